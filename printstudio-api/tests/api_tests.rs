//! End-to-end API tests
//!
//! Drive the router with in-memory stores and a scripted provider:
//! - authentication and tool lookup
//! - upload validation
//! - quota enforcement and usage counting
//! - usage events and admin analytics

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json, post_raw, Form, TestContext, RESULT_DATA_URL};
use printstudio_shared::models::{PlanTier, QuotaType, UsageStatus};
use printstudio_worker::providers::{JobStatus, MockProvider};
use serde_json::json;

#[tokio::test]
async fn test_health_without_database() {
    let ctx = TestContext::new();

    let response = ctx.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "unconfigured");
    assert_eq!(body["providers"]["replicate"], true);
    assert_eq!(body["providers"]["openai"], true);
}

#[tokio::test]
async fn test_tool_catalog_is_public() {
    let ctx = TestContext::new();

    let response = ctx.send(get("/v1/tools", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let tools = body["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "color-change"));
    assert!(tools.iter().all(|t| t.get("prompt_template").is_none()));
}

#[tokio::test]
async fn test_tool_requires_authentication() {
    let ctx = TestContext::new();

    let request = Form::new().png().into_request("/v1/tools/background-removal", None);
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.provider.submit_count(), 0);
}

#[tokio::test]
async fn test_non_bearer_authorization_is_unauthorized() {
    let ctx = TestContext::new();

    let request = Form::new()
        .png()
        .into_request("/v1/tools/background-removal", Some("Basic dXNlcjpwYXNz"));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "unauthorized");
    assert_eq!(ctx.provider.submit_count(), 0);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let request = Form::new().png().into_request("/v1/tools/teleport", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn test_missing_image_is_bad_request() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[]).await;
    let auth = ctx.auth_header();

    let request = Form::new()
        .text("color", "red")
        .into_request("/v1/tools/color-change", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Image file is required");
    assert_eq!(ctx.provider.submit_count(), 0);
}

#[tokio::test]
async fn test_non_image_upload_is_bad_request() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let request = Form::new()
        .file("image", "text/plain", b"hello")
        .into_request("/v1/tools/background-removal", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_reports_limit() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[]).await;
    let auth = ctx.auth_header();

    // Just over the image limit, still inside the body allowance
    let request = Form::new()
        .png_of_size(1024 * 1024 + 16)
        .into_request("/v1/tools/background-removal", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Image exceeds the 1 MB upload limit");

    // Cut off by the body limit while streaming
    let request = Form::new()
        .png_of_size(2 * 1024 * 1024)
        .into_request("/v1/tools/background-removal", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
    assert_eq!(body["error"], "Image exceeds the 1 MB upload limit");

    assert_eq!(ctx.provider.submit_count(), 0);
    assert_eq!(ctx.used(QuotaType::Images).await, 0);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let response = ctx
        .send(post_raw(
            "/v1/tools/background-removal",
            Some(&auth),
            "application/json",
            "{}",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "bad_request");

    let response = ctx
        .send(post_raw("/v1/usage/check", Some(&auth), "application/json", "{not json"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "bad_request");

    let admin = ctx.admin_auth_header();
    let response = ctx
        .send(get("/v1/admin/analytics/summary?days=abc", Some(&admin)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
    assert!(body["error"].is_string());

    assert_eq!(ctx.provider.submit_count(), 0);
}

#[tokio::test]
async fn test_missing_required_field_is_bad_request() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let request = Form::new().png().into_request("/v1/tools/color-change", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing required field: color");
}

#[tokio::test]
async fn test_successful_invocation_charges_usage() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Images, 2)]).await;
    let auth = ctx.auth_header();

    let request = Form::new()
        .png()
        .text("color", "glossy blue")
        .into_request("/v1/tools/color-change", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["image"], RESULT_DATA_URL);

    assert_eq!(ctx.used(QuotaType::Images).await, 3);
    assert_eq!(ctx.used(QuotaType::Scenes).await, 0);

    let submitted = ctx.provider.last_request().unwrap();
    assert_eq!(submitted.model, "black-forest-labs/flux-kontext-pro");
    assert!(submitted.params["prompt"].contains("glossy blue"));

    let events = ctx.wait_for_events(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, UsageStatus::Success.as_str());
    assert_eq!(events[0].tool_name, "color-change");
    assert_eq!(events[0].user_id, ctx.user_id);
}

#[tokio::test]
async fn test_exhausted_quota_is_refused() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Scenes, 2)]).await;
    let auth = ctx.auth_header();

    let request = Form::new()
        .png()
        .text("description", "a sunlit workbench")
        .into_request("/v1/tools/scene-generation", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["code"], "quota_exceeded");
    assert_eq!(body["current_usage"], 2);
    assert_eq!(body["limit"], 2);
    assert!(body["reason"].as_str().unwrap().contains("Monthly scenes"));

    assert_eq!(ctx.provider.submit_count(), 0);
    assert_eq!(ctx.used(QuotaType::Scenes).await, 2);

    let events = ctx.wait_for_events(1).await;
    assert_eq!(events[0].status, UsageStatus::RateLimited.as_str());
}

#[tokio::test]
async fn test_user_without_profile_is_allowed_but_not_charged() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let request = Form::new().png().into_request("/v1/tools/background-removal", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(ctx.profiles.snapshot(ctx.user_id).await.is_none());
}

#[tokio::test]
async fn test_failed_job_is_not_charged() {
    let ctx = TestContext::with_provider(
        MockProvider::new(vec![JobStatus::Processing, JobStatus::Failed])
            .with_error("NSFW content detected"),
    );
    ctx.seed_profile(PlanTier::Starter, &[]).await;
    let auth = ctx.auth_header();

    let request = Form::new()
        .png()
        .text("texture", "brushed metal")
        .into_request("/v1/tools/texture-change", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "processing_failed");
    assert_eq!(body["error"], "NSFW content detected");

    assert_eq!(ctx.used(QuotaType::Images).await, 0);

    let events = ctx.wait_for_events(1).await;
    assert_eq!(events[0].status, UsageStatus::Error.as_str());
    assert!(events[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("NSFW content detected"));
}

#[tokio::test]
async fn test_unconfigured_provider_fails_without_charge() {
    let ctx = TestContext::replicate_only();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Images, 1)]).await;
    let auth = ctx.auth_header();

    let request = Form::new()
        .png()
        .text("prompt", "make it chrome")
        .into_request("/v1/tools/prompt-edit", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "processing_failed");
    assert_eq!(body["error"], "openai is not configured");

    assert_eq!(ctx.provider.submit_count(), 0);
    assert_eq!(ctx.used(QuotaType::Images).await, 1);

    let events = ctx.wait_for_events(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, UsageStatus::Error.as_str());
    assert_eq!(events[0].tool_name, "prompt-edit");
}

#[tokio::test]
async fn test_three_d_output_uses_model_keys() {
    let ctx = TestContext::with_provider(MockProvider::succeeding(json!({
        "preview": "data:image/png;base64,AAAA",
        "model_file": "data:model/gltf-binary;base64,Z2xURg=="
    })));
    ctx.seed_profile(PlanTier::Pro, &[]).await;
    let auth = ctx.auth_header();

    let request = Form::new().png().into_request("/v1/tools/image-to-3d", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["image"],
        "data:model/gltf-binary;base64,Z2xURg=="
    );
    assert_eq!(ctx.used(QuotaType::Models3d).await, 1);
}

#[tokio::test]
async fn test_usage_summary() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Starter, &[(QuotaType::Images, 7)]).await;
    let auth = ctx.auth_header();

    let response = ctx.send(get("/v1/usage", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["plan"], "starter");
    let images = body["quotas"]
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["quota_type"] == "images")
        .unwrap();
    assert_eq!(images["used"], 7);
    assert_eq!(images["limit"], 50);
    assert_eq!(images["remaining"], 43);
}

#[tokio::test]
async fn test_usage_summary_without_profile() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let response = ctx.send(get("/v1/usage", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_usage_check() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Models3d, 1)]).await;
    let auth = ctx.auth_header();

    let response = ctx
        .send(post_json("/v1/usage/check", Some(&auth), json!({ "tool": "image-to-3d" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["current_usage"], 1);
    assert_eq!(body["limit"], 1);
    assert!(body["reason"].is_string());

    let response = ctx
        .send(post_json("/v1/usage/check", Some(&auth), json!({ "tool": "background-removal" })))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["remaining"], 5);
    assert!(body.get("reason").is_none());

    // The pre-flight check consumes nothing
    assert_eq!(ctx.used(QuotaType::Images).await, 0);
}

#[tokio::test]
async fn test_usage_check_validation() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let response = ctx
        .send(post_json("/v1/usage/check", Some(&auth), json!({ "tool": "" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = ctx
        .send(post_json("/v1/usage/check", Some(&auth), json!({ "tool": "teleport" })))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Images, 5)]).await;
    ctx.profiles.set_unavailable(true);
    let auth = ctx.auth_header();

    let request = Form::new().png().into_request("/v1/tools/background-removal", Some(&auth));
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_analytics_requires_admin() {
    let ctx = TestContext::new();
    let auth = ctx.auth_header();

    let response = ctx.send(get("/v1/admin/analytics/summary", Some(&auth))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx.send(get("/v1/admin/analytics/summary", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_analytics() {
    let ctx = TestContext::new();
    ctx.seed_profile(PlanTier::Free, &[(QuotaType::Images, 4)]).await;
    let auth = ctx.auth_header();

    for _ in 0..2 {
        let request = Form::new().png().into_request("/v1/tools/background-removal", Some(&auth));
        ctx.send(request).await;
    }
    ctx.wait_for_events(2).await;

    let admin = ctx.admin_auth_header();

    let response = ctx.send(get("/v1/admin/analytics/summary?days=7", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["days"], 7);
    assert_eq!(body["data"]["total_events"], 2);
    assert_eq!(body["data"]["successes"], 1);
    assert_eq!(body["data"]["rate_limited"], 1);
    assert_eq!(body["data"]["distinct_users"], 1);

    let response = ctx.send(get("/v1/admin/analytics/tools", Some(&admin))).await;
    let body = body_json(response).await;
    assert_eq!(body["days"], 30);
    assert_eq!(body["data"][0]["tool_name"], "background-removal");
    assert_eq!(body["data"][0]["total"], 2);

    let response = ctx.send(get("/v1/admin/analytics/daily", Some(&admin))).await;
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["total"], 2);

    let response = ctx.send(get("/v1/admin/analytics/daily?days=400", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
