//! Common test utilities for API integration tests
//!
//! Builds the full router over in-memory stores and a scripted provider, so
//! tests run without Postgres or network access.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::Utc;
use printstudio_api::app::{build_router, AppState};
use printstudio_api::config::Config;
use printstudio_shared::auth::jwt::{create_token, Claims};
use printstudio_shared::events::{MemoryUsageEventStore, UsageEventRecorder};
use printstudio_shared::models::{PlanTier, QuotaType, UsageEvent, UsageProfile};
use printstudio_shared::quota::store::{MemoryProfileStore, ProfileStore};
use printstudio_shared::quota::QuotaGuard;
use printstudio_worker::providers::{MockProvider, ProviderSet};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const BOUNDARY: &str = "printstudio-test-boundary";

/// 1x1 PNG result served by the mock provider
pub const RESULT_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

/// Test context with the router and handles on its backing stores
pub struct TestContext {
    pub app: Router,
    pub profiles: Arc<MemoryProfileStore>,
    pub events: Arc<MemoryUsageEventStore>,
    pub provider: Arc<MockProvider>,
    pub user_id: Uuid,
    pub admin_id: Uuid,
}

impl TestContext {
    /// Context whose provider jobs succeed immediately
    pub fn new() -> Self {
        Self::with_provider(MockProvider::succeeding(Value::String(RESULT_DATA_URL.to_string())))
    }

    pub fn with_provider(provider: MockProvider) -> Self {
        Self::build(provider, true)
    }

    /// Context without OpenAI credentials
    pub fn replicate_only() -> Self {
        Self::build(
            MockProvider::succeeding(Value::String(RESULT_DATA_URL.to_string())),
            false,
        )
    }

    fn build(provider: MockProvider, with_openai: bool) -> Self {
        let admin_id = Uuid::new_v4();
        let config = test_config(&[("ADMIN_USER_IDS", &admin_id.to_string())]);

        let profiles = Arc::new(MemoryProfileStore::new());
        let events = Arc::new(MemoryUsageEventStore::new());
        let provider = Arc::new(provider);

        let mut providers = ProviderSet::new().with_replicate(provider.clone());
        if with_openai {
            providers = providers.with_openai(provider.clone());
        }

        let state = AppState::new(
            config,
            None,
            QuotaGuard::new(profiles.clone()),
            UsageEventRecorder::new(events.clone()),
            providers,
        );

        TestContext {
            app: build_router(state),
            profiles,
            events,
            provider,
            user_id: Uuid::new_v4(),
            admin_id,
        }
    }

    /// Seeds a current-period profile for the test user
    pub async fn seed_profile(&self, plan: PlanTier, used: &[(QuotaType, i32)]) {
        let mut profile = UsageProfile::new(self.user_id, plan, Utc::now());
        for &(quota_type, value) in used {
            profile = profile.with_used(quota_type, value);
        }
        self.profiles.upsert(profile).await.unwrap();
    }

    pub async fn used(&self, quota_type: QuotaType) -> u32 {
        self.profiles
            .snapshot(self.user_id)
            .await
            .map(|p| p.used(quota_type))
            .unwrap_or(0)
    }

    pub fn auth_header(&self) -> String {
        bearer(self.user_id)
    }

    pub fn admin_auth_header(&self) -> String {
        bearer(self.admin_id)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Waits for the background event inserts to land
    pub async fn wait_for_events(&self, count: usize) -> Vec<UsageEvent> {
        for _ in 0..200 {
            let events = self.events.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.events.events().await
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
        ("POLL_INTERVAL_MS".to_string(), "10".to_string()),
        ("MAX_UPLOAD_BYTES".to_string(), (1024 * 1024).to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn bearer(user_id: Uuid) -> String {
    let token = create_token(&Claims::new(user_id, "authenticated"), JWT_SECRET).unwrap();
    format!("Bearer {}", token)
}

/// Multipart form builder
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn png(self) -> Self {
        self.file("image", "image/png", &[0x89, b'P', b'N', b'G', 1, 2, 3])
    }

    /// PNG upload of `len` bytes
    pub fn png_of_size(self, len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        bytes[..4].copy_from_slice(&[0x89, b'P', b'N', b'G']);
        self.file("image", "image/png", &bytes)
    }

    pub fn into_request(mut self, uri: &str, auth: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

pub fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    post_raw(uri, auth, "application/json", body.to_string())
}

pub fn post_raw(uri: &str, auth: Option<&str>, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(body.into()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
