/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use printstudio_api::{app::{build_router, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::from_config(config, None)?;
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use printstudio_shared::{
    auth::middleware::{create_jwt_middleware, AuthContext, JwtSettings},
    events::{PgUsageEventStore, UsageEventRecorder},
    quota::{store::PgProfileStore, QuotaGuard},
};
use printstudio_worker::{
    poller::{JobPoller, PollerConfig, DEFAULT_MAX_POLLS},
    providers::{OpenAiImageProvider, ProviderSet, ReplicateProvider},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Room for multipart boundaries and text fields on top of the image
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every field
/// is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// `None` when running without persistence
    pub db: Option<PgPool>,

    pub quota: QuotaGuard,
    pub events: UsageEventRecorder,
    pub providers: ProviderSet,
    pub poller: JobPoller,

    /// Client used to download job results
    pub http: reqwest::Client,

    pub jwt: JwtSettings,
}

impl AppState {
    /// Wires stores and providers from configuration
    ///
    /// Without a pool, quota checks run unconfigured (policy decides) and
    /// usage events are dropped. Providers without credentials are left out
    /// and their tools fail at call time.
    pub fn from_config(config: Config, db: Option<PgPool>) -> anyhow::Result<Self> {
        let (quota, events) = match &db {
            Some(pool) => (
                QuotaGuard::new(Arc::new(PgProfileStore::new(pool.clone()))),
                UsageEventRecorder::new(Arc::new(PgUsageEventStore::new(pool.clone()))),
            ),
            None => {
                tracing::warn!("No database configured, usage is neither enforced nor recorded");
                (QuotaGuard::unconfigured(), UsageEventRecorder::disabled())
            }
        };
        let quota = quota.with_policy(config.quota.failure_policy);

        let mut providers = ProviderSet::new();
        match &config.providers.replicate_token {
            Some(token) => {
                providers = providers.with_replicate(Arc::new(ReplicateProvider::new(
                    token.clone(),
                    config.providers.replicate_base_url.clone(),
                )?));
            }
            None => tracing::warn!("REPLICATE_API_TOKEN not set, Replicate tools are disabled"),
        }
        match &config.providers.openai_api_key {
            Some(key) => {
                providers = providers.with_openai(Arc::new(OpenAiImageProvider::new(
                    key.clone(),
                    config.providers.openai_base_url.clone(),
                )?));
            }
            None => tracing::warn!("OPENAI_API_KEY not set, OpenAI tools are disabled"),
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self::new(config, db, quota, events, providers).with_http(http))
    }

    /// Creates state from already built components
    pub fn new(
        config: Config,
        db: Option<PgPool>,
        quota: QuotaGuard,
        events: UsageEventRecorder,
        providers: ProviderSet,
    ) -> Self {
        let poller = JobPoller::new(PollerConfig {
            poll_interval: config.providers.poll_interval,
            max_polls: DEFAULT_MAX_POLLS,
        });
        let jwt = JwtSettings::new(config.jwt.secret.clone(), config.jwt.audience.clone());

        Self {
            config: Arc::new(config),
            db,
            quota,
            events,
            providers,
            poller,
            http: reqwest::Client::new(),
            jwt,
        }
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                        # public
/// └── /v1/
///     ├── GET  /tools                     # public catalog
///     ├── POST /tools/:tool               # JWT, multipart upload
///     ├── GET  /usage                     # JWT
///     ├── POST /usage/check               # JWT
///     └── /admin/analytics/               # JWT + admin
///         ├── GET /summary?days=
///         ├── GET /tools?days=
///         └── GET /daily?days=
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication and admin check (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let jwt_layer = middleware::from_fn(create_jwt_middleware(state.jwt.clone()));
    let upload_limit = state.config.api.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_routes = Router::new().route("/tools", get(routes::tools::list_tools));

    let tool_routes = Router::new()
        .route("/tools/:tool", post(routes::tools::run_tool))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(jwt_layer.clone());

    let usage_routes = Router::new()
        .route("/usage", get(routes::usage::get_usage))
        .route("/usage/check", post(routes::usage::check_usage))
        .layer(jwt_layer.clone());

    let admin_routes = Router::new()
        .route("/admin/analytics/summary", get(routes::admin::analytics_summary))
        .route("/admin/analytics/tools", get(routes::admin::analytics_tools))
        .route("/admin/analytics/daily", get(routes::admin::analytics_daily))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(jwt_layer);

    let v1_routes = Router::new()
        .merge(public_routes)
        .merge(tool_routes)
        .merge(usage_routes)
        .merge(admin_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Admin check; runs after JWT authentication
async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = req
        .extensions()
        .get::<AuthContext>()
        .map(|auth| auth.user_id)
        .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;

    if !state.config.is_admin(user_id) {
        tracing::warn!(user_id = %user_id, "Non-admin user attempted admin access");
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}
