/// Authentication middleware for Axum
///
/// [`jwt_auth_middleware`] validates `Authorization: Bearer <token>` and
/// inserts an [`AuthContext`] into the request extensions. Handlers take
/// `AuthContext` as an extractor; it rejects with 401 when the middleware did
/// not run or did not authenticate the request.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware};
/// use printstudio_shared::auth::middleware::{create_jwt_middleware, AuthContext, JwtSettings};
///
/// async fn handler(auth: AuthContext) -> String {
///     format!("Hello, user {}!", auth.user_id)
/// }
///
/// let settings = JwtSettings::new("a-project-secret-of-at-least-32-bytes", "authenticated");
/// let app: Router = Router::new()
///     .route("/protected", get(handler))
///     .layer(middleware::from_fn(create_jwt_middleware(settings)));
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{validate_token, JwtError};

/// Secret and audience tokens are validated against
#[derive(Clone)]
pub struct JwtSettings {
    secret: Arc<str>,
    audience: Arc<str>,
}

impl JwtSettings {
    pub fn new(secret: impl Into<String>, audience: impl Into<String>) -> Self {
        JwtSettings {
            secret: Arc::from(secret.into()),
            audience: Arc::from(audience.into()),
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Error type for authentication middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Invalid authorization header format
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Any request without a usable session is unauthenticated
        let message = match self {
            AuthError::MissingCredentials => "Missing credentials".to_string(),
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => msg,
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": message, "code": "unauthorized" })),
        )
            .into_response()
    }
}

/// Validates the bearer token of a request
pub fn authenticate(headers: &axum::http::HeaderMap, settings: &JwtSettings) -> Result<AuthContext, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = validate_token(token, &settings.secret, &settings.audience).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidAudience => AuthError::InvalidToken("Invalid audience".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    Ok(AuthContext {
        user_id: claims.sub,
        email: claims.email,
    })
}

/// JWT authentication middleware
///
/// Returns 401 unless the request carries a valid, unexpired bearer token.
pub async fn jwt_auth_middleware(
    settings: JwtSettings,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = authenticate(req.headers(), &settings)?;

    tracing::debug!(user_id = %auth_context.user_id, "Request authenticated");
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// Creates a JWT authentication middleware closure
pub fn create_jwt_middleware(
    settings: JwtSettings,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>> + Clone {
    move |req, next| {
        let settings = settings.clone();
        Box::pin(jwt_auth_middleware(settings, req, next))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}
