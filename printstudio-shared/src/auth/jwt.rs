/// JWT validation
///
/// Access tokens come from the hosted identity provider: HS256 signed with the
/// project secret, `sub` holding the user id and `aud` the audience
/// (`authenticated` for signed-in users).
///
/// # Validation
///
/// - **Algorithm**: HS256 only
/// - **Expiry**: `exp` required and checked
/// - **Audience**: must match the configured audience
///
/// [`create_token`] exists for tests and local tooling; production tokens
/// are never minted here.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Audience mismatch
    #[error("Invalid audience")]
    InvalidAudience,
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    /// Audience
    pub aud: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Database role of the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    /// Creates claims valid for one hour
    pub fn new(user_id: Uuid, audience: impl Into<String>) -> Self {
        Self::with_expiration(user_id, audience, Duration::hours(1))
    }

    pub fn with_expiration(user_id: Uuid, audience: impl Into<String>, expires_in: Duration) -> Self {
        let now = Utc::now();
        let audience = audience.into();

        Self {
            sub: user_id,
            role: Some(audience.clone()),
            aud: audience,
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a token and extracts its claims
///
/// Verifies the signature, expiry and audience.
pub fn validate_token(token: &str, secret: &str, audience: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidAudience => JwtError::InvalidAudience,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
