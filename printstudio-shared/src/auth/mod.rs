/// Authentication utilities
///
/// Users sign in with the hosted identity provider, which issues HS256 JWTs
/// signed with the project secret. This crate only validates those tokens.
///
/// # Modules
///
/// - [`jwt`]: Claims, token validation, and token minting for tests and tools
/// - [`middleware`]: Axum middleware and extractor for the authenticated user
///
/// # Example
///
/// ```
/// use printstudio_shared::auth::jwt::{create_token, validate_token, Claims};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-project-secret-of-at-least-32-bytes";
/// let claims = Claims::new(Uuid::new_v4(), "authenticated");
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_token(&token, secret, "authenticated")?;
/// assert_eq!(validated.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
