/// API route handlers
///
/// - `health`: Health check endpoint
/// - `tools`: Tool catalog and tool invocation
/// - `usage`: Quota summary and pre-flight checks
/// - `admin`: Usage analytics for administrators

pub mod admin;
pub mod health;
pub mod tools;
pub mod usage;
