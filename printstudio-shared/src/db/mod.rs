/// Database layer
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: Embedded migrations for `usage_profiles` and `usage_events`
///
/// Models live in the `models` module at crate root level.

pub mod migrations;
pub mod pool;
