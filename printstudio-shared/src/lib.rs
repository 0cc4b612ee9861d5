//! # PrintStudio Shared Library
//!
//! Types and business logic shared by the PrintStudio API server and the
//! inference job worker.
//!
//! ## Module Organization
//!
//! - `db`: Postgres pool and migrations
//! - `models`: Database models (usage profiles, usage events, plan tiers)
//! - `quota`: Usage quota guard and profile stores
//! - `events`: Usage event recorder and event stores
//! - `tools`: Catalog of live tools
//! - `auth`: JWT validation and request auth context

pub mod auth;
pub mod db;
pub mod events;
pub mod models;
pub mod quota;
pub mod tools;

/// Current version of the PrintStudio shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
