//! # PrintStudio API Server Library
//!
//! HTTP surface of PrintStudio: image tools backed by third-party inference
//! providers, with per-plan usage quotas and usage analytics.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
