//! # PrintStudio Worker Library
//!
//! Runs tool jobs on third-party inference providers and waits for their
//! results.
//!
//! ## Modules
//!
//! - `providers`: Provider trait, Replicate / OpenAI clients and a scripted mock
//! - `poller`: Submit-then-poll loop running as a cancellable background task
//! - `output`: Normalization of provider output shapes and result download
//!
//! ## Example
//!
//! ```no_run
//! use printstudio_worker::poller::{JobPoller, PollerConfig};
//! use printstudio_worker::providers::{JobRequest, ImageInput, mock::MockProvider};
//! use printstudio_worker::providers::JobStatus;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(MockProvider::new(vec![JobStatus::Processing, JobStatus::Succeeded]));
//! let request = JobRequest::new(
//!     "lucataco/remove-bg",
//!     "image",
//!     ImageInput::new(vec![0u8; 16], "image/png"),
//! );
//!
//! let handle = JobPoller::new(PollerConfig::default()).spawn(provider, request, &["image", "output"]);
//! let result = handle.wait().await?;
//! println!("Result at {}", result.output_url);
//! # Ok(())
//! # }
//! ```

pub mod output;
pub mod poller;
pub mod providers;
