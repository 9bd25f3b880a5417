//! Presign Uploadr Library
//!
//! Client-side file validation and two-phase uploads to object storage
//! through presigned URLs.
//!
//! # Features
//!
//! - **Validation**: name, size, declared type and magic-byte checks before
//!   any byte leaves the machine
//! - **Safe Keys**: sanitized, timestamped, UUID-suffixed storage keys
//! - **Rate Limiting**: sliding-window admission per session
//! - **Two-Phase Upload**: request a presigned URL, then PUT to storage
//! - **Status Events**: `uploading` → `success` / `error` per file
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::{config::Config, upload::{UploadFile, UploadOrchestrator}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = UploadOrchestrator::from_config(&config)?;
//!
//!     let file = UploadFile::from_path("photo.png", None).await?;
//!     let report = orchestrator
//!         .submit(vec![file], &|event: &presign_uploadr::upload::UploadEvent| {
//!             println!("{} -> {:?}", event.name, event.status);
//!         })
//!         .await;
//!     assert!(report.all_succeeded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod grant;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod ratelimit;
pub mod upload;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, SecurityConfig};
pub use keys::KeyGenerator;
pub use ratelimit::RateLimiter;
pub use upload::{UploadError, UploadEvent, UploadFile, UploadOrchestrator, UploadStatus};
pub use validation::{FileValidator, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
