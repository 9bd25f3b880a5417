//! Upload module
//!
//! Per-file state machine and the two-phase presigned upload:
//!
//! ```text
//! pending ──► uploading ──► success
//!                  │
//!                  └──────► error
//! ```
//!
//! Files rejected by the rate limiter or the validator never leave
//! `pending` and produce no transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod file;
pub mod observer;
pub mod orchestrator;
pub mod transfer;

pub use file::{FileSource, UploadFile};
pub use observer::{ChannelObserver, NoopObserver, RecordingObserver, UploadObserver};
pub use orchestrator::{BatchReport, FileOutcome, UploadOrchestrator};

use crate::grant::GrantError;
use transfer::TransferError;

/// Upload errors, one per failure class
#[derive(Error, Debug)]
pub enum UploadError {
    /// Rate limit exceeded. The file never entered the pipeline.
    #[error("Upload rate limit exceeded. Please try again in {}s.", .window.as_secs().max(1))]
    AdmissionRejected { remaining: u32, window: Duration },

    /// The batch holds more files than the configured maximum.
    #[error("Too many files in one upload (max {limit})")]
    BatchLimitExceeded { limit: usize },

    #[error("File validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    GrantRequestFailed(#[from] GrantError),

    #[error(transparent)]
    TransferFailed(#[from] TransferError),

    #[error("Could not read file content: {0}")]
    Read(#[from] std::io::Error),

    /// The orchestrator could not be built. Raised before any file is seen.
    #[error("Invalid upload configuration: {0}")]
    Configuration(String),
}

impl UploadError {
    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdmissionRejected { .. } => "admission_rejected",
            Self::BatchLimitExceeded { .. } => "batch_limit_exceeded",
            Self::ValidationFailed(_) => "validation_failed",
            Self::GrantRequestFailed(_) => "grant_request_failed",
            Self::TransferFailed(_) => "transfer_failed",
            Self::Read(_) => "read",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Rejections happen before `uploading`; everything else ends in `error`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::AdmissionRejected { .. } | Self::BatchLimitExceeded { .. } | Self::ValidationFailed(_)
        )
    }
}

/// Per-file status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Allowed transitions of the state machine
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading)
                | (Self::Uploading, Self::Success)
                | (Self::Uploading, Self::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One file's progress through the pipeline
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub status: UploadStatus,
    /// Storage key, empty until success
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(file: &UploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: file.name().to_string(),
            size: file.size(),
            content_type: file.content_type().to_string(),
            status: UploadStatus::Pending,
            key: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Advance to `next`, returning the event to publish.
    ///
    /// Returns `None` and leaves the task untouched for transitions the
    /// state machine does not allow.
    pub(crate) fn advance(&mut self, next: UploadStatus) -> Option<UploadEvent> {
        if !self.status.can_transition_to(next) {
            tracing::error!(
                task = %self.id,
                from = self.status.as_str(),
                to = next.as_str(),
                "invalid upload state transition"
            );
            return None;
        }
        self.status = next;
        Some(UploadEvent::from(&*self))
    }
}

/// Payload handed to observers on each transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub id: Uuid,
    pub name: String,
    /// Storage key on success, empty otherwise
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub status: UploadStatus,
}

impl From<&UploadTask> for UploadEvent {
    fn from(task: &UploadTask) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            url: if task.status == UploadStatus::Success {
                task.key.clone()
            } else {
                String::new()
            },
            size: task.size,
            uploaded_at: Utc::now(),
            status: task.status,
        }
    }
}
