//! Upload orchestrator
//!
//! Drives each file of a batch through admission, validation, grant
//! request and storage PUT, publishing transitions to an observer.
//!
//! # Flow (per file)
//!
//! 1. Rate limiter admission; rejected files are skipped with a notice
//! 2. Validation against the effective [`SecurityConfig`]; failures are
//!    skipped with a notice
//! 3. `pending → uploading`
//! 4. Grant request; failure ends in `error`
//! 5. PUT to the granted URL; failure ends in `error`
//! 6. Record the upload with the rate limiter, then `uploading → success`
//!
//! Files are processed one after another. A failure only affects its own
//! file.
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::config::Config;
//! use presign_uploadr::upload::{RecordingObserver, UploadFile, UploadOrchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let orchestrator = UploadOrchestrator::from_config(&config)?;
//!
//! let observer = RecordingObserver::new();
//! let file = UploadFile::from_path("photo.png", None).await?;
//! let report = orchestrator.submit(vec![file], &observer).await;
//! for task in report.succeeded() {
//!     println!("{} stored at {}", task.name, task.key);
//! }
//! # Ok(())
//! # }
//! ```

use super::observer::UploadObserver;
use super::transfer::{PresignedPutTransfer, StorageTransfer};
use super::{UploadError, UploadFile, UploadStatus, UploadTask};
use crate::config::{Config, GrantFileName, SecurityConfig};
use crate::grant::{GrantClient, HttpGrantClient};
use crate::keys::KeyGenerator;
use crate::metrics;
use crate::ratelimit::{RateLimiter, SharedRateLimiter};
use crate::validation::{FileValidator, SecurityOverrides};
use std::sync::Arc;
use std::time::Instant;

/// Final outcome for one submitted file
#[derive(Debug)]
pub enum FileOutcome {
    /// Reached `success`
    Uploaded { task: UploadTask },
    /// Skipped before entering the pipeline; no transition was emitted
    Rejected { name: String, error: UploadError },
    /// Reached `error`
    Failed { task: UploadTask, error: UploadError },
}

impl FileOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Uploaded { task } | Self::Failed { task, .. } => &task.name,
            Self::Rejected { name, .. } => name,
        }
    }

    pub fn error(&self) -> Option<&UploadError> {
        match self {
            Self::Uploaded { .. } => None,
            Self::Rejected { error, .. } | Self::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

/// Outcomes of one `submit` call, in submission order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &UploadTask> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Uploaded { task } => Some(task),
            _ => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&str, &UploadError)> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Rejected { name, error } => Some((name.as_str(), error)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&UploadTask, &UploadError)> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Failed { task, error } => Some((task, error)),
            _ => None,
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_success)
    }
}

/// Sequences the upload pipeline for batches of files.
///
/// Cheap to share: concurrent `submit` calls on one orchestrator see the
/// same rate-limit window.
pub struct UploadOrchestrator {
    grant_client: Arc<dyn GrantClient>,
    transfer: Arc<dyn StorageTransfer>,
    rate_limiter: SharedRateLimiter,
    key_generator: KeyGenerator,
    security: SecurityConfig,
    default_content_type: String,
    grant_file_name: GrantFileName,
}

impl UploadOrchestrator {
    /// Create an orchestrator with default security, rate-limit and key
    /// settings.
    pub fn new(grant_client: Arc<dyn GrantClient>, transfer: Arc<dyn StorageTransfer>) -> Self {
        let defaults = Config::default();
        Self {
            grant_client,
            transfer,
            rate_limiter: RateLimiter::from_config(&defaults.rate_limit).into(),
            key_generator: KeyGenerator::from_config(&defaults.storage),
            security: defaults.security,
            default_content_type: defaults.transfer.default_content_type,
            grant_file_name: defaults.grant.file_name,
        }
    }

    /// Build the HTTP-backed orchestrator described by `config`
    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        if config.grant.base_url.is_empty() {
            return Err(UploadError::Configuration(
                "grant.base_url is not configured".into(),
            ));
        }

        let grant_client = HttpGrantClient::new(config.grant.endpoint(), config.grant.timeout())
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        let transfer = PresignedPutTransfer::new(config.transfer.timeout())
            .map_err(|e| UploadError::Configuration(e.to_string()))?;

        Ok(Self::new(Arc::new(grant_client), Arc::new(transfer))
            .with_rate_limiter(RateLimiter::from_config(&config.rate_limit).into())
            .with_key_generator(KeyGenerator::from_config(&config.storage))
            .with_security_config(config.security.clone())
            .with_default_content_type(config.transfer.default_content_type.clone())
            .with_grant_file_name(config.grant.file_name))
    }

    pub fn with_rate_limiter(mut self, rate_limiter: SharedRateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn with_security_config(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Choose what the grant request carries as `fileName`
    pub fn with_grant_file_name(mut self, grant_file_name: GrantFileName) -> Self {
        self.grant_file_name = grant_file_name;
        self
    }

    pub fn rate_limiter(&self) -> &SharedRateLimiter {
        &self.rate_limiter
    }

    pub fn security_config(&self) -> &SecurityConfig {
        &self.security
    }

    /// Submit a batch with the configured security settings
    pub async fn submit(&self, files: Vec<UploadFile>, observer: &dyn UploadObserver) -> BatchReport {
        self.submit_with(files, &SecurityOverrides::default(), observer)
            .await
    }

    /// Submit a batch with per-call security overrides
    #[tracing::instrument(
        name = "upload.batch",
        skip_all,
        fields(batch.files = files.len(), batch.overrides = !overrides.is_empty())
    )]
    pub async fn submit_with(
        &self,
        files: Vec<UploadFile>,
        overrides: &SecurityOverrides,
        observer: &dyn UploadObserver,
    ) -> BatchReport {
        let config = overrides.apply(&self.security);
        let limit = config.max_files_per_upload;
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(files.len()),
        };

        for (index, file) in files.into_iter().enumerate() {
            let outcome = if index >= limit {
                self.reject(file.name(), UploadError::BatchLimitExceeded { limit }, observer)
            } else {
                self.process_file(file, &config, observer).await
            };
            report.outcomes.push(outcome);
        }

        tracing::info!(
            succeeded = report.succeeded().count(),
            rejected = report.rejected().count(),
            failed = report.failed().count(),
            "batch finished"
        );

        report
    }

    #[tracing::instrument(
        name = "upload.file",
        skip_all,
        fields(
            file.name = %file.name(),
            file.size = file.size(),
            upload.id = tracing::field::Empty,
            upload.key = tracing::field::Empty
        )
    )]
    async fn process_file(
        &self,
        file: UploadFile,
        config: &SecurityConfig,
        observer: &dyn UploadObserver,
    ) -> FileOutcome {
        if !self.rate_limiter.can_upload() {
            metrics::record_admission_rejection();
            let error = UploadError::AdmissionRejected {
                remaining: self.rate_limiter.remaining_uploads(),
                window: self.rate_limiter.window(),
            };
            return self.reject(file.name(), error, observer);
        }

        let validation = FileValidator::validate(&file, config).await;
        if !validation.is_valid {
            if let Some(check) = validation.check {
                metrics::record_validation_failure(check.as_str());
            }
            let reason = validation
                .reason
                .unwrap_or_else(|| "unknown validation failure".to_string());
            return self.reject(file.name(), UploadError::ValidationFailed(reason), observer);
        }

        let mut task = UploadTask::new(&file);
        tracing::Span::current().record("upload.id", tracing::field::display(task.id));
        self.emit(&mut task, UploadStatus::Uploading, observer);

        match self.transfer_file(&file).await {
            Ok(key) => {
                self.rate_limiter.record_upload();
                metrics::record_upload_success(file.size());
                tracing::Span::current().record("upload.key", key.as_str());

                task.key = key;
                self.emit(&mut task, UploadStatus::Success, observer);
                tracing::info!(key = %task.key, "upload succeeded");
                FileOutcome::Uploaded { task }
            }
            Err(error) => {
                metrics::record_upload_failure();
                metrics::record_error(error.kind());
                tracing::error!(error = %error, "upload failed");

                self.emit(&mut task, UploadStatus::Error, observer);
                FileOutcome::Failed { task, error }
            }
        }
    }

    /// Grant request followed by the PUT. Returns the stored key.
    async fn transfer_file(&self, file: &UploadFile) -> Result<String, UploadError> {
        let generated_key = self.key_generator.generate_key(file.name());
        let requested_name = match self.grant_file_name {
            GrantFileName::GeneratedKey => generated_key.clone(),
            GrantFileName::OriginalName => file.name().to_string(),
        };

        let grant_started = Instant::now();
        let grant = self
            .grant_client
            .request_upload_url(&requested_name, file.content_type())
            .await;
        metrics::record_phase_duration("grant", grant_started.elapsed().as_secs_f64());
        let grant = grant?;

        if !grant.s3_key.is_empty() && grant.s3_key != requested_name {
            tracing::debug!(
                requested = %requested_name,
                granted = %grant.s3_key,
                "grant endpoint assigned a different key"
            );
        }

        let body = file.read_body().await?;
        let content_type = if file.content_type().is_empty() {
            self.default_content_type.as_str()
        } else {
            file.content_type()
        };

        let transfer_started = Instant::now();
        let result = self.transfer.put(&grant.upload_url, body, content_type).await;
        metrics::record_phase_duration("transfer", transfer_started.elapsed().as_secs_f64());
        result?;

        Ok(if grant.s3_key.is_empty() {
            requested_name
        } else {
            grant.s3_key
        })
    }

    fn emit(&self, task: &mut UploadTask, next: UploadStatus, observer: &dyn UploadObserver) {
        if let Some(event) = task.advance(next) {
            tracing::info!(status = next.as_str(), url = %event.url, "upload transition");
            observer.on_transition(&event);
        }
    }

    fn reject(&self, name: &str, error: UploadError, observer: &dyn UploadObserver) -> FileOutcome {
        tracing::warn!(file = %name, error = %error, "file skipped");
        observer.on_rejected(name, &error);
        FileOutcome::Rejected {
            name: name.to_string(),
            error,
        }
    }
}
