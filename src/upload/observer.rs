//! Status observers
//!
//! An observer receives every [`UploadEvent`] in state-machine order for a
//! given file. Rejection notices (rate limit, validation) are separate and
//! never accompany a transition.

use super::{UploadError, UploadEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Receives transitions and notices from the orchestrator
pub trait UploadObserver: Send + Sync {
    /// Called once per state transition
    fn on_transition(&self, event: &UploadEvent);

    /// Called when a file is skipped before entering the pipeline
    fn on_rejected(&self, _file_name: &str, _error: &UploadError) {}
}

impl<F> UploadObserver for F
where
    F: Fn(&UploadEvent) + Send + Sync,
{
    fn on_transition(&self, event: &UploadEvent) {
        self(event)
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {
    fn on_transition(&self, _event: &UploadEvent) {}
}

/// Forwards events to an unbounded channel consumed by the caller
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl UploadObserver for ChannelObserver {
    fn on_transition(&self, event: &UploadEvent) {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(id = %event.id, "event receiver dropped");
        }
    }
}

/// Keeps every event and notice in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UploadEvent>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().clone()
    }

    /// Rejection notices as `"{file}: {error}"`
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_transition(&self, event: &UploadEvent) {
        self.events.lock().push(event.clone());
    }

    fn on_rejected(&self, file_name: &str, error: &UploadError) {
        self.notices.lock().push(format!("{}: {}", file_name, error));
    }
}
