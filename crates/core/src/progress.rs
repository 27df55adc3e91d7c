//! Progress reporting for [`Epub::load_with`](crate::loader::Epub::load_with).

use std::sync::Mutex;

/// Operation name of the per-stage load events (`current` runs 0..=5).
pub const LOAD_OPERATION: &str = "Loading EPUB";
pub const LOAD_STAGES: u64 = 5;
/// Operation name of the per-page events, one per fetched content document.
pub const EXTRACT_OPERATION: &str = "Extracting pages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub operation: String,
    pub current: u64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Receives progress updates. Page fetches run concurrently, so handlers
/// are shared across them.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

pub struct NoopProgress;

impl ProgressHandler for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressHandler for RecordingProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Emit an event if a handler is present.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    operation: &str,
    current: u64,
    total: Option<u64>,
    message: Option<&str>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            operation: operation.to_string(),
            current,
            total,
            message: message.map(str::to_string),
        });
    }
}
