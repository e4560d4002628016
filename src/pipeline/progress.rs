//! Report-processing progress as a small linear state machine.
//!
//! `Reading -> Analyzing -> Discussing -> Finalizing -> Complete`, with
//! `Error` reachable from any stage that hasn't finished. Transitions are
//! driven by the processor as each step actually completes.

use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Reading,
    Analyzing,
    Discussing,
    Finalizing,
    Complete,
    Error,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Analyzing => "analyzing",
            Self::Discussing => "discussing",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// The stage that follows on success.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Reading => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Discussing),
            Self::Discussing => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Complete),
            Self::Complete | Self::Error => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn can_transition_to(&self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == Self::Error || self.next() == Some(target)
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Illegal progress transition: {from} -> {to}")]
pub struct ProgressError {
    pub from: ProcessingStage,
    pub to: ProcessingStage,
}

/// Receives stage changes. Implementations must not block for long: they
/// run on the processing thread.
pub trait ProgressObserver {
    fn on_stage(&self, stage: ProcessingStage);

    fn on_error(&self, _message: &str) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_stage(&self, _stage: ProcessingStage) {}
}

/// Records every notification. Used by tests and by callers polling state.
#[derive(Default)]
pub struct RecordingObserver {
    stages: Mutex<Vec<ProcessingStage>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<ProcessingStage> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last_stage(&self) -> Option<ProcessingStage> {
        self.stages().last().copied()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_stage(&self, stage: ProcessingStage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }

    fn on_error(&self, message: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message.to_string());
        }
    }
}

/// Current stage of one processing run, notifying an observer on change.
pub struct ProgressTracker<'a> {
    stage: ProcessingStage,
    observer: &'a dyn ProgressObserver,
    stage_started: Instant,
}

impl<'a> ProgressTracker<'a> {
    /// Start in `Reading` and announce it.
    pub fn start(observer: &'a dyn ProgressObserver) -> Self {
        observer.on_stage(ProcessingStage::Reading);
        Self {
            stage: ProcessingStage::Reading,
            observer,
            stage_started: Instant::now(),
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    pub fn advance(&mut self, to: ProcessingStage) -> Result<(), ProgressError> {
        if !self.stage.can_transition_to(to) {
            return Err(ProgressError {
                from: self.stage,
                to,
            });
        }
        tracing::debug!(
            from = %self.stage,
            to = %to,
            elapsed_ms = %self.stage_started.elapsed().as_millis(),
            "Processing stage complete"
        );
        self.stage = to;
        self.stage_started = Instant::now();
        self.observer.on_stage(to);
        Ok(())
    }

    /// Move to `Error` and report the message. No-op once terminal.
    pub fn fail(&mut self, message: &str) {
        if self.stage.is_terminal() {
            return;
        }
        tracing::warn!(stage = %self.stage, "Processing failed");
        self.stage = ProcessingStage::Error;
        self.observer.on_stage(ProcessingStage::Error);
        self.observer.on_error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_order() {
        let mut stage = ProcessingStage::Reading;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(
            seen,
            [
                ProcessingStage::Reading,
                ProcessingStage::Analyzing,
                ProcessingStage::Discussing,
                ProcessingStage::Finalizing,
                ProcessingStage::Complete,
            ]
        );
    }

    #[test]
    fn error_reachable_from_every_non_terminal_stage() {
        for stage in [
            ProcessingStage::Reading,
            ProcessingStage::Analyzing,
            ProcessingStage::Discussing,
            ProcessingStage::Finalizing,
        ] {
            assert!(stage.can_transition_to(ProcessingStage::Error));
        }
        assert!(!ProcessingStage::Complete.can_transition_to(ProcessingStage::Error));
        assert!(!ProcessingStage::Error.can_transition_to(ProcessingStage::Reading));
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let observer = RecordingObserver::new();
        let mut tracker = ProgressTracker::start(&observer);
        let err = tracker.advance(ProcessingStage::Finalizing).unwrap_err();
        assert_eq!(err.from, ProcessingStage::Reading);
        assert_eq!(tracker.stage(), ProcessingStage::Reading);
        assert_eq!(observer.stages(), [ProcessingStage::Reading]);
    }

    #[test]
    fn observer_sees_each_transition() {
        let observer = RecordingObserver::new();
        let mut tracker = ProgressTracker::start(&observer);
        tracker.advance(ProcessingStage::Analyzing).unwrap();
        tracker.fail("upstream down");
        tracker.fail("ignored");
        assert_eq!(
            observer.stages(),
            [
                ProcessingStage::Reading,
                ProcessingStage::Analyzing,
                ProcessingStage::Error
            ]
        );
        assert_eq!(observer.errors(), ["upstream down"]);
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProcessingStage::Finalizing).unwrap(),
            "\"finalizing\""
        );
    }
}
