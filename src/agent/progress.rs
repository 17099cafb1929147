//! Progress events and their ordered delivery.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use super::turn::TurnUpdate;

/// Highest percentage a non-terminal event may report.
pub const MAX_NON_TERMINAL_PERCENT: u8 = 95;

/// Step label emitted before the connection is resolved.
pub const STEP_CONNECTING: &str = "connecting";
/// Step label for a reasoning request.
pub const STEP_REASONING: &str = "reasoning";
/// Step label once the model has produced its answer.
pub const STEP_FINALIZING: &str = "finalizing";
/// Terminal success step.
pub const STEP_DONE: &str = "done";
/// Terminal failure step.
pub const STEP_ERROR: &str = "error";

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Machine-readable step, e.g. `reasoning` or `tool_call:execute_query`.
    pub step: String,
    /// Human-readable description.
    pub message: String,
    /// Completion estimate, 0 to 100.
    pub percent: u8,
    /// Whether this is the last event of the turn.
    pub terminal: bool,
}

/// Assigns monotonic percentages.
///
/// Non-terminal events never exceed [`MAX_NON_TERMINAL_PERCENT`]; a
/// terminal success is always 100.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: u8,
    finished: bool,
}

impl ProgressTracker {
    /// Creates a tracker at 0%.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: 0,
            finished: false,
        }
    }

    /// Last percentage handed out.
    #[must_use]
    pub const fn last_percent(&self) -> u8 {
        self.last
    }

    /// Whether a terminal event was produced.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Builds a non-terminal event at `requested` percent, clamped.
    pub fn step(&mut self, step: impl Into<String>, message: impl Into<String>, requested: u8) -> ProgressEvent {
        let percent = requested.min(MAX_NON_TERMINAL_PERCENT).max(self.last);
        self.last = percent;
        ProgressEvent {
            step: step.into(),
            message: message.into(),
            percent,
            terminal: false,
        }
    }

    /// Builds the terminal success event.
    pub fn done(&mut self, message: impl Into<String>) -> ProgressEvent {
        self.last = 100;
        self.finished = true;
        ProgressEvent {
            step: STEP_DONE.to_string(),
            message: message.into(),
            percent: 100,
            terminal: true,
        }
    }

    /// Builds the terminal failure event. The percentage stays where it was.
    pub fn error(&mut self, message: impl Into<String>) -> ProgressEvent {
        self.finished = true;
        ProgressEvent {
            step: STEP_ERROR.to_string(),
            message: message.into(),
            percent: self.last,
            terminal: true,
        }
    }
}

/// Sends progress to the caller in emission order.
///
/// A closed receiver is ignored; the caller having gone away is detected
/// through cancellation, not here.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<TurnUpdate>>,
}

impl ProgressSink {
    /// Wraps a channel sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<TurnUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    #[must_use]
    pub const fn discard() -> Self {
        Self { tx: None }
    }

    /// Delivers one event, waiting for channel capacity.
    pub async fn emit(&self, event: ProgressEvent) {
        trace!(step = %event.step, percent = event.percent, "progress");
        self.send(TurnUpdate::Progress(event)).await;
    }

    pub(crate) async fn send(&self, update: TurnUpdate) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_never_decreases() {
        let mut tracker = ProgressTracker::new();
        let a = tracker.step(STEP_REASONING, "thinking", 40);
        let b = tracker.step("tool_call:list_tables", "listing", 20);
        assert_eq!(a.percent, 40);
        assert_eq!(b.percent, 40);
    }

    #[test]
    fn test_non_terminal_capped() {
        let mut tracker = ProgressTracker::new();
        let event = tracker.step(STEP_FINALIZING, "almost", 100);
        assert_eq!(event.percent, MAX_NON_TERMINAL_PERCENT);
        assert!(!event.terminal);
    }

    #[test]
    fn test_terminal_events() {
        let mut tracker = ProgressTracker::new();
        tracker.step(STEP_REASONING, "thinking", 30);
        let err = tracker.clone().error("boom");
        assert_eq!(err.percent, 30);
        assert!(err.terminal);

        let done = tracker.done("answered");
        assert_eq!(done.percent, 100);
        assert!(tracker.is_finished());
    }

    #[tokio::test]
    async fn test_sink_preserves_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = ProgressSink::new(tx);
        let mut tracker = ProgressTracker::new();
        sink.emit(tracker.step(STEP_CONNECTING, "a", 5)).await;
        sink.emit(tracker.step(STEP_REASONING, "b", 10)).await;
        drop(sink);

        let mut steps = Vec::new();
        while let Some(TurnUpdate::Progress(event)) = rx.recv().await {
            steps.push(event.step);
        }
        assert_eq!(steps, vec![STEP_CONNECTING, STEP_REASONING]);
    }
}
