//! Event sink trait and implementations.

use super::PipelineEvent;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receives lifecycle events from the executor.
///
/// Implementations must return quickly and must not panic.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    fn emit(&self, event: &PipelineEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Logs events through `tracing`.
///
/// Failures, timeouts and retries are always logged at WARN; other events
/// use the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let event_type = event.event_type();
        let run_id = event.run_id();
        let stage = event.stage().unwrap_or("");
        match event {
            PipelineEvent::StageRetrying { attempt, delay_ms, error, .. } => {
                warn!(event_type, run_id, stage, attempt, delay_ms, error = %error, "Stage attempt failed; retrying");
            }
            PipelineEvent::StageFailed { attempts, error, .. } => {
                warn!(event_type, run_id, stage, attempts, error = %error, "Stage failed");
            }
            PipelineEvent::StageTimedOut { attempts, .. } => {
                warn!(event_type, run_id, stage, attempts, "Stage timed out");
            }
            _ if self.level == Level::DEBUG => {
                debug!(event_type, run_id, stage, event_data = ?event, "Event: {}", event_type);
            }
            _ => {
                info!(event_type, run_id, stage, "Event: {}", event_type);
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(PipelineEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn started(stage: &str) -> PipelineEvent {
        PipelineEvent::StageStarted {
            run_id: "r1".into(),
            stage: stage.into(),
            attempt: 1,
        }
    }

    #[test]
    fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit(&started("load"));
        LoggingEventSink::default().emit(&started("load"));
        LoggingEventSink::debug().emit(&PipelineEvent::StageTimedOut {
            run_id: "r1".into(),
            stage: "load".into(),
            attempts: 2,
        });
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&PipelineEvent::RunStarted {
            run_id: "r1".into(),
            pipeline: "etl_pipeline".into(),
        });
        sink.emit(&started("acquire"));
        sink.emit(&started("load"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.event_types(), vec!["run.started", "stage.started", "stage.started"]);
        assert_eq!(sink.events_of_type("stage.").len(), 2);
    }
}
