//! Event fan-out
//!
//! Classified events go to every subscriber (UI, SSE clients) and are
//! mirrored to `tracing` under the `catalina` target. Triggers travel on a
//! separate channel so the refresh side channel never competes with display.

use pilot_api::{EventLevel, LogEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::monitor::classify::Trigger;

const EVENT_CAPACITY: usize = 1024;
const TRIGGER_CAPACITY: usize = 32;

/// Observability sink for server events
pub struct LogSink {
    events: broadcast::Sender<LogEvent>,
    triggers: broadcast::Sender<Trigger>,
    min_level: EventLevel,
}

impl LogSink {
    pub fn new(min_level: EventLevel) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (triggers, _) = broadcast::channel(TRIGGER_CAPACITY);
        Self {
            events,
            triggers,
            min_level,
        }
    }

    /// Subscribe to classified events
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Subscribe to trigger patterns
    pub fn subscribe_triggers(&self) -> broadcast::Receiver<Trigger> {
        self.triggers.subscribe()
    }

    /// Publish an event, returns whether it passed the level filter
    pub fn publish(&self, event: LogEvent) -> bool {
        mirror(&event);
        if event.level.rank() < self.min_level.rank() {
            return false;
        }
        // No receivers is not an error
        let _ = self.events.send(event);
        true
    }

    /// Fire a trigger
    pub fn fire(&self, trigger: Trigger) {
        debug!(?trigger, "Trigger fired");
        let _ = self.triggers.send(trigger);
    }

    /// Convenience for status messages originating in catpilot itself
    pub fn emit(&self, level: EventLevel, message: impl Into<String>) {
        self.publish(LogEvent::new(level, message));
    }
}

fn mirror(event: &LogEvent) {
    match event.level {
        EventLevel::Error => error!(target: "catalina", "{}", event.message),
        EventLevel::Warn => warn!(target: "catalina", "{}", event.message),
        EventLevel::Debug => debug!(target: "catalina", "{}", event.message),
        level => info!(target: "catalina", level = %level, "{}", event.message),
    }
}
