//! Merge point for raw server output
//!
//! The process pumps and the access log tailer are independent producers
//! writing [`RawLine`]s into one channel; a single processor task classifies
//! and publishes them in arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pilot_api::{EventLevel, LogEvent};
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::PilotError;
use crate::monitor::access_log::AccessLineSanitizer;
use crate::monitor::classify::Classifier;
use crate::monitor::sink::LogSink;

/// Where a raw line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    /// Server stdout/stderr
    Process,

    /// On-disk access log
    AccessLog,
}

/// An unprocessed line
#[derive(Debug, Clone)]
pub struct RawLine {
    pub source: LineSource,
    pub text: String,
}

impl RawLine {
    pub fn process(text: impl Into<String>) -> Self {
        Self {
            source: LineSource::Process,
            text: text.into(),
        }
    }

    pub fn access_log(text: impl Into<String>) -> Self {
        Self {
            source: LineSource::AccessLog,
            text: text.into(),
        }
    }
}

pub type LineSender = mpsc::UnboundedSender<RawLine>;
pub type LineReceiver = mpsc::UnboundedReceiver<RawLine>;

/// Create the raw line channel
pub fn line_channel() -> (LineSender, LineReceiver) {
    mpsc::unbounded_channel()
}

/// Classifies raw lines and publishes them to the sink
pub struct LogProcessor {
    sink: Arc<LogSink>,
    classifier: Classifier,
    sanitizer: AccessLineSanitizer,
}

impl LogProcessor {
    pub fn new(sink: Arc<LogSink>) -> Result<Self, PilotError> {
        Ok(Self {
            sink,
            classifier: Classifier::new()?,
            sanitizer: AccessLineSanitizer::new()?,
        })
    }

    /// Process one line, returns the event that was produced
    pub fn handle(&self, raw: RawLine) -> Option<LogEvent> {
        let event = match raw.source {
            LineSource::Process => {
                let classified = self.classifier.classify(&raw.text)?;
                self.sink.publish(classified.event.clone());
                if let Some(trigger) = classified.trigger {
                    self.sink.fire(trigger);
                }
                classified.event
            }
            LineSource::AccessLog => {
                let message = self.sanitizer.sanitize(&raw.text)?;
                let event = LogEvent::new(EventLevel::Http, message);
                self.sink.publish(event.clone());
                event
            }
        };
        Some(event)
    }

    /// Drain the channel until shutdown or until every sender is dropped
    pub async fn run(
        self,
        mut lines: LineReceiver,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) {
        info!("Log processor starting...");

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Log processor shutting down...");
                    return;
                }
                line = lines.recv() => {
                    match line {
                        Some(raw) => {
                            self.handle(raw);
                        }
                        None => {
                            info!("All log producers closed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::classify::Trigger;

    #[tokio::test]
    async fn test_startup_fires_trigger_once() {
        let sink = Arc::new(LogSink::new(EventLevel::Debug));
        let mut events = sink.subscribe();
        let mut triggers = sink.subscribe_triggers();
        let processor = LogProcessor::new(sink.clone()).unwrap();

        processor.handle(RawLine::process("Server startup in [843] milliseconds"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.level, EventLevel::Success);
        assert!(event.message.contains("843"));
        assert!(events.try_recv().is_err());

        assert_eq!(triggers.recv().await.unwrap(), Trigger::ServerStarted { millis: 843 });
        assert!(triggers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_access_line_becomes_http_event() {
        let sink = Arc::new(LogSink::new(EventLevel::Debug));
        let processor = LogProcessor::new(sink).unwrap();

        let event = processor
            .handle(RawLine::access_log(
                r#"127.0.0.1 - - [19/Oct/2026:10:11:12 +0000] "GET /shop/ HTTP/1.1" 200 64"#,
            ))
            .unwrap();

        assert_eq!(event.level, EventLevel::Http);
        assert!(!event.message.contains("127.0.0.1"));
        assert!(!event.message.contains('['));
    }

    #[tokio::test]
    async fn test_run_stops_when_producers_close() {
        let sink = Arc::new(LogSink::new(EventLevel::Debug));
        let mut events = sink.subscribe();
        let processor = LogProcessor::new(sink).unwrap();
        let (tx, rx) = line_channel();

        tx.send(RawLine::process("Hello from ShopServlet")).unwrap();
        drop(tx);
        processor.run(rx, Box::pin(std::future::pending::<()>())).await;

        assert_eq!(events.recv().await.unwrap().level, EventLevel::App);
    }
}
