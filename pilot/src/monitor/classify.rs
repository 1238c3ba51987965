//! Server output classification
//!
//! Turns raw Tomcat console lines into [`LogEvent`]s. Color codes and
//! timestamp prefixes are stripped, noisy launcher banners are dropped, and a
//! small set of trigger patterns (startup complete, context reloaded) are
//! reported alongside the event.

use pilot_api::{EventLevel, LogEvent};
use regex::Regex;

use crate::errors::PilotError;

/// Launcher banners that carry no information once the server is up
const NOISE_PREFIXES: &[&str] = &[
    "Using CATALINA_BASE:",
    "Using CATALINA_HOME:",
    "Using CATALINA_TMPDIR:",
    "Using CATALINA_OPTS:",
    "Using CATALINA_PID:",
    "Using JRE_HOME:",
    "Using JAVA_HOME:",
    "Using CLASSPATH:",
    "Tomcat started.",
    "NOTE: Picked up JDK_JAVA_OPTIONS",
    "Picked up JAVA_TOOL_OPTIONS",
];

const NOISE_FRAGMENTS: &[&str] = &[
    "org.apache.catalina.startup.VersionLoggerListener",
    "org.apache.catalina.core.AprLifecycleListener",
    "The APR based Apache Tomcat Native library",
];

/// Side-channel signals raised by specific log lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// `Server startup in [N] milliseconds`
    ServerStarted { millis: u64 },

    /// `Reloading Context with name [/app] is completed`
    ContextReloaded { path: String },
}

/// A classified line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub event: LogEvent,
    pub trigger: Option<Trigger>,
}

/// Line classifier with precompiled patterns
#[derive(Debug, Clone)]
pub struct Classifier {
    ansi: Regex,
    timestamp: Regex,
    one_line: Regex,
    startup: Regex,
    reload: Regex,
    http_verb: Regex,
    stack_frame: Regex,
    severity: Regex,
}

impl Classifier {
    pub fn new() -> Result<Self, PilotError> {
        Ok(Self {
            ansi: Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]")?,
            timestamp: Regex::new(concat!(
                r"^(?:\d{2}-[A-Za-z]{3}-\d{4} \d{2}:\d{2}:\d{2}(?:[.,]\d+)?",
                r"|\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
                r"|\[\d{4}-\d{2}-\d{2}[^\]]*\]",
                r"|\d{2}:\d{2}:\d{2}[.,]\d+)\s+"
            ))?,
            one_line: Regex::new(
                r"^(SEVERE|WARNING|INFO|CONFIG|FINEST|FINER|FINE|ERROR|WARN|DEBUG|TRACE)\s+\[([^\]]+)\]\s+(\S+)\s+(.*)$",
            )?,
            startup: Regex::new(r"Server startup in \[?(\d+)\]?\s*(?:ms|milliseconds)")?,
            reload: Regex::new(r"Reloading Context with name \[([^\]]*)\] is completed")?,
            http_verb: Regex::new(r#"^"?(?:GET|POST|PUT|DELETE|PATCH|HEAD|OPTIONS|TRACE|CONNECT)\s+/\S*"#)?,
            // Frames, elisions and the exception headers between them
            stack_frame: Regex::new(concat!(
                r"^(?:\s+at\s+[\w$.<>/]+\(.*\)|\s*\.\.\. \d+ (?:more|common frames omitted)",
                r#"|\s*(?:Caused by|Suppressed):|Exception in thread ""#,
                r"|[\w$]+(?:\.[\w$]+)+(?:Exception|Error|Throwable)(?::|$))",
            ))?,
            severity: Regex::new(
                r"^\[?(SEVERE|FATAL|ERROR|WARNING|WARN|INFO|CONFIG|FINEST|FINER|FINE|DEBUG|TRACE)\]?(?::|\s|$)",
            )?,
        })
    }

    /// Classify one line of server output, `None` for dropped lines
    pub fn classify(&self, raw: &str) -> Option<Classified> {
        let without_color = self.ansi.replace_all(raw, "");
        let line = without_color.trim_end();
        if line.trim().is_empty() {
            return None;
        }

        let line = self.timestamp.replace(line, "");
        let line = line.as_ref();

        if is_noise(line) {
            return None;
        }

        // JUL one-line format: LEVEL [thread] source message
        let (keyword, message) = match self.one_line.captures(line) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str().to_string()),
                caps.get(4).map(|m| m.as_str()).unwrap_or_default().to_string(),
            ),
            None => (None, line.to_string()),
        };

        if let Some(caps) = self.startup.captures(&message) {
            let millis = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or_default();
            return Some(Classified {
                event: LogEvent::new(EventLevel::Success, message),
                trigger: Some(Trigger::ServerStarted { millis }),
            });
        }

        if let Some(caps) = self.reload.captures(&message) {
            let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
            return Some(Classified {
                event: LogEvent::new(EventLevel::Success, message),
                trigger: Some(Trigger::ContextReloaded { path }),
            });
        }

        let level = if message.contains("/manager/text") || message.contains("/manager/html") {
            // Our own management calls would otherwise echo back as traffic
            EventLevel::Debug
        } else if self.http_verb.is_match(&message) {
            EventLevel::Http
        } else if self.stack_frame.is_match(line) {
            EventLevel::Debug
        } else if let Some(keyword) = keyword {
            keyword_level(&keyword)
        } else if let Some(caps) = self.severity.captures(&message) {
            keyword_level(caps.get(1).map(|m| m.as_str()).unwrap_or_default())
        } else {
            EventLevel::App
        };

        Some(Classified {
            event: LogEvent::new(level, message),
            trigger: None,
        })
    }
}

fn is_noise(line: &str) -> bool {
    let trimmed = line.trim_start();
    NOISE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || NOISE_FRAGMENTS.iter().any(|f| line.contains(f))
}

fn keyword_level(keyword: &str) -> EventLevel {
    match keyword {
        "SEVERE" | "FATAL" | "ERROR" => EventLevel::Error,
        "WARNING" | "WARN" => EventLevel::Warn,
        "INFO" => EventLevel::Info,
        _ => EventLevel::Debug,
    }
}
