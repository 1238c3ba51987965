//! Control surface models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic category of a classified log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
    Success,
    Http,
    App,
}

impl EventLevel {
    /// Severity rank used for display filtering.
    ///
    /// `Success`, `Http` and `App` rank with `Info` so they survive any
    /// filter that keeps informational output.
    pub fn rank(&self) -> u8 {
        match self {
            EventLevel::Debug => 0,
            EventLevel::Info | EventLevel::Success | EventLevel::Http | EventLevel::App => 1,
            EventLevel::Warn => 2,
            EventLevel::Error => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "DEBUG",
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
            EventLevel::Success => "SUCCESS",
            EventLevel::Http => "HTTP",
            EventLevel::App => "APP",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(EventLevel::Debug),
            "INFO" => Ok(EventLevel::Info),
            "WARN" | "WARNING" => Ok(EventLevel::Warn),
            "ERROR" => Ok(EventLevel::Error),
            "SUCCESS" => Ok(EventLevel::Success),
            "HTTP" => Ok(EventLevel::Http),
            "APP" => Ok(EventLevel::App),
            _ => Err(format!("Invalid event level: {}", s)),
        }
    }
}

/// A classified log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: EventLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Server status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: String,
    pub port: u16,
    pub app_name: Option<String>,
    pub deploy_in_flight: bool,
}

/// Deploy request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    /// `local`, `maven`, `gradle` or `prompt`
    #[serde(default)]
    pub strategy: Option<String>,
}

/// Port change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRequest {
    pub port: u32,
}

/// Result of a triggered action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn failed(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            message: Some(message.into()),
        }
    }
}
