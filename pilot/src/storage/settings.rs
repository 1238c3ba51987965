//! Settings file management

use std::path::PathBuf;

use pilot_api::EventLevel;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::deploy::strategy::BuildStrategy;
use crate::errors::PilotError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Persisted settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Tomcat installation directory
    #[serde(default)]
    pub catalina_home: Option<PathBuf>,

    /// JDK installation directory
    #[serde(default)]
    pub java_home: Option<PathBuf>,

    /// HTTP connector port, mirrored into conf/server.xml
    #[serde(default = "default_port")]
    pub port: u16,

    /// Webapps that `clean` never removes
    #[serde(default = "default_protected_webapps")]
    pub protected_webapps: Vec<String>,

    /// Extra JVM options passed before the classpath
    #[serde(default)]
    pub java_opts: Vec<String>,

    /// JPDA port, debug launch when set
    #[serde(default)]
    pub debug_port: Option<u16>,

    /// Strategy used when a deploy asks to be prompted
    #[serde(default)]
    pub default_strategy: Option<BuildStrategy>,

    /// Management request timeout in seconds
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_secs: u64,

    /// Access log poll interval in milliseconds
    #[serde(default = "default_access_log_poll")]
    pub access_log_poll_ms: u64,

    /// Lowest event level forwarded to subscribers
    #[serde(default = "default_min_event_level")]
    pub min_event_level: EventLevel,

    /// Browser refresh configuration
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Local control API configuration
    #[serde(default)]
    pub api: ApiSettings,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8080
}

fn default_protected_webapps() -> Vec<String> {
    ["ROOT", "docs", "examples", "manager", "host-manager"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reload_timeout() -> u64 {
    10
}

fn default_access_log_poll() -> u64 {
    1000
}

fn default_min_event_level() -> EventLevel {
    EventLevel::Debug
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            catalina_home: None,
            java_home: None,
            port: default_port(),
            protected_webapps: default_protected_webapps(),
            java_opts: Vec::new(),
            debug_port: None,
            default_strategy: None,
            reload_timeout_secs: default_reload_timeout(),
            access_log_poll_ms: default_access_log_poll(),
            min_event_level: default_min_event_level(),
            browser: BrowserSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

/// Browser refresh settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Refresh the browser after deploys and startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Launcher command, the OS opener when absent
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }
}

/// Local control API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    9090
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

/// In-memory settings mirrored to the settings file
pub struct SettingsStore {
    file: File,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings, falling back to defaults when the file is missing
    pub async fn load(file: File) -> Result<Self, PilotError> {
        let settings = if file.exists().await {
            file.read_json::<Settings>().await?
        } else {
            info!("No settings at {}, using defaults", file.path().display());
            Settings::default()
        };
        Ok(Self::with_settings(file, settings))
    }

    /// Wrap already-loaded settings
    pub fn with_settings(file: File, settings: Settings) -> Self {
        Self {
            file,
            current: RwLock::new(settings),
        }
    }

    /// Path of the backing file
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Snapshot of the current settings
    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Configured HTTP port
    pub async fn port(&self) -> u16 {
        self.current.read().await.port
    }

    /// Apply a change, persisting it before it becomes visible.
    ///
    /// On a write failure the in-memory copy is left untouched.
    pub async fn update<F>(&self, change: F) -> Result<Settings, PilotError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut current = self.current.write().await;
        let mut next = current.clone();
        change(&mut next);
        if next == *current {
            return Ok(next);
        }
        self.file.write_json(&next).await?;
        debug!("Settings persisted to {}", self.file.path().display());
        *current = next.clone();
        Ok(next)
    }
}
