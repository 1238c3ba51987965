//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::orchestrator::DeployerOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::tomcat::install::InstallOverrides;
use crate::tomcat::lifecycle::TomcatOptions;
use crate::workers::access_log;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Project being deployed
    pub project_root: PathBuf,

    /// Installation paths given on the command line
    pub overrides: InstallOverrides,

    /// Prompt on the terminal for missing answers
    pub interactive: bool,

    /// Enable the local control API
    pub enable_api: bool,

    /// Control API configuration
    pub api: ApiOptions,

    /// Server process options
    pub tomcat: TomcatOptions,

    /// Deployment orchestrator options
    pub deployer: DeployerOptions,

    /// Access log worker options
    pub access_log: access_log::Options,

    /// Window within which repeated refreshes of one app are collapsed
    pub refresh_debounce: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            project_root: PathBuf::from("."),
            overrides: InstallOverrides::default(),
            interactive: false,
            enable_api: true,
            api: ApiOptions::default(),
            tomcat: TomcatOptions::default(),
            deployer: DeployerOptions::default(),
            access_log: access_log::Options::default(),
            refresh_debounce: Duration::from_secs(2),
        }
    }
}

impl AppOptions {
    /// Options with the persisted settings applied
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            storage: StorageOptions { layout },
            enable_api: settings.api.enabled,
            api: ApiOptions {
                host: settings.api.host.clone(),
                port: settings.api.port,
            },
            access_log: access_log::Options {
                poll_interval: Duration::from_millis(settings.access_log_poll_ms),
            },
            ..Default::default()
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Stop a server this process spawned when shutting down
    pub stop_server_on_exit: bool,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            stop_server_on_exit: true,
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}

/// Local HTTP API options
#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
        }
    }
}
