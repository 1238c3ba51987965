//! Application state
//!
//! Everything that would otherwise be global (installation paths, active
//! port, the deploy-in-flight flag) lives in one owned context built here and
//! handed to workers and handlers.

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::browser::{BrowserController, CommandBrowser, DebouncedBrowser};
use crate::deploy::orchestrator::Deployer;
use crate::deploy::project::Project;
use crate::deploy::runner::RunnerRegistry;
use crate::errors::PilotError;
use crate::monitor::processor::LineSender;
use crate::monitor::sink::LogSink;
use crate::storage::settings::SettingsStore;
use crate::tomcat::install::Installer;
use crate::tomcat::lifecycle::TomcatManager;
use crate::tomcat::manager::{ManagerApi, ManagerClient};
use crate::tomcat::process::{ProcessHost, SystemHost};
use crate::workbench::{Headless, Terminal, Workbench};

/// External collaborators, replaceable for tests
pub struct Collaborators {
    pub host: Arc<dyn ProcessHost>,
    pub manager_api: Arc<dyn ManagerApi>,
    pub workbench: Arc<dyn Workbench>,
    pub browser: Arc<dyn BrowserController>,
    pub runners: RunnerRegistry,
}

impl Collaborators {
    /// Real OS, HTTP and browser implementations
    pub async fn system(
        options: &AppOptions,
        settings: &Arc<SettingsStore>,
    ) -> Result<Self, PilotError> {
        let current = settings.get().await;
        let manager_api = ManagerClient::new(std::time::Duration::from_secs(
            current.reload_timeout_secs,
        ))?;
        let workbench: Arc<dyn Workbench> = if options.interactive {
            Arc::new(Terminal::default())
        } else {
            Arc::new(Headless {
                default_strategy: current.default_strategy,
            })
        };

        Ok(Self {
            host: Arc::new(SystemHost),
            manager_api: Arc::new(manager_api),
            workbench,
            browser: Arc::new(CommandBrowser::new(settings.clone())),
            runners: RunnerRegistry::default(),
        })
    }
}

/// Main application state
pub struct AppState {
    pub version: String,
    pub settings: Arc<SettingsStore>,
    pub sink: Arc<LogSink>,
    pub lines: LineSender,
    pub tomcat: Arc<TomcatManager>,
    pub deployer: Arc<Deployer>,
    pub browser: Arc<dyn BrowserController>,
}

impl AppState {
    /// Wire the components together
    pub async fn init(
        version: String,
        options: &AppOptions,
        settings: Arc<SettingsStore>,
        sink: Arc<LogSink>,
        lines: LineSender,
        collaborators: Collaborators,
    ) -> Result<Self, PilotError> {
        info!("Initializing application state...");

        let project = Project::new(std::path::absolute(&options.project_root)?)?;
        info!(app = project.app_name(), root = %project.root().display(), "Project");

        let installer = Arc::new(Installer::new(
            options.overrides.clone(),
            settings.clone(),
            collaborators.workbench.clone(),
        ));

        let tomcat = Arc::new(TomcatManager::new(
            installer,
            settings.clone(),
            collaborators.host,
            collaborators.manager_api,
            sink.clone(),
            lines.clone(),
            options.tomcat.clone(),
        ));

        let browser: Arc<dyn BrowserController> = Arc::new(DebouncedBrowser::new(
            collaborators.browser,
            options.refresh_debounce,
        ));

        let deployer = Arc::new(Deployer::new(
            project,
            tomcat.clone(),
            collaborators.runners,
            collaborators.workbench,
            browser.clone(),
            sink.clone(),
            options.deployer.clone(),
        ));

        Ok(Self {
            version,
            settings,
            sink,
            lines,
            tomcat,
            deployer,
            browser,
        })
    }

    pub fn app_name(&self) -> &str {
        self.deployer.project().app_name()
    }

    /// Shutdown application state
    pub async fn shutdown(&self, stop_server: bool) -> Result<(), PilotError> {
        info!("Shutting down application state...");
        self.tomcat.wait_recovery().await;
        if stop_server {
            self.tomcat.stop_owned().await?;
        }
        Ok(())
    }
}
