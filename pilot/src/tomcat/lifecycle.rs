//! Server lifecycle
//!
//! [`TomcatManager`] owns the one tracked server process. Every operation
//! first reconciles the state machine with reality by probing the configured
//! port, then acts.

use std::sync::Arc;
use std::time::Duration;

use pilot_api::EventLevel;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::monitor::processor::LineSender;
use crate::monitor::sink::LogSink;
use crate::storage::settings::SettingsStore;
use crate::tomcat::config::{heal_users_file, read_server_port, write_server_port};
use crate::tomcat::fsm::{ServerEvent, ServerFsm, ServerState};
use crate::tomcat::install::{Installer, ServerInstallation};
use crate::tomcat::manager::ManagerApi;
use crate::tomcat::port::validate_port;
use crate::tomcat::process::{jvm_args, BootstrapCommand, LaunchOptions, ProcessHost, ServerProcess};

/// Lifecycle timing
#[derive(Debug, Clone)]
pub struct TomcatOptions {
    /// Time allowed for a graceful stop before killing
    pub stop_grace: Duration,

    /// Interval between port probes while waiting for a stop
    pub probe_interval: Duration,
}

impl Default for TomcatOptions {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(15),
            probe_interval: Duration::from_millis(250),
        }
    }
}

/// What `reload` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The manager accepted the reload
    Reloaded,

    /// The manager refused; start or self-heal continues in the background
    Recovering,
}

struct Inner {
    fsm: ServerFsm,
    process: Option<Box<dyn ServerProcess>>,
}

/// Process lifecycle manager
pub struct TomcatManager {
    installer: Arc<Installer>,
    settings: Arc<SettingsStore>,
    host: Arc<dyn ProcessHost>,
    manager_api: Arc<dyn ManagerApi>,
    sink: Arc<LogSink>,
    lines: LineSender,
    options: TomcatOptions,
    inner: Mutex<Inner>,
    recovery: Mutex<Option<JoinHandle<()>>>,
}

impl TomcatManager {
    pub fn new(
        installer: Arc<Installer>,
        settings: Arc<SettingsStore>,
        host: Arc<dyn ProcessHost>,
        manager_api: Arc<dyn ManagerApi>,
        sink: Arc<LogSink>,
        lines: LineSender,
        options: TomcatOptions,
    ) -> Self {
        Self {
            installer,
            settings,
            host,
            manager_api,
            sink,
            lines,
            options,
            inner: Mutex::new(Inner {
                fsm: ServerFsm::new(),
                process: None,
            }),
            recovery: Mutex::new(None),
        }
    }

    pub fn installer(&self) -> &Arc<Installer> {
        &self.installer
    }

    /// Resolve the installation, reporting failures to the sink
    pub async fn installation(&self) -> Result<ServerInstallation, PilotError> {
        self.installer.resolve().await.inspect_err(|e| {
            self.sink.emit(EventLevel::Error, e.to_string());
        })
    }

    /// Configured HTTP port
    pub async fn port(&self) -> u16 {
        self.settings.port().await
    }

    async fn probe(&self, inner: &mut Inner) {
        if let Some(process) = inner.process.as_mut() {
            if process.has_exited() {
                debug!("Tracked server process has exited");
                inner.process = None;
                transition(&mut inner.fsm, ServerEvent::Exited);
            }
        }

        let bound = self.host.port_in_use(self.port().await).await;
        // A live child that has not bound yet is still starting
        if inner.process.is_none() || bound {
            transition(&mut inner.fsm, ServerEvent::Probed(bound));
        }
    }

    /// Current state, after probing
    pub async fn status(&self) -> ServerState {
        let mut inner = self.inner.lock().await;
        self.probe(&mut inner).await;
        inner.fsm.state()
    }

    /// Record that startup completed
    pub async fn mark_ready(&self) {
        let mut inner = self.inner.lock().await;
        if inner.fsm.state() == ServerState::Starting {
            transition(&mut inner.fsm, ServerEvent::Ready);
        }
    }

    /// Spawn the server unless it is already up.
    ///
    /// Returns once the process is spawned; readiness is reported later
    /// through the startup log line.
    pub async fn start(&self) -> Result<(), PilotError> {
        let mut inner = self.inner.lock().await;
        self.probe(&mut inner).await;
        if inner.fsm.state().is_up() {
            info!("Server already {}", inner.fsm.state().as_str());
            return Ok(());
        }

        let install = self.installation().await?;
        Dir::new(install.temp_dir()).create().await?;

        let settings = self.settings.get().await;
        let launch = LaunchOptions {
            java_opts: settings.java_opts.clone(),
            debug_port: settings.debug_port,
        };
        let args = jvm_args(&install, BootstrapCommand::Start, &launch);

        self.sink.emit(
            EventLevel::Info,
            format!("Starting Tomcat on port {}", settings.port),
        );
        if let Some(debug_port) = settings.debug_port {
            self.sink.emit(
                EventLevel::Info,
                format!("Debugger listening on port {}", debug_port),
            );
        }

        match self.host.spawn(&install, args, self.lines.clone()).await {
            Ok(process) => {
                inner.process = Some(process);
                transition(&mut inner.fsm, ServerEvent::Spawned);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start server: {}", e);
                self.sink.emit(EventLevel::Error, format!("Failed to start Tomcat: {}", e));
                // The homes may have moved; resolve again on the next operation
                self.installer.invalidate().await;
                Err(e)
            }
        }
    }

    /// Stop the server, no-op when it is not running
    pub async fn stop(&self) -> Result<(), PilotError> {
        let mut inner = self.inner.lock().await;
        self.probe(&mut inner).await;
        if !inner.fsm.state().is_up() && inner.process.is_none() {
            debug!("Server not running, nothing to stop");
            return Ok(());
        }

        self.sink.emit(EventLevel::Info, "Stopping Tomcat");
        transition(&mut inner.fsm, ServerEvent::Stop);

        let result = match inner.process.take() {
            Some(mut process) => process.terminate(self.options.stop_grace).await,
            None => self.run_stop_command().await,
        };

        if let Err(e) = result {
            error!("Failed to stop server: {}", e);
            self.sink.emit(EventLevel::Error, format!("Failed to stop Tomcat: {}", e));
            transition(&mut inner.fsm, ServerEvent::Failed(e.to_string()));
            return Err(e);
        }

        self.wait_port_released().await;
        transition(&mut inner.fsm, ServerEvent::Exited);
        Ok(())
    }

    /// Stop the server only if this manager spawned it
    pub async fn stop_owned(&self) -> Result<(), PilotError> {
        if self.inner.lock().await.process.is_none() {
            return Ok(());
        }
        self.stop().await
    }

    async fn run_stop_command(&self) -> Result<(), PilotError> {
        let install = self.installation().await?;
        let args = jvm_args(&install, BootstrapCommand::Stop, &LaunchOptions::default());
        self.host.run_to_exit(&install, args).await
    }

    async fn wait_port_released(&self) {
        let port = self.port().await;
        let deadline = tokio::time::Instant::now() + self.options.stop_grace;
        while self.host.port_in_use(port).await {
            if tokio::time::Instant::now() >= deadline {
                warn!(port, "Port still bound after stop");
                return;
            }
            tokio::time::sleep(self.options.probe_interval).await;
        }
    }

    /// Stop then start
    pub async fn restart(&self) -> Result<(), PilotError> {
        self.stop().await?;
        self.start().await
    }

    /// Hot reload one app through the manager.
    ///
    /// Only the manager request is awaited. When it is refused the server is
    /// started (if down) or healed and restarted (if up) in the background;
    /// see [`TomcatManager::wait_recovery`].
    pub async fn reload(self: &Arc<Self>, app_name: &str) -> Result<ReloadOutcome, PilotError> {
        let port = self.port().await;
        let error = match self.manager_api.reload(port, app_name).await {
            Ok(()) => {
                self.sink.emit(EventLevel::Info, format!("Reloaded /{}", app_name));
                return Ok(ReloadOutcome::Reloaded);
            }
            Err(e) => e,
        };
        warn!(app = app_name, "Reload rejected: {}", error);

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = manager.recover().await {
                error!("Reload recovery failed: {}", e);
                manager
                    .sink
                    .emit(EventLevel::Error, format!("Reload recovery failed: {}", e));
            }
        });

        let previous = self.recovery.lock().await.replace(handle);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                debug!("Previous recovery still running");
            }
        }
        Ok(ReloadOutcome::Recovering)
    }

    async fn recover(&self) -> Result<(), PilotError> {
        match self.status().await {
            ServerState::Starting => {
                info!("Server is starting, deployed files will be picked up at startup");
                Ok(())
            }
            state if state.is_up() => {
                self.sink.emit(
                    EventLevel::Warn,
                    "Manager rejected the reload, restoring credentials and restarting",
                );
                self.heal_credentials().await?;
                self.restart().await
            }
            _ => self.start().await,
        }
    }

    /// Wait for a background reload recovery to finish
    pub async fn wait_recovery(&self) {
        let handle = self.recovery.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Recovery task panicked: {}", e);
            }
        }
    }

    /// Rewrite the management user in `tomcat-users.xml`
    pub async fn heal_credentials(&self) -> Result<(), PilotError> {
        let install = self.installation().await?;
        heal_users_file(&install.users_xml()).await
    }

    /// Move the HTTP connector to a new port.
    ///
    /// Any failure reverts `server.xml` and the settings to the previous port
    /// and brings the server back up if it was running.
    pub async fn update_port(&self, requested: u32) -> Result<bool, PilotError> {
        let old = self.port().await;
        if requested == u32::from(old) {
            debug!(port = old, "Port unchanged");
            return Ok(false);
        }
        let new = validate_port(requested)?;
        if self.host.port_in_use(new).await {
            return Err(PilotError::ValidationError(format!("Port {} is already in use", new)));
        }
        let install = self.installation().await?;
        let was_up = self.status().await.is_up();

        match self.apply_port(&install, new, was_up).await {
            Ok(()) => {
                self.sink.emit(EventLevel::Info, format!("Port changed {} -> {}", old, new));
                Ok(true)
            }
            Err(e) => {
                error!(old, new, "Port change failed, rolling back: {}", e);
                self.rollback_port(&install, old).await;
                if was_up && !self.status().await.is_up() {
                    if let Err(restart) = self.start().await {
                        error!("Restart on port {} failed: {}", old, restart);
                    }
                }
                self.sink.emit(
                    EventLevel::Error,
                    format!("Port change to {} failed: {}", new, e),
                );
                Err(e)
            }
        }
    }

    async fn apply_port(
        &self,
        install: &ServerInstallation,
        new: u16,
        was_up: bool,
    ) -> Result<(), PilotError> {
        if was_up {
            self.stop().await?;
        }
        write_server_port(&install.server_xml(), new).await?;
        self.settings.update(|s| s.port = new).await?;
        if was_up {
            self.start().await?;
        }
        Ok(())
    }

    async fn rollback_port(&self, install: &ServerInstallation, old: u16) {
        match read_server_port(&install.server_xml()).await {
            Ok(Some(port)) if port == old => {}
            Ok(_) => {
                if let Err(e) = write_server_port(&install.server_xml(), old).await {
                    error!("Failed to restore server.xml port: {}", e);
                }
            }
            Err(e) => error!("Failed to read server.xml during rollback: {}", e),
        }
        if let Err(e) = self.settings.update(|s| s.port = old).await {
            error!("Failed to restore port setting: {}", e);
        }
    }

    /// Kill the tracked process and any stray runtime of this installation
    pub async fn kill_runtime(&self) -> Result<(), PilotError> {
        let install = self.installation().await?;
        let mut inner = self.inner.lock().await;
        if let Some(mut process) = inner.process.take() {
            if let Err(e) = process.terminate(Duration::ZERO).await {
                warn!("Failed to kill tracked process: {}", e);
            }
        }
        let killed = self.host.kill_runtime(&install).await?;
        debug!(killed, "Runtime processes killed");
        force_stopped(&mut inner.fsm);
        Ok(())
    }

    /// Kill runtimes, empty `webapps` except protected apps, reset scratch dirs
    pub async fn clean(&self) -> Result<Vec<String>, PilotError> {
        self.kill_runtime().await?;
        let install = self.installation().await?;
        let protected = self.settings.get().await.protected_webapps;

        let removed = Dir::new(install.webapps_dir()).clear_except(&protected).await?;
        Dir::new(install.work_dir()).recreate().await?;
        Dir::new(install.temp_dir()).recreate().await?;

        info!(removed = removed.len(), "Webapps cleaned");
        self.sink.emit(
            EventLevel::Info,
            format!("Cleaned {} webapp entries", removed.len()),
        );
        Ok(removed)
    }
}

fn transition(fsm: &mut ServerFsm, event: ServerEvent) {
    if let Err(e) = fsm.process(event) {
        debug!("{}", e);
    }
}

fn force_stopped(fsm: &mut ServerFsm) {
    if fsm.state().is_up() {
        transition(fsm, ServerEvent::Stop);
    }
    if fsm.state() == ServerState::Stopping {
        transition(fsm, ServerEvent::Exited);
    }
    if fsm.state() == ServerState::Unknown {
        transition(fsm, ServerEvent::Probed(false));
    }
}
