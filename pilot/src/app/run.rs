//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::serve::serve;
use crate::app::action::{perform, Action};
use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::{AppState, Collaborators};
use crate::errors::PilotError;
use crate::monitor::access_log::AccessLogTailer;
use crate::monitor::processor::{line_channel, LineReceiver, LogProcessor};
use crate::monitor::sink::LogSink;
use crate::storage::settings::SettingsStore;
use crate::workers::{access_log, refresh};

/// Run catpilot with the real collaborators
pub async fn run(
    version: String,
    options: AppOptions,
    settings: Arc<SettingsStore>,
    action: Option<Action>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PilotError> {
    let collaborators = Collaborators::system(&options, &settings).await?;
    run_with(version, options, settings, collaborators, action, shutdown_signal).await
}

/// Run catpilot, performing `action` first.
///
/// Without an action, or after a deploy or start, the service keeps running
/// until the shutdown signal.
pub async fn run_with(
    version: String,
    options: AppOptions,
    settings: Arc<SettingsStore>,
    collaborators: Collaborators,
    action: Option<Action>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PilotError> {
    info!("Initializing catpilot...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = match init(
        version,
        &options,
        settings,
        collaborators,
        &shutdown_tx,
        &mut shutdown_manager,
    )
    .await
    {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start catpilot: {}", e);
            shutdown_manager.shutdown(false).await?;
            return Err(e);
        }
    };

    let mut outcome = Ok(());
    let keep_running = match action {
        Some(action) => match perform(&app_state, action).await {
            Ok(message) => {
                println!("{} {}", format!("[{}]", action).green().bold(), message);
                action.keeps_running()
            }
            Err(e) => {
                eprintln!("{} {}", format!("[{}]", action).red().bold(), e);
                outcome = Err(e);
                false
            }
        },
        None => true,
    };

    if keep_running {
        shutdown_signal.await;
        info!("Shutdown signal received, shutting down...");
    }

    drop(shutdown_tx);
    let stop_server = keep_running && options.lifecycle.stop_server_on_exit;
    shutdown_manager.shutdown(stop_server).await?;
    outcome
}

// =============================== INITIALIZATION ================================== //

async fn init(
    version: String,
    options: &AppOptions,
    settings: Arc<SettingsStore>,
    collaborators: Collaborators,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, PilotError> {
    let min_level = settings.get().await.min_event_level;
    let sink = Arc::new(LogSink::new(min_level));
    let (lines_tx, lines_rx) = line_channel();

    init_log_processor(sink.clone(), lines_rx, shutdown_manager, shutdown_tx.subscribe())?;

    let app_state = Arc::new(
        AppState::init(version, options, settings, sink, lines_tx, collaborators).await?,
    );
    shutdown_manager.with_app_state(app_state.clone())?;

    init_access_log_worker(
        options.access_log.clone(),
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    init_refresh_worker(app_state.clone(), shutdown_manager, shutdown_tx.subscribe())?;

    if options.enable_api {
        init_api_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

fn init_log_processor(
    sink: Arc<LogSink>,
    lines: LineReceiver,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PilotError> {
    info!("Initializing log processor...");

    let processor = LogProcessor::new(sink)?;
    let handle = tokio::spawn(async move {
        processor
            .run(
                lines,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
    });

    shutdown_manager.with_processor_handle(handle)
}

async fn init_access_log_worker(
    options: access_log::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PilotError> {
    info!("Initializing access log worker...");

    let install = match app_state.tomcat.installation().await {
        Ok(install) => install,
        Err(e) => {
            warn!("Access log tailing disabled: {}", e);
            return Ok(());
        }
    };
    let tailer = AccessLogTailer::new(install.logs_dir())?;
    let lines = app_state.lines.clone();

    let handle = tokio::spawn(async move {
        access_log::run(
            &options,
            tailer,
            lines,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_access_log_worker_handle(handle)
}

fn init_refresh_worker(
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PilotError> {
    info!("Initializing refresh worker...");

    let triggers = app_state.sink.subscribe_triggers();
    let app_name = app_state.app_name().to_string();
    let tomcat = app_state.tomcat.clone();
    let browser = app_state.browser.clone();

    let handle = tokio::spawn(async move {
        refresh::run(
            app_name,
            triggers,
            tomcat,
            browser,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_refresh_worker_handle(handle)
}

async fn init_api_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PilotError> {
    info!("Initializing control API...");

    let server_handle = serve(&options.api, app_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_api_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    api_server_handle: Option<JoinHandle<Result<(), PilotError>>>,
    processor_handle: Option<JoinHandle<()>>,
    access_log_worker_handle: Option<JoinHandle<()>>,
    refresh_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            api_server_handle: None,
            processor_handle: None,
            access_log_worker_handle: None,
            refresh_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PilotError> {
        if self.app_state.is_some() {
            return Err(PilotError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_processor_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PilotError> {
        if self.processor_handle.is_some() {
            return Err(PilotError::ShutdownError("processor_handle already set".to_string()));
        }
        self.processor_handle = Some(handle);
        Ok(())
    }

    pub fn with_access_log_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), PilotError> {
        if self.access_log_worker_handle.is_some() {
            return Err(PilotError::ShutdownError("access_log_handle already set".to_string()));
        }
        self.access_log_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_refresh_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PilotError> {
        if self.refresh_worker_handle.is_some() {
            return Err(PilotError::ShutdownError("refresh_handle already set".to_string()));
        }
        self.refresh_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_api_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PilotError>>,
    ) -> Result<(), PilotError> {
        if self.api_server_handle.is_some() {
            return Err(PilotError::ShutdownError("api_server_handle already set".to_string()));
        }
        self.api_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self, stop_server: bool) -> Result<(), PilotError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(stop_server),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self, stop_server: bool) -> Result<(), PilotError> {
        info!("Shutting down catpilot...");

        // 1. Control API
        if let Some(handle) = self.api_server_handle.take() {
            handle.await.map_err(|e| PilotError::ShutdownError(e.to_string()))??;
        }

        // 2. Refresh worker
        if let Some(handle) = self.refresh_worker_handle.take() {
            handle.await.map_err(|e| PilotError::ShutdownError(e.to_string()))?;
        }

        // 3. Access log worker
        if let Some(handle) = self.access_log_worker_handle.take() {
            handle.await.map_err(|e| PilotError::ShutdownError(e.to_string()))?;
        }

        // 4. App state, stops the server when asked
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown(stop_server).await?;
        }

        // 5. Log processor
        if let Some(handle) = self.processor_handle.take() {
            handle.await.map_err(|e| PilotError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
