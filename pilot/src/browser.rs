//! Browser refresh side channel
//!
//! The controller is a black box: "refresh the tab showing this app, or open
//! one". The default implementation hands the URL to the OS opener or a
//! configured command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::PilotError;
use crate::storage::settings::SettingsStore;

/// Refreshes or opens the browser for an app
#[async_trait]
pub trait BrowserController: Send + Sync {
    async fn refresh(&self, app_name: &str) -> Result<(), PilotError>;
}

/// Build the app URL for a port
pub fn app_url(port: u16, app_name: &str) -> String {
    format!("http://localhost:{}/{}", port, app_name.trim_start_matches('/'))
}

/// Launches the app URL through an external command
pub struct CommandBrowser {
    settings: Arc<SettingsStore>,
}

impl CommandBrowser {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserController for CommandBrowser {
    async fn refresh(&self, app_name: &str) -> Result<(), PilotError> {
        let settings = self.settings.get().await;
        if !settings.browser.enabled {
            debug!("Browser refresh disabled");
            return Ok(());
        }

        let url = app_url(settings.port, app_name);
        let mut cmd = match settings.browser.command.as_deref() {
            Some(custom) => {
                let mut parts = custom.split_whitespace();
                let program = parts
                    .next()
                    .ok_or_else(|| PilotError::ConfigError("Empty browser command".to_string()))?;
                let mut cmd = Command::new(program);
                cmd.args(parts);
                cmd
            }
            None => opener(),
        };

        info!("Opening {}", url);
        let status = cmd
            .arg(&url)
            .status()
            .await
            .map_err(|e| PilotError::ProcessError(format!("Failed to launch browser: {}", e)))?;

        if !status.success() {
            warn!("Browser launcher exited with {}", status);
        }
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn opener() -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]);
    cmd
}

#[cfg(target_os = "macos")]
fn opener() -> Command {
    Command::new("open")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener() -> Command {
    Command::new("xdg-open")
}

/// Collapses refreshes for the same app within a window.
///
/// A successful reload refreshes directly and then logs a reload-completed
/// line that triggers a second refresh; only the first one goes through.
pub struct DebouncedBrowser {
    inner: Arc<dyn BrowserController>,
    window: Duration,
    last: Mutex<Option<(String, Instant)>>,
}

impl DebouncedBrowser {
    pub fn new(inner: Arc<dyn BrowserController>, window: Duration) -> Self {
        Self {
            inner,
            window,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BrowserController for DebouncedBrowser {
    async fn refresh(&self, app_name: &str) -> Result<(), PilotError> {
        {
            let mut last = self.last.lock().await;
            if let Some((app, at)) = last.as_ref() {
                if app == app_name && at.elapsed() < self.window {
                    debug!("Refresh of {} debounced", app_name);
                    return Ok(());
                }
            }
            *last = Some((app_name.to_string(), Instant::now()));
        }
        self.inner.refresh(app_name).await
    }
}
