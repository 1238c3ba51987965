//! Trigger-driven browser refresh

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::browser::BrowserController;
use crate::monitor::classify::Trigger;
use crate::tomcat::lifecycle::TomcatManager;

/// Run the refresh worker
pub async fn run(
    app_name: String,
    mut triggers: broadcast::Receiver<Trigger>,
    tomcat: Arc<TomcatManager>,
    browser: Arc<dyn BrowserController>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Refresh worker starting...");

    loop {
        let trigger = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Refresh worker shutting down...");
                return;
            }
            trigger = triggers.recv() => trigger,
        };

        let trigger = match trigger {
            Ok(trigger) => trigger,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Refresh worker lagged behind triggers");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Trigger channel closed");
                return;
            }
        };

        let refresh = match &trigger {
            Trigger::ServerStarted { millis } => {
                info!(millis, "Server ready");
                tomcat.mark_ready().await;
                true
            }
            Trigger::ContextReloaded { path } => path.trim_start_matches('/') == app_name,
        };
        if !refresh {
            debug!(?trigger, "Trigger ignored");
            continue;
        }

        if let Err(e) = browser.refresh(&app_name).await {
            warn!("Browser refresh failed: {}", e);
        }
    }
}
