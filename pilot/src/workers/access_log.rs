//! Access log tailing worker
//!
//! Growth of the live file is picked up from filesystem notifications when
//! available; the poll tick rescans for rotation and doubles as the fallback
//! growth check. Both paths read through the same offset, so a line is
//! never emitted twice.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::monitor::access_log::AccessLogTailer;
use crate::monitor::processor::{LineSender, RawLine};

/// Access log worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Rotation scan and fallback poll interval
    pub poll_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Run the access log worker
pub async fn run<S, F>(
    options: &Options,
    mut tailer: AccessLogTailer,
    lines: LineSender,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(dir = %tailer.logs_dir().display(), "Access log worker starting...");

    let (changed_tx, mut changed_rx) = mpsc::unbounded_channel::<()>();
    let mut watcher: Option<RecommendedWatcher> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                drop(watcher.take());
                info!("Access log worker shutting down...");
                return;
            }
            _ = sleep_fn(options.poll_interval) => {
                match tailer.rescan().await {
                    Ok(Some(path)) => {
                        // Tear down the old watch before establishing the new one
                        drop(watcher.take());
                        watcher = watch_file(&path, changed_tx.clone());
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Access log scan failed: {}", e),
                }
            }
            Some(()) = changed_rx.recv() => {
                // Coalesce bursts of notifications into one read
                while changed_rx.try_recv().is_ok() {}
            }
        }

        match tailer.read_new_lines().await {
            Ok(new_lines) => {
                for line in new_lines {
                    if lines.send(RawLine::access_log(line)).is_err() {
                        info!("Log processor gone, stopping access log worker");
                        return;
                    }
                }
            }
            Err(e) => warn!("Access log read failed: {}", e),
        }
    }
}

fn watch_file(path: &Path, changed: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
    let handler = move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() {
                let _ = changed.send(());
            }
        }
    };

    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(w) => w,
        Err(e) => {
            warn!("File watcher unavailable, polling only: {}", e);
            return None;
        }
    };

    if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
        warn!(file = %path.display(), "Could not watch access log, polling only: {}", e);
        return None;
    }

    debug!(file = %path.display(), "Watching access log");
    Some(watcher)
}
