//! Deployment orchestrator
//!
//! One deploy at a time: a second call while a deploy is in flight returns
//! [`DeployOutcome::AlreadyRunning`] without touching anything. Busy targets
//! are retried in a bounded loop with the runtime killed between attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pilot_api::EventLevel;
use tracing::{error, info, warn};

use crate::browser::BrowserController;
use crate::deploy::attempt::{DeploymentAttempt, MAX_BUSY_RETRIES};
use crate::deploy::project::Project;
use crate::deploy::runner::RunnerRegistry;
use crate::deploy::strategy::{BuildStrategy, StrategyChoice};
use crate::errors::PilotError;
use crate::monitor::sink::LogSink;
use crate::tomcat::lifecycle::{ReloadOutcome, TomcatManager};
use crate::workbench::Workbench;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct DeployerOptions {
    /// Retries after a resource-busy failure
    pub max_busy_retries: u32,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            max_busy_retries: MAX_BUSY_RETRIES,
        }
    }
}

/// Result of a deploy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Another deploy holds the guard
    AlreadyRunning,

    /// No recognizable project, scaffolding was offered
    NoProject,

    /// Strategy prompt declined
    Cancelled,

    Deployed {
        strategy: BuildStrategy,
        duration: Duration,
        /// Executions, the first run plus busy retries
        attempts: u32,
        reload: ReloadOutcome,
    },
}

/// Clears the in-flight flag when dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Deployer {
    project: Project,
    tomcat: Arc<TomcatManager>,
    runners: RunnerRegistry,
    workbench: Arc<dyn Workbench>,
    browser: Arc<dyn BrowserController>,
    sink: Arc<LogSink>,
    options: DeployerOptions,
    in_flight: AtomicBool,
}

impl Deployer {
    pub fn new(
        project: Project,
        tomcat: Arc<TomcatManager>,
        runners: RunnerRegistry,
        workbench: Arc<dyn Workbench>,
        browser: Arc<dyn BrowserController>,
        sink: Arc<LogSink>,
        options: DeployerOptions,
    ) -> Self {
        Self {
            project,
            tomcat,
            runners,
            workbench,
            browser,
            sink,
            options,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Build, sync, reload and refresh
    pub async fn deploy(&self, choice: StrategyChoice) -> Result<DeployOutcome, PilotError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            info!("Deploy already in progress, ignoring request");
            return Ok(DeployOutcome::AlreadyRunning);
        };

        if !self.project.is_recognized() {
            self.workbench.scaffold(self.project.root()).await;
            return Ok(DeployOutcome::NoProject);
        }

        let strategy = match choice {
            StrategyChoice::Strategy(strategy) => strategy,
            StrategyChoice::Prompt => match self.workbench.pick_strategy().await {
                Some(strategy) => strategy,
                None => {
                    info!("No strategy chosen, deploy cancelled");
                    return Ok(DeployOutcome::Cancelled);
                }
            },
        };

        self.workbench.save_all().await?;
        let install = self.tomcat.installation().await?;
        let target = self.project.target(&install);
        let runner = self.runners.get(strategy)?;

        let mut attempt = DeploymentAttempt::new(strategy);
        info!(
            id = %attempt.id(),
            app = %target.app_name,
            strategy = %strategy,
            started_at = %attempt.started_at(),
            "Deploy started"
        );
        self.sink.emit(
            EventLevel::Info,
            format!("Deploying {} ({})", target.app_name, strategy),
        );

        loop {
            match runner.produce(&target, &install).await {
                Ok(()) => break,
                Err(e) if e.is_resource_busy() && attempt.can_retry(self.options.max_busy_retries) => {
                    attempt.record_retry();
                    warn!(
                        retry = attempt.retries(),
                        max = self.options.max_busy_retries,
                        "Deployment target busy: {}",
                        e
                    );
                    self.sink.emit(
                        EventLevel::Warn,
                        format!(
                            "Target locked, stopping Tomcat and retrying ({}/{})",
                            attempt.retries(),
                            self.options.max_busy_retries
                        ),
                    );
                    if let Err(kill) = self.tomcat.kill_runtime().await {
                        error!("Failed to release target: {}", kill);
                    }
                }
                Err(e) => {
                    error!(attempts = attempt.executions(), "Deploy failed: {}", e);
                    self.sink.emit(EventLevel::Error, format!("Deploy failed: {}", e));
                    return Err(e);
                }
            }
        }

        let duration = attempt.elapsed();
        self.sink.emit(
            EventLevel::Success,
            format!(
                "Deployed {} with {} in {} ms",
                target.app_name,
                strategy,
                duration.as_millis()
            ),
        );

        let reload = self.tomcat.reload(&target.app_name).await?;
        if reload == ReloadOutcome::Reloaded {
            if let Err(e) = self.browser.refresh(&target.app_name).await {
                warn!("Browser refresh failed: {}", e);
            }
        }

        Ok(DeployOutcome::Deployed {
            strategy,
            duration,
            attempts: attempt.executions(),
            reload,
        })
    }
}
