//! Strategy runners

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::deploy::direct::DirectCopyRunner;
use crate::deploy::project::DeploymentTarget;
use crate::deploy::strategy::BuildStrategy;
use crate::deploy::toolchain::ToolchainRunner;
use crate::errors::PilotError;
use crate::tomcat::install::ServerInstallation;

/// Produces the deployed artifact for one strategy
#[async_trait]
pub trait StrategyRunner: Send + Sync {
    fn strategy(&self) -> BuildStrategy;

    /// Build and place the artifact under the target
    async fn produce(
        &self,
        target: &DeploymentTarget,
        install: &ServerInstallation,
    ) -> Result<(), PilotError>;
}

/// Runner per strategy
#[derive(Clone)]
pub struct RunnerRegistry {
    runners: HashMap<BuildStrategy, Arc<dyn StrategyRunner>>,
}

impl RunnerRegistry {
    pub fn empty() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Register a runner, replacing any runner for the same strategy
    pub fn with(mut self, runner: Arc<dyn StrategyRunner>) -> Self {
        self.runners.insert(runner.strategy(), runner);
        self
    }

    pub fn get(&self, strategy: BuildStrategy) -> Result<Arc<dyn StrategyRunner>, PilotError> {
        self.runners
            .get(&strategy)
            .cloned()
            .ok_or_else(|| PilotError::NotFound(format!("No runner for strategy {}", strategy)))
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(DirectCopyRunner))
            .with(Arc::new(ToolchainRunner::new(BuildStrategy::Maven)))
            .with(Arc::new(ToolchainRunner::new(BuildStrategy::Gradle)))
    }
}
