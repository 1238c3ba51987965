//! Triggerable actions
//!
//! The command line and the control API both funnel into [`perform`].

use std::fmt;

use pilot_api::ActionResponse;
use tracing::error;

use crate::app::state::AppState;
use crate::deploy::orchestrator::DeployOutcome;
use crate::deploy::strategy::StrategyChoice;
use crate::errors::PilotError;
use crate::tomcat::lifecycle::ReloadOutcome;

/// An action on the server or project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy(StrategyChoice),
    Start,
    Stop,
    Reload,
    Clean,
    Port(u32),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Deploy(_) => "deploy",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Reload => "reload",
            Action::Clean => "clean",
            Action::Port(_) => "port",
        }
    }

    /// Whether the service keeps running after the action from the command line
    pub fn keeps_running(&self) -> bool {
        matches!(self, Action::Deploy(_) | Action::Start)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run an action, returning a human readable summary
pub async fn perform(state: &AppState, action: Action) -> Result<String, PilotError> {
    match action {
        Action::Deploy(choice) => Ok(match state.deployer.deploy(choice).await? {
            DeployOutcome::AlreadyRunning => "A deploy is already in progress".to_string(),
            DeployOutcome::NoProject => "No Java web project found".to_string(),
            DeployOutcome::Cancelled => "Deploy cancelled".to_string(),
            DeployOutcome::Deployed {
                strategy,
                duration,
                attempts,
                ..
            } => format!(
                "Deployed {} with {} in {} ms ({} attempt{})",
                state.app_name(),
                strategy,
                duration.as_millis(),
                attempts,
                if attempts == 1 { "" } else { "s" }
            ),
        }),
        Action::Start => {
            state.tomcat.start().await?;
            Ok("Server starting".to_string())
        }
        Action::Stop => {
            state.tomcat.stop().await?;
            Ok("Server stopped".to_string())
        }
        Action::Reload => Ok(match state.tomcat.reload(state.app_name()).await? {
            ReloadOutcome::Reloaded => format!("Reloaded /{}", state.app_name()),
            ReloadOutcome::Recovering => "Reload rejected, recovering in background".to_string(),
        }),
        Action::Clean => {
            let removed = state.tomcat.clean().await?;
            Ok(format!("Removed {} webapp entries", removed.len()))
        }
        Action::Port(port) => Ok(if state.tomcat.update_port(port).await? {
            format!("Port changed to {}", port)
        } else {
            format!("Port already {}", port)
        }),
    }
}

/// [`perform`] wrapped as an API response
pub async fn perform_response(state: &AppState, action: Action) -> ActionResponse {
    match perform(state, action).await {
        Ok(message) => ActionResponse::ok(action.name(), message),
        Err(e) => {
            error!(action = action.name(), "Action failed: {}", e);
            ActionResponse::failed(action.name(), e.to_string())
        }
    }
}
