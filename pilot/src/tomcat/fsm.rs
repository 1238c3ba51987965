//! Finite state machine for the server process

use serde::{Deserialize, Serialize};

/// Server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// Not yet probed
    Unknown,

    Stopped,

    /// Process spawned, startup not yet reported
    Starting,

    Running,

    Stopping,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Unknown => "unknown",
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        }
    }

    /// Starting or running
    pub fn is_up(&self) -> bool {
        matches!(self, ServerState::Starting | ServerState::Running)
    }
}

/// Server event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Port probe result, whether the connector port is bound
    Probed(bool),

    /// Process spawned
    Spawned,

    /// Startup completed
    Ready,

    /// Stop requested
    Stop,

    /// Process exited
    Exited,

    /// Spawn or startup failed
    Failed(String),
}

/// Server FSM
#[derive(Debug, Clone)]
pub struct ServerFsm {
    state: ServerState,
    error: Option<String>,
}

impl ServerFsm {
    /// Create a new FSM in unknown state
    pub fn new() -> Self {
        Self {
            state: ServerState::Unknown,
            error: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Last failure, cleared on the next start
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ServerEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            // Probing reconciles with reality unless a transition is underway
            (ServerState::Unknown | ServerState::Stopped | ServerState::Running, ServerEvent::Probed(bound)) => {
                if *bound {
                    ServerState::Running
                } else {
                    ServerState::Stopped
                }
            }
            (ServerState::Starting | ServerState::Stopping, ServerEvent::Probed(_)) => self.state,

            // From Stopped
            (ServerState::Stopped | ServerState::Unknown, ServerEvent::Spawned) => {
                self.error = None;
                ServerState::Starting
            }

            // From Starting
            (ServerState::Starting, ServerEvent::Ready) => ServerState::Running,
            (ServerState::Starting, ServerEvent::Failed(err)) => {
                self.error = Some(err.clone());
                ServerState::Stopped
            }
            (ServerState::Starting, ServerEvent::Stop) => ServerState::Stopping,
            (ServerState::Starting, ServerEvent::Exited) => ServerState::Stopped,

            // From Running
            (ServerState::Running, ServerEvent::Ready) => ServerState::Running,
            (ServerState::Running, ServerEvent::Stop) => ServerState::Stopping,
            (ServerState::Running, ServerEvent::Exited) => ServerState::Stopped,

            // From Stopping
            (ServerState::Stopping, ServerEvent::Exited) => ServerState::Stopped,
            (ServerState::Stopping, ServerEvent::Failed(err)) => {
                self.error = Some(err.clone());
                ServerState::Stopped
            }

            // Stray exit notifications
            (ServerState::Stopped, ServerEvent::Exited) => ServerState::Stopped,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ServerFsm {
    fn default() -> Self {
        Self::new()
    }
}
