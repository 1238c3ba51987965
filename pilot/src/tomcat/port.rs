//! Port validation and probing

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::errors::PilotError;

pub const MIN_PORT: u32 = 1024;
pub const MAX_PORT: u32 = 65535;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);

/// Reject privileged and out-of-range ports
pub fn validate_port(port: u32) -> Result<u16, PilotError> {
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(PilotError::ValidationError(format!(
            "Port {} is outside {}..={}",
            port, MIN_PORT, MAX_PORT
        )));
    }
    u16::try_from(port).map_err(|_| PilotError::ValidationError(format!("Invalid port {}", port)))
}

/// Whether something is listening on the port.
///
/// A successful connect to loopback is authoritative; otherwise a failed
/// listen attempt on the wildcard address means the port is taken.
pub async fn is_port_bound(port: u16) -> bool {
    let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    if let Ok(Ok(_)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(loopback)).await {
        debug!(port, "Port accepts connections");
        return true;
    }

    match TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(e) => {
            debug!(port, error = %e, "Port cannot be bound");
            true
        }
    }
}
