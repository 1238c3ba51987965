//! Tomcat manager text interface client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use url::Url;

use crate::errors::PilotError;
use crate::tomcat::config::{MANAGER_PASSWORD, MANAGER_USER};

/// Management protocol used by the reload fast path
#[async_trait]
pub trait ManagerApi: Send + Sync {
    /// Reload one application, `Err` for anything but HTTP 200
    async fn reload(&self, port: u16, app_name: &str) -> Result<(), PilotError>;
}

/// Build the reload URL for an app
pub fn reload_url(port: u16, app_name: &str) -> Result<Url, PilotError> {
    let mut url = Url::parse(&format!("http://localhost:{}/manager/text/reload", port))
        .map_err(|e| PilotError::ValidationError(format!("Invalid manager URL: {}", e)))?;
    url.set_query(Some(&format!("path=/{}", app_name.trim_start_matches('/'))));
    Ok(url)
}

/// HTTP client for `/manager/text`
pub struct ManagerClient {
    client: Client,
    username: String,
    password: SecretString,
}

impl ManagerClient {
    /// Create a client whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, PilotError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            username: MANAGER_USER.to_string(),
            password: SecretString::from(MANAGER_PASSWORD.to_string()),
        })
    }
}

#[async_trait]
impl ManagerApi for ManagerClient {
    async fn reload(&self, port: u16, app_name: &str) -> Result<(), PilotError> {
        let url = reload_url(port, app_name)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("Manager reload failed: {} - {}", status, body.trim());
            return Err(PilotError::ProtocolError(format!("{}: {}", status, body.trim())));
        }

        let body = response.text().await.unwrap_or_default();
        if body.starts_with("FAIL") {
            return Err(PilotError::ProtocolError(body.trim().to_string()));
        }
        debug!("Manager replied: {}", body.trim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_url() {
        let url = reload_url(8080, "shop").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/manager/text/reload?path=/shop");
    }
}
