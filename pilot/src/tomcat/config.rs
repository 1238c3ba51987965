//! Targeted edits of `conf/server.xml` and `conf/tomcat-users.xml`
//!
//! Edits are regex substitutions confined to one element, never a structural
//! rewrite, so unrelated configuration survives untouched. Every write checks
//! that the intended value is present in the output before it reaches disk.
//! A change in Tomcat's file layout breaks these patterns; that shows up as a
//! `PortConfigError`, not as silent corruption.

use std::ops::Range;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::PilotError;
use crate::filesys::file::File;

/// Management user written by self-healing
pub const MANAGER_USER: &str = "admin";
pub const MANAGER_PASSWORD: &str = "admin";
pub const MANAGER_ROLES: &[&str] = &[
    "manager-gui",
    "manager-script",
    "manager-jmx",
    "manager-status",
    "admin-gui",
    "admin-script",
];

const USERS_CLOSING_TAG: &str = "</tomcat-users>";

const EMPTY_USERS_FILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tomcat-users xmlns="http://tomcat.apache.org/xml"
              xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
              xsi:schemaLocation="http://tomcat.apache.org/xml tomcat-users.xsd"
              version="1.0">
</tomcat-users>
"#;

fn comment_spans(xml: &str) -> Result<Vec<Range<usize>>, PilotError> {
    let comments = Regex::new(r"(?s)<!--.*?-->")?;
    Ok(comments.find_iter(xml).map(|m| m.range()).collect())
}

/// Locate the primary HTTP connector: the first live `<Connector>` speaking
/// HTTP/1.1 without TLS.
fn http_connector(xml: &str) -> Result<Option<Range<usize>>, PilotError> {
    let connector = Regex::new(r"(?s)<Connector\b[^>]*>")?;
    let protocol = Regex::new(r#"\bprotocol\s*=\s*"([^"]*)""#)?;
    let ssl = Regex::new(r#"(?i)\bSSLEnabled\s*=\s*"true""#)?;
    let comments = comment_spans(xml)?;

    for m in connector.find_iter(xml) {
        if comments.iter().any(|c| c.contains(&m.start())) {
            continue;
        }
        let tag = m.as_str();
        let is_http = match protocol.captures(tag).and_then(|c| c.get(1)) {
            Some(p) => p.as_str() == "HTTP/1.1" || p.as_str().to_lowercase().contains("http11"),
            None => true,
        };
        if is_http && !ssl.is_match(tag) {
            return Ok(Some(m.range()));
        }
    }
    Ok(None)
}

fn port_attr() -> Result<Regex, PilotError> {
    Ok(Regex::new(r#"(\bport\s*=\s*")(\d+)(")"#)?)
}

/// Port of the primary HTTP connector
pub fn read_connector_port(xml: &str) -> Result<Option<u16>, PilotError> {
    let Some(range) = http_connector(xml)? else {
        return Ok(None);
    };
    Ok(port_attr()?
        .captures(&xml[range])
        .and_then(|c| c.get(2))
        .and_then(|p| p.as_str().parse().ok()))
}

/// Rewrite the port attribute of the primary HTTP connector
pub fn patch_connector_port(xml: &str, port: u16) -> Result<String, PilotError> {
    let range = http_connector(xml)?
        .ok_or_else(|| PilotError::PortConfigError("No HTTP/1.1 connector in server.xml".to_string()))?;
    let tag = &xml[range.clone()];
    let attr = port_attr()?;
    if !attr.is_match(tag) {
        return Err(PilotError::PortConfigError(
            "HTTP connector has no port attribute".to_string(),
        ));
    }

    let patched_tag = attr.replace(tag, format!("${{1}}{}${{3}}", port));
    let patched = format!("{}{}{}", &xml[..range.start], patched_tag, &xml[range.end..]);

    if read_connector_port(&patched)? != Some(port) {
        return Err(PilotError::PortConfigError(format!(
            "Port {} not present after patching server.xml",
            port
        )));
    }
    Ok(patched)
}

/// Read the connector port from a server.xml file
pub async fn read_server_port(server_xml: &Path) -> Result<Option<u16>, PilotError> {
    let file = File::new(server_xml);
    if !file.exists().await {
        return Ok(None);
    }
    read_connector_port(&file.read_string().await?)
}

/// Patch the connector port in a server.xml file
pub async fn write_server_port(server_xml: &Path, port: u16) -> Result<(), PilotError> {
    let file = File::new(server_xml);
    let xml = file.read_string().await.map_err(|e| {
        PilotError::PortConfigError(format!("Cannot read {}: {}", server_xml.display(), e))
    })?;
    let patched = patch_connector_port(&xml, port)?;
    file.write_atomic(patched.as_bytes()).await?;
    info!(port, file = %server_xml.display(), "Connector port written");
    Ok(())
}

/// Replace the management user with a fresh one carrying every manager role
pub fn heal_users(xml: &str) -> Result<String, PilotError> {
    let existing = Regex::new(&format!(
        r#"(?s)[ \t]*<user\b[^>]*\busername\s*=\s*"{}"[^>]*/>[ \t]*\r?\n?"#,
        regex::escape(MANAGER_USER)
    ))?;
    let without = existing.replace_all(xml, "");

    let Some(close) = without.rfind(USERS_CLOSING_TAG) else {
        return Err(PilotError::PortConfigError(format!(
            "{} missing from tomcat-users.xml",
            USERS_CLOSING_TAG
        )));
    };

    let entry = format!(
        "  <user username=\"{}\" password=\"{}\" roles=\"{}\"/>\n",
        MANAGER_USER,
        MANAGER_PASSWORD,
        MANAGER_ROLES.join(",")
    );
    let healed = format!("{}{}{}", &without[..close], entry, &without[close..]);
    debug!("Management user entry rewritten");
    Ok(healed)
}

/// Heal the users file, creating it when missing
pub async fn heal_users_file(users_xml: &Path) -> Result<(), PilotError> {
    let file = File::new(users_xml);
    let xml = if file.exists().await {
        file.read_string().await?
    } else {
        EMPTY_USERS_FILE.to_string()
    };
    let healed = heal_users(&xml)?;
    file.write_atomic(healed.as_bytes()).await?;
    info!(file = %users_xml.display(), "Management credentials restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Service name="Catalina">
    <!--
    <Connector port="8443" protocol="org.apache.coyote.http11.Http11NioProtocol"
               maxThreads="150" SSLEnabled="true" />
    -->
    <Connector port="8080" protocol="HTTP/1.1"
               connectionTimeout="20000"
               redirectPort="8443" />
    <Connector protocol="AJP/1.3" port="8009" redirectPort="8443" />
  </Service>
</Server>
"#;

    #[test]
    fn test_patch_only_http_connector() {
        let patched = patch_connector_port(SERVER_XML, 9090).unwrap();
        assert_eq!(read_connector_port(&patched).unwrap(), Some(9090));
        assert!(patched.contains(r#"<Server port="8005""#));
        assert!(patched.contains(r#"port="8009""#));
        assert!(patched.contains(r#"redirectPort="8443""#));
        assert!(patched.contains(r#"<Connector port="8443""#));
        assert_eq!(patched.len(), SERVER_XML.len());
    }

    #[test]
    fn test_missing_connector_fails() {
        let xml = r#"<Server><Service><Connector protocol="AJP/1.3" port="8009"/></Service></Server>"#;
        assert!(matches!(
            patch_connector_port(xml, 9090),
            Err(PilotError::PortConfigError(_))
        ));
        assert_eq!(read_connector_port(xml).unwrap(), None);
    }

    #[test]
    fn test_heal_replaces_admin() {
        let xml = r#"<tomcat-users>
  <user username="admin" password="secret" roles="manager-gui"/>
  <user username="alice" password="pw" roles="tomcat"/>
</tomcat-users>
"#;
        let healed = heal_users(xml).unwrap();
        assert_eq!(healed.matches("username=\"admin\"").count(), 1);
        assert!(!healed.contains("secret"));
        assert!(healed.contains("manager-script"));
        assert!(healed.contains("username=\"alice\""));
        assert!(healed.trim_end().ends_with(USERS_CLOSING_TAG));
    }

    #[tokio::test]
    async fn test_heal_creates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conf/tomcat-users.xml");
        heal_users_file(&path).await.unwrap();
        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("roles=\"manager-gui,manager-script"));
    }
}
