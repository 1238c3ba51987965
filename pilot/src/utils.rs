//! Utility functions

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::deploy::strategy::BuildStrategy;
use crate::storage::settings::SettingsStore;
use crate::tomcat::config::read_server_port;
use crate::tomcat::install::{InstallOverrides, Installer};
use crate::tomcat::port::is_port_bound;
use crate::workbench::Headless;

/// Version information for catpilot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Print installation, port and project diagnostics
pub async fn run_diagnostic(
    settings: Arc<SettingsStore>,
    overrides: InstallOverrides,
    project_root: &Path,
) {
    let version = version_info();
    println!("{}", "catpilot diagnostics".bold());
    println!("  version:        {} ({}, {})", version.version, version.git_hash, version.build_time);
    println!("  settings:       {}", settings.file().path().display());

    let current = settings.get().await;
    let installer = Installer::new(overrides, settings.clone(), Arc::new(Headless::default()));
    match installer.resolve().await {
        Ok(install) => {
            println!("  catalina home:  {}", install.catalina_home.display());
            println!("  java home:      {}", install.java_home.display());
            match read_server_port(&install.server_xml()).await {
                Ok(Some(port)) if port == current.port => {
                    println!("  server.xml:     port {}", port)
                }
                Ok(Some(port)) => println!(
                    "  server.xml:     port {} {}",
                    port,
                    format!("(settings say {})", current.port).yellow()
                ),
                Ok(None) => println!("  server.xml:     {}", "no HTTP connector".yellow()),
                Err(e) => println!("  server.xml:     {}", e.to_string().red()),
            }
        }
        Err(e) => println!("  installation:   {}", e.to_string().red()),
    }

    let bound = is_port_bound(current.port).await;
    println!(
        "  port:           {} ({})",
        current.port,
        if bound { "in use".yellow() } else { "free".green() }
    );
    if let Some(debug_port) = current.debug_port {
        println!("  debug port:     {}", debug_port);
    }
    println!("  protected apps: {}", current.protected_webapps.join(", "));

    let strategies = BuildStrategy::detect(project_root);
    if strategies.is_empty() {
        println!("  project:        {}", "no Java web project".yellow());
    } else {
        let names: Vec<&str> = strategies.iter().map(|s| s.as_str()).collect();
        println!("  project:        {} [{}]", project_root.display(), names.join(", "));
    }
}
