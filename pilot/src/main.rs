//! catpilot - Entry Point
//!
//! Builds a Java web project, deploys it into a local Tomcat, reloads or
//! restarts the server and streams its logs.

use std::collections::HashMap;
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use catpilot::app::action::Action;
use catpilot::app::options::AppOptions;
use catpilot::app::run::run;
use catpilot::deploy::strategy::StrategyChoice;
use catpilot::logs::{init_logging, LogOptions};
use catpilot::storage::layout::StorageLayout;
use catpilot::storage::settings::SettingsStore;
use catpilot::tomcat::install::InstallOverrides;
use catpilot::utils::{run_diagnostic, version_info};

use colored::Colorize;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Storage and settings
    let layout = cli_args
        .get("config-dir")
        .map(StorageLayout::new)
        .unwrap_or_default();
    if let Err(e) = layout.setup().await {
        eprintln!("{} {}", "Unable to create storage directory:".red(), e);
        std::process::exit(1);
    }
    let settings = match SettingsStore::load(layout.settings_file()).await {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("{} {}", "Unable to read settings file:".red(), e);
            std::process::exit(1);
        }
    };
    let current = settings.get().await;

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli_args
            .get("log-level")
            .and_then(|l| l.parse().ok())
            .unwrap_or_else(|| current.log_level.clone()),
        stdout: true,
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        json_format: cli_args.contains_key("json-logs"),
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let overrides = InstallOverrides {
        catalina_home: cli_args.get("catalina-home").map(PathBuf::from),
        java_home: cli_args.get("java-home").map(PathBuf::from),
    };
    let project_root = cli_args
        .get("project")
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(settings, overrides, &project_root).await;
        return;
    }

    let action = match parse_action(&cli_args) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{} {}", "Invalid arguments:".red(), e);
            std::process::exit(2);
        }
    };

    let options = AppOptions {
        project_root,
        overrides,
        interactive: std::io::stdin().is_terminal(),
        ..AppOptions::from_settings(&current, layout)
    };

    info!("Running catpilot with options: {:?}", options);
    let result = run(version.version, options, settings, action, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("catpilot failed: {e}");
        std::process::exit(1);
    }
}

fn parse_action(cli_args: &HashMap<String, String>) -> Result<Option<Action>, String> {
    if let Some(value) = cli_args.get("deploy") {
        let choice = if value == "true" {
            StrategyChoice::Prompt
        } else {
            value.parse()?
        };
        return Ok(Some(Action::Deploy(choice)));
    }
    if let Some(value) = cli_args.get("port") {
        let port = value
            .parse::<u32>()
            .map_err(|_| format!("Invalid port: {}", value))?;
        return Ok(Some(Action::Port(port)));
    }

    let flags = [
        ("start", Action::Start),
        ("stop", Action::Stop),
        ("reload", Action::Reload),
        ("clean", Action::Clean),
    ];
    Ok(flags
        .into_iter()
        .find(|(flag, _)| cli_args.contains_key(*flag))
        .map(|(_, action)| action))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Ctrl+C received, shutting down...");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
