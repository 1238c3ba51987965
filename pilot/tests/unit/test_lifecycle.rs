//! Lifecycle manager tests against a fake process host

use std::sync::atomic::Ordering;

use catpilot::errors::PilotError;
use catpilot::tomcat::config::read_server_port;
use catpilot::tomcat::fsm::ServerState;
use catpilot::tomcat::lifecycle::ReloadOutcome;
use tokio_test::{assert_err, assert_ok};

use crate::support::{Fixture, SERVER_XML, SERVER_XML_AJP_ONLY};

#[tokio::test]
async fn test_start_is_idempotent() {
    let fx = Fixture::new(SERVER_XML, true);

    assert_ok!(fx.tomcat.start().await);
    assert_eq!(fx.tomcat.status().await, ServerState::Starting);

    assert_ok!(fx.tomcat.start().await);
    assert_eq!(fx.host.spawns(), 1);

    fx.tomcat.mark_ready().await;
    fx.host.bind(8080);
    assert_eq!(fx.tomcat.status().await, ServerState::Running);
}

#[tokio::test]
async fn test_start_skips_external_server() {
    let fx = Fixture::new(SERVER_XML, true);
    fx.host.bind(8080);

    assert_ok!(fx.tomcat.start().await);
    assert_eq!(fx.host.spawns(), 0);
    assert_eq!(fx.tomcat.status().await, ServerState::Running);
}

#[tokio::test]
async fn test_stop_uses_bootstrap_for_untracked_server() {
    let fx = Fixture::new(SERVER_XML, true);
    fx.host.bind(8080);

    assert_ok!(fx.tomcat.stop().await);
    assert_eq!(fx.host.stop_commands(), 1);
    assert_eq!(fx.tomcat.status().await, ServerState::Stopped);

    // Already stopped
    assert_ok!(fx.tomcat.stop().await);
    assert_eq!(fx.host.stop_commands(), 1);
}

#[tokio::test]
async fn test_stop_owned_leaves_external_server() {
    let fx = Fixture::new(SERVER_XML, true);
    fx.host.bind(8080);

    assert_ok!(fx.tomcat.stop_owned().await);
    assert_eq!(fx.host.stop_commands(), 0);
    assert_eq!(fx.tomcat.status().await, ServerState::Running);
}

#[tokio::test]
async fn test_reload_accepted() {
    let fx = Fixture::new(SERVER_XML, true);

    let outcome = fx.tomcat.reload("shop").await.unwrap();
    fx.tomcat.wait_recovery().await;

    assert_eq!(outcome, ReloadOutcome::Reloaded);
    assert_eq!(fx.host.spawns(), 0);
}

#[tokio::test]
async fn test_reload_refused_while_down_starts_server() {
    let fx = Fixture::new(SERVER_XML, false);

    let outcome = fx.tomcat.reload("shop").await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Recovering);

    fx.tomcat.wait_recovery().await;
    assert_eq!(fx.host.spawns(), 1);
    assert_eq!(fx.host.stop_commands(), 0);
    assert_eq!(fx.tomcat.status().await, ServerState::Starting);
}

#[tokio::test]
async fn test_reload_refused_while_up_heals_and_restarts() {
    let fx = Fixture::new(SERVER_XML, false);
    fx.host.bind(8080);

    let outcome = fx.tomcat.reload("shop").await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Recovering);
    fx.tomcat.wait_recovery().await;

    let users = std::fs::read_to_string(fx.install.users_xml()).unwrap();
    assert!(users.contains(r#"username="admin""#));
    assert!(users.contains("manager-script"));
    assert_eq!(fx.host.stop_commands(), 1);
    assert_eq!(fx.host.spawns(), 1);
}

#[tokio::test]
async fn test_reload_refused_while_starting_waits_for_startup() {
    let fx = Fixture::new(SERVER_XML, false);
    assert_ok!(fx.tomcat.start().await);

    fx.tomcat.reload("shop").await.unwrap();
    fx.tomcat.wait_recovery().await;

    assert_eq!(fx.host.spawns(), 1);
    assert_eq!(fx.host.stop_commands(), 0);
    assert!(!fx.install.users_xml().exists());
}

#[tokio::test]
async fn test_port_update_while_stopped() {
    let fx = Fixture::new(SERVER_XML, true);

    assert!(fx.tomcat.update_port(9090).await.unwrap());

    assert_eq!(fx.settings.port().await, 9090);
    assert_eq!(read_server_port(&fx.install.server_xml()).await.unwrap(), Some(9090));
    assert!(fx.server_xml().contains(r#"redirectPort="8443""#));
    assert_eq!(fx.host.spawns(), 0);
}

#[tokio::test]
async fn test_port_update_restarts_running_server() {
    let fx = Fixture::new(SERVER_XML, true);
    assert_ok!(fx.tomcat.start().await);

    assert!(fx.tomcat.update_port(9090).await.unwrap());

    assert_eq!(fx.settings.port().await, 9090);
    assert_eq!(fx.host.spawns(), 2);
    assert!(fx.tomcat.status().await.is_up());
}

#[tokio::test]
async fn test_port_update_unchanged_is_noop() {
    let fx = Fixture::new(SERVER_XML, true);
    assert!(!fx.tomcat.update_port(8080).await.unwrap());
    assert_eq!(fx.server_xml(), SERVER_XML);
}

#[tokio::test]
async fn test_port_update_rejects_invalid_ports() {
    let fx = Fixture::new(SERVER_XML, true);

    for port in [0u32, 80, 1023, 65536, 100_000] {
        let err = assert_err!(fx.tomcat.update_port(port).await);
        assert!(matches!(err, PilotError::ValidationError(_)), "port {}", port);
    }

    fx.host.bind(9090);
    let err = assert_err!(fx.tomcat.update_port(9090).await);
    assert!(matches!(err, PilotError::ValidationError(_)));

    assert_eq!(fx.settings.port().await, 8080);
    assert_eq!(fx.server_xml(), SERVER_XML);
    assert!(!fx.settings.file().path().exists());
}

#[tokio::test]
async fn test_port_update_failure_rolls_back() {
    let fx = Fixture::new(SERVER_XML_AJP_ONLY, true);

    let err = assert_err!(fx.tomcat.update_port(9090).await);

    assert!(matches!(err, PilotError::PortConfigError(_)));
    assert_eq!(fx.settings.port().await, 8080);
    assert_eq!(fx.server_xml(), SERVER_XML_AJP_ONLY);
    assert_eq!(fx.host.spawns(), 0);
}

#[tokio::test]
async fn test_port_update_failure_restarts_on_old_port() {
    let fx = Fixture::new(SERVER_XML_AJP_ONLY, true);
    assert_ok!(fx.tomcat.start().await);

    assert_err!(fx.tomcat.update_port(9090).await);

    assert_eq!(fx.settings.port().await, 8080);
    assert_eq!(fx.host.spawns(), 2);
    assert!(fx.tomcat.status().await.is_up());
}

#[tokio::test]
async fn test_clean_keeps_protected_webapps() {
    let fx = Fixture::new(SERVER_XML, true);
    let webapps = fx.install.webapps_dir();
    for app in ["ROOT", "manager", "shop", "blog"] {
        std::fs::create_dir_all(webapps.join(app)).unwrap();
    }
    std::fs::write(webapps.join("shop.war"), "war").unwrap();
    std::fs::write(fx.install.work_dir().join("stale"), "").unwrap();
    assert_ok!(fx.tomcat.start().await);

    let mut removed = fx.tomcat.clean().await.unwrap();
    removed.sort();

    assert_eq!(removed, vec!["blog", "shop", "shop.war"]);
    assert!(webapps.join("ROOT").exists());
    assert!(webapps.join("manager").exists());
    assert!(fx.install.work_dir().exists());
    assert!(!fx.install.work_dir().join("stale").exists());
    assert!(fx.install.temp_dir().exists());
    assert_eq!(fx.host.kills(), 1);
    assert_eq!(fx.tomcat.status().await, ServerState::Stopped);
}

#[tokio::test]
async fn test_failed_spawn_resolves_installation_again() {
    let fx = Fixture::new(SERVER_XML, true);
    fx.host.fail_spawn.store(true, Ordering::SeqCst);

    let err = assert_err!(fx.tomcat.start().await);
    assert!(matches!(err, PilotError::ProcessError(_)));

    // A stale cache would launch again and fail the same way
    std::fs::remove_file(fx.install.catalina_home.join("bin/bootstrap.jar")).unwrap();
    let err = assert_err!(fx.tomcat.start().await);
    assert!(matches!(err, PilotError::ConfigError(_)));
    assert_eq!(fx.host.spawns(), 1);
}
