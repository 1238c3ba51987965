//! Actions against fully wired application state

use std::sync::Arc;
use std::time::Duration;

use catpilot::app::action::{perform, perform_response, Action};
use catpilot::app::options::AppOptions;
use catpilot::app::run::run_with;
use catpilot::app::state::{AppState, Collaborators};
use catpilot::deploy::runner::RunnerRegistry;
use catpilot::deploy::strategy::{BuildStrategy, StrategyChoice};
use catpilot::monitor::classify::Trigger;
use catpilot::tomcat::install::InstallOverrides;
use catpilot::tomcat::lifecycle::TomcatOptions;
use catpilot::workbench::Headless;
use catpilot::workers::refresh;

use crate::support::{Fixture, RecordingBrowser, ScriptedRunner, SERVER_XML};

async fn app_state(fx: &Fixture, browser: Arc<RecordingBrowser>) -> Arc<AppState> {
    let options = AppOptions {
        project_root: fx.project(),
        overrides: InstallOverrides {
            catalina_home: Some(fx.install.catalina_home.clone()),
            java_home: Some(fx.install.java_home.clone()),
        },
        tomcat: TomcatOptions {
            stop_grace: Duration::from_millis(200),
            probe_interval: Duration::from_millis(10),
        },
        ..AppOptions::default()
    };
    let collaborators = Collaborators {
        host: fx.host.clone(),
        manager_api: fx.manager_api.clone(),
        workbench: Arc::new(Headless::default()),
        browser,
        runners: RunnerRegistry::empty().with(Arc::new(ScriptedRunner::busy(0))),
    };

    Arc::new(
        AppState::init(
            "0.1.0".to_string(),
            &options,
            fx.settings.clone(),
            fx.sink.clone(),
            fx.lines.clone(),
            collaborators,
        )
        .await
        .unwrap(),
    )
}

#[tokio::test]
async fn test_deploy_action_summary() {
    let fx = Fixture::new(SERVER_XML, true);
    let state = app_state(&fx, Arc::new(RecordingBrowser::default())).await;
    assert_eq!(state.app_name(), "shop");

    let message = perform(
        &state,
        Action::Deploy(StrategyChoice::Strategy(BuildStrategy::DirectCopy)),
    )
    .await
    .unwrap();

    assert!(message.starts_with("Deployed shop with local"), "{}", message);
    assert!(message.ends_with("(1 attempt)"), "{}", message);
}

#[tokio::test]
async fn test_reload_refresh_is_debounced() {
    let fx = Fixture::new(SERVER_XML, true);
    let browser = Arc::new(RecordingBrowser::default());
    let state = app_state(&fx, browser.clone()).await;

    let worker = tokio::spawn(refresh::run(
        state.app_name().to_string(),
        state.sink.subscribe_triggers(),
        state.tomcat.clone(),
        state.browser.clone(),
        Box::pin(std::future::pending::<()>()),
    ));

    perform(
        &state,
        Action::Deploy(StrategyChoice::Strategy(BuildStrategy::DirectCopy)),
    )
    .await
    .unwrap();
    // The reload-completed line arrives after the direct refresh
    state.sink.fire(Trigger::ContextReloaded { path: "/shop".to_string() });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(browser.refreshed(), vec!["shop"]);
    worker.abort();
}

#[tokio::test]
async fn test_failed_action_response() {
    let fx = Fixture::new(SERVER_XML, true);
    let state = app_state(&fx, Arc::new(RecordingBrowser::default())).await;

    let response = perform_response(&state, Action::Port(80)).await;
    assert!(!response.success);
    assert_eq!(response.action, "port");
    assert!(response.message.unwrap().contains("80"));

    let response = perform_response(&state, Action::Port(8080)).await;
    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("Port already 8080"));
}

#[tokio::test]
async fn test_start_stop_actions() {
    let fx = Fixture::new(SERVER_XML, true);
    let state = app_state(&fx, Arc::new(RecordingBrowser::default())).await;

    assert_eq!(perform(&state, Action::Start).await.unwrap(), "Server starting");
    assert_eq!(fx.host.spawns(), 1);

    assert_eq!(perform(&state, Action::Stop).await.unwrap(), "Server stopped");
    assert!(!state.tomcat.status().await.is_up());

    state.shutdown(true).await.unwrap();
    assert_eq!(fx.host.stop_commands(), 0);
}

#[tokio::test]
async fn test_one_shot_run_exits_after_action() {
    let fx = Fixture::new(SERVER_XML, true);
    let options = AppOptions {
        project_root: fx.project(),
        overrides: InstallOverrides {
            catalina_home: Some(fx.install.catalina_home.clone()),
            java_home: Some(fx.install.java_home.clone()),
        },
        enable_api: false,
        ..AppOptions::default()
    };
    let collaborators = Collaborators {
        host: fx.host.clone(),
        manager_api: fx.manager_api.clone(),
        workbench: Arc::new(Headless::default()),
        browser: Arc::new(RecordingBrowser::default()),
        runners: RunnerRegistry::empty(),
    };

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        run_with(
            "0.1.0".to_string(),
            options,
            fx.settings.clone(),
            collaborators,
            Some(Action::Port(9090)),
            std::future::pending::<()>(),
        ),
    )
    .await
    .unwrap();

    assert!(result.is_ok());
    assert_eq!(fx.settings.port().await, 9090);
    assert_eq!(fx.host.spawns(), 0);
}
