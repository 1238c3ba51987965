//! Deploy orchestration tests

use std::sync::Arc;
use std::time::Duration;

use catpilot::deploy::orchestrator::{DeployOutcome, Deployer, DeployerOptions};
use catpilot::deploy::project::Project;
use catpilot::deploy::runner::RunnerRegistry;
use catpilot::deploy::strategy::{BuildStrategy, StrategyChoice};
use catpilot::tomcat::lifecycle::ReloadOutcome;
use catpilot::workbench::Headless;
use tokio::sync::Notify;
use tokio_test::assert_err;

use crate::support::{Fixture, RecordingBrowser, ScriptedRunner, SERVER_XML};

fn deployer(
    fx: &Fixture,
    root: std::path::PathBuf,
    runner: Arc<ScriptedRunner>,
    workbench: Headless,
    browser: Arc<RecordingBrowser>,
) -> Arc<Deployer> {
    Arc::new(Deployer::new(
        Project::new(root).unwrap(),
        fx.tomcat.clone(),
        RunnerRegistry::empty().with(runner),
        Arc::new(workbench),
        browser,
        fx.sink.clone(),
        DeployerOptions::default(),
    ))
}

const DIRECT: StrategyChoice = StrategyChoice::Strategy(BuildStrategy::DirectCopy);

#[tokio::test]
async fn test_deploy_reloads_and_refreshes() {
    let fx = Fixture::new(SERVER_XML, true);
    let runner = Arc::new(ScriptedRunner::busy(0));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner.clone(), Headless::default(), browser.clone());

    let outcome = deployer.deploy(DIRECT).await.unwrap();

    let DeployOutcome::Deployed { strategy, attempts, reload, .. } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    assert_eq!(strategy, BuildStrategy::DirectCopy);
    assert_eq!(attempts, 1);
    assert_eq!(reload, ReloadOutcome::Reloaded);
    assert_eq!(runner.calls(), 1);
    assert_eq!(browser.refreshed(), vec!["shop"]);
    assert!(!deployer.in_flight());
}

#[tokio::test]
async fn test_busy_target_is_retried() {
    let fx = Fixture::new(SERVER_XML, true);
    let runner = Arc::new(ScriptedRunner::busy(2));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner.clone(), Headless::default(), browser);

    let outcome = deployer.deploy(DIRECT).await.unwrap();

    assert!(matches!(outcome, DeployOutcome::Deployed { attempts: 3, .. }));
    assert_eq!(runner.calls(), 3);
    assert_eq!(fx.host.kills(), 2);
}

#[tokio::test]
async fn test_busy_retries_are_bounded() {
    let fx = Fixture::new(SERVER_XML, true);
    let runner = Arc::new(ScriptedRunner::busy(u32::MAX));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner.clone(), Headless::default(), browser.clone());

    let err = assert_err!(deployer.deploy(DIRECT).await);

    assert!(err.is_resource_busy());
    assert_eq!(runner.calls(), 4);
    assert_eq!(fx.host.kills(), 3);
    assert_eq!(fx.manager_api.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(browser.refreshed().is_empty());
    assert!(!deployer.in_flight());
}

#[tokio::test]
async fn test_build_failure_is_not_retried() {
    let fx = Fixture::new(SERVER_XML, true);
    let runner = Arc::new(ScriptedRunner::failing("Shop.java:3: error: ';' expected"));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner.clone(), Headless::default(), browser);

    let err = assert_err!(deployer.deploy(DIRECT).await);

    assert!(err.to_string().contains("';' expected"));
    assert_eq!(runner.calls(), 1);
    assert_eq!(fx.host.kills(), 0);
}

#[tokio::test]
async fn test_concurrent_deploy_is_rejected() {
    let fx = Fixture::new(SERVER_XML, true);
    let gate = Arc::new(Notify::new());
    let runner = Arc::new(ScriptedRunner::gated(gate.clone()));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner.clone(), Headless::default(), browser);

    let first = {
        let deployer = deployer.clone();
        tokio::spawn(async move { deployer.deploy(DIRECT).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while runner.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(deployer.in_flight());
    assert_eq!(deployer.deploy(DIRECT).await.unwrap(), DeployOutcome::AlreadyRunning);
    assert_eq!(runner.calls(), 1);

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, DeployOutcome::Deployed { .. }));
    assert!(!deployer.in_flight());
}

#[tokio::test]
async fn test_refused_reload_skips_refresh() {
    let fx = Fixture::new(SERVER_XML, false);
    let runner = Arc::new(ScriptedRunner::busy(0));
    let browser = Arc::new(RecordingBrowser::default());
    let deployer = deployer(&fx, fx.project(), runner, Headless::default(), browser.clone());

    let outcome = deployer.deploy(DIRECT).await.unwrap();
    fx.tomcat.wait_recovery().await;

    assert!(matches!(
        outcome,
        DeployOutcome::Deployed { reload: ReloadOutcome::Recovering, .. }
    ));
    assert!(browser.refreshed().is_empty());
    assert_eq!(fx.host.spawns(), 1);
}

#[tokio::test]
async fn test_unrecognized_project_offers_scaffolding() {
    let fx = Fixture::new(SERVER_XML, true);
    let empty = fx.tmp.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let runner = Arc::new(ScriptedRunner::busy(0));
    let deployer = deployer(
        &fx,
        empty,
        runner.clone(),
        Headless::default(),
        Arc::new(RecordingBrowser::default()),
    );

    assert_eq!(deployer.deploy(DIRECT).await.unwrap(), DeployOutcome::NoProject);
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_prompt_uses_workbench_answer() {
    let fx = Fixture::new(SERVER_XML, true);

    let runner = Arc::new(ScriptedRunner::busy(0));
    let declined = deployer(
        &fx,
        fx.project(),
        runner.clone(),
        Headless::default(),
        Arc::new(RecordingBrowser::default()),
    );
    assert_eq!(
        declined.deploy(StrategyChoice::Prompt).await.unwrap(),
        DeployOutcome::Cancelled
    );
    assert_eq!(runner.calls(), 0);

    let answered = deployer(
        &fx,
        fx.project(),
        runner.clone(),
        Headless {
            default_strategy: Some(BuildStrategy::DirectCopy),
        },
        Arc::new(RecordingBrowser::default()),
    );
    let outcome = answered.deploy(StrategyChoice::Prompt).await.unwrap();
    assert!(matches!(
        outcome,
        DeployOutcome::Deployed { strategy: BuildStrategy::DirectCopy, .. }
    ));
}

#[tokio::test]
async fn test_missing_runner_is_an_error() {
    let fx = Fixture::new(SERVER_XML, true);
    let root = fx.project();
    std::fs::write(root.join("pom.xml"), "<project/>").unwrap();
    let deployer = deployer(
        &fx,
        root,
        Arc::new(ScriptedRunner::busy(0)),
        Headless::default(),
        Arc::new(RecordingBrowser::default()),
    );

    assert_err!(deployer.deploy(StrategyChoice::Strategy(BuildStrategy::Maven)).await);
    assert!(!deployer.in_flight());
}
