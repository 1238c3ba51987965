//! Refresh worker tests

use std::sync::Arc;
use std::time::Duration;

use catpilot::monitor::classify::Trigger;
use catpilot::tomcat::fsm::ServerState;
use catpilot::workers::refresh;
use tokio::sync::oneshot;

use crate::support::{Fixture, RecordingBrowser, SERVER_XML};

async fn wait_for_refreshes(browser: &RecordingBrowser, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while browser.refreshed().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_triggers_refresh_matching_app() {
    let fx = Fixture::new(SERVER_XML, true);
    let browser = Arc::new(RecordingBrowser::default());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    fx.tomcat.start().await.unwrap();
    let worker = tokio::spawn(refresh::run(
        "shop".to_string(),
        fx.sink.subscribe_triggers(),
        fx.tomcat.clone(),
        browser.clone(),
        Box::pin(async move {
            let _ = stop_rx.await;
        }),
    ));

    fx.sink.fire(Trigger::ServerStarted { millis: 900 });
    fx.sink.fire(Trigger::ContextReloaded { path: "/blog".to_string() });
    fx.sink.fire(Trigger::ContextReloaded { path: "/shop".to_string() });
    wait_for_refreshes(&browser, 2).await;

    assert_eq!(browser.refreshed(), vec!["shop", "shop"]);

    // Startup marked the server ready
    fx.host.bind(8080);
    assert_eq!(fx.tomcat.status().await, ServerState::Running);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
}
