//! Notification clicks routed back into call control

mod common;

use common::{call_event, eventually, next_event, rule, Harness};
use serial_test::serial;
use webvoice_bridge::activation;
use webvoice_bridge::{ActivationError, NotificationState};

#[test]
#[serial]
fn activation_without_a_session_is_a_noop() {
    activation::unregister();
    assert_eq!(activation::activate("accept:CA123"), Ok(()));
    assert!(matches!(
        activation::activate("bogus"),
        Err(ActivationError::InvalidArgument(_))
    ));
}

#[tokio::test]
#[serial]
async fn accept_click_answers_and_clears_notification() {
    let h = Harness::start(vec![
        rule("parameters.CallSid : ''", "\"CA123\""),
        rule("window.connection.accept()", "true"),
    ])
    .await;
    let mut events = h.bridge.listen();

    h.bridge
        .post_message(call_event("incoming", "+1555", "+1666", "CA123", ""));
    next_event(&mut events).await;

    activation::activate("accept:CA123").expect("valid activation");
    eventually(|| h.page.ran("window.connection.accept()") == 1).await;
    eventually(|| h.bridge.coordinator().state_of("CA123") == NotificationState::Cleared).await;

    h.bridge.shutdown().await;
}

#[tokio::test]
#[serial]
async fn reject_click_hangs_up_and_tears_down_listeners() {
    let h = Harness::start(vec![rule("window.connection.status()", "true")]).await;

    activation::activate("reject:CA1").expect("valid activation");
    eventually(|| h.page.ran("window.connection.status()") == 1).await;

    let scripts = h.page.scripts();
    let hang_up = scripts
        .iter()
        .find(|s| s.contains("window.connection.status()"))
        .expect("hang-up script ran");
    let forget = hang_up
        .find("window.connection = null")
        .expect("hang-up drops the connection");
    for event in ["accept", "disconnect", "error", "reject", "cancel"] {
        let removal = hang_up
            .find(&format!("window.connection.removeAllListeners('{}')", event))
            .expect("listener removed");
        assert!(removal < forget);
    }

    h.bridge.shutdown().await;
}

#[tokio::test]
#[serial]
async fn call_back_click_dials_from_activation_context() {
    let h = Harness::start(vec![rule("window.device.connect", "{}")]).await;
    let mut events = h.bridge.listen();

    h.bridge
        .post_message(call_event("cancel", "+1555", "+1666", "CA42", ""));
    next_event(&mut events).await;

    activation::activate("call:CA42").expect("valid activation");
    eventually(|| h.page.ran("window.device.connect") == 1).await;
    assert_eq!(h.page.ran("To: 'CA42', From: 'Unknown Caller'"), 1);

    h.bridge.shutdown().await;
}

#[tokio::test]
#[serial]
async fn malformed_activation_runs_nothing() {
    let h = Harness::start(vec![]).await;
    let before = h.page.scripts().len();

    assert!(matches!(
        activation::activate("bogus"),
        Err(ActivationError::InvalidArgument(_))
    ));
    assert!(matches!(
        activation::activate("dial:CA1"),
        Err(ActivationError::InvalidArgument(_))
    ));
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.page.scripts().len(), before);

    h.bridge.shutdown().await;
}

#[tokio::test]
#[serial]
async fn shutdown_unregisters_the_router() {
    let h = Harness::start(vec![]).await;
    assert!(activation::registered().is_ok());

    h.bridge.shutdown().await;
    assert_eq!(activation::registered().err(), Some(ActivationError::NotRegistered));
    assert_eq!(activation::activate("accept:CA1"), Ok(()));
}
