//! Integration tests for the host doubles
//!
//! Checks that the environment built by `TestHost` routes every capability to
//! the recording page and the virtual-time scheduler.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use jxn_core::environment::{
    Clock, Dialogs, FileInput, FormHost, Navigator, Scheduler, SelectedFile, TargetResolver,
};
use jxn_core::{json, RequestSpec, WireResponse};
use jxn_testing::{
    command, init_tracing, response_with, test_clock, test_config, RecordingHost, ScriptedTransport,
    TestHost,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_environment_routes_to_the_recording_host() {
    let test = TestHost::new(RecordingHost::new().with_node("out").with_file_input(
        "avatar",
        "avatar",
        vec![SelectedFile {
            name: "me.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        }],
    ));
    let env = test.environment(Arc::new(ScriptedTransport::failing()));

    assert!(env.targets.by_id("out").is_some());
    assert_eq!(env.clock.now(), test_clock().now());

    let input: FileInput = env.forms.file_input("avatar").unwrap();
    assert!(input.is_file_input);
    assert_eq!(input.files.len(), 1);

    env.dialogs.alert("hello");
    env.navigator.navigate("/next");
    assert_eq!(test.host.alerts(), vec!["hello"]);
    assert_eq!(test.host.navigations(), vec!["/next"]);
}

#[test]
fn test_scheduler_in_environment_is_virtual() {
    let test = TestHost::default();
    let env = test.environment(Arc::new(ScriptedTransport::failing()));
    let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let flag = Arc::clone(&fired);
    env.scheduler.schedule(
        Duration::from_secs(1),
        Box::new(move || flag.store(true, std::sync::atomic::Ordering::SeqCst)),
    );
    assert_eq!(test.scheduler.pending(), 1);

    test.scheduler.advance(Duration::from_millis(999));
    assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));
    test.scheduler.advance(Duration::from_millis(1));
    assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn test_scripted_client_runs_alert() {
    init_tracing();
    let test = TestHost::default();
    let transport = Arc::new(ScriptedTransport::new([Ok(response_with(vec![command(
        "dialog.alert",
        json!({"message": "saved"}),
    )]))]));
    let client = test.client(test_config(), transport.clone());

    assert_ok!(client.execute(RequestSpec::function("save")).await);
    assert_eq!(test.host.alerts(), vec!["saved"]);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let call: serde_json::Value = serde_json::from_str(&sent[0].param("jxncall").unwrap()).unwrap();
    assert_eq!(call["name"], json!("save"));
}

#[tokio::test]
async fn test_scripted_client_reports_exhausted_script() {
    let test = TestHost::default();
    let transport = Arc::new(ScriptedTransport::new(Vec::<Result<WireResponse, _>>::new()));
    let client = test.client(test_config(), transport.clone());

    assert_err!(client.execute(RequestSpec::function("save")).await);
    assert_eq!(transport.sent_count(), 1);
}
