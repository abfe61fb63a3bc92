//! Integration tests for synchronous/asynchronous request ordering
//!
//! Responses are handed out by hand through the mock transport so each test
//! controls exactly when every response arrives.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use jxn_core::{json, Hook, RequestSpec, RequestState};
use jxn_runtime::Client;
use jxn_testing::{
    command, init_tracing, response_with, test_config, CommandLog, TestHost, TransportController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// ============================================================================
// Test Fixtures
// ============================================================================

fn setup() -> (TestHost, Client, TransportController, CommandLog) {
    init_tracing();
    let test = TestHost::default();
    let (client, _transport, controller) = test.mock_client(test_config());
    let log = CommandLog::new();
    log.record(client.handlers(), &["log.write"]);
    (test, client, controller, log)
}

fn spawn_execute(
    client: &Client,
    spec: RequestSpec,
) -> JoinHandle<Result<jxn_core::RequestHandle, jxn_runtime::RequestError>> {
    let client = client.clone();
    tokio::spawn(async move { client.execute(spec).await })
}

fn writes(value: &str) -> jxn_core::WireResponse {
    response_with(vec![command("log.write", json!({ "value": value }))])
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_async_response_waits_for_synchronous_request() {
    let (_test, client, mut controller, log) = setup();

    let r0 = spawn_execute(&client, RequestSpec::function("r0"));
    let e0 = controller.next_exchange().await.expect("r0 sent");

    let r1 = spawn_execute(&client, RequestSpec::function("r1").synchronous());
    let e1 = controller.next_exchange().await.expect("r1 sent");

    // r2 is created while r1 is in flight: it waits instead of going out
    let r2 = client
        .execute(RequestSpec::function("r2"))
        .await
        .unwrap();
    assert_eq!(r2.state(), RequestState::Queued);
    assert!(controller.try_next_exchange().is_none());
    assert_eq!(client.pending_requests(), 2);

    // r0 answers first but is held back behind r1
    e0.respond(writes("r0"));
    r0.await.unwrap().unwrap();
    assert!(log.entries().is_empty());
    assert_eq!(client.buffered_responses(), 1);

    // r1 completes, then the buffered r0, then r2 is released
    e1.respond(writes("r1"));
    let r1 = r1.await.unwrap().unwrap();
    assert_eq!(r1.state(), RequestState::Completed);
    assert_eq!(log.entries(), vec!["log.write#0:r1", "log.write#0:r0"]);
    assert_eq!(client.buffered_responses(), 0);

    let e2 = controller.next_exchange().await.expect("r2 released");
    e2.respond(writes("r2"));
    tokio::task::yield_now().await;
    wait_for_state(&r2, RequestState::Completed).await;

    assert_eq!(
        log.entries(),
        vec!["log.write#0:r1", "log.write#0:r0", "log.write#0:r2"]
    );
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_synchronous_requests_run_one_at_a_time() {
    let (_test, client, mut controller, log) = setup();

    let s1 = spawn_execute(&client, RequestSpec::function("s1").synchronous());
    let e1 = controller.next_exchange().await.unwrap();

    let s2 = client
        .execute(RequestSpec::function("s2").synchronous())
        .await
        .unwrap();
    let a3 = client.execute(RequestSpec::function("a3")).await.unwrap();
    assert_eq!(s2.state(), RequestState::Queued);
    assert_eq!(a3.state(), RequestState::Queued);
    assert!(controller.try_next_exchange().is_none());

    e1.respond(writes("s1"));
    s1.await.unwrap().unwrap();

    // s2 is released, a3 still waits behind it
    let e2 = controller.next_exchange().await.unwrap();
    assert!(controller.try_next_exchange().is_none());
    assert_eq!(a3.state(), RequestState::Queued);

    e2.respond(writes("s2"));
    let e3 = controller.next_exchange().await.unwrap();
    e3.respond(writes("a3"));
    wait_for_state(&a3, RequestState::Completed).await;

    assert_eq!(
        log.entries(),
        vec!["log.write#0:s1", "log.write#0:s2", "log.write#0:a3"]
    );
}

#[tokio::test]
async fn test_aborted_queued_request_is_skipped() {
    let (_test, client, mut controller, log) = setup();

    let s1 = spawn_execute(&client, RequestSpec::function("s1").synchronous());
    let e1 = controller.next_exchange().await.unwrap();

    let skipped = client.execute(RequestSpec::function("skipped")).await.unwrap();
    let kept = client.execute(RequestSpec::function("kept")).await.unwrap();
    client.abort(&skipped);
    assert_eq!(skipped.state(), RequestState::Aborted);

    e1.respond(writes("s1"));
    s1.await.unwrap().unwrap();

    let next = controller.next_exchange().await.unwrap();
    let call: serde_json::Value = serde_json::from_str(&next.request.param("jxncall").unwrap()).unwrap();
    assert_eq!(call["name"], json!("kept"));
    next.respond(writes("kept"));
    wait_for_state(&kept, RequestState::Completed).await;

    assert!(controller.try_next_exchange().is_none());
    assert_eq!(log.entries(), vec!["log.write#0:s1", "log.write#0:kept"]);
}

#[tokio::test]
async fn test_asynchronous_requests_complete_in_arrival_order() {
    let (_test, client, mut controller, log) = setup();

    let first = spawn_execute(&client, RequestSpec::function("first"));
    let e_first = controller.next_exchange().await.unwrap();
    let second = spawn_execute(&client, RequestSpec::function("second"));
    let e_second = controller.next_exchange().await.unwrap();

    assert_eq!(client.pending_requests(), 0);

    e_second.respond(writes("second"));
    second.await.unwrap().unwrap();
    e_first.respond(writes("first"));
    first.await.unwrap().unwrap();

    assert_eq!(log.entries(), vec!["log.write#0:second", "log.write#0:first"]);
}

#[tokio::test]
async fn test_buffered_response_cancels_its_timers() {
    let (test, client, mut controller, log) = setup();
    let watcher = {
        let set = client
            .lifecycle()
            .callbacks()
            .create(Some(Duration::from_millis(500)), Some(Duration::from_secs(1)));
        let slow = log.clone();
        let expired = log.clone();
        Arc::new(
            set.on(Hook::OnResponseDelay, move |_| slow.push("slow"))
                .on(Hook::OnExpiration, move |_| expired.push("expired")),
        )
    };

    let r0 = spawn_execute(&client, RequestSpec::function("r0").callbacks(watcher));
    let e0 = controller.next_exchange().await.unwrap();
    let r1 = spawn_execute(&client, RequestSpec::function("r1").synchronous());
    let e1 = controller.next_exchange().await.unwrap();

    e0.respond(writes("r0"));
    r0.await.unwrap().unwrap();
    assert_eq!(client.buffered_responses(), 1);

    // r0 has its answer even though its commands wait behind r1
    test.scheduler.advance(Duration::from_secs(2));
    assert!(log.entries().is_empty());
    assert_eq!(test.scheduler.pending(), 0);

    e1.respond(writes("r1"));
    r1.await.unwrap().unwrap();
    assert_eq!(log.entries(), vec!["log.write#0:r1", "log.write#0:r0"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_response_racing_synchronous_completion_is_processed() {
    for _ in 0..200 {
        let (_test, client, mut controller, log) = setup();

        let a = spawn_execute(&client, RequestSpec::function("a"));
        let ea = controller.next_exchange().await.unwrap();
        let s = spawn_execute(&client, RequestSpec::function("s").synchronous());
        let es = controller.next_exchange().await.unwrap();

        es.respond(writes("s"));
        ea.respond(writes("a"));
        let a = a.await.unwrap().unwrap();
        s.await.unwrap().unwrap();
        wait_for_state(&a, RequestState::Completed).await;

        let mut entries = log.entries();
        entries.sort();
        assert_eq!(entries, vec!["log.write#0:a", "log.write#0:s"]);
        assert_eq!(client.buffered_responses(), 0);
    }
}

async fn wait_for_state(request: &jxn_core::RequestHandle, state: RequestState) {
    for _ in 0..100 {
        if request.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("request never reached {state:?}, still {:?}", request.state());
}
