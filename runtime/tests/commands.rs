//! Integration tests for command draining, pause/resume and the built-in
//! commands
//!
//! Timers run on the manual scheduler, so every wait is driven explicitly
//! with `advance`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use jxn_core::{json, CommandSpec, RequestHandle, RequestSpec, RequestState};
use jxn_runtime::{Client, Resume};
use jxn_testing::{
    command, init_tracing, response_with, test_config, CommandLog, RecordingHost, ScriptedTransport,
    TestHost,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Test Fixtures
// ============================================================================

/// A client answering each request with the next command list.
fn scripted(test: &TestHost, responses: Vec<Vec<CommandSpec>>) -> (Client, CommandLog) {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::new(
        responses.into_iter().map(|commands| Ok(response_with(commands))),
    ));
    let client = test.client(test_config(), transport);
    let log = CommandLog::new();
    log.record(client.handlers(), &["log.write"]);
    (client, log)
}

fn write(value: &str) -> CommandSpec {
    command("log.write", json!({ "value": value }))
}

async fn run(client: &Client) -> RequestHandle {
    assert_ok!(client.execute(RequestSpec::function("f")).await)
}

/// Register `hold`, which pauses and hands its resume token to the test.
fn hold_handler(client: &Client) -> Arc<Mutex<Option<Resume>>> {
    let slot: Arc<Mutex<Option<Resume>>> = Arc::default();
    let stash = Arc::clone(&slot);
    client.register("hold", move |_, ctx| {
        *stash.lock().unwrap() = Some(ctx.pause());
        Ok(true)
    });
    slot
}

// ============================================================================
// Pause and resume
// ============================================================================

#[tokio::test]
async fn test_paused_queue_resumes_where_it_stopped() {
    let test = TestHost::default();
    let (client, log) = scripted(&test, vec![vec![write("a"), command("hold", json!({})), write("b")]]);
    let slot = hold_handler(&client);

    let request = run(&client).await;
    assert_eq!(log.entries(), vec!["log.write#0:a"]);
    assert_eq!(request.state(), RequestState::Processing);

    let resume = slot.lock().unwrap().take().unwrap();
    assert!(resume.queue().is_paused());
    assert_eq!(resume.queue().pending_sequences(), vec![2, 3]);
    resume.resume(0);

    assert_eq!(log.entries(), vec!["log.write#0:a", "log.write#2:b"]);
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_resume_skips_commands() {
    let test = TestHost::default();
    let (client, log) = scripted(
        &test,
        vec![vec![command("hold", json!({})), write("a"), write("b"), write("c")]],
    );
    let slot = hold_handler(&client);

    run(&client).await;
    slot.lock().unwrap().take().unwrap().resume(2);

    assert_eq!(log.entries(), vec!["log.write#3:c"]);
}

#[tokio::test]
async fn test_skip_never_drops_the_terminal_command() {
    let test = TestHost::default();
    let (client, log) = scripted(&test, vec![vec![command("hold", json!({})), write("a")]]);
    let slot = hold_handler(&client);

    let request = run(&client).await;
    slot.lock().unwrap().take().unwrap().resume(99);

    assert!(log.entries().is_empty());
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_failing_command_stops_the_queue() {
    let test = TestHost::default();
    let (client, log) = scripted(&test, vec![vec![write("a"), command("dialog.alert", json!({})), write("b")]]);

    let request = run(&client).await;

    // dialog.alert without a message is rejected
    assert_eq!(log.entries(), vec!["log.write#0:a"]);
    assert!(test.host.alerts().is_empty());
    assert_eq!(request.state(), RequestState::Processing);
}

#[tokio::test]
async fn test_synchronous_request_holds_traffic_until_its_commands_drain() {
    let test = TestHost::default();
    let (client, log) = scripted(
        &test,
        vec![
            vec![command("script.sleep", json!({"duration": 1})), write("sync")],
            vec![write("later")],
        ],
    );

    let sync = client
        .execute(RequestSpec::function("first").synchronous())
        .await
        .unwrap();
    let later = client.execute(RequestSpec::function("second")).await.unwrap();
    assert_eq!(later.state(), RequestState::Queued);

    test.scheduler.advance(POLL);
    assert_eq!(sync.state(), RequestState::Completed);

    for _ in 0..100 {
        if later.state() == RequestState::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(log.entries(), vec!["log.write#1:sync", "log.write#0:later"]);
}

// ============================================================================
// Built-in commands
// ============================================================================

#[tokio::test]
async fn test_sleep_waits_one_poll_interval_per_unit() {
    let test = TestHost::default();
    let (client, log) = scripted(
        &test,
        vec![vec![command("script.sleep", json!({"duration": 2})), write("awake")]],
    );

    let request = run(&client).await;
    assert!(log.entries().is_empty());

    test.scheduler.advance(POLL);
    assert!(log.entries().is_empty());
    test.scheduler.advance(POLL);
    assert_eq!(log.entries(), vec!["log.write#1:awake"]);
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_sleep_of_zero_does_not_pause() {
    let test = TestHost::default();
    let (client, log) = scripted(
        &test,
        vec![vec![command("script.sleep", json!({"duration": 0})), write("now")]],
    );

    run(&client).await;

    assert_eq!(log.entries(), vec!["log.write#1:now"]);
    assert_eq!(test.scheduler.pending(), 0);
}

#[tokio::test]
async fn test_confirm_no_skips_commands() {
    let test = TestHost::default();
    test.host.answer_confirms([false, true]);
    let (client, log) = scripted(
        &test,
        vec![
            vec![
                command("script.confirm", json!({"question": "Delete?", "count": 1})),
                write("deleted"),
                write("after"),
            ],
            vec![
                command("script.confirm", json!({"question": "Again?", "count": 1})),
                write("deleted"),
            ],
        ],
    );

    run(&client).await;
    assert_eq!(log.entries(), vec!["log.write#2:after"]);

    log.clear();
    run(&client).await;
    assert_eq!(log.entries(), vec!["log.write#1:deleted"]);
    assert_eq!(test.host.questions(), vec!["Delete?", "Again?"]);
}

#[tokio::test]
async fn test_confirm_waits_for_the_answer() {
    let test = TestHost::default();
    let (client, log) = scripted(
        &test,
        vec![vec![
            command("script.confirm", json!({"question": "Sure?", "count": 1})),
            write("yes"),
        ]],
    );

    let request = run(&client).await;
    assert_eq!(test.host.pending_confirms(), 1);
    assert!(log.entries().is_empty());

    assert!(test.host.answer_pending(true));
    assert_eq!(log.entries(), vec!["log.write#1:yes"]);
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_wait_for_polls_until_condition_holds() {
    let test = TestHost::default();
    test.host.script_condition("window.ready", [false, false, true]);
    let (client, log) = scripted(
        &test,
        vec![vec![
            command("script.wait_for", json!({"condition": "window.ready", "tries": 5})),
            write("ready"),
        ]],
    );

    run(&client).await;
    test.scheduler.advance(POLL);
    assert!(log.entries().is_empty());
    test.scheduler.advance(POLL);

    assert_eq!(log.entries(), vec!["log.write#1:ready"]);
    assert_eq!(test.host.evaluations(), 3);
}

#[tokio::test]
async fn test_wait_for_gives_up_after_its_tries() {
    let test = TestHost::default();
    test.host.script_condition("never", [false]);
    let (client, log) = scripted(
        &test,
        vec![vec![
            command("script.wait_for", json!({"condition": "never", "tries": 1})),
            write("anyway"),
        ]],
    );

    run(&client).await;
    test.scheduler.advance(POLL);

    assert_eq!(log.entries(), vec!["log.write#1:anyway"]);
    assert_eq!(test.host.evaluations(), 2);
}

#[tokio::test]
async fn test_wait_for_budget_grants_that_many_retries() {
    let test = TestHost::default();
    test.host.script_condition("never", [false]);
    let (client, log) = scripted(
        &test,
        vec![vec![
            command("script.wait_for", json!({"condition": "never", "tries": 3})),
            write("anyway"),
        ]],
    );

    run(&client).await;
    assert_eq!(test.host.evaluations(), 1);
    test.scheduler.advance(POLL);
    test.scheduler.advance(POLL);
    assert!(log.entries().is_empty());
    assert_eq!(test.host.evaluations(), 3);

    // the third retry is the last one granted
    test.scheduler.advance(POLL);
    assert_eq!(test.host.evaluations(), 4);
    assert_eq!(log.entries(), vec!["log.write#1:anyway"]);
    assert_eq!(test.scheduler.pending(), 0);
}

#[tokio::test]
async fn test_css_wait_polls_until_stylesheets_have_rules() {
    let test = TestHost::new(RecordingHost::new());
    test.host.set_rule_counts(vec![12, 0]);
    let (client, log) = scripted(
        &test,
        vec![vec![command("css.wait", json!({"tries": 3})), write("styled")]],
    );

    run(&client).await;
    test.scheduler.advance(POLL);
    assert!(log.entries().is_empty());

    test.host.set_rule_counts(vec![12, 4]);
    test.scheduler.advance(POLL);
    assert_eq!(log.entries(), vec!["log.write#1:styled"]);
}

#[tokio::test]
async fn test_databag_commands_update_the_store() {
    let test = TestHost::default();
    let (client, _log) = scripted(
        &test,
        vec![
            vec![command(
                "databag.set",
                json!({"values": {"user": {"name": "ada", "id": 7}, "cart": {"items": 2}}}),
            )],
            vec![command("databag.clear", json!({"bag": "cart"}))],
        ],
    );

    run(&client).await;
    let user = client.databags().get("user").unwrap();
    assert_eq!(user.get("name"), Some(&json!("ada")));
    assert_eq!(user.get("id"), Some(&json!(7)));
    assert!(client.databags().get("cart").is_some());

    run(&client).await;
    assert!(client.databags().get("cart").is_none_or(|bag| bag.is_empty()));
    assert!(client.databags().get("user").is_some());
}

#[tokio::test]
async fn test_alert_reaches_the_host() {
    let test = TestHost::default();
    let (client, _log) = scripted(
        &test,
        vec![vec![command("dialog.alert", json!({"message": "Saved"}))]],
    );

    run(&client).await;

    assert_eq!(test.host.alerts(), vec!["Saved"]);
}

#[tokio::test]
async fn test_handlers_can_be_replaced_and_removed() {
    let test = TestHost::default();
    let (client, log) = scripted(&test, vec![vec![write("x")], vec![write("y")]]);

    let previous = client.register("log.write", |_, _| Ok(true));
    assert!(previous.is_some());
    run(&client).await;
    assert!(log.entries().is_empty());

    client.unregister("log.write");
    assert!(!client.handlers().contains("log.write"));
    let request = run(&client).await;
    // unknown commands are skipped
    assert_eq!(request.state(), RequestState::Completed);
}
