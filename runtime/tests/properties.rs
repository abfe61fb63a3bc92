//! Property tests for command draining and argument pruning

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use jxn_core::{
    CallTarget, CommandSpec, RequestContext, RequestHandle, RequestMode, ResponsePayload, Value,
    WireResponse, COMPLETE_COMMAND,
};
use jxn_runtime::params::prune;
use jxn_runtime::{CommandHandlerRegistry, CommandProcessor, Resume};
use jxn_testing::properties::{command_list, nested_value};
use jxn_testing::{payload_body, RecordingHost};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn responded(commands: Vec<CommandSpec>) -> RequestHandle {
    let mut ctx = RequestContext::new(
        CallTarget::Func {
            name: "f".to_string(),
        },
        RequestMode::Asynchronous,
        1,
        "/".to_string(),
    );
    ctx.response = Some(WireResponse::ok(payload_body(commands)));
    RequestHandle::new(ctx)
}

fn logging_processor(names: &[String]) -> (Arc<CommandProcessor>, Arc<Mutex<Vec<usize>>>) {
    let handlers = Arc::new(CommandHandlerRegistry::new());
    let log: Arc<Mutex<Vec<usize>>> = Arc::default();
    for name in names.iter().map(String::as_str).chain([COMPLETE_COMMAND]) {
        let log = Arc::clone(&log);
        handlers.register_fn(name, move |_, ctx| {
            log.lock().unwrap().push(ctx.sequence());
            Ok(true)
        });
    }
    let processor = Arc::new(CommandProcessor::new(handlers, Arc::new(RecordingHost::new()), 64));
    (processor, log)
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(entries) => 1 + entries.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn widest(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.iter().map(widest).max().unwrap_or(0).max(items.len()),
        Value::Object(entries) => entries.values().map(widest).max().unwrap_or(0).max(entries.len()),
        _ => 0,
    }
}

proptest! {
    #[test]
    fn test_every_command_runs_once_in_order(commands in command_list(20)) {
        prop_assume!(commands.iter().all(|spec| spec.name != COMPLETE_COMMAND));
        let names: Vec<String> = commands.iter().map(|spec| spec.name.clone()).collect();
        let (processor, log) = logging_processor(&names);
        let count = commands.len();

        let queue = processor.process_commands(&responded(commands)).unwrap();

        prop_assert!(queue.is_empty());
        let expected: Vec<usize> = (0..=count).collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
    }

    #[test]
    fn test_skip_after_pause_keeps_the_terminal(commands in command_list(10), skip in 0usize..16) {
        prop_assume!(commands.iter().all(|spec| spec.name != COMPLETE_COMMAND && spec.name != "test.hold"));
        let names: Vec<String> = commands.iter().map(|spec| spec.name.clone()).collect();
        let (processor, log) = logging_processor(&names);
        let slot: Arc<Mutex<Option<Resume>>> = Arc::default();
        let stash = Arc::clone(&slot);
        processor.handlers().register_fn("test.hold", move |_, ctx| {
            *stash.lock().unwrap() = Some(ctx.pause());
            Ok(true)
        });

        let count = commands.len();
        let mut all = vec![CommandSpec::new("test.hold", Value::Null)];
        all.extend(commands);
        processor.process_commands(&responded(all)).unwrap();
        prop_assert!(log.lock().unwrap().is_empty());

        slot.lock().unwrap().take().unwrap().resume(skip);

        // sequences 1..=count are the commands, count + 1 the terminal
        let first = 1 + skip.min(count);
        let expected: Vec<usize> = (first..=count + 1).collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
    }

    #[test]
    fn test_pruned_arguments_respect_limits(
        value in nested_value(6),
        max_depth in 1usize..5,
        max_size in 1usize..4,
    ) {
        let pruned = prune(&value, 1, max_depth, max_size);
        prop_assert!(depth(&pruned) <= max_depth);
        prop_assert!(widest(&pruned) <= max_size);
    }
}

#[test]
fn test_payload_body_round_trips_through_decode() -> anyhow::Result<()> {
    let commands = vec![CommandSpec::new("node.assign", jxn_core::json!({"id": "out", "value": "1"}))];
    let decoded = ResponsePayload::decode(&payload_body(commands.clone()))?;
    assert_eq!(decoded.into_commands(), commands);
    Ok(())
}
