//! proptest strategies for pipeline values.

use jxn_core::{json, CommandSpec, HttpMethod, RequestMode, Value};
use proptest::prelude::*;

/// A command name such as `node.assign`.
pub fn command_name() -> impl Strategy<Value = String> {
    "[a-z]{1,8}\\.[a-z_]{1,10}"
}

/// A scalar or shallow argument value.
pub fn arg_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[ -~]{0,16}".prop_map(Value::String),
        prop::collection::vec(any::<u8>().prop_map(|n| json!(n)), 0..4).prop_map(Value::Array),
    ]
}

/// A command with up to four arguments.
pub fn command_spec() -> impl Strategy<Value = CommandSpec> {
    (
        command_name(),
        prop::collection::btree_map("[a-z]{1,6}", arg_value(), 0..4),
    )
        .prop_map(|(name, args)| {
            // `name` is taken by the command itself
            let args: serde_json::Map<String, Value> =
                args.into_iter().filter(|(key, _)| key != "name").collect();
            CommandSpec { name, args }
        })
}

/// An ordered list of commands.
pub fn command_list(max: usize) -> impl Strategy<Value = Vec<CommandSpec>> {
    prop::collection::vec(command_spec(), 0..=max)
}

/// Either execution mode.
pub fn request_mode() -> impl Strategy<Value = RequestMode> {
    prop_oneof![Just(RequestMode::Synchronous), Just(RequestMode::Asynchronous)]
}

/// Either HTTP method.
pub fn http_method() -> impl Strategy<Value = HttpMethod> {
    prop_oneof![Just(HttpMethod::Get), Just(HttpMethod::Post)]
}

/// Arbitrary nested call arguments, up to `depth` levels deep.
pub fn nested_value(depth: u32) -> impl Strategy<Value = Value> {
    arg_value().prop_recursive(depth, 64, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}
