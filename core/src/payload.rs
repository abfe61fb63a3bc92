//! Decoded response payloads.
//!
//! The server answers with a JSON object:
//!
//! ```json
//! {
//!   "debug": { "message": "optional text, logged only" },
//!   "jxn": { "commands": [ { "name": "node.assign", "id": "out", "value": "42" } ] }
//! }
//! ```
//!
//! A payload without `jxn` carries zero commands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form command arguments.
pub type CommandArgs = Map<String, Value>;

/// A command as authored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Handler name
    pub name: String,

    /// Every other field of the command object
    #[serde(flatten)]
    pub args: CommandArgs,
}

impl CommandSpec {
    /// Build a command from a name and an argument object.
    ///
    /// Non-object `args` values are ignored.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Server-side debug section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSection {
    /// Text to log on the client
    #[serde(default)]
    pub message: Option<String>,
}

/// The command section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSection {
    /// Commands in server order
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

/// A decoded response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Optional debug section
    #[serde(default)]
    pub debug: Option<DebugSection>,

    /// Optional command section
    #[serde(default)]
    pub jxn: Option<CommandSection>,
}

impl ResponsePayload {
    /// Decode a response body.
    ///
    /// An empty (or whitespace-only) body decodes to an empty payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not a valid payload.
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }

    /// Build a payload from commands.
    #[must_use]
    pub fn with_commands(commands: Vec<CommandSpec>) -> Self {
        Self {
            debug: None,
            jxn: Some(CommandSection { commands }),
        }
    }

    /// The server debug message, if any.
    #[must_use]
    pub fn debug_message(&self) -> Option<&str> {
        self.debug.as_ref().and_then(|debug| debug.message.as_deref())
    }

    /// Take the commands out of the payload.
    #[must_use]
    pub fn into_commands(self) -> Vec<CommandSpec> {
        self.jxn.map(|section| section.commands).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_commands_with_flattened_args() {
        let body = json!({
            "debug": { "message": "hello" },
            "jxn": { "commands": [
                { "name": "node.assign", "id": "out", "value": 42 },
                { "name": "script.sleep", "duration": 3 }
            ]}
        })
        .to_string();

        let payload = ResponsePayload::decode(&body).unwrap();
        assert_eq!(payload.debug_message(), Some("hello"));

        let commands = payload.into_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].name, "node.assign");
        assert_eq!(commands[0].args.get("id"), Some(&json!("out")));
        assert_eq!(commands[0].args.get("value"), Some(&json!(42)));
        assert!(!commands[0].args.contains_key("name"));
        assert_eq!(commands[1].args.get("duration"), Some(&json!(3)));
    }

    #[test]
    fn test_missing_jxn_means_no_commands() {
        let payload = ResponsePayload::decode(r#"{"debug":{"message":"only debug"}}"#).unwrap();
        assert!(payload.into_commands().is_empty());
    }

    #[test]
    fn test_empty_body_is_empty_payload() {
        let payload = ResponsePayload::decode("  ").unwrap();
        assert_eq!(payload, ResponsePayload::default());
    }

    #[test]
    fn test_invalid_body_is_an_error() {
        assert!(ResponsePayload::decode("<html>").is_err());
    }
}
