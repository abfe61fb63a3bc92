//! Command records: one per unit of work a response applies to the page.

use serde_json::Value;
use thiserror::Error;

use crate::payload::{CommandArgs, CommandSpec};
use crate::request::RequestHandle;
use crate::retry::RetryCounter;

/// Name of the synthetic record appended after every response's commands.
pub const COMPLETE_COMMAND: &str = "response.complete";

/// A command waiting in, or popped from, a command queue.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// Handler name
    pub name: String,
    /// Command arguments
    pub args: CommandArgs,
    /// Position within the response, assigned at enqueue time
    pub sequence: usize,
    /// Request whose response produced this command
    pub request: RequestHandle,
    /// Attempt counter for commands that reschedule themselves
    pub retry: RetryCounter,
}

impl CommandRecord {
    /// Build a record from a decoded command.
    #[must_use]
    pub fn from_spec(spec: CommandSpec, sequence: usize, request: RequestHandle) -> Self {
        Self {
            name: spec.name,
            args: spec.args,
            sequence,
            request,
            retry: RetryCounter::new(),
        }
    }

    /// The terminal `response.complete` record.
    #[must_use]
    pub fn complete(sequence: usize, request: RequestHandle) -> Self {
        Self {
            name: COMPLETE_COMMAND.to_string(),
            args: CommandArgs::new(),
            sequence,
            request,
            retry: RetryCounter::new(),
        }
    }

    /// Whether this is the terminal record.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.name == COMPLETE_COMMAND
    }
}

/// Errors a command handler can return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A required argument is missing or has the wrong type
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArguments {
        /// Argument name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The handler failed
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The handler panicked
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// The script sandbox rejected an expression
    #[error("Sandbox error: {0}")]
    Sandbox(String),
}

impl HandlerError {
    /// Shorthand for a missing argument.
    #[must_use]
    pub fn missing(name: &str) -> Self {
        Self::InvalidArguments {
            name: name.to_string(),
            reason: "missing".to_string(),
        }
    }
}

/// A handler error tagged with the command that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command '{command}' (#{sequence}) failed: {source}")]
pub struct CommandError {
    /// Command name
    pub command: String,
    /// Command sequence number
    pub sequence: usize,
    /// Underlying handler error
    #[source]
    pub source: HandlerError,
}

/// Typed argument access for handlers.
pub trait ArgsExt {
    /// A string argument.
    ///
    /// # Errors
    ///
    /// [`HandlerError::InvalidArguments`] when missing or not a string.
    fn str_arg(&self, name: &str) -> Result<&str, HandlerError>;

    /// An optional string argument.
    fn opt_str(&self, name: &str) -> Option<&str>;

    /// An unsigned integer argument, with a default when absent.
    ///
    /// # Errors
    ///
    /// [`HandlerError::InvalidArguments`] when present but not an unsigned integer.
    fn u32_or(&self, name: &str, default: u32) -> Result<u32, HandlerError>;
}

impl ArgsExt for CommandArgs {
    fn str_arg(&self, name: &str) -> Result<&str, HandlerError> {
        match self.get(name) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(HandlerError::InvalidArguments {
                name: name.to_string(),
                reason: "expected a string".to_string(),
            }),
            None => Err(HandlerError::missing(name)),
        }
    }

    fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn u32_or(&self, name: &str, default: u32) -> Result<u32, HandlerError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| HandlerError::InvalidArguments {
                    name: name.to_string(),
                    reason: "expected an unsigned integer".to_string(),
                }),
        }
    }
}
