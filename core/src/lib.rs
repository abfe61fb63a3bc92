//! # Jxn Core
//!
//! Core types for the jxn client runtime.
//!
//! The runtime sends a call to the server, receives an ordered list of
//! commands, and applies them to the page in order, pausing and resuming when
//! a command has to wait. This crate holds the pieces that do not need an
//! executor:
//!
//! - **[`queue::BoundedQueue`]**: fixed-capacity circular FIFO with push-front
//! - **[`retry::RetryCounter`]**: attempt counter for self-rescheduling commands
//! - **[`command::CommandRecord`]**: one server-authored command in a queue
//! - **[`request::RequestContext`]**: one logical call and its lifecycle state
//! - **[`callback::CallbackSet`]**: lifecycle observers with delayed hooks
//! - **[`payload::ResponsePayload`]** and **[`wire`]**: what goes over the network
//! - **[`environment`]**: capability traits the host implements
//!
//! The request lifecycle and the command processor live in `jxn-runtime`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value};
pub use smallvec::{smallvec, SmallVec};

pub mod callback;
pub mod command;
pub mod databag;
pub mod environment;
pub mod payload;
pub mod queue;
pub mod request;
pub mod retry;
pub mod wire;

pub use callback::{CallbackSet, Hook, HookFn};
pub use command::{ArgsExt, CommandError, CommandRecord, HandlerError, COMPLETE_COMMAND};
pub use databag::DataBags;
pub use payload::{CommandArgs, CommandSpec, ResponsePayload};
pub use queue::{BoundedQueue, QueueError};
pub use request::{
    CallTarget, RequestContext, RequestHandle, RequestId, RequestMode, RequestSpec, RequestState,
    UploadDescriptor, UploadError,
};
pub use retry::RetryCounter;
pub use wire::{HttpMethod, StatusClass, TransportError, WireBody, WireRequest, WireResponse};
