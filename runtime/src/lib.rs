//! # Jxn Runtime
//!
//! The request pipeline of the jxn client runtime.
//!
//! A call goes out as one request; the server answers with an ordered list of
//! commands; the runtime applies them in order, pausing whenever a command
//! has to wait (a timer, a confirmation dialog, a stylesheet still loading).
//!
//! ## Core Components
//!
//! - **[`Client`]**: facade tying everything together
//! - **[`lifecycle::RequestLifecycle`]**: initialize, prepare, submit, receive,
//!   complete; orders synchronous and asynchronous traffic
//! - **[`processor::CommandProcessor`]**: builds a command queue per response
//!   and drains it, with pause/resume and skip
//! - **[`handlers::CommandHandlerRegistry`]**: name-to-handler map
//! - **[`callbacks::CallbackRegistry`]**: fires lifecycle hooks, arms their timers
//!
//! ## Example
//!
//! ```ignore
//! use jxn_runtime::{Client, ClientConfig, Environment};
//! use jxn_core::RequestSpec;
//!
//! let client = Client::new(ClientConfig::default().with_request_uri("/ajax"), Environment::new(transport));
//! client.register("dom.assign", |args, ctx| { /* apply */ Ok(true) });
//!
//! let request = client.execute(RequestSpec::function("refresh").synchronous()).await?;
//! ```

/// Exponential backoff between network attempts
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub mod builtins;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod params;
pub mod processor;

pub use callbacks::CallbackRegistry;
pub use client::Client;
pub use config::{ClientConfig, ConfigError};
pub use environment::{Environment, Headless, SystemClock, TokioScheduler};
pub use error::RequestError;
pub use handlers::{CommandHandler, CommandHandlerRegistry};
pub use lifecycle::RequestLifecycle;
pub use processor::{CommandContext, CommandProcessor, CommandQueue, Resume};
pub use retry::RetryPolicy;
