//! # Jxn Testing
//!
//! Testing utilities for the jxn client runtime.
//!
//! This crate provides:
//! - Deterministic doubles for the clock, the scheduler and the network
//! - A recording page host for dialogs, navigation, conditions and uploads
//! - Builders for responses, environments and clients
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use jxn_testing::{command, response_with, test_config, CommandLog, TestHost};
//! use jxn_core::{json, RequestSpec};
//!
//! #[tokio::test]
//! async fn test_assign() {
//!     let test = TestHost::default();
//!     let (client, _transport, mut controller) = test.mock_client(test_config());
//!     let log = CommandLog::new();
//!     log.record(client.handlers(), &["node.assign"]);
//!
//!     let running = tokio::spawn(async move { client.execute(RequestSpec::function("f")).await });
//!     controller
//!         .next_exchange()
//!         .await
//!         .unwrap()
//!         .respond(response_with(vec![command("node.assign", json!({"value": "42"}))]));
//!     running.await.unwrap().unwrap();
//!
//!     assert_eq!(log.entries(), vec!["node.assign#0:42"]);
//! }
//! ```

/// Doubles for time, timers and the network
pub mod mocks;

/// A recording page host
pub mod host;

/// Test helpers and builders
pub mod helpers;

/// Property-based testing utilities using proptest.
pub mod properties;

// Re-export commonly used items
pub use helpers::{command, payload_body, redirect, response_with, test_config, CommandLog, TestHost};
pub use host::RecordingHost;
pub use mocks::{
    test_clock, FixedClock, ManualScheduler, MockTransport, PendingExchange, ScriptedTransport,
    TransportController,
};

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG` and writes through the test harness so output is only
/// shown for failing tests. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
