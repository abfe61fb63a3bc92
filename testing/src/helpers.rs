//! Builders for responses, environments and command logs.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned test locks

use jxn_core::environment::Transport;
use jxn_core::{CommandSpec, ResponsePayload, Value, WireResponse};
use jxn_runtime::{Client, ClientConfig, CommandHandlerRegistry, Environment};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::host::RecordingHost;
use crate::mocks::{test_clock, ManualScheduler, MockTransport, TransportController};

/// A command with the given arguments object.
#[must_use]
pub fn command(name: &str, args: Value) -> CommandSpec {
    CommandSpec::new(name, args)
}

/// Encode commands as a response body.
#[must_use]
pub fn payload_body(commands: Vec<CommandSpec>) -> String {
    serde_json::to_string(&ResponsePayload::with_commands(commands)).unwrap()
}

/// A `200 OK` response carrying the given commands.
#[must_use]
pub fn response_with(commands: Vec<CommandSpec>) -> WireResponse {
    WireResponse::ok(payload_body(commands))
}

/// A `302 Found` pointing at `location`.
#[must_use]
pub fn redirect(location: &str) -> WireResponse {
    WireResponse::empty(302).with_header("location", location)
}

/// Records which commands ran, in order.
///
/// Entries look like `name#sequence`, or `name#sequence:value` when the
/// command carries a string `value` argument.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CommandLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logging handler under each name.
    pub fn record(&self, registry: &CommandHandlerRegistry, names: &[&str]) {
        for name in names {
            let entries = Arc::clone(&self.entries);
            let label = (*name).to_string();
            registry.register_fn(*name, move |args, ctx| {
                let entry = match args.get("value").and_then(Value::as_str) {
                    Some(value) => format!("{label}#{}:{value}", ctx.sequence()),
                    None => format!("{label}#{}", ctx.sequence()),
                };
                entries.lock().unwrap().push(entry);
                Ok(true)
            });
        }
    }

    /// Append an entry by hand (from hooks, for instance).
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Everything a pipeline test needs, wired together.
///
/// The page is a [`RecordingHost`], timers run on a [`ManualScheduler`] and
/// the clock is fixed.
#[derive(Debug, Clone)]
pub struct TestHost {
    /// Page double
    pub host: Arc<RecordingHost>,
    /// Virtual-time scheduler
    pub scheduler: Arc<ManualScheduler>,
}

impl TestHost {
    /// Wrap a prepared page.
    #[must_use]
    pub fn new(host: RecordingHost) -> Self {
        Self {
            host: Arc::new(host),
            scheduler: Arc::new(ManualScheduler::new()),
        }
    }

    /// An environment sending through `transport`.
    #[must_use]
    pub fn environment(&self, transport: Arc<dyn Transport>) -> Environment {
        Environment::new(transport)
            .with_scheduler(self.scheduler.clone())
            .with_clock(Arc::new(test_clock()))
            .with_targets(self.host.clone())
            .with_forms(self.host.clone())
            .with_dialogs(self.host.clone())
            .with_navigator(self.host.clone())
            .with_sandbox(self.host.clone())
            .with_stylesheets(self.host.clone())
    }

    /// A client over `transport`.
    #[must_use]
    pub fn client(&self, config: ClientConfig, transport: Arc<dyn Transport>) -> Client {
        Client::new(config, self.environment(transport))
    }

    /// A client whose responses the test hands out through the controller.
    #[must_use]
    pub fn mock_client(&self, config: ClientConfig) -> (Client, Arc<MockTransport>, TransportController) {
        let (transport, controller) = MockTransport::new();
        let client = self.client(config, transport.clone());
        (client, transport, controller)
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new(RecordingHost::new())
    }
}

/// Configuration used by most pipeline tests.
///
/// Requests go to `/ajax`, run asynchronously and are not retried. Hook
/// timers are long enough that they never fire unless a test advances time.
#[must_use]
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_request_uri("/ajax")
        .with_default_retry(1)
        .with_timers(Duration::from_secs(60), Duration::from_secs(120))
        .with_poll_interval(Duration::from_millis(100))
}
