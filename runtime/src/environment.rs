//! Production host implementations and the [`Environment`] bundle.
//!
//! [`Environment`] gathers every capability the pipeline needs. Build one
//! with [`Environment::new`] (a transport plus headless defaults) and replace
//! the slots the host can actually serve.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use jxn_core::environment::{
    Clock, ConfirmCallback, Dialogs, FileInput, FormHost, Navigator, NodeRef, Scheduler,
    ScriptSandbox, Stylesheets, TargetResolver, Task, TimerId, Transport,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timers and background work on the ambient Tokio runtime.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<TimerId, Option<AbortHandle>>>>,
}

impl TokioScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // registered before spawning so a zero delay cannot outrun the entry
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, None);

        let timers = Arc::clone(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let live = timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .is_some();
            if live {
                task();
            }
        });

        if let Some(slot) = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            *slot = Some(handle.abort_handle());
        }
        id
    }

    fn cancel(&self, timer: TimerId) {
        let entry = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&timer);
        if let Some(Some(handle)) = entry {
            handle.abort();
        }
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}

/// Host defaults for running without a page.
///
/// No targets, no forms, confirmations answered "yes", navigation and
/// alerts only logged, no script sandbox, no stylesheets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl TargetResolver for Headless {
    fn by_id(&self, _id: &str) -> Option<NodeRef> {
        None
    }

    fn by_component(&self, _name: &str, _item: Option<&str>) -> Option<NodeRef> {
        None
    }
}

impl FormHost for Headless {
    fn file_input(&self, _field_id: &str) -> Option<FileInput> {
        None
    }
}

impl Dialogs for Headless {
    fn confirm(&self, question: &str, _title: Option<&str>, answer: ConfirmCallback) {
        tracing::info!(question, "Confirmation answered yes (headless)");
        answer(true);
    }

    fn alert(&self, message: &str) {
        tracing::info!(message, "Alert (headless)");
    }
}

impl Navigator for Headless {
    fn navigate(&self, location: &str) {
        tracing::info!(location, "Navigation requested (headless)");
    }
}

impl ScriptSandbox for Headless {
    fn evaluate(&self, _expression: &str) -> Result<bool, String> {
        Err("no script sandbox available".to_string())
    }
}

impl Stylesheets for Headless {
    fn rule_counts(&self) -> Vec<usize> {
        Vec::new()
    }
}

/// Every host capability the pipeline uses.
#[derive(Clone)]
pub struct Environment {
    /// Network calls
    pub transport: Arc<dyn Transport>,
    /// Timers and background submission
    pub scheduler: Arc<dyn Scheduler>,
    /// Source of `jxnr`
    pub clock: Arc<dyn Clock>,
    /// Command target lookup
    pub targets: Arc<dyn TargetResolver>,
    /// Upload field lookup
    pub forms: Arc<dyn FormHost>,
    /// Confirm and alert dialogs
    pub dialogs: Arc<dyn Dialogs>,
    /// Redirect handling
    pub navigator: Arc<dyn Navigator>,
    /// Expression evaluation for `script.wait_for`
    pub sandbox: Arc<dyn ScriptSandbox>,
    /// Stylesheet state for `css.wait`
    pub stylesheets: Arc<dyn Stylesheets>,
}

impl Environment {
    /// An environment with the given transport, a Tokio scheduler, the system
    /// clock and [`Headless`] everywhere else.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            scheduler: Arc::new(TokioScheduler::new()),
            clock: Arc::new(SystemClock),
            targets: Arc::new(Headless),
            forms: Arc::new(Headless),
            dialogs: Arc::new(Headless),
            navigator: Arc::new(Headless),
            sandbox: Arc::new(Headless),
            stylesheets: Arc::new(Headless),
        }
    }

    /// Replace the scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the target resolver.
    #[must_use]
    pub fn with_targets(mut self, targets: Arc<dyn TargetResolver>) -> Self {
        self.targets = targets;
        self
    }

    /// Replace the form host.
    #[must_use]
    pub fn with_forms(mut self, forms: Arc<dyn FormHost>) -> Self {
        self.forms = forms;
        self
    }

    /// Replace the dialogs.
    #[must_use]
    pub fn with_dialogs(mut self, dialogs: Arc<dyn Dialogs>) -> Self {
        self.dialogs = dialogs;
        self
    }

    /// Replace the navigator.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Replace the script sandbox.
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Replace the stylesheet source.
    #[must_use]
    pub fn with_stylesheets(mut self, stylesheets: Arc<dyn Stylesheets>) -> Self {
        self.stylesheets = stylesheets;
        self
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
