//! Host capability traits.
//!
//! The pipeline never touches the page, the network or the clock directly.
//! Everything outside the request/command core is reached through one of the
//! traits below and injected by the host, so tests can swap in deterministic
//! doubles.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::wire::{TransportError, WireRequest, WireResponse};

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// struct SystemClock;
/// impl Clock for SystemClock {
///     fn now(&self) -> DateTime<Utc> {
///         Utc::now()
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Performs the network call for a prepared request.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be stored as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the exchange fails below the HTTP
    /// level. HTTP error statuses are *not* errors; they come back as a
    /// [`WireResponse`] and are classified by the lifecycle.
    fn send(
        &self,
        request: WireRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + Send + '_>>;
}

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Work scheduled on a timer.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Timers and background work.
///
/// Handlers never block; they defer through a scheduler instead.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending timer. Cancelling a fired or unknown timer is a no-op.
    fn cancel(&self, timer: TimerId);

    /// Run a future to completion in the background.
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// Opaque handle to a page node resolved by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef(pub String);

/// Resolves command targets to page nodes.
pub trait TargetResolver: Send + Sync {
    /// Find a node by element id.
    fn by_id(&self, id: &str) -> Option<NodeRef>;

    /// Find the node bound to a component (and optional item key).
    fn by_component(&self, name: &str, item: Option<&str>) -> Option<NodeRef>;
}

/// A file selected in a file input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Client-side file name
    pub name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// What the host knows about a form field referenced as an upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInput {
    /// Whether the element is an `<input type="file">`
    pub is_file_input: bool,
    /// The element's `name` attribute
    pub name: Option<String>,
    /// Currently selected files
    pub files: Vec<SelectedFile>,
}

/// Form access needed for uploads.
pub trait FormHost: Send + Sync {
    /// Look up the element with the given id.
    fn file_input(&self, field_id: &str) -> Option<FileInput>;
}

/// Callback receiving the user's answer to a confirmation.
pub type ConfirmCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// User-facing dialogs.
pub trait Dialogs: Send + Sync {
    /// Ask a yes/no question; `answer` is invoked exactly once.
    fn confirm(&self, question: &str, title: Option<&str>, answer: ConfirmCallback);

    /// Show a message.
    fn alert(&self, message: &str);
}

/// Page navigation.
pub trait Navigator: Send + Sync {
    /// Navigate the page to `location`.
    fn navigate(&self, location: &str);
}

/// Untrusted expression evaluation used by condition-polling commands.
pub trait ScriptSandbox: Send + Sync {
    /// Evaluate a boolean expression.
    ///
    /// # Errors
    ///
    /// Returns a message when the expression cannot be evaluated.
    fn evaluate(&self, expression: &str) -> Result<bool, String>;
}

/// Stylesheet load state.
pub trait Stylesheets: Send + Sync {
    /// Number of rules currently visible in each tracked stylesheet.
    fn rule_counts(&self) -> Vec<usize>;
}
