//! Request contexts: one per logical call to the server.
//!
//! A caller describes a call with a [`RequestSpec`]. The lifecycle turns it
//! into a [`RequestContext`] (configuration merged in), shares it through a
//! [`RequestHandle`], and drives it through [`RequestState`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::callback::CallbackSet;
use crate::environment::SelectedFile;
use crate::wire::{HttpMethod, WireRequest, WireResponse};

/// Unique identifier of a request within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate the next id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// How a request is placed relative to other requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Strictly one at a time; later traffic waits until its commands drain
    Synchronous,
    /// Submitted as soon as the send queue allows
    #[default]
    Asynchronous,
}

impl RequestMode {
    /// Parse `"synchronous"`/`"sync"` or `"asynchronous"`/`"async"`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "synchronous" | "sync" => Some(Self::Synchronous),
            "asynchronous" | "async" => Some(Self::Asynchronous),
            _ => None,
        }
    }
}

/// Lifecycle states.
///
/// `Created → Initialized → Queued? → Submitting → AwaitingResponse →
/// Processing → Completed`, with `Aborted` reachable from any state before
/// `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Context allocated
    Created,
    /// Configuration merged, placement decided
    Initialized,
    /// Waiting in the send queue
    Queued,
    /// Hooks fired, network call starting
    Submitting,
    /// Network call in flight
    AwaitingResponse,
    /// Response accepted, commands draining
    Processing,
    /// Finished, transient fields cleared
    Completed,
    /// Cancelled by the caller
    Aborted,
}

impl RequestState {
    /// Whether the request can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// The server-side function a request calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallTarget {
    /// A plain exported function
    Func {
        /// Function name
        name: String,
    },
    /// A method of an exported class
    Class {
        /// Class name
        name: String,
        /// Method name
        method: String,
    },
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func { name } => f.write_str(name),
            Self::Class { name, method } => write!(f, "{name}.{method}"),
        }
    }
}

/// A caller's description of a request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Target function
    pub call: CallTarget,
    /// Call arguments
    pub args: Vec<Value>,
    /// Execution mode, `None` for the configured default
    pub mode: Option<RequestMode>,
    /// HTTP method, `None` for the configured default
    pub method: Option<HttpMethod>,
    /// Target URI, `None` for the configured default
    pub uri: Option<String>,
    /// Extra headers, overriding configured ones with the same name
    pub headers: Vec<(String, String)>,
    /// Per-request observers, run after the client defaults
    pub callbacks: Vec<Arc<CallbackSet>>,
    /// Id of a file input whose files are uploaded with the call
    pub upload: Option<String>,
    /// Databags sent with the call
    pub bags: Vec<String>,
    /// Network attempt budget, `None` for the configured default
    pub retry: Option<u32>,
}

impl RequestSpec {
    /// Call a plain function.
    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        Self::new(CallTarget::Func { name: name.into() })
    }

    /// Call a class method.
    #[must_use]
    pub fn method_call(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(CallTarget::Class {
            name: class.into(),
            method: method.into(),
        })
    }

    fn new(call: CallTarget) -> Self {
        Self {
            call,
            args: Vec::new(),
            mode: None,
            method: None,
            uri: None,
            headers: Vec::new(),
            callbacks: Vec::new(),
            upload: None,
            bags: Vec::new(),
            retry: None,
        }
    }

    /// Set the call arguments.
    #[must_use]
    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Run synchronously.
    #[must_use]
    pub const fn synchronous(mut self) -> Self {
        self.mode = Some(RequestMode::Synchronous);
        self
    }

    /// Run asynchronously.
    #[must_use]
    pub const fn asynchronous(mut self) -> Self {
        self.mode = Some(RequestMode::Asynchronous);
        self
    }

    /// Set the HTTP method.
    #[must_use]
    pub const fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the target URI.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an observer.
    #[must_use]
    pub fn callbacks(mut self, callbacks: Arc<CallbackSet>) -> Self {
        self.callbacks.push(callbacks);
        self
    }

    /// Upload the files of the given file input.
    #[must_use]
    pub fn upload(mut self, field_id: impl Into<String>) -> Self {
        self.upload = Some(field_id.into());
        self
    }

    /// Send the named databags.
    #[must_use]
    pub fn bags<I, S>(mut self, bags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bags = bags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the network attempt budget.
    #[must_use]
    pub const fn retry(mut self, attempts: u32) -> Self {
        self.retry = Some(attempts);
        self
    }
}

/// Reasons an upload field is ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// No element with the given id
    #[error("Upload field '{0}' not found")]
    MissingField(String),

    /// The element is not a file input
    #[error("Upload field '{0}' is not a file input")]
    NotAFileInput(String),

    /// The file input has no selected file
    #[error("Upload field '{0}' has no selected files")]
    NoFilesSelected(String),

    /// The file input has no `name` attribute
    #[error("Upload field '{0}' has no name attribute")]
    MissingName(String),
}

/// A validated upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    /// Id of the file input
    pub field_id: String,
    /// Form field name the files are sent under
    pub name: String,
    /// Selected files
    pub files: Vec<SelectedFile>,
}

/// Header maps merged from configuration and the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    /// Sent with every request
    pub common: Vec<(String, String)>,
    /// Sent with POST requests
    pub post: Vec<(String, String)>,
    /// Sent with GET requests
    pub get: Vec<(String, String)>,
}

/// Network-specific fields that only live while a request is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transient {
    /// The encoded request as sent
    pub wire: WireRequest,
}

/// State of one logical call to the server.
#[derive(Debug)]
pub struct RequestContext {
    id: RequestId,
    mode: RequestMode,
    retry: u32,
    /// Target function
    pub call: CallTarget,
    /// Call arguments
    pub args: Vec<Value>,
    /// HTTP method (may be switched to POST during prepare)
    pub method: HttpMethod,
    /// Target URI without parameters
    pub uri: String,
    /// Merged headers
    pub headers: HeaderSet,
    /// Observers: client defaults first, then per-request ones
    pub callbacks: SmallVec<[Arc<CallbackSet>; 2]>,
    /// Validated upload, if any
    pub upload: Option<UploadDescriptor>,
    /// Databags sent with the call
    pub bags: Vec<String>,
    /// Whether the caller cancelled the request
    pub aborted: bool,
    /// Whether the request was submitted right away (not queued)
    pub submit_now: bool,
    /// Current lifecycle state
    pub state: RequestState,
    /// In-flight fields, cleared by cleanup
    pub transient: Option<Transient>,
    /// Last response received
    pub response: Option<WireResponse>,
}

impl RequestContext {
    /// Create a context in the `Created` state.
    #[must_use]
    pub fn new(call: CallTarget, mode: RequestMode, retry: u32, uri: String) -> Self {
        Self {
            id: RequestId::next(),
            mode,
            retry,
            call,
            args: Vec::new(),
            method: HttpMethod::Post,
            uri,
            headers: HeaderSet::default(),
            callbacks: SmallVec::new(),
            upload: None,
            bags: Vec::new(),
            aborted: false,
            submit_now: false,
            state: RequestState::Created,
            transient: None,
            response: None,
        }
    }

    /// Request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Execution mode. Fixed at creation.
    #[must_use]
    pub const fn mode(&self) -> RequestMode {
        self.mode
    }

    /// Whether the request is synchronous.
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        matches!(self.mode, RequestMode::Synchronous)
    }

    /// Remaining network attempts.
    #[must_use]
    pub const fn retry_budget(&self) -> u32 {
        self.retry
    }

    /// Consume one network attempt, returning what is left.
    pub const fn consume_attempt(&mut self) -> u32 {
        self.retry = self.retry.saturating_sub(1);
        self.retry
    }

    /// Drop the in-flight fields once the response is fully handled.
    pub fn cleanup(&mut self) {
        self.transient = None;
    }
}

/// Shared, lockable handle to a [`RequestContext`].
#[derive(Clone)]
pub struct RequestHandle {
    id: RequestId,
    mode: RequestMode,
    inner: Arc<Mutex<RequestContext>>,
}

impl RequestHandle {
    /// Wrap a context.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        Self {
            id: context.id(),
            mode: context.mode(),
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Request id (no locking).
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Execution mode (no locking).
    #[must_use]
    pub const fn mode(&self) -> RequestMode {
        self.mode
    }

    /// Whether the request is synchronous (no locking).
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        matches!(self.mode, RequestMode::Synchronous)
    }

    /// Lock the context.
    ///
    /// Never hold the guard while firing hooks or running commands.
    pub fn lock(&self) -> MutexGuard<'_, RequestContext> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the context.
    pub fn with<R>(&self, f: impl FnOnce(&RequestContext) -> R) -> R {
        f(&self.lock())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.lock().state
    }

    /// Whether the caller aborted the request.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Status of the last response, if one arrived.
    #[must_use]
    pub fn response_status(&self) -> Option<u16> {
        self.lock().response.as_ref().map(|response| response.status)
    }

    /// Whether two handles point at the same request.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
