//! Request lifecycle observers.
//!
//! A [`CallbackSet`] is one observer: a bag of optional hooks keyed by the
//! closed [`Hook`] enum, plus the two timers used by the delayed hooks. A
//! request carries a list of sets; the client's default sets always come first
//! so default behaviour (status, cursor) runs before per-request behaviour.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::environment::TimerId;
use crate::request::RequestHandle;

/// Named lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    /// Request context built and configured
    OnInitialize,
    /// Wire encoding about to be built
    OnPrepare,
    /// Network call about to start
    OnRequest,
    /// Response is taking longer than the response-delay timer
    OnResponseDelay,
    /// Response is taking longer than the expiration timer
    OnExpiration,
    /// Response arrived, nothing processed yet
    BeforeResponseProcessing,
    /// Response accepted for processing
    OnResponseReceived,
    /// Success status, commands about to run
    OnSuccess,
    /// Redirect status, navigation about to happen
    OnRedirect,
    /// Network failure or error status
    OnFailure,
    /// Request finished
    OnComplete,
}

impl Hook {
    /// Every hook, in lifecycle order.
    pub const ALL: [Self; 11] = [
        Self::OnInitialize,
        Self::OnPrepare,
        Self::OnRequest,
        Self::OnResponseDelay,
        Self::OnExpiration,
        Self::BeforeResponseProcessing,
        Self::OnResponseReceived,
        Self::OnSuccess,
        Self::OnRedirect,
        Self::OnFailure,
        Self::OnComplete,
    ];

    /// Hook name as used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OnInitialize => "onInitialize",
            Self::OnPrepare => "onPrepare",
            Self::OnRequest => "onRequest",
            Self::OnResponseDelay => "onResponseDelay",
            Self::OnExpiration => "onExpiration",
            Self::BeforeResponseProcessing => "beforeResponseProcessing",
            Self::OnResponseReceived => "onResponseReceived",
            Self::OnSuccess => "onSuccess",
            Self::OnRedirect => "onRedirect",
            Self::OnFailure => "onFailure",
            Self::OnComplete => "onComplete",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A hook implementation. Receives the request it fires for.
pub type HookFn = Arc<dyn Fn(&RequestHandle) + Send + Sync>;

/// One observer of request lifecycles.
pub struct CallbackSet {
    hooks: HashMap<Hook, HookFn>,
    timers: HashMap<Hook, Duration>,
    pending: Mutex<HashMap<Hook, TimerId>>,
}

impl CallbackSet {
    /// Create an observer whose delayed hooks use the given timers.
    ///
    /// `response_delay` arms [`Hook::OnResponseDelay`], `expiration` arms
    /// [`Hook::OnExpiration`].
    #[must_use]
    pub fn new(response_delay: Duration, expiration: Duration) -> Self {
        let timers = HashMap::from([
            (Hook::OnResponseDelay, response_delay),
            (Hook::OnExpiration, expiration),
        ]);
        Self {
            hooks: HashMap::new(),
            timers,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Observer with no timers: every hook fires immediately.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            hooks: HashMap::new(),
            timers: HashMap::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Install a hook implementation, replacing any previous one.
    #[must_use]
    pub fn on<F>(mut self, hook: Hook, callback: F) -> Self
    where
        F: Fn(&RequestHandle) + Send + Sync + 'static,
    {
        self.hooks.insert(hook, Arc::new(callback));
        self
    }

    /// The implementation of `hook`, if this observer has one.
    #[must_use]
    pub fn hook(&self, hook: Hook) -> Option<HookFn> {
        self.hooks.get(&hook).cloned()
    }

    /// Delay before `hook` fires, if it is timer-armed.
    #[must_use]
    pub fn timer(&self, hook: Hook) -> Option<Duration> {
        self.timers.get(&hook).copied()
    }

    /// Remember the pending timer for `hook`, returning the one it replaces.
    pub fn replace_pending(&self, hook: Hook, timer: TimerId) -> Option<TimerId> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hook, timer)
    }

    /// Forget and return the pending timer for `hook`.
    pub fn take_pending(&self, hook: Hook) -> Option<TimerId> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hook)
    }

    /// Forget the pending timer for `hook` only if it is still `timer`.
    pub fn finish_pending(&self, hook: Hook, timer: TimerId) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(&hook) == Some(&timer) {
            pending.remove(&hook);
        }
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<_> = self.hooks.keys().map(|hook| hook.name()).collect();
        hooks.sort_unstable();
        f.debug_struct("CallbackSet")
            .field("hooks", &hooks)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
