//! Firing lifecycle hooks across a request's observers.

use jxn_core::environment::Scheduler;
use jxn_core::{CallbackSet, Hook, RequestHandle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Creates observers and fires their hooks.
///
/// Hooks without a timer run inline, in observer order. Timer-armed hooks
/// ([`Hook::OnResponseDelay`], [`Hook::OnExpiration`]) are scheduled instead;
/// arming one again replaces the pending timer, and
/// [`clear_timer`](Self::clear_timer) cancels it before it fires.
#[derive(Clone)]
pub struct CallbackRegistry {
    scheduler: Arc<dyn Scheduler>,
    response_delay: Duration,
    expiration: Duration,
}

impl CallbackRegistry {
    /// Create a registry whose observers default to the given timers.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, response_delay: Duration, expiration: Duration) -> Self {
        Self {
            scheduler,
            response_delay,
            expiration,
        }
    }

    /// A fresh observer, with the configured timers unless overridden.
    #[must_use]
    pub fn create(&self, response_delay: Option<Duration>, expiration: Option<Duration>) -> CallbackSet {
        CallbackSet::new(
            response_delay.unwrap_or(self.response_delay),
            expiration.unwrap_or(self.expiration),
        )
    }

    /// Fire `hook` on every observer that implements it.
    pub fn execute(&self, sets: &[Arc<CallbackSet>], hook: Hook, request: &RequestHandle) {
        for set in sets {
            let Some(callback) = set.hook(hook) else {
                continue;
            };

            let Some(delay) = set.timer(hook) else {
                tracing::trace!(request_id = %request.id(), %hook, "Firing hook");
                callback(request);
                continue;
            };

            let slot: Arc<OnceLock<_>> = Arc::new(OnceLock::new());
            let task = {
                let set = Arc::clone(set);
                let slot = Arc::clone(&slot);
                let request = request.clone();
                Box::new(move || {
                    if let Some(timer) = slot.get() {
                        set.finish_pending(hook, *timer);
                    }
                    tracing::trace!(request_id = %request.id(), %hook, "Firing delayed hook");
                    callback(&request);
                })
            };

            let timer = self.scheduler.schedule(delay, task);
            let _ = slot.set(timer);
            if let Some(previous) = set.replace_pending(hook, timer) {
                self.scheduler.cancel(previous);
            }
        }
    }

    /// Cancel the pending timer of `hook` on every observer.
    pub fn clear_timer(&self, sets: &[Arc<CallbackSet>], hook: Hook) {
        for set in sets {
            if let Some(timer) = set.take_pending(hook) {
                self.scheduler.cancel(timer);
            }
        }
    }
}
