//! Deterministic doubles for time, timers and the network.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned test locks

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use jxn_core::environment::{Clock, Scheduler, Task, TimerId, Transport};
use jxn_core::{TransportError, WireRequest, WireResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use jxn_testing::mocks::FixedClock;
/// use jxn_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

struct Timer {
    id: TimerId,
    due: Duration,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer>,
}

/// Scheduler driven by virtual time.
///
/// Timers only fire inside [`advance`](Self::advance), on the calling thread,
/// in due order (ties in scheduling order). Background futures go to
/// `tokio::spawn`.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
    spawned: AtomicUsize,
}

impl ManualScheduler {
    /// Create a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward, firing every timer that falls due,
    /// including timers scheduled by the tasks it runs.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().unwrap().now + by;
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                let position = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id))
                    .map(|(position, _)| position);
                match position {
                    Some(position) => {
                        let timer = state.timers.remove(position);
                        state.now = timer.due;
                        Some(timer)
                    },
                    None => {
                        state.now = target;
                        None
                    },
                }
            };
            match next {
                Some(timer) => (timer.task)(),
                None => return,
            }
        }
    }

    /// Fire everything currently due without moving time.
    pub fn run_due(&self) {
        self.advance(Duration::ZERO);
    }

    /// Elapsed virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    /// Timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().timers.len()
    }

    /// Futures handed to [`Scheduler::spawn`].
    #[must_use]
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.lock().unwrap();
        let id = TimerId(state.next_id);
        state.next_id += 1;
        let due = state.now + delay;
        state.timers.push(Timer { id, due, task });
        id
    }

    fn cancel(&self, timer: TimerId) {
        self.state.lock().unwrap().timers.retain(|pending| pending.id != timer);
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(future);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.timers.len())
            .finish_non_exhaustive()
    }
}

/// A request the [`MockTransport`] is holding until the test answers it.
#[derive(Debug)]
pub struct PendingExchange {
    /// What the lifecycle sent
    pub request: WireRequest,
    reply: oneshot::Sender<Result<WireResponse, TransportError>>,
}

impl PendingExchange {
    /// Deliver a response.
    pub fn respond(self, response: WireResponse) {
        let _ = self.reply.send(Ok(response));
    }

    /// Fail the exchange below the HTTP level.
    pub fn fail(self, error: TransportError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Transport whose responses the test hands out one by one.
///
/// Every `send` parks until the test takes the exchange from the
/// [`TransportController`] and answers it, so tests decide the order in
/// which responses arrive.
#[derive(Debug)]
pub struct MockTransport {
    exchanges: mpsc::UnboundedSender<PendingExchange>,
    sent: Mutex<Vec<WireRequest>>,
}

/// Test side of a [`MockTransport`].
#[derive(Debug)]
pub struct TransportController {
    exchanges: mpsc::UnboundedReceiver<PendingExchange>,
}

impl MockTransport {
    /// Create a transport and its controller.
    #[must_use]
    pub fn new() -> (Arc<Self>, TransportController) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                exchanges: sender,
                sent: Mutex::new(Vec::new()),
            }),
            TransportController {
                exchanges: receiver,
            },
        )
    }

    /// Every request sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<WireRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: WireRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + Send + '_>> {
        self.sent.lock().unwrap().push(request.clone());
        let (reply, response) = oneshot::channel();
        let queued = self.exchanges.send(PendingExchange { request, reply });
        Box::pin(async move {
            if queued.is_err() {
                return Err(TransportError::Connection("controller dropped".to_string()));
            }
            response
                .await
                .unwrap_or_else(|_| Err(TransportError::Connection("exchange dropped".to_string())))
        })
    }
}

impl TransportController {
    /// Wait (up to five seconds) for the next request to reach the network.
    pub async fn next_exchange(&mut self) -> Option<PendingExchange> {
        tokio::time::timeout(Duration::from_secs(5), self.exchanges.recv())
            .await
            .ok()
            .flatten()
    }

    /// The next request, if one is already waiting.
    pub fn try_next_exchange(&mut self) -> Option<PendingExchange> {
        self.exchanges.try_recv().ok()
    }
}

/// Transport answering from a script, immediately.
///
/// Once the script runs out every send fails with a connection error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<WireResponse, TransportError>>>,
    sent: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    /// Create a transport that replays `replies` in order.
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = Result<WireResponse, TransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A transport that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    /// Every request sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<WireRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: WireRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + Send + '_>> {
        self.sent.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("connection refused".to_string())));
        Box::pin(async move { reply })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_scheduler_fires_in_due_order() {
        let scheduler = Arc::new(ManualScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [("late", 30), ("early", 10), ("middle", 20)] {
            let log = Arc::clone(&log);
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || log.lock().unwrap().push(label)),
            );
        }

        scheduler.advance(Duration::from_millis(25));
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle"]);
        assert_eq!(scheduler.now(), Duration::from_millis(25));
        scheduler.advance(Duration::from_millis(5));
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_manual_scheduler_runs_chained_timers() {
        let scheduler = Arc::new(ManualScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_fired = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_fired.fetch_add(1, Ordering::SeqCst);
                let again = Arc::clone(&inner_fired);
                inner_scheduler.schedule(
                    Duration::from_millis(10),
                    Box::new(move || {
                        again.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.advance(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_cancelled_timer_is_dropped() {
        let scheduler = ManualScheduler::new();
        let id = scheduler.schedule(Duration::from_millis(1), Box::new(|| {}));
        scheduler.cancel(id);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_mock_transport_round_trip() {
        let (transport, mut controller) = MockTransport::new();
        let request = WireRequest {
            method: jxn_core::HttpMethod::Post,
            uri: "/ajax".to_string(),
            headers: Vec::new(),
            body: jxn_core::WireBody::Empty,
        };

        let sending = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.send(request).await }
        });
        let exchange = controller.next_exchange().await.unwrap();
        assert_eq!(exchange.request.uri, "/ajax");
        exchange.respond(WireResponse::ok("{}"));

        let response = sending.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_transport_runs_out() {
        let transport = ScriptedTransport::new([Ok(WireResponse::ok(""))]);
        let request = WireRequest {
            method: jxn_core::HttpMethod::Get,
            uri: "/".to_string(),
            headers: Vec::new(),
            body: jxn_core::WireBody::Empty,
        };

        assert!(transport.send(request.clone()).await.is_ok());
        assert!(transport.send(request).await.is_err());
        assert_eq!(transport.sent_count(), 2);
    }
}
