//! The request lifecycle.
//!
//! ```text
//! execute ─► initialize ─► prepare ─► submit ─► received ─► process_response
//!                │                      ▲  │                   │
//!                └── queued ────────────┘  └─ retry on failure  ├─ success ─► commands ─► complete
//!                                                               ├─ redirect ─► complete ─► navigate
//!                                                               └─ error ────► complete
//! ```
//!
//! # Ordering
//!
//! Two queues enforce the ordering between synchronous and asynchronous
//! requests:
//!
//! - the **send queue** holds every synchronous request from initialization
//!   until completion, plus any request created while the send queue was not
//!   empty (those wait instead of being submitted);
//! - the **receive queue** buffers responses of asynchronous requests that
//!   arrive while a synchronous request is at the head of the send queue.
//!
//! When a synchronous request completes it leaves the send queue, buffered
//! responses are processed in arrival order, and waiting requests are
//! released in enqueue order up to and including the next synchronous one.

use jxn_core::request::{HeaderSet, Transient};
use jxn_core::{
    BoundedQueue, CallbackSet, DataBags, Hook, RequestContext, RequestHandle, RequestSpec,
    RequestState, StatusClass, UploadDescriptor, UploadError, WireResponse,
};
use smallvec::SmallVec;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::callbacks::CallbackRegistry;
use crate::config::ClientConfig;
use crate::environment::Environment;
use crate::error::RequestError;
use crate::metrics::{QueueMetrics, RequestMetrics};
use crate::params;
use crate::processor::CommandProcessor;

type RequestQueue = Mutex<BoundedQueue<RequestHandle>>;

fn lock(queue: &RequestQueue) -> MutexGuard<'_, BoundedQueue<RequestHandle>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives requests from creation to completion.
///
/// Lock order: the send queue before the receive queue, and a queue lock
/// before a request lock. No lock is held while hooks or commands run.
pub struct RequestLifecycle {
    config: ClientConfig,
    env: Environment,
    callbacks: CallbackRegistry,
    processor: Arc<CommandProcessor>,
    databags: Arc<DataBags>,
    defaults: RwLock<Vec<Arc<CallbackSet>>>,
    send_queue: RequestQueue,
    receive_queue: RequestQueue,
}

impl RequestLifecycle {
    /// Create a lifecycle.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        env: Environment,
        processor: Arc<CommandProcessor>,
        databags: Arc<DataBags>,
    ) -> Self {
        let callbacks = CallbackRegistry::new(
            Arc::clone(&env.scheduler),
            config.response_delay(),
            config.expiration(),
        );
        let capacity = config.request_queue_size;
        Self {
            config,
            env,
            callbacks,
            processor,
            databags,
            defaults: RwLock::new(Vec::new()),
            send_queue: Mutex::new(BoundedQueue::new(capacity)),
            receive_queue: Mutex::new(BoundedQueue::new(capacity)),
        }
    }

    /// The callback registry.
    #[must_use]
    pub const fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Replace the observers every request starts with.
    pub fn set_default_callbacks(&self, sets: Vec<Arc<CallbackSet>>) {
        *self.defaults.write().unwrap_or_else(PoisonError::into_inner) = sets;
    }

    /// Requests in the send queue.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        lock(&self.send_queue).len()
    }

    /// Asynchronous responses waiting in the receive queue.
    #[must_use]
    pub fn buffered_responses(&self) -> usize {
        lock(&self.receive_queue).len()
    }

    /// Run a request: initialize, prepare and, unless it has to wait, submit.
    ///
    /// A request that has to wait is submitted in the background when the
    /// synchronous request ahead of it completes; this returns as soon as it
    /// is queued.
    ///
    /// # Errors
    ///
    /// - [`RequestError::MissingRequestUri`] when no URI is configured
    /// - [`RequestError::Queue`] when the send queue or a command queue is full
    /// - [`RequestError::Network`] when every network attempt failed
    pub async fn execute(self: &Arc<Self>, spec: RequestSpec) -> Result<RequestHandle, RequestError> {
        let request = self.initialize(spec)?;
        self.fire(&request, Hook::OnInitialize);

        if let Err(err) = self.prepare(&request) {
            self.complete(&request);
            return Err(err);
        }

        let submit_now = request.lock().submit_now;
        if submit_now {
            self.submit(&request).await?;
        } else {
            tracing::debug!(request_id = %request.id(), "Request queued behind earlier traffic");
        }
        Ok(request)
    }

    /// Build the context and decide its placement.
    ///
    /// An invalid upload is logged and the request proceeds without it.
    ///
    /// # Errors
    ///
    /// [`RequestError::MissingRequestUri`] or a full send queue.
    pub fn initialize(&self, spec: RequestSpec) -> Result<RequestHandle, RequestError> {
        let uri = spec
            .uri
            .or_else(|| self.config.request_uri.clone())
            .filter(|uri| !uri.is_empty())
            .ok_or(RequestError::MissingRequestUri)?;

        let mut ctx = RequestContext::new(
            spec.call,
            spec.mode.unwrap_or(self.config.default_mode),
            spec.retry.unwrap_or(self.config.default_retry),
            uri,
        );
        ctx.args = spec.args;
        ctx.method = spec.method.unwrap_or(self.config.default_method);
        ctx.headers = HeaderSet {
            common: params::merge_headers(&self.config.common_headers, &spec.headers),
            post: self.config.post_headers.clone(),
            get: self.config.get_headers.clone(),
        };
        ctx.callbacks = self
            .defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .chain(spec.callbacks)
            .collect::<SmallVec<_>>();
        ctx.bags = spec.bags;
        let request_id = ctx.id();
        ctx.upload = spec.upload.and_then(|field_id| match self.validate_upload(&field_id) {
            Ok(upload) => Some(upload),
            Err(err) => {
                tracing::error!(%request_id, error = %err, "Ignoring invalid upload");
                None
            },
        });
        ctx.state = RequestState::Initialized;

        let request = RequestHandle::new(ctx);
        {
            let mut send = lock(&self.send_queue);
            let submit_now = send.is_empty();
            if !submit_now || request.is_synchronous() {
                send.push(request.clone())?;
                QueueMetrics::record_send_depth(send.len());
            }

            let mut ctx = request.lock();
            ctx.submit_now = submit_now;
            if !submit_now {
                ctx.state = RequestState::Queued;
            }
        }

        tracing::debug!(
            request_id = %request.id(),
            mode = ?request.mode(),
            "Request initialized"
        );
        Ok(request)
    }

    /// Encode the wire request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Encoding`] when the call cannot be serialized.
    pub fn prepare(&self, request: &RequestHandle) -> Result<(), RequestError> {
        self.fire(request, Hook::OnPrepare);
        let now = self.env.clock.now();
        let mut ctx = request.lock();
        let wire = params::encode(&ctx, &self.config, &self.databags, now)?;
        ctx.method = wire.method;
        ctx.transient = Some(Transient { wire });
        Ok(())
    }

    /// Send the request, retrying network failures within its budget.
    ///
    /// Each failed attempt fires `onFailure` and consumes one unit of budget.
    /// Once the budget is spent the request is completed and the last error
    /// returned.
    ///
    /// # Errors
    ///
    /// [`RequestError::Network`] when every attempt failed, or any error of
    /// [`received`](Self::received).
    pub async fn submit(self: &Arc<Self>, request: &RequestHandle) -> Result<(), RequestError> {
        let mut attempts: u32 = 0;
        loop {
            let wire = {
                let mut ctx = request.lock();
                if ctx.aborted || ctx.state.is_terminal() {
                    return Ok(());
                }
                let Some(transient) = ctx.transient.as_ref() else {
                    return Err(RequestError::Encoding("request was not prepared".to_string()));
                };
                let wire = transient.wire.clone();
                ctx.state = RequestState::Submitting;
                wire
            };

            self.fire(request, Hook::OnResponseDelay);
            self.fire(request, Hook::OnExpiration);
            self.fire(request, Hook::OnRequest);
            request.lock().state = RequestState::AwaitingResponse;

            attempts += 1;
            RequestMetrics::record_submitted();
            tracing::debug!(
                request_id = %request.id(),
                attempt = attempts,
                method = %wire.method,
                uri = %wire.uri,
                "Submitting request"
            );

            let error = match self.env.transport.send(wire).await {
                Ok(response) => return self.received(request, response),
                Err(error) => error,
            };

            self.clear_timers(request);
            self.fire(request, Hook::OnFailure);
            let (remaining, aborted) = {
                let mut ctx = request.lock();
                (ctx.consume_attempt(), ctx.aborted)
            };

            if remaining == 0 || aborted {
                tracing::error!(
                    request_id = %request.id(),
                    attempts,
                    error = %error,
                    "Request failed, retry budget exhausted"
                );
                RequestMetrics::record_failure();
                self.complete(request);
                return Err(RequestError::Network {
                    attempts,
                    source: error,
                });
            }

            let delay = self.config.retry_backoff.delay_for_attempt(attempts - 1);
            tracing::warn!(
                request_id = %request.id(),
                attempt = attempts,
                remaining,
                delay_ms = delay.as_millis(),
                error = %error,
                "Request failed, retrying"
            );
            RequestMetrics::record_retry();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Accept a response.
    ///
    /// An asynchronous response that arrives while a synchronous request is
    /// in flight is buffered until that request completes.
    ///
    /// # Errors
    ///
    /// [`RequestError::Queue`] when the receive queue or the command queue is
    /// full.
    pub fn received(self: &Arc<Self>, request: &RequestHandle, response: WireResponse) -> Result<(), RequestError> {
        {
            let mut ctx = request.lock();
            if ctx.aborted {
                tracing::debug!(request_id = %request.id(), "Dropping response of aborted request");
                return Ok(());
            }
            ctx.response = Some(response);
        }
        self.clear_timers(request);

        if !request.is_synchronous() {
            let send = lock(&self.send_queue);
            if send.peek().is_some_and(RequestHandle::is_synchronous) {
                // pushed under the send lock so `release` cannot miss it
                let mut receive = lock(&self.receive_queue);
                receive.push(request.clone())?;
                QueueMetrics::record_receive_depth(receive.len());
                tracing::debug!(request_id = %request.id(), "Buffering response behind synchronous request");
                return Ok(());
            }
        }

        self.process_response(request)
    }

    /// Classify the response status and act on it.
    ///
    /// # Errors
    ///
    /// [`RequestError::Queue`] when the command queue is full; the request is
    /// completed first.
    pub fn process_response(self: &Arc<Self>, request: &RequestHandle) -> Result<(), RequestError> {
        if request.is_aborted() {
            return Ok(());
        }

        self.clear_timers(request);
        self.fire(request, Hook::BeforeResponseProcessing);
        self.fire(request, Hook::OnResponseReceived);

        let (status, location) = request.with(|ctx| {
            ctx.response.as_ref().map_or((0, None), |response| {
                (response.status, response.header("location").map(str::to_owned))
            })
        });

        match StatusClass::of(status) {
            StatusClass::Success => {
                request.lock().state = RequestState::Processing;
                self.fire(request, Hook::OnSuccess);
                if let Err(err) = self.processor.process_commands(request) {
                    tracing::error!(request_id = %request.id(), error = %err, "Response does not fit the command queue");
                    self.complete(request);
                    return Err(err.into());
                }
            },
            StatusClass::Redirect => {
                self.fire(request, Hook::OnRedirect);
                self.complete(request);
                match location {
                    Some(location) => self.env.navigator.navigate(&location),
                    None => tracing::warn!(request_id = %request.id(), status, "Redirect without location"),
                }
            },
            StatusClass::Error => {
                tracing::warn!(request_id = %request.id(), status, "Server returned an error status");
                RequestMetrics::record_failure();
                self.fire(request, Hook::OnFailure);
                self.complete(request);
            },
            StatusClass::Other => {
                tracing::debug!(request_id = %request.id(), status, "Response status not handled");
            },
        }
        Ok(())
    }

    /// Finish a request. Runs once per request; later calls do nothing.
    ///
    /// Fires `onComplete`, clears the in-flight fields and, for a synchronous
    /// request, releases the traffic that waited behind it.
    pub fn complete(self: &Arc<Self>, request: &RequestHandle) {
        {
            let mut ctx = request.lock();
            if ctx.state.is_terminal() {
                return;
            }
            ctx.state = if ctx.aborted {
                RequestState::Aborted
            } else {
                RequestState::Completed
            };
        }

        self.fire(request, Hook::OnComplete);
        request.lock().cleanup();
        RequestMetrics::record_completed();
        tracing::debug!(request_id = %request.id(), "Request completed");

        if request.is_synchronous() {
            self.release(request);
        }
    }

    /// Cancel a request.
    ///
    /// Its response, if one still arrives, is ignored and its remaining
    /// commands are abandoned. A queued request is skipped when its turn
    /// comes.
    pub fn abort(self: &Arc<Self>, request: &RequestHandle) {
        {
            let mut ctx = request.lock();
            if ctx.state.is_terminal() {
                return;
            }
            ctx.aborted = true;
        }
        tracing::info!(request_id = %request.id(), "Request aborted");
        RequestMetrics::record_aborted();
        self.clear_timers(request);
        self.complete(request);
    }

    fn release(self: &Arc<Self>, finished: &RequestHandle) {
        let buffered = {
            let mut send = lock(&self.send_queue);
            if !send.peek().is_some_and(|head| head.same(finished)) {
                // aborted while still waiting; skipped when its turn comes
                return;
            }
            send.pop();
            let mut receive = lock(&self.receive_queue);
            std::iter::from_fn(|| receive.pop()).collect::<Vec<_>>()
        };

        for buffered in buffered {
            tracing::debug!(request_id = %buffered.id(), "Processing buffered response");
            if let Err(err) = self.process_response(&buffered) {
                tracing::error!(request_id = %buffered.id(), error = %err, "Buffered response failed");
            }
        }

        loop {
            let (next, is_sync) = {
                let mut send = lock(&self.send_queue);
                let Some(head) = send.peek().cloned() else {
                    break;
                };
                if head.state().is_terminal() {
                    send.pop();
                    tracing::debug!(request_id = %head.id(), "Skipping finished queued request");
                    continue;
                }
                if head.is_synchronous() {
                    (head, true)
                } else {
                    send.pop();
                    (head, false)
                }
            };

            self.spawn_submit(next);
            if is_sync {
                break;
            }
        }

        QueueMetrics::record_send_depth(self.pending_requests());
        QueueMetrics::record_receive_depth(self.buffered_responses());
    }

    fn spawn_submit(self: &Arc<Self>, request: RequestHandle) {
        tracing::debug!(request_id = %request.id(), "Releasing queued request");
        let lifecycle = Arc::clone(self);
        self.env.scheduler.spawn(Box::pin(async move {
            if let Err(err) = lifecycle.submit(&request).await {
                tracing::error!(request_id = %request.id(), error = %err, "Released request failed");
            }
        }));
    }

    fn validate_upload(&self, field_id: &str) -> Result<UploadDescriptor, UploadError> {
        let input = self
            .env
            .forms
            .file_input(field_id)
            .ok_or_else(|| UploadError::MissingField(field_id.to_string()))?;
        if !input.is_file_input {
            return Err(UploadError::NotAFileInput(field_id.to_string()));
        }
        if input.files.is_empty() {
            return Err(UploadError::NoFilesSelected(field_id.to_string()));
        }
        let name = input
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| UploadError::MissingName(field_id.to_string()))?;

        Ok(UploadDescriptor {
            field_id: field_id.to_string(),
            name,
            files: input.files,
        })
    }

    fn observers(request: &RequestHandle) -> SmallVec<[Arc<CallbackSet>; 2]> {
        request.with(|ctx| ctx.callbacks.clone())
    }

    fn fire(&self, request: &RequestHandle, hook: Hook) {
        self.callbacks.execute(&Self::observers(request), hook, request);
    }

    fn clear_timers(&self, request: &RequestHandle) {
        let observers = Self::observers(request);
        self.callbacks.clear_timer(&observers, Hook::OnResponseDelay);
        self.callbacks.clear_timer(&observers, Hook::OnExpiration);
    }
}

impl std::fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("pending_requests", &self.pending_requests())
            .field("buffered_responses", &self.buffered_responses())
            .finish_non_exhaustive()
    }
}
