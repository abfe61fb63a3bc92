//! The command processor: turns a response into a command queue and drains it.
//!
//! Each successful response gets its own [`CommandQueue`] holding the decoded
//! commands in server order followed by the terminal `response.complete`
//! record. A drain pass pops and executes records one at a time until the
//! queue is empty, paused, aborted or a handler fails.
//!
//! # Pausing
//!
//! A handler that has to wait calls [`CommandContext::pause`]. The queue stops
//! after the current record and the handler receives a [`Resume`] token, the
//! only way to restart it. Resuming with a skip count discards that many
//! records from the head first, but never the last record, so the terminal
//! record always runs.
//!
//! A resume can arrive while the pausing pass is still on the stack (a dialog
//! answering synchronously, or a timer firing on another worker). The resume
//! is then recorded and the pausing pass picks it up, so one queue is never
//! drained by two passes at once.

use jxn_core::environment::{NodeRef, TargetResolver};
use jxn_core::{
    ArgsExt, BoundedQueue, CommandArgs, CommandError, CommandRecord, HandlerError, QueueError,
    RequestHandle, ResponsePayload, RetryCounter, Value,
};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::handlers::CommandHandlerRegistry;
use crate::metrics::CommandMetrics;

struct QueueState {
    commands: BoundedQueue<CommandRecord>,
    draining: bool,
    pending_resume: Option<usize>,
}

impl QueueState {
    /// Unpause and drop up to `skip` records from the head, keeping the last.
    fn begin_pass(&mut self, mut skip: usize) {
        self.commands.unpause();
        while skip > 0 && self.commands.len() > 1 {
            if let Some(record) = self.commands.pop() {
                tracing::debug!(
                    command = %record.name,
                    sequence = record.sequence,
                    "Skipping command"
                );
            }
            skip -= 1;
        }
    }
}

/// Commands of one response, shared by its drain passes and resume tokens.
#[derive(Clone)]
pub struct CommandQueue {
    state: Arc<Mutex<QueueState>>,
}

impl CommandQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                commands: BoundedQueue::new(capacity),
                draining: false,
                pending_resume: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records not yet executed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    /// Whether every record has been executed or skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().commands.is_empty()
    }

    /// Whether the queue is waiting for a [`Resume`].
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().commands.is_paused()
    }

    /// Sequence numbers of the records not yet executed, head first.
    #[must_use]
    pub fn pending_sequences(&self) -> Vec<usize> {
        self.lock().commands.iter().map(|record| record.sequence).collect()
    }

    /// Names of the records not yet executed, head first.
    #[must_use]
    pub fn pending_commands(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .map(|record| record.name.clone())
            .collect()
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CommandQueue")
            .field("len", &state.commands.len())
            .field("paused", &state.commands.is_paused())
            .field("draining", &state.draining)
            .finish()
    }
}

/// Continuation of a paused queue.
///
/// Consumed by [`resume`](Self::resume), so a pause is resumed at most once.
/// Dropping it leaves the queue paused for good.
#[must_use = "a paused queue only continues when resumed"]
pub struct Resume {
    queue: CommandQueue,
    processor: Arc<CommandProcessor>,
}

impl Resume {
    /// Continue the queue, first discarding up to `skip` records.
    pub fn resume(self, skip: usize) {
        self.processor.process_queue(&self.queue, skip);
    }

    /// The paused queue.
    pub const fn queue(&self) -> &CommandQueue {
        &self.queue
    }
}

impl fmt::Debug for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resume").field("queue", &self.queue).finish()
    }
}

/// What a handler sees while it runs.
pub struct CommandContext<'a> {
    target: Option<NodeRef>,
    sequence: usize,
    queue: &'a CommandQueue,
    request: &'a RequestHandle,
    retry: &'a mut RetryCounter,
    processor: &'a Arc<CommandProcessor>,
}

impl CommandContext<'_> {
    /// Page node the command addresses, when it names one that exists.
    #[must_use]
    pub const fn target(&self) -> Option<&NodeRef> {
        self.target.as_ref()
    }

    /// Position of the command within its response.
    #[must_use]
    pub const fn sequence(&self) -> usize {
        self.sequence
    }

    /// The request whose response carried the command.
    #[must_use]
    pub const fn request(&self) -> &RequestHandle {
        self.request
    }

    /// The queue the command was popped from.
    #[must_use]
    pub const fn queue(&self) -> &CommandQueue {
        self.queue
    }

    /// Ask to run this command again when the queue resumes.
    ///
    /// The first call arms a budget of `max_attempts`; later calls consume it.
    /// Returns `false` once the budget is spent, in which case the command is
    /// not run again.
    pub fn retry(&mut self, max_attempts: u32) -> bool {
        self.retry.retry(max_attempts)
    }

    /// Pause the queue after this command.
    pub fn pause(&mut self) -> Resume {
        self.processor.pause(self.queue)
    }
}

impl fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("target", &self.target)
            .field("sequence", &self.sequence)
            .field("request", self.request)
            .finish_non_exhaustive()
    }
}

/// Builds and drains command queues.
pub struct CommandProcessor {
    handlers: Arc<CommandHandlerRegistry>,
    targets: Arc<dyn TargetResolver>,
    queue_capacity: usize,
}

impl CommandProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(
        handlers: Arc<CommandHandlerRegistry>,
        targets: Arc<dyn TargetResolver>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            handlers,
            targets,
            queue_capacity,
        }
    }

    /// The handler registry.
    #[must_use]
    pub const fn handlers(&self) -> &Arc<CommandHandlerRegistry> {
        &self.handlers
    }

    /// Decode the request's response, queue its commands and drain.
    ///
    /// Commands get sequence numbers `0..n` in server order and the terminal
    /// record gets `n`. A body that is empty or not a payload yields no
    /// commands, so only the terminal record runs.
    ///
    /// # Errors
    ///
    /// [`QueueError::CapacityExceeded`] when the commands (plus the terminal
    /// record) do not fit. Nothing runs in that case.
    pub fn process_commands(self: &Arc<Self>, request: &RequestHandle) -> Result<CommandQueue, QueueError> {
        let body = request.with(|ctx| {
            ctx.response
                .as_ref()
                .map(|response| response.body.clone())
                .unwrap_or_default()
        });

        let payload = ResponsePayload::decode(&body).unwrap_or_else(|err| {
            tracing::warn!(
                request_id = %request.id(),
                error = %err,
                "Response body is not a command payload"
            );
            ResponsePayload::default()
        });
        if let Some(message) = payload.debug_message() {
            tracing::info!(request_id = %request.id(), message, "Server debug message");
        }

        let commands = payload.into_commands();
        let count = commands.len();
        let queue = CommandQueue::new(self.queue_capacity);
        {
            let mut state = queue.lock();
            for (sequence, spec) in commands.into_iter().enumerate() {
                state
                    .commands
                    .push(CommandRecord::from_spec(spec, sequence, request.clone()))?;
            }
            state
                .commands
                .push(CommandRecord::complete(count, request.clone()))?;
        }
        tracing::debug!(request_id = %request.id(), commands = count, "Queued response commands");

        self.process_queue(&queue, 0);
        Ok(queue)
    }

    /// Start or continue a drain pass, first skipping up to `skip` records.
    pub fn process_queue(self: &Arc<Self>, queue: &CommandQueue, skip: usize) {
        {
            let mut state = queue.lock();
            if state.draining {
                tracing::trace!(skip, "Queue resumed during its own drain pass");
                state.pending_resume = Some(skip);
                return;
            }
            state.draining = true;
            state.begin_pass(skip);
        }
        self.drain(queue);
    }

    /// Pause `queue` after the record currently executing.
    pub fn pause(self: &Arc<Self>, queue: &CommandQueue) -> Resume {
        queue.lock().commands.pause();
        CommandMetrics::record_pause();
        Resume {
            queue: queue.clone(),
            processor: Arc::clone(self),
        }
    }

    fn drain(self: &Arc<Self>, queue: &CommandQueue) {
        loop {
            let Some(mut record) = Self::next_record(queue) else {
                return;
            };

            if record.request.is_aborted() {
                tracing::debug!(
                    request_id = %record.request.id(),
                    sequence = record.sequence,
                    "Request aborted, abandoning its commands"
                );
                queue.lock().draining = false;
                return;
            }

            let result = self.execute(&mut record, queue);
            let requeue = record.retry.take_requeue();

            let mut state = queue.lock();
            if let Err(err) = result {
                tracing::error!(
                    request_id = %record.request.id(),
                    command = %err.command,
                    sequence = err.sequence,
                    error = %err.source,
                    "Command failed, stopping drain pass"
                );
                CommandMetrics::record_failure();
                state.draining = false;
                state.pending_resume = None;
                return;
            }

            if requeue {
                let sequence = record.sequence;
                if let Err(err) = state.commands.push_front(record) {
                    tracing::error!(sequence, error = %err, "Could not requeue command");
                }
            }

            if state.commands.is_paused() {
                match state.pending_resume.take() {
                    Some(skip) => state.begin_pass(skip),
                    None => {
                        state.draining = false;
                        return;
                    },
                }
            }
        }
    }

    fn next_record(queue: &CommandQueue) -> Option<CommandRecord> {
        let mut state = queue.lock();
        let record = state.commands.pop();
        if record.is_none() {
            state.draining = false;
        }
        record
    }

    /// Run one record's handler.
    ///
    /// An unknown command is logged and treated as done. A panicking handler
    /// is reported as [`HandlerError::Panicked`].
    ///
    /// # Errors
    ///
    /// The handler's error, tagged with the command name and sequence.
    pub fn execute(self: &Arc<Self>, record: &mut CommandRecord, queue: &CommandQueue) -> Result<(), CommandError> {
        let Some(handler) = self.handlers.get(&record.name) else {
            tracing::error!(
                request_id = %record.request.id(),
                command = %record.name,
                sequence = record.sequence,
                "Unknown command"
            );
            CommandMetrics::record_unknown();
            return Ok(());
        };

        let target = self.resolve_target(&record.args);
        let CommandRecord {
            name,
            args,
            sequence,
            request,
            retry,
        } = record;
        let mut ctx = CommandContext {
            target,
            sequence: *sequence,
            queue,
            request,
            retry,
            processor: self,
        };

        tracing::trace!(request_id = %request.id(), command = %name, sequence = *sequence, "Executing command");
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(args, &mut ctx)));
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(_) => {
                CommandMetrics::record_executed();
                Ok(())
            },
            Err(source) => Err(CommandError {
                command: name.clone(),
                sequence: *sequence,
                source,
            }),
        }
    }

    fn resolve_target(&self, args: &CommandArgs) -> Option<NodeRef> {
        if let Some(id) = args.opt_str("id") {
            return self.targets.by_id(id);
        }
        match args.get("component") {
            Some(Value::Object(component)) => {
                let name = component.get("name").and_then(Value::as_str)?;
                let item = component.get("item").and_then(Value::as_str);
                self.targets.by_component(name, item)
            },
            _ => None,
        }
    }
}

impl fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("handlers", &self.handlers)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
