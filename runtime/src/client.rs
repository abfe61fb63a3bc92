//! The [`Client`] facade.

use jxn_core::{CallbackSet, CommandArgs, DataBags, HandlerError, RequestHandle, RequestSpec};
use std::sync::Arc;

use crate::builtins;
use crate::config::ClientConfig;
use crate::environment::Environment;
use crate::error::RequestError;
use crate::handlers::{CommandHandler, CommandHandlerRegistry};
use crate::lifecycle::RequestLifecycle;
use crate::processor::{CommandContext, CommandProcessor};

/// Entry point of the runtime: runs requests and applies their commands.
///
/// Cloning is cheap; clones share queues, handlers and databags.
///
/// # Example
///
/// ```no_run
/// use jxn_runtime::{Client, ClientConfig, Environment};
/// use jxn_core::{json, RequestSpec};
/// # use std::sync::Arc;
///
/// # async fn example(transport: Arc<dyn jxn_core::environment::Transport>) -> Result<(), jxn_runtime::RequestError> {
/// let client = Client::new(
///     ClientConfig::default().with_request_uri("/ajax.php"),
///     Environment::new(transport),
/// );
/// client.register("log.write", |args, _ctx| {
///     println!("{args:?}");
///     Ok(true)
/// });
///
/// client
///     .execute(RequestSpec::function("hello").args(vec![json!("world")]))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    lifecycle: Arc<RequestLifecycle>,
    processor: Arc<CommandProcessor>,
    databags: Arc<DataBags>,
}

impl Client {
    /// Create a client with the built-in commands registered.
    #[must_use]
    pub fn new(config: ClientConfig, env: Environment) -> Self {
        let handlers = Arc::new(CommandHandlerRegistry::new());
        let databags = Arc::new(DataBags::new());
        let processor = Arc::new(CommandProcessor::new(
            Arc::clone(&handlers),
            Arc::clone(&env.targets),
            config.response_queue_size,
        ));
        let lifecycle = Arc::new(RequestLifecycle::new(
            config.clone(),
            env.clone(),
            Arc::clone(&processor),
            Arc::clone(&databags),
        ));
        builtins::register(&handlers, &lifecycle, &env, config.poll_interval(), &databags);

        tracing::debug!(handlers = ?handlers.names(), "Client created");
        Self {
            config: Arc::new(config),
            lifecycle,
            processor,
            databags,
        }
    }

    /// Observers every request starts with, ahead of its own.
    #[must_use]
    pub fn with_default_callbacks(self, sets: Vec<Arc<CallbackSet>>) -> Self {
        self.lifecycle.set_default_callbacks(sets);
        self
    }

    /// Register a command handler closure, returning the handler it replaces.
    pub fn register<F>(&self, name: impl Into<String>, handler: F) -> Option<Arc<dyn CommandHandler>>
    where
        F: Fn(&CommandArgs, &mut CommandContext<'_>) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.handlers().register_fn(name, handler)
    }

    /// Register a command handler object, returning the handler it replaces.
    pub fn register_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.handlers().register(name, handler)
    }

    /// Remove a command handler.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers().unregister(name)
    }

    /// Run a request.
    ///
    /// Resolves once the response is handled (its commands may still be
    /// paused), or as soon as the request is queued when it has to wait for
    /// a synchronous request.
    ///
    /// # Errors
    ///
    /// See [`RequestLifecycle::execute`].
    pub async fn execute(&self, spec: RequestSpec) -> Result<RequestHandle, RequestError> {
        self.lifecycle.execute(spec).await
    }

    /// Cancel a request.
    pub fn abort(&self, request: &RequestHandle) {
        self.lifecycle.abort(request);
    }

    /// The shared databag store.
    #[must_use]
    pub const fn databags(&self) -> &Arc<DataBags> {
        &self.databags
    }

    /// A new observer using the configured hook timers.
    #[must_use]
    pub fn callbacks(&self) -> CallbackSet {
        self.lifecycle.callbacks().create(None, None)
    }

    /// Requests in the send queue.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.lifecycle.pending_requests()
    }

    /// Asynchronous responses waiting behind a synchronous request.
    #[must_use]
    pub fn buffered_responses(&self) -> usize {
        self.lifecycle.buffered_responses()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The command handler registry.
    #[must_use]
    pub fn handlers(&self) -> &Arc<CommandHandlerRegistry> {
        self.processor.handlers()
    }

    /// The request lifecycle.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<RequestLifecycle> {
        &self.lifecycle
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("lifecycle", &self.lifecycle)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}
