//! Command handlers and their registry.

use jxn_core::{CommandArgs, HandlerError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::processor::CommandContext;

/// Applies one kind of command.
///
/// Handlers run synchronously inside a drain pass. A handler that has to wait
/// pauses its queue through [`CommandContext::pause`] and hands the returned
/// [`Resume`](crate::processor::Resume) to whatever will wake it up.
pub trait CommandHandler: Send + Sync {
    /// Apply the command.
    ///
    /// The returned flag is informational only; the queue advances either way.
    ///
    /// # Errors
    ///
    /// A [`HandlerError`] stops the current drain pass.
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandArgs, &mut CommandContext<'_>) -> Result<bool, HandlerError> + Send + Sync,
{
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        self(args, ctx)
    }
}

/// Name-to-handler map shared by every command queue of a client.
#[derive(Default)]
pub struct CommandHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandHandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaces.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        let name = name.into();
        tracing::debug!(command = %name, "Registering command handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, handler)
    }

    /// Register a closure as a handler.
    pub fn register_fn<F>(&self, name: impl Into<String>, handler: F) -> Option<Arc<dyn CommandHandler>>
    where
        F: Fn(&CommandArgs, &mut CommandContext<'_>) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(handler))
    }

    /// Remove a handler.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Look up a handler.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
