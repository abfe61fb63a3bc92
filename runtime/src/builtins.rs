//! Commands every client understands.
//!
//! | name                | arguments |
//! |---------------------|-----------|
//! | `response.complete` | none, appended by the processor |
//! | `script.sleep`      | `duration`: number of poll intervals to wait |
//! | `script.confirm`    | `question`, `title`?, `count`: commands skipped on "no" |
//! | `script.wait_for`   | `condition`, `tries` |
//! | `css.wait`          | `tries` |
//! | `databag.set`       | `values`: `{bag: {key: value}}` |
//! | `databag.clear`     | `bag` |
//! | `dialog.alert`      | `message` |

use jxn_core::environment::{Dialogs, Scheduler, ScriptSandbox, Stylesheets};
use jxn_core::{ArgsExt, CommandArgs, DataBags, HandlerError, Value, COMPLETE_COMMAND};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::environment::Environment;
use crate::handlers::{CommandHandler, CommandHandlerRegistry};
use crate::lifecycle::RequestLifecycle;
use crate::processor::CommandContext;

/// Register the built-in commands.
pub fn register(
    registry: &CommandHandlerRegistry,
    lifecycle: &Arc<RequestLifecycle>,
    env: &Environment,
    poll_interval: Duration,
    databags: &Arc<DataBags>,
) {
    registry.register(
        COMPLETE_COMMAND,
        Arc::new(Complete {
            lifecycle: Arc::downgrade(lifecycle),
        }),
    );
    registry.register(
        "script.sleep",
        Arc::new(Sleep {
            scheduler: Arc::clone(&env.scheduler),
            interval: poll_interval,
        }),
    );
    registry.register(
        "script.confirm",
        Arc::new(Confirm {
            dialogs: Arc::clone(&env.dialogs),
        }),
    );
    registry.register(
        "script.wait_for",
        Arc::new(WaitFor {
            sandbox: Arc::clone(&env.sandbox),
            scheduler: Arc::clone(&env.scheduler),
            interval: poll_interval,
        }),
    );
    registry.register(
        "css.wait",
        Arc::new(CssWait {
            stylesheets: Arc::clone(&env.stylesheets),
            scheduler: Arc::clone(&env.scheduler),
            interval: poll_interval,
        }),
    );
    registry.register(
        "databag.set",
        Arc::new(DatabagSet {
            databags: Arc::clone(databags),
        }),
    );
    registry.register(
        "databag.clear",
        Arc::new(DatabagClear {
            databags: Arc::clone(databags),
        }),
    );
    let dialogs = Arc::clone(&env.dialogs);
    registry.register_fn("dialog.alert", move |args, _ctx| {
        dialogs.alert(args.str_arg("message")?);
        Ok(true)
    });
}

/// Pause and ask to run again after `interval`, while the budget lasts.
///
/// Returns whether the command was rescheduled.
fn poll_again(ctx: &mut CommandContext<'_>, scheduler: &Arc<dyn Scheduler>, interval: Duration, tries: u32) -> bool {
    if !ctx.retry(tries) {
        return false;
    }
    let resume = ctx.pause();
    scheduler.schedule(interval, Box::new(move || resume.resume(0)));
    true
}

struct Complete {
    lifecycle: Weak<RequestLifecycle>,
}

impl CommandHandler for Complete {
    fn handle(&self, _args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        if let Some(lifecycle) = self.lifecycle.upgrade() {
            lifecycle.complete(ctx.request());
        }
        Ok(true)
    }
}

struct Sleep {
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
}

impl CommandHandler for Sleep {
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        let duration = args.u32_or("duration", 0)?;
        poll_again(ctx, &self.scheduler, self.interval, duration);
        Ok(true)
    }
}

struct Confirm {
    dialogs: Arc<dyn Dialogs>,
}

impl CommandHandler for Confirm {
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        let question = args.str_arg("question")?;
        let title = args.opt_str("title");
        let count = args.u32_or("count", 0)? as usize;

        let resume = ctx.pause();
        self.dialogs.confirm(
            question,
            title,
            Box::new(move |yes| resume.resume(if yes { 0 } else { count })),
        );
        Ok(true)
    }
}

struct WaitFor {
    sandbox: Arc<dyn ScriptSandbox>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
}

impl CommandHandler for WaitFor {
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        let condition = args.str_arg("condition")?;
        let tries = args.u32_or("tries", 0)?;

        if self.sandbox.evaluate(condition).map_err(HandlerError::Sandbox)? {
            return Ok(true);
        }
        if !poll_again(ctx, &self.scheduler, self.interval, tries) {
            tracing::warn!(condition, tries, "Condition still false, giving up");
        }
        Ok(true)
    }
}

struct CssWait {
    stylesheets: Arc<dyn Stylesheets>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
}

impl CommandHandler for CssWait {
    fn handle(&self, args: &CommandArgs, ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        let tries = args.u32_or("tries", 0)?;
        // a sheet with zero rules counts as not loaded yet
        let loaded = self.stylesheets.rule_counts().iter().all(|count| *count > 0);
        if loaded {
            return Ok(true);
        }
        if !poll_again(ctx, &self.scheduler, self.interval, tries) {
            tracing::warn!(tries, "Stylesheets still loading, giving up");
        }
        Ok(true)
    }
}

struct DatabagSet {
    databags: Arc<DataBags>,
}

impl CommandHandler for DatabagSet {
    fn handle(&self, args: &CommandArgs, _ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        let Some(Value::Object(bags)) = args.get("values") else {
            return Err(HandlerError::InvalidArguments {
                name: "values".to_string(),
                reason: "expected an object of bags".to_string(),
            });
        };
        for (bag, values) in bags {
            match values {
                Value::Object(values) => self.databags.merge(bag, values.clone()),
                _ => tracing::warn!(bag = %bag, "Ignoring databag update that is not an object"),
            }
        }
        Ok(true)
    }
}

struct DatabagClear {
    databags: Arc<DataBags>,
}

impl CommandHandler for DatabagClear {
    fn handle(&self, args: &CommandArgs, _ctx: &mut CommandContext<'_>) -> Result<bool, HandlerError> {
        self.databags.clear(args.str_arg("bag")?);
        Ok(true)
    }
}
