//! Named, introspectable commands that local and remote actors may invoke.
//!
//! [`CommandRegistry`] maps command names to asynchronous handlers. Both the
//! bridge client (remote `execute` requests) and in-process consumers call
//! [`CommandRegistry::execute`], so local and remote invocations share one
//! code path.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::event::CommandRecord;
use super::{EventBus, EventKind};

/// Boxed future returned by a command handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

type Handler = Arc<dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync>;

/// Public description of a registered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommandInfo {
    /// Unique command name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// Result of executing a command.
///
/// This is also the `result` object of an `executeResult` wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandOutcome {
    /// Whether the command completed successfully.
    pub success: bool,
    /// Failure cause, present when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Value returned by the handler, omitted when null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl CommandOutcome {
    /// Successful outcome carrying `value` (dropped when `null`).
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self {
            success: true,
            error: None,
            result: (!value.is_null()).then_some(value),
        }
    }

    /// Failed outcome with the given cause.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            result: None,
        }
    }
}

struct CommandDef {
    name: String,
    description: String,
    handler: Handler,
}

/// Registry of remotely invocable commands.
///
/// Cheap to clone; all clones share the same command table. Registration
/// order is preserved by [`CommandRegistry::list`], and re-registering a
/// name replaces the handler in place.
#[derive(Clone)]
pub struct CommandRegistry {
    bus: EventBus,
    commands: Arc<RwLock<Vec<CommandDef>>>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list())
            .finish_non_exhaustive()
    }
}

impl CommandRegistry {
    /// Creates an empty registry that reports executions on `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            commands: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Returns the bus executions are reported on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registers (or replaces) an asynchronous command handler.
    pub fn register<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        let def = CommandDef {
            name: name.into(),
            description: description.into(),
            handler,
        };

        let mut commands = self
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = commands.iter_mut().find(|c| c.name == def.name) {
            tracing::debug!(command = %def.name, "replacing command handler");
            *existing = def;
        } else {
            commands.push(def);
        }
    }

    /// Registers (or replaces) a synchronous command handler.
    pub fn register_sync<F>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) where
        F: Fn(Option<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(name, description, move |payload| {
            let handler = Arc::clone(&handler);
            async move { handler(payload) }
        });
    }

    /// Executes the command registered under `name`.
    ///
    /// Never fails: unknown names, handler errors and handler panics all
    /// produce a failed [`CommandOutcome`]. Every execution of a registered
    /// command emits a `command` event on the bus.
    pub async fn execute(&self, name: &str, payload: Option<Value>) -> CommandOutcome {
        let handler = self
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name == name)
            .map(|c| Arc::clone(&c.handler));

        let Some(handler) = handler else {
            return CommandOutcome::failure(format!("Unknown command: {name}"));
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| handler(payload.clone()))) {
            Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => CommandOutcome::ok(value),
                Ok(Err(err)) => CommandOutcome::failure(format!("{err:#}")),
                Err(_) => CommandOutcome::failure("command handler panicked"),
            },
            Err(_) => CommandOutcome::failure("command handler panicked"),
        };

        if let Some(error) = &outcome.error {
            tracing::debug!(command = name, %error, "command failed");
        }

        self.bus.emit(
            EventKind::Command,
            CommandRecord {
                name: name.to_string(),
                payload,
                success: outcome.success,
                error: outcome.error.clone(),
            },
        );

        outcome
    }

    /// Returns the registered commands in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<CommandInfo> {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| CommandInfo {
                name: c.name.clone(),
                description: c.description.clone(),
            })
            .collect()
    }

    /// Returns `true` if a command named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| c.name == name)
    }
}

/// Registers the commands every instrumented application exposes.
///
/// - `clearLogs`: empties the event buffer.
pub fn register_builtin_commands(registry: &CommandRegistry) {
    let bus = registry.bus().clone();
    registry.register_sync("clearLogs", "Clear the debug bus buffer", move |_| {
        bus.clear();
        Ok(Value::Null)
    });
}
