//! Domain layer: captured events, the event bus and the command registry.
//!
//! Everything here is in-process and transport-agnostic. The bridge client
//! and any local consumer (an overlay, a test harness) share the same
//! [`EventBus`] and [`CommandRegistry`] handles.

pub mod command_registry;
pub mod context;
pub mod event;
pub mod event_bus;
pub mod event_id;

pub use command_registry::{CommandInfo, CommandOutcome, CommandRegistry, register_builtin_commands};
pub use context::ContextSnapshot;
pub use event::{
    BusEvent, CommandRecord, ErrorReport, EventData, EventKind, LogLevel, LogRecord,
    NavigationRecord, NetworkRecord, StateRecord,
};
pub use event_bus::{EventBus, Subscription};
pub use event_id::EventId;
