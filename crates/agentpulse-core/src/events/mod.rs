//! Event bus - structured telemetry events fanned out to handlers

mod bus;
mod handlers;

pub use bus::{EventBus, EventStats};
pub use handlers::{
    CallbackEventHandler, EventHandler, FilteredEventHandler, LoggingEventHandler,
    MemoryEventHandler,
};
