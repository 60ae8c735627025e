//! Adapters implementing the outbound ports.

mod event_bus;

pub use event_bus::InMemoryEventBus;
