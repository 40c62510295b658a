//! Job lifecycle and progress events.
//!
//! The orchestrator publishes [`JobEvent`]s to the [`EventBus`]; presentation
//! layers hold a [`Subscription`] per job. Each event carries enough data to
//! rebuild UI state without polling.

pub mod bus;
pub mod event;

pub use bus::{EventBus, Subscription};
pub use event::{ErrorKind, JobEvent, JobId, LogLevel};
