//! Event sink system for observability.
//!
//! The orchestrator reports every run and stage transition to an
//! [`EventSink`]. Sinks never influence control flow.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
