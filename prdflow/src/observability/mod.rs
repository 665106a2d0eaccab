//! Observability utilities.

mod logging;
mod wide_events;

pub use logging::{init_logging, log_filter, DEFAULT_LOG_FILTER};
pub use wide_events::WideEventEmitter;
