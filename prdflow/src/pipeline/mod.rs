//! Pipeline execution.
//!
//! This module provides:
//! - The orchestrator driving runs through the stage table
//! - The context accumulator threaded between stages
//! - Per-stage retry policy with backoff and jitter

mod context;
mod integration_tests;
mod orchestrator;
mod retry;

pub use context::ContextAccumulator;
pub use orchestrator::{validate_idea, Orchestrator, DEFAULT_CANCEL_REASON, MAX_IDEA_CHARS};
pub use retry::{
    should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState,
};
