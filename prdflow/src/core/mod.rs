//! Core domain model types for prdflow.
//!
//! This module contains the fundamental types used throughout the service:
//! - Run and stage identifiers
//! - Run and stage status enums
//! - The run model with its stage results
//! - Structured agent output and lifecycle events

mod event;
mod identity;
mod output;
mod run;
mod status;

pub use event::RunEvent;
pub use identity::{RunId, StageId};
pub use output::StructuredOutput;
pub use run::{Run, StageResult};
pub use status::{RunStatus, StageStatus};
