//! Testing utilities.
//!
//! A scripted model backend and run fixtures built from the canned stage
//! answers.

pub mod fixtures;
mod mocks;

pub use fixtures::{canned_response, completed_run, partial_run, WATER_INTAKE_IDEA};
pub use mocks::ScriptedBackend;
