//! # Prdflow
//!
//! A multi-agent pipeline service that turns a one-line product idea into
//! a product requirements bundle.
//!
//! Five agents run in a fixed order, each seeing the structured output of
//! the agents it depends on:
//!
//! - **Strategist**: market, problem and personas
//! - **Architect**: features, data model and tech stack
//! - **UX Writer**: user flows and microcopy
//! - **Mockup Designer**: screens built from a closed component vocabulary
//! - **Synthesizer**: metrics, risks and an execution plan
//!
//! A completed run is assembled into a Markdown PRD, a mockup
//! specification, an execution plan and the conversation transcript, and
//! served as a zip archive.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prdflow::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryRunStore::new());
//! let invoker = AgentInvoker::new(Arc::new(StubBackend::new()));
//! let orchestrator = Arc::new(Orchestrator::new(store, invoker));
//!
//! let run = orchestrator.create_run("A water intake tracker").await?;
//! let run = orchestrator.execute_run(&run.id).await?;
//! let bundle = orchestrator.bundle(&run.id)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod assembler;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{AgentInvoker, ModelBackend, StubBackend};
    pub use crate::assembler::{assemble, ArtifactBundle, ArtifactKind, BundleWriter, ZipBundleWriter};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::AppConfig;
    pub use crate::core::{Run, RunEvent, RunId, RunStatus, StageId, StageResult, StageStatus};
    pub use crate::errors::{PrdflowError, PipelineValidationError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{Orchestrator, RetryConfig};
    pub use crate::server::{router, AppState};
    pub use crate::store::{FileRunStore, InMemoryRunStore, RunStore};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
