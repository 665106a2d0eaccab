//! Agent invocation.
//!
//! An agent is one model call made on behalf of a stage. This module holds
//! the [`ModelBackend`] seam, the [`AgentInvoker`] that renders prompts and
//! checks answers against the stage schema, and the concrete backends.

mod backend;
mod context;
mod invoker;
mod parse;
mod stub;
mod template;

#[cfg(feature = "http-backends")]
mod anthropic;
#[cfg(feature = "http-backends")]
mod openai;

pub use backend::{BackendError, CompletionRequest, HttpBackendConfig, ModelBackend};
pub use context::{StageContext, CONVERSATION_KEY, IDEA_KEY};
pub use invoker::{AgentInvoker, DEFAULT_CALL_TIMEOUT};
pub use parse::{extract_json, parse_output};
pub use stub::{canned_template, DomainVocabulary, StubBackend};
pub use template::{placeholders, render as render_template};

#[cfg(feature = "http-backends")]
pub use anthropic::{AnthropicBackend, ANTHROPIC_BASE_URL};
#[cfg(feature = "http-backends")]
pub use openai::{OpenAiBackend, OPENAI_BASE_URL};

#[cfg(test)]
pub(crate) use backend::MockModelBackend;
