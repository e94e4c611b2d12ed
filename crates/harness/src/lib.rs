//! # Harness: Out-of-Process Reflection
//!
//! **Role**: Turns a validated [`ReflectionRequest`] into a [`common::DeclarationModel`]
//! by building and running a probe program against the real package.
//!
//! **Protocol**: render probe → try working directory → package directory → temp directory.
//! Each try runs in its own [`sandbox::Sandbox`]; see [`Harness::locations`].
//!
//! **Fast paths**: [`Harness::render`] stops after synthesis, [`Harness::run_prebuilt`]
//! skips it.

mod extract;
pub mod probe;
mod request;

pub use extract::Harness;
pub use probe::{render_probe, ProbeOptions};
pub use request::{split_list, ReflectionRequest};

/// Errors from reflection requests.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Invalid request: {0}")]
    ValidationError(#[from] common::ValidationError),
    #[error("Probe synthesis failed: {0}")]
    SynthesisError(String),
    #[error(transparent)]
    AttemptError(#[from] sandbox::AttemptError),
}
