//! # Sandbox: Ephemeral Build Directories for Probe Programs
//!
//! **Role**: Everything that touches the Go toolchain or the disk on behalf of a probe.
//!
//! **Core Types**:
//! - `Sandbox`: a `depstub_reflect_*` directory owned by exactly one attempt, removed on drop.
//! - `Toolchain` / `GoToolchain`: `go build`, probe execution and `go list`.
//! - `ProbeRunner`: the staged build → run → decode protocol, with location fallback.
//!
//! **Manifest lookup** walks parent directories for `go.mod`; see [`manifest`].

mod dir;
pub mod manifest;
pub mod runner;
pub mod toolchain;

pub use dir::Sandbox;
pub use manifest::{find_manifest, same_manifest, GoModule};
pub use runner::{AttemptError, Location, ManifestPolicy, ProbeRunner};
pub use toolchain::{GoToolchain, Toolchain, ToolchainError};

/// Errors from sandbox directory operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Manifest error: {0}")]
    ManifestError(String),
}
