//! Staged build-and-run protocol with location fallback.
//!
//! One attempt = create sandbox → write `prog.go` → place manifest → `go build` →
//! run with `-output <temp file>` → decode that file → remove sandbox. Locations are
//! tried strictly one after another; the first full success wins and only the last
//! failure is surfaced.

use crate::dir::Sandbox;
use crate::manifest::find_manifest;
use crate::toolchain::{Toolchain, ToolchainError};
use crate::SandboxError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the sandbox of one attempt gets its `go.mod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestPolicy {
    /// Copy the manifest enclosing the location's directory, if there is one.
    Enclosing,
    /// Copy this manifest, wherever the sandbox lives.
    Copy(PathBuf),
    /// Build without a manifest.
    Omit,
    /// Write the given manifest text.
    Synthesized(String),
}

/// A directory to build in, plus the manifest to build with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub label: &'static str,
    /// `None` means the OS temporary directory.
    pub dir: Option<PathBuf>,
    pub manifest: ManifestPolicy,
}

impl Location {
    pub fn new(label: &'static str, dir: Option<PathBuf>, manifest: ManifestPolicy) -> Self {
        Self {
            label,
            dir,
            manifest,
        }
    }

    /// The OS temporary directory, without a manifest.
    pub fn temp(label: &'static str) -> Self {
        Self::new(label, None, ManifestPolicy::Omit)
    }

    /// The manifest an attempt here would copy, if any.
    pub fn manifest_to_copy(&self) -> Option<PathBuf> {
        match (&self.manifest, &self.dir) {
            (ManifestPolicy::Enclosing, Some(dir)) => find_manifest(dir),
            (ManifestPolicy::Copy(manifest), _) => Some(manifest.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("Sandbox setup failed: {0}")]
    SandboxError(#[from] SandboxError),
    #[error("Build failed: {0}")]
    BuildError(#[source] ToolchainError),
    #[error("Probe run failed: {0}")]
    RunError(#[source] ToolchainError),
    #[error("Undecodable probe output: {0}")]
    DecodeError(String),
    #[error("No build location available")]
    NoLocation,
}

/// Drives [`Toolchain`] through the staged protocol.
pub struct ProbeRunner<'a, T: Toolchain + ?Sized> {
    toolchain: &'a T,
}

impl<'a, T: Toolchain + ?Sized> ProbeRunner<'a, T> {
    pub fn new(toolchain: &'a T) -> Self {
        Self { toolchain }
    }

    /// Tries each location in order and returns the first decoded result.
    pub fn first_success<R, F>(
        &self,
        program: &str,
        locations: &[Location],
        args: &[String],
        decode: F,
    ) -> Result<R, AttemptError>
    where
        F: Fn(&[u8]) -> Result<R, String>,
    {
        let mut last = AttemptError::NoLocation;
        for (i, location) in locations.iter().enumerate() {
            match self.attempt(program, location, args, &decode) {
                Ok(result) => {
                    info!(location = location.label, "probe succeeded");
                    return Ok(result);
                }
                Err(e) => {
                    if i + 1 < locations.len() {
                        warn!(location = location.label, error = %e, "probe attempt failed, trying next location");
                    }
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// One full attempt at `location`. The sandbox is gone when this returns.
    pub fn attempt<R, F>(
        &self,
        program: &str,
        location: &Location,
        args: &[String],
        decode: F,
    ) -> Result<R, AttemptError>
    where
        F: Fn(&[u8]) -> Result<R, String>,
    {
        let sandbox = Sandbox::create_in(location.dir.as_deref())?;
        debug!(location = location.label, dir = %sandbox.path().display(), "sandbox created");

        let result = self.build_and_run(&sandbox, program, location, args, decode);

        let dir = sandbox.path().to_path_buf();
        if let Err(e) = sandbox.close() {
            warn!(dir = %dir.display(), error = %e, "failed to remove sandbox");
        }
        result
    }

    fn build_and_run<R, F>(
        &self,
        sandbox: &Sandbox,
        program: &str,
        location: &Location,
        args: &[String],
        decode: F,
    ) -> Result<R, AttemptError>
    where
        F: Fn(&[u8]) -> Result<R, String>,
    {
        sandbox.write_source(program)?;

        match &location.manifest {
            ManifestPolicy::Enclosing | ManifestPolicy::Copy(_) => {
                if let Some(manifest) = location.manifest_to_copy() {
                    sandbox.copy_manifest(&manifest)?;
                    debug!(manifest = %manifest.display(), "manifest copied");
                }
            }
            ManifestPolicy::Synthesized(text) => {
                sandbox.write_manifest(text)?;
                debug!("manifest synthesized");
            }
            ManifestPolicy::Omit => {}
        }

        self.toolchain
            .build(sandbox.path(), Sandbox::SOURCE_FILE, Sandbox::binary_name())
            .map_err(AttemptError::BuildError)?;
        debug!("probe built");

        self.run_binary(&sandbox.binary_path(), args, decode)
    }

    /// Runs a built probe with `-output <fresh temp file>` and decodes that file.
    pub fn run_binary<R, F>(&self, binary: &Path, args: &[String], decode: F) -> Result<R, AttemptError>
    where
        F: Fn(&[u8]) -> Result<R, String>,
    {
        let output = tempfile::Builder::new()
            .prefix("depstub_out_")
            .tempfile()
            .map_err(SandboxError::from)?
            .into_temp_path();

        let mut full_args = vec!["-output".to_string(), output.display().to_string()];
        full_args.extend(args.iter().cloned());

        self.toolchain
            .run(binary, &full_args)
            .map_err(AttemptError::RunError)?;
        debug!(binary = %binary.display(), "probe ran");

        let bytes = std::fs::read(&output).map_err(SandboxError::from)?;
        decode(&bytes).map_err(AttemptError::DecodeError)
    }
}
