use crate::manifest::{CHECKSUM_FILE, MANIFEST_FILE};
use crate::SandboxError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Exclusively owned working directory for one build attempt.
///
/// The directory is removed when the `Sandbox` is dropped, on every exit path
/// including unwinding. [`Sandbox::close`] does the same but reports failures.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub const PREFIX: &'static str = "depstub_reflect_";
    pub const SOURCE_FILE: &'static str = "prog.go";

    /// Creates a fresh directory inside `parent`, or inside the OS temp dir for `None`.
    pub fn create_in(parent: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(Self::PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// File name of the probe binary. Windows refuses to execute files without `.exe`.
    pub fn binary_name() -> &'static str {
        if cfg!(windows) {
            "prog.bin.exe"
        } else {
            "prog.bin"
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.path().join(Self::binary_name())
    }

    pub fn write_source(&self, contents: &str) -> Result<PathBuf, SandboxError> {
        let path = self.path().join(Self::SOURCE_FILE);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Copies `manifest` (and its sibling `go.sum`, when present) to the sandbox root.
    ///
    /// The source files are only read.
    pub fn copy_manifest(&self, manifest: &Path) -> Result<PathBuf, SandboxError> {
        if !manifest.is_file() {
            return Err(SandboxError::ManifestError(format!(
                "{} is not a regular file",
                manifest.display()
            )));
        }
        let target = self.path().join(MANIFEST_FILE);
        fs::copy(manifest, &target)?;

        if let Some(sum) = manifest.parent().map(|p| p.join(CHECKSUM_FILE)) {
            if sum.is_file() {
                fs::copy(&sum, self.path().join(CHECKSUM_FILE))?;
            }
        }
        Ok(target)
    }

    pub fn write_manifest(&self, contents: &str) -> Result<PathBuf, SandboxError> {
        let target = self.path().join(MANIFEST_FILE);
        fs::write(&target, contents)?;
        Ok(target)
    }

    /// Removes the directory now, surfacing any I/O failure.
    pub fn close(self) -> Result<(), SandboxError> {
        self.dir.close()?;
        Ok(())
    }
}
