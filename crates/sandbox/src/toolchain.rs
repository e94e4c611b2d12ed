//! The external build toolchain, behind a trait so tests can substitute it.

use common::Config;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("Failed to spawn {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Operations the pipeline needs from the Go toolchain.
///
/// All calls block until the child process exits.
pub trait Toolchain {
    /// Compiles `source` inside `dir` into the executable `output` (relative to `dir`).
    fn build(&self, dir: &Path, source: &str, output: &str) -> Result<(), ToolchainError>;

    /// Runs a built probe with `args`, returning its captured stdout.
    fn run(&self, binary: &Path, args: &[String]) -> Result<Vec<u8>, ToolchainError>;

    /// Evaluates `go list -f <template> <pattern>` from `dir`.
    fn list(&self, pattern: &str, dir: &Path, template: &str) -> Result<String, ToolchainError>;

    /// Source directory of the package `import_path`, as seen from `from`.
    fn locate_package(&self, import_path: &str, from: &Path) -> Option<PathBuf> {
        match self.list(import_path, from, "{{.Dir}}") {
            Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
            Ok(_) => None,
            Err(e) => {
                debug!(import_path, error = %e, "package directory lookup failed");
                None
            }
        }
    }

    /// Import path of the package matched by `pattern` (e.g. `.`) from `dir`.
    fn import_path_of(&self, pattern: &str, dir: &Path) -> Result<String, ToolchainError> {
        self.list(pattern, dir, "{{.ImportPath}}")
    }
}

/// [`Toolchain`] backed by a real `go` binary.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: PathBuf,
    build_flags: Vec<String>,
}

impl GoToolchain {
    pub fn new(go: impl Into<PathBuf>, build_flags: Vec<String>) -> Self {
        Self {
            go: go.into(),
            build_flags,
        }
    }

    /// Resolves the configured binary through `PATH`, keeping the raw name if lookup fails.
    pub fn from_config(config: &Config) -> Self {
        let go = match which::which(&config.go) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(go = %config.go.display(), error = %e, "go binary not found on PATH");
                config.go.clone()
            }
        };
        Self::new(go, config.build_flags.clone())
    }

    pub fn go(&self) -> &Path {
        &self.go
    }

    /// Arguments of the `go build` invocation for `source` → `output`.
    pub fn build_args(&self, source: &str, output: &str) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-mod=mod".to_string()];
        args.extend(self.build_flags.iter().cloned());
        args.extend(["-o".to_string(), output.to_string(), source.to_string()]);
        args
    }

    fn exec(&self, mut cmd: Command, program: &str, command_line: String) -> Result<Output, ToolchainError> {
        debug!(command = %command_line, "exec");
        let output = cmd.output().map_err(|source| ToolchainError::SpawnError {
            program: program.to_string(),
            source,
        })?;
        if !output.stderr.is_empty() {
            debug!(command = %command_line, stderr = %String::from_utf8_lossy(&output.stderr), "stderr");
        }
        if output.status.success() {
            Ok(output)
        } else {
            Err(ToolchainError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Toolchain for GoToolchain {
    fn build(&self, dir: &Path, source: &str, output: &str) -> Result<(), ToolchainError> {
        let args = self.build_args(source, output);
        let mut cmd = Command::new(&self.go);
        cmd.args(&args).current_dir(dir);
        let command_line = format!("{} {}", self.go.display(), args.join(" "));
        self.exec(cmd, &self.go.display().to_string(), command_line)?;
        Ok(())
    }

    fn run(&self, binary: &Path, args: &[String]) -> Result<Vec<u8>, ToolchainError> {
        let mut cmd = Command::new(binary);
        cmd.args(args);
        if let Some(dir) = binary.parent() {
            cmd.current_dir(dir);
        }
        let command_line = format!("{} {}", binary.display(), args.join(" "));
        let output = self.exec(cmd, &binary.display().to_string(), command_line)?;
        Ok(output.stdout)
    }

    fn list(&self, pattern: &str, dir: &Path, template: &str) -> Result<String, ToolchainError> {
        let mut cmd = Command::new(&self.go);
        cmd.args(["list", "-f", template, pattern]).current_dir(dir);
        let command_line = format!("{} list -f {} {}", self.go.display(), template, pattern);
        let output = self.exec(cmd, &self.go.display().to_string(), command_line)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
