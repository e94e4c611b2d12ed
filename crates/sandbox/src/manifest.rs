//! Module manifest (`go.mod`) discovery and parsing.

use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "go.mod";
pub const CHECKSUM_FILE: &str = "go.sum";

/// The parts of a `go.mod` this workspace cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoModule {
    /// Module path (e.g., "github.com/user/project")
    pub path: String,
}

/// Finds `go.mod` by walking up from `dir` (or from the parent, if `dir` is a file).
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let start = if dir.is_file() { dir.parent()? } else { dir };
    start
        .ancestors()
        .map(|d| d.join(MANIFEST_FILE))
        .find(|candidate| candidate.is_file())
}

/// Returns `true` if both paths name the same manifest file on disk.
pub fn same_manifest(a: &Path, b: &Path) -> bool {
    match (dunce::canonicalize(a), dunce::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn read_module(manifest: &Path) -> std::io::Result<Option<GoModule>> {
    let content = std::fs::read_to_string(manifest)?;
    Ok(parse_go_mod_content(&content))
}

/// Parses the `module` directive out of `go.mod` text.
pub fn parse_go_mod_content(content: &str) -> Option<GoModule> {
    content
        .lines()
        .map(|line| strip_comment(line).trim())
        .find_map(|line| {
            let rest = line.strip_prefix("module")?;
            rest.starts_with(char::is_whitespace)
                .then(|| unquote(rest.trim()).to_string())
        })
        .filter(|path| !path.is_empty())
        .map(|path| GoModule { path })
}

fn strip_comment(line: &str) -> &str {
    line.split_once("//").map_or(line, |(code, _)| code)
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(s)
}
