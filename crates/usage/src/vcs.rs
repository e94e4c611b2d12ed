//! Version-control root resolution for import paths.
//!
//! Static host table only: well-known hosting services and paths carrying an explicit
//! VCS suffix (`example.org/repo.git/sub`). Nothing is fetched over the network; an
//! unknown host resolves to `None` and callers fall back to path-prefix comparison.

use regex::Regex;
use std::sync::OnceLock;

/// The repository an import path lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    /// Import path prefix naming the repository root.
    pub root: String,
    pub vcs: &'static str,
}

struct Host {
    prefix: &'static str,
    vcs: &'static str,
    pattern: &'static str,
}

const HOSTS: &[Host] = &[
    Host {
        prefix: "github.com/",
        vcs: "git",
        pattern: r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[\p{L}0-9_.\-]+)*$",
    },
    Host {
        prefix: "bitbucket.org/",
        vcs: "git",
        pattern: r"^(?P<root>bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "gitlab.com/",
        vcs: "git",
        pattern: r"^(?P<root>gitlab\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "launchpad.net/",
        vcs: "bzr",
        pattern: r"^(?P<root>launchpad\.net/(([A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)?|~[A-Za-z0-9_.\-]+/(\+junk|[A-Za-z0-9_.\-]+)/[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "hub.jazz.net/",
        vcs: "git",
        pattern: r"^(?P<root>hub\.jazz\.net/git/[a-z0-9]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "git.apache.org/",
        vcs: "git",
        pattern: r"^(?P<root>git\.apache\.org/[a-z0-9_.\-]+\.git)(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "golang.org/x/",
        vcs: "git",
        pattern: r"^(?P<root>golang\.org/x/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
    },
    Host {
        prefix: "gopkg.in/",
        vcs: "git",
        pattern: r"^(?P<root>gopkg\.in/([A-Za-z0-9_\-]+/)?[A-Za-z0-9_\-]+\.v[0-9]+)(/[A-Za-z0-9_.\-]+)*$",
    },
];

/// Any host, with the VCS named by an explicit suffix on the repository element.
const VCS_SUFFIX: &str = r"^(?P<root>(?P<repo>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?(/~?[A-Za-z0-9_.\-]+)+?)\.(?P<vcs>bzr|fossil|git|hg|svn))(/~?[A-Za-z0-9_.\-]+)*$";

static HOST_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
static VCS_SUFFIX_REGEX: OnceLock<Regex> = OnceLock::new();

fn host_regexes() -> &'static [Regex] {
    HOST_REGEXES.get_or_init(|| {
        HOSTS
            .iter()
            .map(|h| Regex::new(h.pattern).expect("Invalid host pattern"))
            .collect()
    })
}

fn vcs_suffix_regex() -> &'static Regex {
    VCS_SUFFIX_REGEX.get_or_init(|| Regex::new(VCS_SUFFIX).expect("Invalid VCS suffix pattern"))
}

/// Resolves the repository root of `import_path` from the static host table.
///
/// ```
/// # use usage::vcs::repo_root_for_import_path;
/// let root = repo_root_for_import_path("github.com/user/project/sub/pkg").unwrap();
/// assert_eq!(root.root, "github.com/user/project");
/// assert!(repo_root_for_import_path("fmt").is_none());
/// ```
pub fn repo_root_for_import_path(import_path: &str) -> Option<RepoRoot> {
    if common::is_standard_import_path(import_path) || import_path.contains("...") {
        return None;
    }

    for (host, re) in HOSTS.iter().zip(host_regexes()) {
        if !import_path.starts_with(host.prefix) {
            continue;
        }
        return re.captures(import_path).map(|caps| RepoRoot {
            root: caps["root"].to_string(),
            vcs: host.vcs,
        });
    }

    let caps = vcs_suffix_regex().captures(import_path)?;
    let vcs = match &caps["vcs"] {
        "bzr" => "bzr",
        "fossil" => "fossil",
        "git" => "git",
        "hg" => "hg",
        _ => "svn",
    };
    Some(RepoRoot {
        root: caps["root"].to_string(),
        vcs,
    })
}

/// `true` if both paths resolve to the same repository root.
pub fn same_repo(a: &str, b: &str) -> bool {
    match (repo_root_for_import_path(a), repo_root_for_import_path(b)) {
        (Some(a), Some(b)) => a.root == b.root,
        _ => false,
    }
}
