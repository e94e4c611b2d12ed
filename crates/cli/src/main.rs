use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{Config, DeclarationModel, Provenance};
use harness::{Harness, ReflectionRequest};
use sandbox::{GoToolchain, Toolchain};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use usage::{detect, format_all, GoPackagesLoader, PackageLoader, SyntaxLoader};

#[derive(Parser)]
#[command(name = "depstub", version)]
#[command(about = "Detect and reflect the external Go symbols a package uses", long_about = None)]
struct Cli {
    /// Go binary to drive (overrides depstub.toml and DEPSTUB_GO).
    #[arg(long, global = true)]
    go: Option<PathBuf>,
    /// Extra `go build` flags, space separated (overrides DEPSTUB_BUILD_FLAGS).
    #[arg(long, global = true, allow_hyphen_values = true)]
    build_flags: Option<String>,
    /// Reflect external types instead of collapsing them to `interface{}`.
    #[arg(long, global = true)]
    use_ext_types: bool,
    /// Working directory (defaults to the current directory).
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,
    /// More logging on stderr; repeat for more. DEPSTUB_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one re-extraction directive per external package used.
    Detect {
        /// Package pattern to inspect.
        #[arg(default_value = ".")]
        package: String,
        /// Parse sources with tree-sitter instead of type-checking with go/packages.
        #[arg(long)]
        offline: bool,
    },
    /// Reflect the given symbols of one package and print the declaration model.
    Extract {
        /// Import path of the package; `.` for the package in the working directory.
        import_path: String,
        /// Comma-separated type names (may be empty).
        types: String,
        /// Comma-separated function, variable and constant names.
        #[arg(default_value = "")]
        values: String,
        /// Print the reflection program and exit.
        #[arg(long, conflicts_with = "exec_only")]
        prog_only: bool,
        /// Run this pre-built reflection program instead of building one.
        #[arg(long, value_name = "BINARY")]
        exec_only: Option<PathBuf>,
    },
    /// Detect, then extract every detected package.
    Auto {
        /// Package pattern to inspect.
        #[arg(default_value = ".")]
        package: String,
        /// Parse sources with tree-sitter instead of type-checking with go/packages.
        #[arg(long)]
        offline: bool,
        /// Write `<import path>/model.json` files here instead of printing to stdout.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

/// One extracted package as emitted on stdout or to disk.
#[derive(Debug, Serialize)]
struct Record {
    provenance: Provenance,
    model: DeclarationModel,
}

fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!("ignoring .env: {e}");
        }
    }

    let dir = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let config = build_config(&cli, &dir)?;
    let toolchain = GoToolchain::from_config(&config);

    match &cli.command {
        Commands::Detect { package, offline } => cmd_detect(&toolchain, &config, &dir, package, *offline),
        Commands::Extract {
            import_path,
            types,
            values,
            prog_only,
            exec_only,
        } => cmd_extract(
            &toolchain,
            &config,
            &dir,
            import_path,
            types,
            values,
            *prog_only,
            exec_only.as_deref(),
        ),
        Commands::Auto {
            package,
            offline,
            out_dir,
        } => cmd_auto(&toolchain, &config, &dir, package, *offline, out_dir.as_deref()),
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env("DEPSTUB_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults → depstub.toml → environment → flags.
fn build_config(cli: &Cli, dir: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(dir)
        .context("Failed to load depstub.toml")?
        .with_env(|key| std::env::var(key).ok());
    if let Some(go) = &cli.go {
        config.go = go.clone();
    }
    if let Some(flags) = &cli.build_flags {
        config.build_flags = common::config::parse_build_flags(flags);
    }
    if cli.use_ext_types {
        config.use_ext_types = true;
    }
    Ok(config)
}

fn loader<'a>(toolchain: &'a GoToolchain, config: &'a Config, offline: bool) -> Box<dyn PackageLoader + 'a> {
    if offline {
        Box::new(SyntaxLoader::new())
    } else {
        Box::new(GoPackagesLoader::new(toolchain, config))
    }
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

fn cmd_detect(toolchain: &GoToolchain, config: &Config, dir: &Path, package: &str, offline: bool) -> anyhow::Result<()> {
    let loader = loader(toolchain, config, offline);
    let detection = detect(loader.as_ref(), package, dir)
        .with_context(|| format!("Failed to detect symbols used by {package}"))?;
    for line in format_all(&detection.types, &detection.values, &config.directive) {
        println!("{line}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn cmd_extract<T: Toolchain + ?Sized>(
    toolchain: &T,
    config: &Config,
    dir: &Path,
    import_path: &str,
    types: &str,
    values: &str,
    prog_only: bool,
    exec_only: Option<&Path>,
) -> anyhow::Result<()> {
    let import_path = resolve_import_path(toolchain, import_path, dir)?;
    let request = ReflectionRequest::from_lists(&import_path, types, values)?;
    let harness = Harness::new(toolchain, config, dir);

    if prog_only {
        print!("{}", harness.render(&request)?);
        return Ok(());
    }

    let model = match exec_only {
        Some(binary) => harness
            .run_prebuilt(binary)
            .with_context(|| format!("Failed to run {}", binary.display()))?,
        None => harness
            .extract(&request)
            .with_context(|| format!("Failed to extract from {import_path}"))?,
    };
    let record = Record {
        provenance: request.provenance(),
        model,
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// `.` means the package in `dir`; anything else is taken as an import path.
fn resolve_import_path<T: Toolchain + ?Sized>(toolchain: &T, import_path: &str, dir: &Path) -> anyhow::Result<String> {
    if import_path != "." {
        return Ok(import_path.to_string());
    }
    toolchain
        .import_path_of(".", dir)
        .with_context(|| format!("Failed to resolve the package in {}", dir.display()))
}

// ---------------------------------------------------------------------------
// auto
// ---------------------------------------------------------------------------

fn cmd_auto(
    toolchain: &GoToolchain,
    config: &Config,
    dir: &Path,
    package: &str,
    offline: bool,
    out_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let loader = loader(toolchain, config, offline);
    let detection = detect(loader.as_ref(), package, dir)
        .with_context(|| format!("Failed to detect symbols used by {package}"))?;
    let harness = Harness::new(toolchain, config, dir);

    let mut records = Vec::new();
    for path in detection.packages() {
        let request = ReflectionRequest::new(
            path,
            detection.types.get(path).to_vec(),
            detection.values.get(path).to_vec(),
        )?;
        let hint = detection.module_dirs.get(path).map(PathBuf::as_path);
        let model = harness
            .extract_with(&request, hint)
            .with_context(|| format!("Failed to extract from {path}"))?;
        records.push(Record {
            provenance: request.provenance(),
            model,
        });
    }
    tracing::info!(packages = records.len(), "extraction finished");

    match out_dir {
        Some(out_dir) => write_records(&records, out_dir),
        None => {
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}

const MODEL_FILE: &str = "model.json";

/// Writes `<out_dir>/<import path>/model.json` per record, all or nothing.
///
/// Records are staged inside `out_dir` first and then renamed into place; a failure
/// while publishing removes whatever was already published.
fn write_records(records: &[Record], out_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(".depstub_staging_")
        .tempdir_in(out_dir)
        .with_context(|| format!("Failed to create a staging directory in {}", out_dir.display()))?;

    for record in records {
        let dir = staging.path().join(&record.provenance.import_path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(MODEL_FILE);
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let mut published = Published::default();
    if let Err(e) = publish(records, staging.path(), out_dir, &mut published) {
        published.roll_back();
        return Err(e);
    }
    Ok(())
}

/// Files and directories created in `out_dir` so far.
#[derive(Default)]
struct Published {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Published {
    fn roll_back(self) {
        for file in self.files.iter().rev() {
            if let Err(e) = std::fs::remove_file(file) {
                tracing::warn!(path = %file.display(), error = %e, "failed to remove partial output");
            }
        }
        for dir in self.dirs.iter().rev().filter(|d| d.exists()) {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "failed to remove partial output");
            }
        }
    }
}

fn publish(records: &[Record], staging: &Path, out_dir: &Path, published: &mut Published) -> anyhow::Result<()> {
    for record in records {
        let relative = Path::new(&record.provenance.import_path);
        let dir = out_dir.join(relative);
        if let Some(first_new) = first_missing_dir(out_dir, relative) {
            published.dirs.push(first_new);
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let target = dir.join(MODEL_FILE);
        std::fs::rename(staging.join(relative).join(MODEL_FILE), &target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        published.files.push(target);
    }
    Ok(())
}

/// The outermost directory of `out_dir/relative` that does not exist yet.
fn first_missing_dir(out_dir: &Path, relative: &Path) -> Option<PathBuf> {
    let mut dir = out_dir.to_path_buf();
    for component in relative.components() {
        dir.push(component);
        if !dir.exists() {
            return Some(dir);
        }
    }
    None
}
