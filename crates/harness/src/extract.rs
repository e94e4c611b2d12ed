use crate::probe::{render_probe, ProbeOptions};
use crate::{HarnessError, ReflectionRequest};
use common::model::{decode, DeclarationModel};
use common::Config;
use sandbox::{find_manifest, same_manifest, Location, ManifestPolicy, ProbeRunner, Toolchain};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Runs reflection probes for requests against one working directory.
pub struct Harness<'a, T: Toolchain + ?Sized> {
    toolchain: &'a T,
    config: &'a Config,
    working_dir: PathBuf,
}

impl<'a, T: Toolchain + ?Sized> Harness<'a, T> {
    pub fn new(toolchain: &'a T, config: &'a Config, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            config,
            working_dir: working_dir.into(),
        }
    }

    /// The probe source for `request`, without building anything.
    pub fn render(&self, request: &ReflectionRequest) -> Result<String, HarnessError> {
        render_probe(
            request,
            ProbeOptions {
                model_package: &self.config.model_package,
                use_ext_types: self.config.use_ext_types,
            },
        )
    }

    pub fn extract(&self, request: &ReflectionRequest) -> Result<DeclarationModel, HarnessError> {
        self.extract_with(request, None)
    }

    /// Extracts with an already-known package directory for the second location.
    ///
    /// Without a hint the directory is looked up through the toolchain.
    pub fn extract_with(
        &self,
        request: &ReflectionRequest,
        package_dir: Option<&Path>,
    ) -> Result<DeclarationModel, HarnessError> {
        let program = self.render(request)?;
        let locations = self.locations(request, package_dir);
        info!(
            import_path = request.import_path(),
            types = request.types().len(),
            values = request.values().len(),
            "extracting"
        );
        let model = ProbeRunner::new(self.toolchain).first_success(&program, &locations, &[], decode_model)?;
        Ok(model)
    }

    /// Runs a probe that was built elsewhere and decodes its output.
    pub fn run_prebuilt(&self, binary: &Path) -> Result<DeclarationModel, HarnessError> {
        let model = ProbeRunner::new(self.toolchain).run_binary(binary, &[], decode_model)?;
        Ok(model)
    }

    /// Build locations in the order they are tried: caller's directory, the package's own
    /// directory, then the OS temp dir.
    pub fn locations(&self, request: &ReflectionRequest, package_dir: Option<&Path>) -> Vec<Location> {
        let mut locations = vec![Location::new(
            "working directory",
            Some(self.working_dir.clone()),
            ManifestPolicy::Enclosing,
        )];

        let package_dir = package_dir
            .map(Path::to_path_buf)
            .or_else(|| self.toolchain.locate_package(request.import_path(), &self.working_dir));
        match package_dir {
            Some(dir) if self.has_distinct_manifest(&dir) => {
                // The package's own go.mod would declare the import path as the sandbox itself.
                let manifest = match find_manifest(&self.working_dir) {
                    Some(ours) => ManifestPolicy::Copy(ours),
                    None => ManifestPolicy::Omit,
                };
                locations.push(Location::new("package directory", Some(dir), manifest));
            }
            Some(dir) => {
                debug!(dir = %dir.display(), "package directory shares the caller's manifest, skipping");
            }
            None => debug!(import_path = request.import_path(), "package directory unknown, skipping"),
        }

        locations.push(Location::temp("temp directory"));
        locations
    }

    fn has_distinct_manifest(&self, dir: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        match (find_manifest(&self.working_dir), find_manifest(dir)) {
            (Some(ours), Some(theirs)) => !same_manifest(&ours, &theirs),
            (None, None) => false,
            _ => true,
        }
    }
}

fn decode_model(bytes: &[u8]) -> Result<DeclarationModel, String> {
    decode(bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox::ToolchainError;
    use std::cell::RefCell;
    use tempfile::TempDir;

    const TWO_METHODS: &str = r#"{"Name":"pkg","PkgPath":"example.org/pkg","Types":[
        {"Name":"ReadWriter","Kind":"interface","Methods":[
            {"Name":"Read","Signature":"func([]byte) (int, error)"},
            {"Name":"Write","Signature":"func([]byte) (int, error)"}]}]}"#;

    /// Builds fail under any of `broken`; the probe writes `payload` to `-output`.
    struct FakeGo {
        broken: Vec<PathBuf>,
        payload: String,
        package_dir: Option<PathBuf>,
        builds: RefCell<Vec<PathBuf>>,
        sources: RefCell<Vec<String>>,
        manifests: RefCell<Vec<Option<String>>>,
        runs: RefCell<usize>,
    }

    impl FakeGo {
        fn new(payload: &str) -> Self {
            Self {
                broken: Vec::new(),
                payload: payload.to_string(),
                package_dir: None,
                builds: RefCell::new(Vec::new()),
                sources: RefCell::new(Vec::new()),
                manifests: RefCell::new(Vec::new()),
                runs: RefCell::new(0),
            }
        }
    }

    impl Toolchain for FakeGo {
        fn build(&self, dir: &Path, source: &str, _output: &str) -> Result<(), ToolchainError> {
            self.builds.borrow_mut().push(dir.to_path_buf());
            self.sources
                .borrow_mut()
                .push(std::fs::read_to_string(dir.join(source)).unwrap());
            self.manifests
                .borrow_mut()
                .push(std::fs::read_to_string(dir.join("go.mod")).ok());
            if self.broken.iter().any(|b| dir.starts_with(b)) {
                return Err(ToolchainError::CommandFailed {
                    command: "go build".into(),
                    status: "exit status: 1".into(),
                    stderr: "no required module provides package".into(),
                });
            }
            Ok(())
        }

        fn run(&self, _binary: &Path, args: &[String]) -> Result<Vec<u8>, ToolchainError> {
            *self.runs.borrow_mut() += 1;
            std::fs::write(&args[1], &self.payload).unwrap();
            Ok(Vec::new())
        }

        fn list(&self, _: &str, _: &Path, _: &str) -> Result<String, ToolchainError> {
            Ok(self
                .package_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default())
        }
    }

    fn module(path: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), format!("module {path}\n")).unwrap();
        dir
    }

    fn request() -> ReflectionRequest {
        ReflectionRequest::from_lists("example.org/pkg", "ReadWriter", "").unwrap()
    }

    #[test]
    fn test_first_location_wins() {
        let cwd = module("example.org/consumer");
        let fake = FakeGo::new(TWO_METHODS);
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let model = harness.extract(&request()).unwrap();
        let rw = model.type_named("ReadWriter").unwrap();
        assert_eq!(rw.methods.len(), 2);
        assert_eq!(fake.builds.borrow().len(), 1);
        assert!(fake.builds.borrow()[0].starts_with(cwd.path()));
    }

    #[test]
    fn test_cascade_reaches_temp_and_leaves_nothing_behind() {
        let cwd = module("example.org/consumer");
        let dep = module("example.org/pkg");
        let mut fake = FakeGo::new(TWO_METHODS);
        fake.broken = vec![cwd.path().to_path_buf(), dep.path().to_path_buf()];
        fake.package_dir = Some(dep.path().to_path_buf());
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let model = harness.extract(&request()).unwrap();
        assert_eq!(model.type_named("ReadWriter").unwrap().methods.len(), 2);

        let builds = fake.builds.borrow();
        assert_eq!(builds.len(), 3);
        assert!(builds[0].starts_with(cwd.path()));
        assert!(builds[1].starts_with(dep.path()));
        assert!(!builds[2].starts_with(cwd.path()) && !builds[2].starts_with(dep.path()));
        for dir in [cwd.path(), dep.path()] {
            let leftovers: Vec<_> = std::fs::read_dir(dir)
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("depstub_reflect_"))
                .collect();
            assert!(leftovers.is_empty());
        }
    }

    #[test]
    fn test_package_dir_builds_with_callers_manifest() {
        let cwd = module("example.org/consumer");
        let dep = module("example.org/pkg");
        let mut fake = FakeGo::new(TWO_METHODS);
        fake.broken = vec![cwd.path().to_path_buf()];
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        harness.extract_with(&request(), Some(dep.path())).unwrap();
        let builds = fake.builds.borrow();
        assert_eq!(builds.len(), 2);
        assert!(builds[1].starts_with(dep.path()));
        let manifests = fake.manifests.borrow();
        assert_eq!(manifests[0].as_deref(), Some("module example.org/consumer\n"));
        assert_eq!(manifests[1].as_deref(), Some("module example.org/consumer\n"));
        assert!(fake.sources.borrow()[1].contains("pkg_ \"example.org/pkg\""));
    }

    #[test]
    fn test_temp_directory_builds_without_manifest() {
        let cwd = module("example.org/consumer");
        let dep = module("example.org/pkg");
        let mut fake = FakeGo::new(TWO_METHODS);
        fake.broken = vec![cwd.path().to_path_buf(), dep.path().to_path_buf()];
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        harness.extract_with(&request(), Some(dep.path())).unwrap();
        assert_eq!(fake.manifests.borrow()[2], None);
    }

    #[test]
    fn test_package_dir_with_same_manifest_is_skipped() {
        let cwd = module("example.org/consumer");
        let inner = cwd.path().join("vendored");
        std::fs::create_dir_all(&inner).unwrap();
        let fake = FakeGo::new(TWO_METHODS);
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let locations = harness.locations(&request(), Some(&inner));
        let labels: Vec<_> = locations.iter().map(|l| l.label).collect();
        assert_eq!(labels, ["working directory", "temp directory"]);
    }

    #[test]
    fn test_package_dir_hint_beats_lookup() {
        let cwd = module("example.org/consumer");
        let dep = module("example.org/pkg");
        let fake = FakeGo::new(TWO_METHODS);
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let locations = harness.locations(&request(), Some(dep.path()));
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[1].dir.as_deref(), Some(dep.path()));
    }

    #[test]
    fn test_undecodable_output_is_retried_then_surfaced() {
        let cwd = module("example.org/consumer");
        let fake = FakeGo::new("Reflection: not a model");
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let err = harness.extract(&request()).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::AttemptError(sandbox::AttemptError::DecodeError(_))
        ));
        assert_eq!(*fake.runs.borrow(), 2);
    }

    #[test]
    fn test_empty_model_is_a_decode_error() {
        let cwd = module("example.org/consumer");
        let fake = FakeGo::new("{}");
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let err = harness.extract(&request()).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::AttemptError(sandbox::AttemptError::DecodeError(_))
        ));
        assert_eq!(*fake.runs.borrow(), 2);
    }

    #[test]
    fn test_repeated_extraction_is_stable() {
        let cwd = module("example.org/consumer");
        let fake = FakeGo::new(TWO_METHODS);
        let config = Config::default();
        let harness = Harness::new(&fake, &config, cwd.path());

        let first = harness.extract(&request()).unwrap();
        let second = harness.extract(&request()).unwrap();
        assert_eq!(first, second);
        let builds = fake.builds.borrow();
        assert_ne!(builds[0], builds[1]);
        assert_eq!(fake.sources.borrow()[0], fake.sources.borrow()[1]);
    }

    #[test]
    fn test_prebuilt_binary_skips_synthesis() {
        let fake = FakeGo::new(TWO_METHODS);
        let config = Config::default();
        let harness = Harness::new(&fake, &config, std::env::temp_dir());

        let model = harness.run_prebuilt(Path::new("/opt/probes/prog.bin")).unwrap();
        assert_eq!(model.pkg_path, "example.org/pkg");
        assert!(fake.builds.borrow().is_empty());
    }

    #[test]
    fn test_render_uses_config() {
        let fake = FakeGo::new("");
        let config = Config {
            model_package: "example.org/fork/model".into(),
            use_ext_types: true,
            ..Config::default()
        };
        let harness = Harness::new(&fake, &config, std::env::temp_dir());
        let src = harness.render(&request()).unwrap();
        assert!(src.contains("model \"example.org/fork/model\""));
        assert!(src.contains("model.NewPackage(\"example.org/pkg\", true)"));
        assert!(fake.builds.borrow().is_empty());
    }
}
