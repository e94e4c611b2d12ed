//! Full type-checking through `golang.org/x/tools/go/packages`.
//!
//! A small Go program is built in a sandbox and run against the consumer directory; it
//! dumps every `TypesInfo.Uses` entry of the loaded packages as JSON.

use crate::loader::{CheckedPackage, LoadError, PackageLoader};
use common::Config;
use sandbox::{Location, ManifestPolicy, ProbeRunner, Toolchain};
use std::path::Path;
use tracing::debug;

const LOADER_SOURCE: &str = r#"package main

import (
	"encoding/json"
	"flag"
	"fmt"
	"go/types"
	"os"

	"golang.org/x/tools/go/packages"
)

var (
	dir     = flag.String("dir", ".", "Directory to load from.")
	pattern = flag.String("pattern", ".", "Package pattern to load.")
	output  = flag.String("output", "", "The output file name, or empty to use stdout.")
)

type namedType struct {
	Package string `json:"package"`
	Name    string `json:"name"`
}

type receiver struct {
	Named     *namedType `json:"named,omitempty"`
	Interface bool       `json:"interface"`
}

type object struct {
	Package  *string    `json:"package"`
	Name     string     `json:"name"`
	Exported bool       `json:"exported"`
	Kind     string     `json:"kind"`
	Named    *namedType `json:"named,omitempty"`
	IsField  bool       `json:"is_field,omitempty"`
	Receiver *receiver  `json:"receiver,omitempty"`
}

type result struct {
	Path       string            `json:"path"`
	Errors     []string          `json:"errors"`
	Uses       []object          `json:"uses"`
	ModuleDirs map[string]string `json:"module_dirs"`
}

func namedOf(t types.Type) *namedType {
	t = types.Unalias(t)
	if p, ok := t.(*types.Pointer); ok {
		t = types.Unalias(p.Elem())
	}
	n, ok := t.(*types.Named)
	if !ok || n.Obj() == nil {
		return nil
	}
	nt := &namedType{Name: n.Obj().Name()}
	if n.Obj().Pkg() != nil {
		nt.Package = n.Obj().Pkg().Path()
	}
	return nt
}

func describe(obj types.Object) object {
	o := object{Name: obj.Name(), Exported: obj.Exported()}
	if obj.Pkg() != nil {
		path := obj.Pkg().Path()
		o.Package = &path
	}
	switch obj := obj.(type) {
	case *types.TypeName:
		o.Kind = "type_name"
		o.Named = namedOf(obj.Type())
	case *types.Const:
		o.Kind = "const"
	case *types.Var:
		o.Kind = "var"
		o.IsField = obj.IsField()
	case *types.Func:
		o.Kind = "func"
		if sig, ok := obj.Type().(*types.Signature); ok && sig.Recv() != nil {
			recv := sig.Recv().Type()
			o.Receiver = &receiver{Named: namedOf(recv), Interface: types.IsInterface(recv)}
		}
	case *types.Builtin:
		o.Kind = "builtin"
	case *types.PkgName:
		o.Kind = "pkg_name"
	case *types.Label:
		o.Kind = "label"
	case *types.Nil:
		o.Kind = "nil"
	default:
		o.Kind = fmt.Sprintf("%T", obj)
	}
	return o
}

func main() {
	flag.Parse()

	cfg := &packages.Config{
		Mode: packages.LoadSyntax | packages.NeedModule,
		Dir:  *dir,
	}
	pkgs, err := packages.Load(cfg, *pattern)
	if err != nil {
		fmt.Fprintf(os.Stderr, "packages.Load: %v\n", err)
		os.Exit(1)
	}
	if len(pkgs) == 0 {
		fmt.Fprintf(os.Stderr, "no packages matched %q\n", *pattern)
		os.Exit(1)
	}

	res := result{Path: pkgs[0].PkgPath, Errors: []string{}, Uses: []object{}, ModuleDirs: map[string]string{}}
	packages.Visit(pkgs, nil, func(p *packages.Package) {
		for _, e := range p.Errors {
			res.Errors = append(res.Errors, e.Error())
		}
		if p.Module != nil && p.Module.Dir != "" {
			res.ModuleDirs[p.PkgPath] = p.Module.Dir
		}
	})
	for _, p := range pkgs {
		if p.TypesInfo == nil {
			continue
		}
		for _, obj := range p.TypesInfo.Uses {
			res.Uses = append(res.Uses, describe(obj))
		}
	}

	outfile := os.Stdout
	if len(*output) != 0 {
		f, err := os.Create(*output)
		if err != nil {
			fmt.Fprintf(os.Stderr, "failed to open output file %q: %v\n", *output, err)
			os.Exit(1)
		}
		outfile = f
	}
	if err := json.NewEncoder(outfile).Encode(res); err != nil {
		fmt.Fprintf(os.Stderr, "json encode: %v\n", err)
		os.Exit(1)
	}
	if outfile != os.Stdout {
		if err := outfile.Close(); err != nil {
			fmt.Fprintf(os.Stderr, "failed to close output file %q: %v\n", *output, err)
			os.Exit(1)
		}
	}
}
"#;

const LOADER_MODULE: &str = "depstubloader";

/// [`PackageLoader`] that type-checks with the Go toolchain.
pub struct GoPackagesLoader<'a, T: Toolchain + ?Sized> {
    toolchain: &'a T,
    config: &'a Config,
}

impl<'a, T: Toolchain + ?Sized> GoPackagesLoader<'a, T> {
    pub fn new(toolchain: &'a T, config: &'a Config) -> Self {
        Self { toolchain, config }
    }

    pub fn source() -> &'static str {
        LOADER_SOURCE
    }

    /// Manifest used when the consumer's own module cannot build the loader.
    pub fn synthesized_manifest(&self) -> String {
        let mut manifest = format!("module {LOADER_MODULE}\n\ngo 1.22\n");
        if let Some(version) = &self.config.tools_version {
            manifest.push_str(&format!("\nrequire golang.org/x/tools {version}\n"));
        }
        manifest
    }

    fn locations(&self, dir: &Path) -> Vec<Location> {
        vec![
            Location::new("working directory", Some(dir.to_path_buf()), ManifestPolicy::Enclosing),
            Location::new(
                "temp directory",
                None,
                ManifestPolicy::Synthesized(self.synthesized_manifest()),
            ),
        ]
    }
}

impl<T: Toolchain + ?Sized> PackageLoader for GoPackagesLoader<'_, T> {
    fn load(&self, pattern: &str, dir: &Path) -> Result<CheckedPackage, LoadError> {
        let dir = dunce::canonicalize(dir)?;
        let args = vec![
            "-dir".to_string(),
            dir.display().to_string(),
            "-pattern".to_string(),
            pattern.to_string(),
        ];
        let package = ProbeRunner::new(self.toolchain).first_success(
            LOADER_SOURCE,
            &self.locations(&dir),
            &args,
            |bytes| serde_json::from_slice::<CheckedPackage>(bytes).map_err(|e| e.to_string()),
        )?;
        debug!(
            path = %package.path,
            uses = package.uses.len(),
            errors = package.errors.len(),
            "packages loaded"
        );
        Ok(package)
    }
}
