//! Reflection probe source synthesis.
//!
//! The probe imports the target under the alias `pkg_`, feeds every requested symbol to
//! the declaration-model builder, and JSON-encodes the packed model to `-output`.

use crate::{HarnessError, ReflectionRequest};
use std::fmt::Write;

pub const PACKAGE_ALIAS: &str = "pkg_";

/// Inputs of one probe beyond the request itself.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions<'a> {
    pub model_package: &'a str,
    pub use_ext_types: bool,
}

/// Renders the Go source of the reflection probe for `request`.
pub fn render_probe(request: &ReflectionRequest, options: ProbeOptions<'_>) -> Result<String, HarnessError> {
    check_import_path(request.import_path())?;
    check_import_path(options.model_package)?;

    let import_path = go_string(request.import_path())?;
    let model_package = go_string(options.model_package)?;

    let mut src = String::new();
    write_probe(&mut src, request, options, &import_path, &model_package)
        .map_err(|e| HarnessError::SynthesisError(e.to_string()))?;
    Ok(src)
}

fn write_probe(
    src: &mut String,
    request: &ReflectionRequest,
    options: ProbeOptions<'_>,
    import_path: &str,
    model_package: &str,
) -> std::fmt::Result {
    writeln!(src, "package main")?;
    writeln!(src)?;
    writeln!(src, "import (")?;
    for std_import in ["encoding/json", "flag", "fmt", "os", "reflect"] {
        writeln!(src, "\t{std_import:?}")?;
    }
    writeln!(src)?;
    writeln!(src, "\tmodel {model_package}")?;
    writeln!(src)?;
    writeln!(src, "\t{PACKAGE_ALIAS} {import_path}")?;
    writeln!(src, ")")?;
    writeln!(src)?;
    writeln!(
        src,
        "var output = flag.String(\"output\", \"\", \"The output file name, or empty to use stdout.\")"
    )?;
    writeln!(src)?;
    writeln!(src, "func main() {{")?;
    writeln!(src, "\tflag.Parse()")?;
    writeln!(src)?;

    writeln!(src, "\ttypes := []struct {{")?;
    writeln!(src, "\t\tsym string")?;
    writeln!(src, "\t\ttyp reflect.Type")?;
    writeln!(src, "\t}}{{")?;
    for name in request.types() {
        writeln!(
            src,
            "\t\t{{{:?}, reflect.TypeOf((*{PACKAGE_ALIAS}.{name})(nil)).Elem()}},",
            name
        )?;
    }
    writeln!(src, "\t}}")?;
    writeln!(src)?;

    writeln!(src, "\tvalues := []struct {{")?;
    writeln!(src, "\t\tsym string")?;
    writeln!(src, "\t\tval reflect.Value")?;
    writeln!(src, "\t}}{{")?;
    for name in request.values() {
        writeln!(
            src,
            "\t\t{{{:?}, reflect.ValueOf({})}},",
            name,
            value_expression(name)
        )?;
    }
    writeln!(src, "\t}}")?;
    writeln!(src)?;

    writeln!(
        src,
        "\tpkg := model.NewPackage({import_path}, {})",
        options.use_ext_types
    )?;
    writeln!(src)?;
    writeln!(src, "\tfor _, t := range types {{")?;
    writeln!(src, "\t\tif err := pkg.AddType(t.sym, t.typ); err != nil {{")?;
    writeln!(src, "\t\t\tfmt.Fprintf(os.Stderr, \"Reflection: %v\\n\", err)")?;
    writeln!(src, "\t\t\tos.Exit(1)")?;
    writeln!(src, "\t\t}}")?;
    writeln!(src, "\t}}")?;
    writeln!(src, "\tfor _, v := range values {{")?;
    writeln!(src, "\t\tif err := pkg.AddValue(v.sym, v.val); err != nil {{")?;
    writeln!(src, "\t\t\tfmt.Fprintf(os.Stderr, \"Reflection: %v\\n\", err)")?;
    writeln!(src, "\t\t\tos.Exit(1)")?;
    writeln!(src, "\t\t}}")?;
    writeln!(src, "\t}}")?;
    writeln!(src)?;

    writeln!(src, "\toutfile := os.Stdout")?;
    writeln!(src, "\tif len(*output) != 0 {{")?;
    writeln!(src, "\t\tf, err := os.Create(*output)")?;
    writeln!(src, "\t\tif err != nil {{")?;
    writeln!(
        src,
        "\t\t\tfmt.Fprintf(os.Stderr, \"failed to open output file %q: %v\\n\", *output, err)"
    )?;
    writeln!(src, "\t\t\tos.Exit(1)")?;
    writeln!(src, "\t\t}}")?;
    writeln!(src, "\t\toutfile = f")?;
    writeln!(src, "\t}}")?;
    writeln!(
        src,
        "\tif err := json.NewEncoder(outfile).Encode(model.PackPkg(pkg)); err != nil {{"
    )?;
    writeln!(src, "\t\tfmt.Fprintf(os.Stderr, \"json encode: %v\\n\", err)")?;
    writeln!(src, "\t\tos.Exit(1)")?;
    writeln!(src, "\t}}")?;
    writeln!(src, "\tif outfile != os.Stdout {{")?;
    writeln!(src, "\t\tif err := outfile.Close(); err != nil {{")?;
    writeln!(
        src,
        "\t\t\tfmt.Fprintf(os.Stderr, \"failed to close output file %q: %v\\n\", *output, err)"
    )?;
    writeln!(src, "\t\t\tos.Exit(1)")?;
    writeln!(src, "\t\t}}")?;
    writeln!(src, "\t}}")?;
    writeln!(src, "}}")?;
    Ok(())
}

/// `Name` → `pkg_.Name`; `Type.Method` → the method expression `(*pkg_.Type).Method`.
fn value_expression(name: &str) -> String {
    match name.split_once('.') {
        Some((receiver, method)) => format!("(*{PACKAGE_ALIAS}.{receiver}).{method}"),
        None => format!("{PACKAGE_ALIAS}.{name}"),
    }
}

/// Quotes `s` as a Go interpreted string literal.
fn go_string(s: &str) -> Result<String, HarnessError> {
    serde_json::to_string(s).map_err(|e| HarnessError::SynthesisError(e.to_string()))
}

fn check_import_path(path: &str) -> Result<(), HarnessError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '"' | '`' | '\\' | '\'')
        });
    if bad {
        return Err(HarnessError::SynthesisError(format!(
            "{path:?} is not a usable import path"
        )));
    }
    Ok(())
}
