//! Re-extraction directives, one line per external package.

use common::{DirectiveStyle, UsageIndex};
use std::collections::BTreeSet;

/// Renders `<prefix> <path> <types> <values>` for one package.
///
/// Both lists are deduplicated and sorted first. An empty type list renders as `""` so
/// the value list keeps its position; an empty value list is dropped unless the style
/// asks for a placeholder.
///
/// ```
/// # use common::DirectiveStyle;
/// # use usage::directive::format_directive;
/// let style = DirectiveStyle { prefix: "directive".into(), empty_values_placeholder: false };
/// let line = format_directive("example.org/pkg", &["TypeA", "TypeA"], &["ConstB"], &style);
/// assert_eq!(line, "directive example.org/pkg TypeA ConstB");
/// ```
pub fn format_directive<S: AsRef<str>>(
    path: &str,
    types: &[S],
    values: &[S],
    style: &DirectiveStyle,
) -> String {
    let types = join_sorted(types);
    let values = join_sorted(values);

    let types = if types.is_empty() { "\"\"".to_string() } else { types };
    let values = if values.is_empty() && style.empty_values_placeholder {
        "\"\"".to_string()
    } else {
        values
    };

    format!("{} {} {} {}", style.prefix, path, types, values)
        .trim()
        .to_string()
}

fn join_sorted<S: AsRef<str>>(names: &[S]) -> String {
    let unique: BTreeSet<&str> = names.iter().map(AsRef::as_ref).collect();
    unique.into_iter().collect::<Vec<_>>().join(",")
}

/// One directive per package path found in either index, in path order.
pub fn format_all(types: &UsageIndex, values: &UsageIndex, style: &DirectiveStyle) -> Vec<String> {
    let paths: BTreeSet<&str> = types.packages().chain(values.packages()).collect();
    paths
        .into_iter()
        .map(|path| format_directive(path, types.get(path), values.get(path), style))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(prefix: &str) -> DirectiveStyle {
        DirectiveStyle {
            prefix: prefix.into(),
            empty_values_placeholder: false,
        }
    }

    #[test]
    fn test_order_independent() {
        let s = style("directive");
        let a = format_directive("example.org/pkg", &["B", "A", "B"], &["Y", "X"], &s);
        let b = format_directive("example.org/pkg", &["A", "B"], &["X", "Y", "X"], &s);
        assert_eq!(a, "directive example.org/pkg A,B X,Y");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_types_placeholder() {
        let s = style("directive");
        assert_eq!(
            format_directive::<&str>("example.org/pkg", &[], &["New"], &s),
            "directive example.org/pkg \"\" New"
        );
    }

    #[test]
    fn test_empty_values_trimmed_or_placeholder() {
        let mut s = style("directive");
        assert_eq!(
            format_directive::<&str>("example.org/pkg", &["T"], &[], &s),
            "directive example.org/pkg T"
        );
        s.empty_values_placeholder = true;
        assert_eq!(
            format_directive::<&str>("example.org/pkg", &["T"], &[], &s),
            "directive example.org/pkg T \"\""
        );
    }

    #[test]
    fn test_default_prefix() {
        let line = format_directive("example.org/pkg", &["T"], &["V"], &DirectiveStyle::default());
        assert_eq!(line, "//go:generate depstub -vendor example.org/pkg T V");
    }

    #[test]
    fn test_format_all_covers_both_indices() {
        let mut types = UsageIndex::default();
        let mut values = UsageIndex::default();
        types.record("example.org/b", "T");
        values.record("example.org/a", "New");
        values.record("example.org/b", "V");
        types.finalize();
        values.finalize();

        let lines = format_all(&types, &values, &style("d"));
        assert_eq!(
            lines,
            ["d example.org/a \"\" New", "d example.org/b T V"]
        );
    }
}
