//! Symbol-id algebra.
//!
//! Symbol ids are opaque strings of the shape
//! `"<scheme> <manager> <package> <version> <path>/<descriptor>..."`, e.g.
//! `scip-dart pub myapp 1.0.0 lib/src/auth.dart/AuthService#login().`.
//! The engine never composes ids; it only truncates descriptors to derive
//! parents and extracts trailing names for display and search.
//!
//! Descriptor suffixes: `#` type, `().` method/function/constructor,
//! `.` field/property/enum member, `[..]` type parameter.

use regex::Regex;
use std::sync::LazyLock;

static TRAILING_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)[.#()\[\]]*$").unwrap());

static LAST_DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z_$][A-Za-z0-9_$]*\(\)\.|[A-Za-z_$][A-Za-z0-9_$]*#|[A-Za-z_$][A-Za-z0-9_$]*\.|\[[^\]]*\])$")
        .unwrap()
});

/// Extract the trailing identifier of a symbol id: the last maximal
/// `[A-Za-z_][A-Za-z0-9_]*` run before the final descriptor boundary.
pub fn name_of(symbol: &str) -> String {
    TRAILING_NAME
        .captures(symbol)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Derive the parent id by lexically truncating the last descriptor.
///
/// Returns `None` when truncation lands on the file path instead of another
/// descriptor, i.e. for top-level symbols.
pub fn parent_of(symbol: &str) -> Option<String> {
    let m = LAST_DESCRIPTOR.find(symbol)?;
    let parent = &symbol[..m.start()];
    // A parent must itself end in a descriptor; ids whose descriptor chain
    // is exhausted end in the `<path>/` separator instead.
    if parent.ends_with('/') {
        return None;
    }
    if parent.ends_with('#') || parent.ends_with(").") || parent.ends_with(']') || parent.ends_with('.')
    {
        return Some(parent.to_string());
    }
    None
}
