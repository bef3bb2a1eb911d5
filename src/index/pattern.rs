//! Pattern dialects for symbol search.
//!
//! `find_symbols` interprets its pattern as a glob: `*` matches any run,
//! `?` one character, `.` is literal. Compiled patterns are anchored to the
//! whole name and case-insensitive. Regex-literal (`/…/i`) and fuzzy (`~`)
//! dialects are recognized upstream at the parser; this module provides the
//! compilers and the edit-distance used by fuzzy search.

use regex::Regex;

/// Maximum pattern length the edit-distance check applies to. Longer
/// patterns fall back to substring matching only.
pub const FUZZY_MAX_PATTERN_LEN: usize = 10;

/// Default edit-distance threshold for fuzzy search.
pub const FUZZY_DEFAULT_DISTANCE: usize = 2;

/// Compile a glob pattern into an anchored, case-insensitive regex.
///
/// An alternation containing `|` is wrapped in a non-capturing group before
/// anchoring so `Foo|Bar` matches either whole name.
pub fn compile_glob(pattern: &str) -> Result<Regex, regex::Error> {
    let mut body = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '*' => body.push_str(".*"),
            '?' => body.push('.'),
            '.' => body.push_str(r"\."),
            '|' => body.push('|'),
            c if regex_syntax_char(c) => {
                body.push('\\');
                body.push(c);
            }
            c => body.push(c),
        }
    }
    let anchored = if body.contains('|') {
        format!("(?i)^(?:{body})$")
    } else {
        format!("(?i)^{body}$")
    };
    Regex::new(&anchored)
}

fn regex_syntax_char(c: char) -> bool {
    matches!(
        c,
        '\\' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$'
    )
}

/// Compile a regex-literal pattern body, optionally case-insensitive.
pub fn compile_regex(body: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    if case_insensitive {
        Regex::new(&format!("(?i){body}"))
    } else {
        Regex::new(body)
    }
}

/// Classical dynamic-programming Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Fuzzy match: substring hits bypass the distance check; otherwise the
/// edit distance must stay within `max_distance`, and only patterns of
/// length ≤ [`FUZZY_MAX_PATTERN_LEN`] are eligible for the distance path.
pub fn fuzzy_matches(name: &str, pattern: &str, max_distance: usize) -> bool {
    let name_lower = name.to_lowercase();
    let pattern_lower = pattern.to_lowercase();
    if name_lower.contains(&pattern_lower) {
        return true;
    }
    if pattern.chars().count() > FUZZY_MAX_PATTERN_LEN {
        return false;
    }
    levenshtein(&name_lower, &pattern_lower) <= max_distance
}
