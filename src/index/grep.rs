//! Raw-source grep with symbol context.
//!
//! Grep reads file bytes from the index's `source_root` rather than any
//! stored document text, so results always reflect what is on disk. Each
//! match is annotated with the lexically innermost symbol whose definition
//! span contains the match line. Read failures degrade to an empty result
//! for that file; they never abort the query.

use crate::types::{GrepMatch, GrepOptions};
use globset::Glob;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Definition spans for one file: `(symbol name, start_line, end_line)`.
pub(crate) type FileSpans = Vec<(String, u32, u32)>;

/// Innermost enclosing symbol name for a 0-based line: among spans that
/// contain the line, the one starting last.
pub(crate) fn symbol_context(spans: &FileSpans, line: u32) -> Option<String> {
    spans
        .iter()
        .filter(|(_, start, end)| *start <= line && line <= *end)
        .max_by_key(|(_, start, _)| *start)
        .map(|(name, _, _)| name.clone())
}

/// Whether a relative path passes the option's path prefix and glob filters.
pub(crate) fn file_selected(relative_path: &str, opts: &GrepOptions) -> bool {
    if let Some(prefix) = &opts.path_filter {
        if !relative_path.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(include) = &opts.include_glob {
        match Glob::new(include) {
            Ok(glob) if glob.compile_matcher().is_match(relative_path) => {}
            _ => return false,
        }
    }
    if let Some(exclude) = &opts.exclude_glob {
        if let Ok(glob) = Glob::new(exclude) {
            if glob.compile_matcher().is_match(relative_path) {
                return false;
            }
        }
    }
    true
}

/// Grep one file. `spans` carries the file's definition spans for context
/// attachment; positions in the result are 0-based.
pub(crate) fn grep_file(
    source_root: &Path,
    relative_path: &str,
    spans: &FileSpans,
    pattern: &Regex,
    opts: &GrepOptions,
) -> Vec<GrepMatch> {
    let Ok(text) = fs::read_to_string(source_root.join(relative_path)) else {
        return Vec::new();
    };

    if opts.multiline {
        return grep_multiline(relative_path, &text, spans, pattern, opts);
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut matches = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let hit = pattern.is_match(line);
        if hit == opts.invert {
            continue;
        }

        let text = if opts.only_matching && !opts.invert {
            match pattern.find(line) {
                Some(m) => m.as_str().to_string(),
                None => continue,
            }
        } else {
            line.to_string()
        };

        let before = context_lines(&lines, i.saturating_sub(opts.before), i);
        let after = context_lines(&lines, i + 1, (i + 1 + opts.after).min(lines.len()));

        matches.push(GrepMatch {
            file: relative_path.to_string(),
            line: i as u32,
            text,
            symbol_context: symbol_context(spans, i as u32),
            before,
            after,
        });

        if let Some(cap) = opts.max_per_file {
            if matches.len() >= cap {
                break;
            }
        }
    }

    matches
}

fn grep_multiline(
    relative_path: &str,
    text: &str,
    spans: &FileSpans,
    pattern: &Regex,
    opts: &GrepOptions,
) -> Vec<GrepMatch> {
    let mut matches = Vec::new();
    for m in pattern.find_iter(text) {
        let line = text[..m.start()].matches('\n').count() as u32;
        matches.push(GrepMatch {
            file: relative_path.to_string(),
            line,
            text: if opts.only_matching {
                m.as_str().to_string()
            } else {
                m.as_str().lines().next().unwrap_or_default().to_string()
            },
            symbol_context: symbol_context(spans, line),
            before: Vec::new(),
            after: Vec::new(),
        });
        if let Some(cap) = opts.max_per_file {
            if matches.len() >= cap {
                break;
            }
        }
    }
    matches
}

fn context_lines(lines: &[&str], start: usize, end: usize) -> Vec<String> {
    lines[start..end].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_span_wins() {
        let spans: FileSpans = vec![
            ("A".into(), 0, 10),
            ("x".into(), 2, 5),
        ];
        assert_eq!(symbol_context(&spans, 3), Some("x".into()));
        assert_eq!(symbol_context(&spans, 8), Some("A".into()));
        assert_eq!(symbol_context(&spans, 20), None);
    }

    #[test]
    fn file_filters() {
        let mut opts = GrepOptions::default();
        opts.path_filter = Some("lib/".into());
        assert!(file_selected("lib/a.dart", &opts));
        assert!(!file_selected("test/a.dart", &opts));

        opts.path_filter = None;
        opts.include_glob = Some("**/*.dart".into());
        assert!(file_selected("lib/a.dart", &opts));
        assert!(!file_selected("lib/a.txt", &opts));

        opts.exclude_glob = Some("**/generated/**".into());
        assert!(!file_selected("lib/generated/a.dart", &opts));
    }
}
