//! The query DSL.
//!
//! A query is a space-separated action, optional target and filters:
//! `refs AuthService.login kind:method in:lib/src`. Quoted tokens keep
//! their spaces. Tokens with a `:` past position zero are filters, tokens
//! shaped `-x` / `-x:v` / `--name:v` are grep flags, and whatever remains
//! is joined with `.` into the target so `Class method` and `Class.method`
//! parse alike.

pub mod executor;
pub mod result;

use crate::error::QueryError;
use crate::types::SymbolKind;

/// Pipeline separator. Splitting happens on the exact spaced form so `|`
/// inside a glob alternation survives.
pub const PIPE: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Def,
    Refs,
    Sig,
    Source,
    Members,
    Impls,
    Hierarchy,
    Supertypes,
    Subtypes,
    Find,
    Which,
    Grep,
    Calls,
    Callers,
    Deps,
    Imports,
    Exports,
    Symbols,
    Get,
    Files,
    Stats,
    Classify,
    Storyboard,
}

impl Action {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "def" => Self::Def,
            "refs" => Self::Refs,
            "sig" => Self::Sig,
            "source" => Self::Source,
            "members" => Self::Members,
            "impls" => Self::Impls,
            "hierarchy" => Self::Hierarchy,
            "supertypes" => Self::Supertypes,
            "subtypes" => Self::Subtypes,
            "find" => Self::Find,
            "which" => Self::Which,
            "grep" => Self::Grep,
            "calls" => Self::Calls,
            "callers" => Self::Callers,
            "deps" => Self::Deps,
            "imports" => Self::Imports,
            "exports" => Self::Exports,
            "symbols" => Self::Symbols,
            "get" => Self::Get,
            "files" => Self::Files,
            "stats" => Self::Stats,
            "classify" => Self::Classify,
            "storyboard" => Self::Storyboard,
            _ => return None,
        })
    }

    /// `files` and `stats` take no target; `storyboard` spans the whole
    /// workspace. `files` accepts an optional filter pattern.
    pub fn requires_target(&self) -> bool {
        !matches!(self, Self::Files | Self::Stats | Self::Storyboard)
    }
}

/// How the target pattern is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PatternDialect {
    #[default]
    Literal,
    Glob,
    Regex {
        body: String,
        case_insensitive: bool,
    },
    Fuzzy {
        body: String,
    },
}

/// Parsed grep flags (see the CLI table: `-D` widens to external, `-C`/
/// `-A`/`-B` control context, `-w` word boundaries, `-l`/`-L` list modes,
/// `-c` counts, `-o` match-only, `-F` literal, `-v` invert, `-U`
/// multiline, `-m:n` per-file cap, `--include`/`--exclude` file globs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrepFlags {
    pub before: usize,
    pub after: usize,
    pub widen_external: bool,
    pub word: bool,
    pub list_files: bool,
    pub list_files_without: bool,
    pub count: bool,
    pub only_matching: bool,
    pub literal: bool,
    pub invert: bool,
    pub multiline: bool,
    pub max_per_file: Option<usize>,
    pub include: Option<String>,
    pub exclude: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub action: Action,
    pub target: Option<String>,
    pub dialect: PatternDialect,
    /// `(container_pattern, member_pattern)` when the target is qualified.
    pub qualified: Option<(String, String)>,
    pub kind: Option<SymbolKind>,
    pub path_prefix: Option<String>,
    pub lang: Option<String>,
    pub grep: GrepFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Split on whitespace, honoring paired `"…"` and `'…'`.
fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    quoted = true;
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() || quoted {
                        tokens.push(Token {
                            text: std::mem::take(&mut current),
                            quoted,
                        });
                        quoted = false;
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    tokens
}

/// Parse one (non-piped) query string into a command.
pub fn parse(input: &str) -> Result<Command, QueryError> {
    let tokens = tokenize(input);
    let Some(first) = tokens.first() else {
        return Err(QueryError::Empty);
    };
    let action =
        Action::parse(&first.text).ok_or_else(|| QueryError::UnknownAction(first.text.clone()))?;

    let mut command = Command {
        action,
        target: None,
        dialect: PatternDialect::Literal,
        qualified: None,
        kind: None,
        path_prefix: None,
        lang: None,
        grep: GrepFlags::default(),
    };
    let mut target_parts: Vec<String> = Vec::new();

    for token in &tokens[1..] {
        if !token.quoted {
            if let Some(rest) = token.text.strip_prefix("--") {
                parse_long_flag(rest, &mut command.grep)
                    .ok_or_else(|| QueryError::InvalidFlag(token.text.clone()))?;
                continue;
            }
            if token.text.starts_with('-') && token.text.len() > 1 && !token.text.starts_with("-/")
            {
                parse_short_flag(&token.text, &mut command.grep)
                    .ok_or_else(|| QueryError::InvalidFlag(token.text.clone()))?;
                continue;
            }
            if let Some(colon) = token.text.find(':') {
                // A `:` past position zero marks a filter, unless the token
                // is a regex or fuzzy pattern.
                let is_pattern = token.text.starts_with('/') || token.text.starts_with('~');
                if colon > 0 && !is_pattern {
                    apply_filter(&token.text[..colon], &token.text[colon + 1..], &mut command)?;
                    continue;
                }
            }
        }
        target_parts.push(token.text.clone());
    }

    if !target_parts.is_empty() {
        let target = target_parts.join(".");
        command.dialect = classify_pattern(&target);
        if matches!(command.dialect, PatternDialect::Literal | PatternDialect::Glob) {
            if let Some((container, member)) = target.rsplit_once('.') {
                if !container.is_empty() && !member.is_empty() {
                    command.qualified = Some((container.to_string(), member.to_string()));
                }
            }
        }
        command.target = Some(target);
    } else if action.requires_target() {
        return Err(QueryError::MissingTarget(first.text.clone()));
    }

    Ok(command)
}

fn apply_filter(name: &str, value: &str, command: &mut Command) -> Result<(), QueryError> {
    match name {
        "kind" => {
            let kind = SymbolKind::parse(value)
                .ok_or_else(|| QueryError::UnknownFilter(format!("kind:{value}")))?;
            command.kind = Some(kind);
        }
        "in" => command.path_prefix = Some(value.to_string()),
        "lang" => command.lang = Some(value.to_string()),
        other => {
            return Err(QueryError::UnknownFilter(format!("{other}:{value}")));
        }
    }
    Ok(())
}

fn parse_short_flag(token: &str, flags: &mut GrepFlags) -> Option<()> {
    let body = &token[1..];
    let (name, value) = match body.split_once(':') {
        Some((n, v)) => (n, Some(v)),
        None => (body, None),
    };
    match (name, value) {
        ("D", None) => flags.widen_external = true,
        ("w", None) => flags.word = true,
        ("l", None) => flags.list_files = true,
        ("L", None) => flags.list_files_without = true,
        ("c", None) => flags.count = true,
        ("o", None) => flags.only_matching = true,
        ("F", None) => flags.literal = true,
        ("v", None) => flags.invert = true,
        ("U", None) => flags.multiline = true,
        ("C", Some(v)) => {
            let n = v.parse().ok()?;
            flags.before = n;
            flags.after = n;
        }
        ("A", Some(v)) => flags.after = v.parse().ok()?,
        ("B", Some(v)) => flags.before = v.parse().ok()?,
        ("m", Some(v)) => flags.max_per_file = Some(v.parse().ok()?),
        _ => return None,
    }
    Some(())
}

fn parse_long_flag(body: &str, flags: &mut GrepFlags) -> Option<()> {
    let (name, value) = body
        .split_once(':')
        .or_else(|| body.split_once('='))
        .map(|(n, v)| (n, Some(v)))
        .unwrap_or((body, None));
    match (name, value) {
        ("include", Some(v)) => flags.include = Some(v.to_string()),
        ("exclude", Some(v)) => flags.exclude = Some(v.to_string()),
        _ => return None,
    }
    Some(())
}

/// Classify the target's pattern dialect.
pub fn classify_pattern(target: &str) -> PatternDialect {
    if let Some(body) = target.strip_prefix('/') {
        if let Some(stripped) = body.strip_suffix("/i") {
            return PatternDialect::Regex {
                body: stripped.to_string(),
                case_insensitive: true,
            };
        }
        if let Some(stripped) = body.strip_suffix('/') {
            return PatternDialect::Regex {
                body: stripped.to_string(),
                case_insensitive: false,
            };
        }
    }
    if let Some(body) = target.strip_prefix('~') {
        return PatternDialect::Fuzzy {
            body: body.to_string(),
        };
    }
    if target.contains('*') || target.contains('?') {
        return PatternDialect::Glob;
    }
    PatternDialect::Literal
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokenizer_respects_quotes() {
        let tokens = tokenize(r#"grep "TODO fix" -C:2"#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "TODO fix");
        assert!(tokens[1].quoted);
        assert_eq!(tokens[2].text, "-C:2");
    }

    #[test]
    fn simple_action_and_target() {
        let cmd = parse("def AuthService").unwrap();
        assert_eq!(cmd.action, Action::Def);
        assert_eq!(cmd.target.as_deref(), Some("AuthService"));
        assert_eq!(cmd.dialect, PatternDialect::Literal);
        assert!(cmd.qualified.is_none());
    }

    #[test]
    fn multi_token_target_joins_with_dot() {
        let cmd = parse("refs AuthService login").unwrap();
        assert_eq!(cmd.target.as_deref(), Some("AuthService.login"));
        assert_eq!(
            cmd.qualified,
            Some(("AuthService".to_string(), "login".to_string()))
        );
    }

    #[test]
    fn filters() {
        let cmd = parse("find *Service kind:class in:lib/src lang:dart").unwrap();
        assert_eq!(cmd.dialect, PatternDialect::Glob);
        assert_eq!(cmd.kind, Some(SymbolKind::Class));
        assert_eq!(cmd.path_prefix.as_deref(), Some("lib/src"));
        assert_eq!(cmd.lang.as_deref(), Some("dart"));
    }

    #[test]
    fn unknown_action_is_bad_query() {
        let err = parse("explode everything").unwrap_err();
        assert_eq!(err, QueryError::UnknownAction("explode".into()));
    }

    #[test]
    fn unknown_kind_is_bad_query() {
        let err = parse("find x kind:widget").unwrap_err();
        assert!(matches!(err, QueryError::UnknownFilter(_)));
    }

    #[test]
    fn missing_target_rejected_except_for_exempt_actions() {
        assert!(matches!(
            parse("refs").unwrap_err(),
            QueryError::MissingTarget(_)
        ));
        assert!(parse("files").is_ok());
        assert!(parse("stats").is_ok());
        assert!(parse("storyboard").is_ok());
    }

    #[test]
    fn regex_and_fuzzy_dialects() {
        let cmd = parse("find /^Auth.*Service$/i").unwrap();
        assert_eq!(
            cmd.dialect,
            PatternDialect::Regex {
                body: "^Auth.*Service$".into(),
                case_insensitive: true,
            }
        );

        let cmd = parse("find ~authservce").unwrap();
        assert_eq!(
            cmd.dialect,
            PatternDialect::Fuzzy {
                body: "authservce".into()
            }
        );
    }

    #[test]
    fn grep_flags() {
        let cmd = parse("grep TODO -C:2 -w -m:5 --include:**/*.dart -D").unwrap();
        assert_eq!(cmd.grep.before, 2);
        assert_eq!(cmd.grep.after, 2);
        assert!(cmd.grep.word);
        assert!(cmd.grep.widen_external);
        assert_eq!(cmd.grep.max_per_file, Some(5));
        assert_eq!(cmd.grep.include.as_deref(), Some("**/*.dart"));
        assert_eq!(cmd.target.as_deref(), Some("TODO"));
    }

    #[test]
    fn invalid_flag_is_bad_query() {
        assert!(matches!(
            parse("grep TODO -Z").unwrap_err(),
            QueryError::InvalidFlag(_)
        ));
    }

    #[test]
    fn quoted_token_is_never_a_filter() {
        let cmd = parse(r#"grep "fixme: later""#).unwrap();
        assert_eq!(cmd.target.as_deref(), Some("fixme: later"));
    }
}
