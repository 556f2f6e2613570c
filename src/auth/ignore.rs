//! Path exemptions
//!
//! Requests whose method and path match an ignore rule bypass the gate.
//! Patterns use shell glob syntax:
//!
//! - `*` matches any run of characters, including `/`
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character of a set, `[!abc]` negates it
//! - `\x` matches `x` literally

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid glob pattern
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("Unterminated character class in pattern '{0}'")]
    UnterminatedClass(String),

    #[error("Dangling escape at end of pattern '{0}'")]
    DanglingEscape(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    Invalid { pattern: String, reason: String },
}

/// A configured exemption
///
/// Deserializes from either a bare string (path glob, any method) or a map
/// with `path` and an optional `method` glob:
///
/// ```yaml
/// ignore:
///   - "/health"
///   - { method: "G*", path: "/public*" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreRule {
    PathOnly(String),
    MethodAndPath {
        #[serde(default)]
        method: Option<String>,
        path: String,
    },
}

impl IgnoreRule {
    /// Rule matching `path` for any method
    pub fn path(path: &str) -> Self {
        IgnoreRule::PathOnly(path.to_string())
    }

    /// Rule matching `path` only for methods matching `method`
    pub fn method_and_path(method: &str, path: &str) -> Self {
        IgnoreRule::MethodAndPath {
            method: Some(method.to_string()),
            path: path.to_string(),
        }
    }

    fn parts(&self) -> (Option<&str>, &str) {
        match self {
            IgnoreRule::PathOnly(path) => (None, path),
            IgnoreRule::MethodAndPath { method, path } => (method.as_deref(), path),
        }
    }
}

/// Compiled glob
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let source = glob_to_regex(pattern)?;
        let regex = Regex::new(&source).map_err(|e| PatternError::Invalid {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Translate a shell glob into an anchored regular expression
fn glob_to_regex(pattern: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex_lite::escape(&escaped.to_string())),
                None => return Err(PatternError::DanglingEscape(pattern.to_string())),
            },
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut first = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        // A leading ']' is a literal member of the set
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(escaped) => push_class_member(&mut out, escaped),
                            None => return Err(PatternError::DanglingEscape(pattern.to_string())),
                        },
                        '[' | ']' | '^' => push_class_member(&mut out, inner),
                        other => out.push(other),
                    }
                    first = false;
                }
                if !closed {
                    return Err(PatternError::UnterminatedClass(pattern.to_string()));
                }
                out.push(']');
            }
            other => out.push_str(&regex_lite::escape(&other.to_string())),
        }
    }

    out.push('$');
    Ok(out)
}

/// Push a literal character into a regex character class
fn push_class_member(out: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '-') {
        out.push('\\');
    }
    out.push(c);
}

#[derive(Debug, Clone)]
struct CompiledRule {
    method: Option<Glob>,
    path: Glob,
}

impl CompiledRule {
    fn matches(&self, method: &str, path: &str) -> bool {
        self.path.is_match(path)
            && self
                .method
                .as_ref()
                .map_or(true, |glob| glob.is_match(method))
    }
}

/// Compiled set of ignore rules
///
/// # Example
///
/// ```
/// use sso_gate::auth::ignore::{IgnoreRule, PathExemptions};
///
/// let exemptions = PathExemptions::new(&[
///     IgnoreRule::method_and_path("G*", "/public*"),
/// ]).unwrap();
///
/// assert!(exemptions.is_exempt("GET", "/public_info"));
/// assert!(!exemptions.is_exempt("POST", "/public_info"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathExemptions {
    rules: Vec<CompiledRule>,
}

impl PathExemptions {
    pub fn new(rules: &[IgnoreRule]) -> Result<Self, PatternError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let (method, path) = rule.parts();
                Ok(CompiledRule {
                    method: method.map(Glob::new).transpose()?,
                    path: Glob::new(path)?,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self { rules })
    }

    /// True if any rule matches the method and path
    pub fn is_exempt(&self, method: &str, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
