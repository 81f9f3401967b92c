//! Glob-to-predicate translation for file pattern search.
//!
//! Supported syntax: `*` (within a segment), `?` (single non-separator
//! character), `**` (any number of segments), character classes (`[a-z]`,
//! `[!a-z]`), alternation (`{a,b}`), and a leading `!` marking a pattern as
//! negative. A path matches when it matches at least one positive pattern
//! and no negative pattern.

use regex::Regex;

use crate::error::{EngineError, EngineResult};

/// Compiled (positive, negative) predicate pair for one pattern string.
#[derive(Debug)]
pub struct GlobMatcher {
    positives: Vec<Regex>,
    negatives: Vec<Regex>,
}

impl GlobMatcher {
    /// Compile a pattern string. Multiple globs may be separated by commas;
    /// each may carry a leading `!`.
    pub fn compile(pattern: &str) -> EngineResult<Self> {
        let mut positives = Vec::new();
        let mut negatives = Vec::new();

        for raw in pattern.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (negated, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let regex = Regex::new(&glob_to_regex(body)?).map_err(|e| {
                EngineError::InvalidArgument {
                    reason: format!("invalid glob '{raw}': {e}"),
                }
            })?;
            if negated {
                negatives.push(regex);
            } else {
                positives.push(regex);
            }
        }

        if positives.is_empty() && negatives.is_empty() {
            return Err(EngineError::InvalidArgument {
                reason: "empty glob pattern".into(),
            });
        }
        Ok(Self {
            positives,
            negatives,
        })
    }

    /// Test a path. Separators are normalized to `/` before matching.
    pub fn is_match(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let positive = self.positives.is_empty()
            || self.positives.iter().any(|re| re.is_match(&normalized));
        let negative = self.negatives.iter().any(|re| re.is_match(&normalized));
        positive && !negative
    }
}

/// Translate one glob into an anchored regex.
fn glob_to_regex(glob: &str) -> EngineResult<String> {
    let mut out = String::from("^");
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    // `**/` crosses any number of segments, including zero;
                    // a trailing `**` swallows the rest of the path.
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:[^/]+/)*");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| EngineError::InvalidArgument {
                        reason: format!("unclosed character class in glob '{glob}'"),
                    })?;
                out.push('[');
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') {
                    out.push('^');
                    j += 1;
                }
                while j < close {
                    let c = chars[j];
                    if c == '\\' || c == '^' {
                        out.push('\\');
                    }
                    out.push(c);
                    j += 1;
                }
                out.push(']');
                i = close + 1;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| EngineError::InvalidArgument {
                        reason: format!("unclosed alternation in glob '{glob}'"),
                    })?;
                let alternatives: Vec<String> = chars[i + 1..close]
                    .iter()
                    .collect::<String>()
                    .split(',')
                    .map(|alt| alt.chars().map(escape_literal).collect())
                    .collect();
                out.push_str("(?:");
                out.push_str(&alternatives.join("|"));
                out.push(')');
                i = close + 1;
            }
            c => {
                out.push_str(&escape_literal(c));
                i += 1;
            }
        }
    }

    out.push('$');
    Ok(out)
}

fn escape_literal(c: char) -> String {
    if "\\.+()|^$[]{}?*".contains(c) {
        format!("\\{c}")
    } else {
        c.to_string()
    }
}
