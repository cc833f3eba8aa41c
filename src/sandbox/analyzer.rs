//! Static security analysis of submitted source.
//!
//! Four ordered passes, cheapest and most decisive first: length check,
//! lexical token pass, textual pattern pass over normalized source, and a
//! structural complexity pass. The first breach wins; a clean run returns
//! silently. All passes are pure and deterministic.

use crate::error::{SecurityFinding, ViolationKind};
use crate::sandbox::lexer::{normalize, tokenize, TokenKind};
use crate::sandbox::policy::PolicyConfiguration;

/// Bracket-nesting ceiling for the lexical pass.
const MAX_NESTING_DEPTH: usize = 50;
/// Function-definition ceiling for the complexity pass.
const MAX_FUNCTION_DEFS: usize = 20;
/// Loop-construct ceiling for the complexity pass.
const MAX_LOOPS: usize = 10;

/// One shape a textual rule can look for in the normalized source.
enum Needle {
    /// Identifier at word boundaries.
    Word(&'static str),
    /// `base.attr` with optional whitespace around the dot. An empty
    /// attribute list matches any attribute; a trailing `*` marks a prefix.
    Attr(&'static str, &'static [&'static str]),
    /// Two words separated by whitespace.
    Pair(&'static str, &'static str),
    /// A word followed (after optional whitespace) by a single character.
    WordBefore(&'static str, char),
    /// Plain substring.
    Text(&'static str),
}

/// A textual rule applied to the normalized source.
struct PatternRule {
    needles: &'static [Needle],
    description: &'static str,
}

/// Fixed ordered rule list targeting constructs the lexical pass cannot see:
/// attribute-mediated process control, interpreter-state access, environment
/// mutation, abrupt termination, dangerous URI schemes.
static PATTERN_RULES: &[PatternRule] = &[
    PatternRule {
        needles: &[
            Needle::Word("__builtins__"),
            Needle::Word("__globals__"),
            Needle::Word("__subclasses__"),
            Needle::Word("__mro__"),
            Needle::Word("__bases__"),
            Needle::Word("__loader__"),
            Needle::Word("__spec__"),
        ],
        description: "dunder introspection escape",
    },
    PatternRule {
        needles: &[Needle::Attr(
            "os",
            &["system", "popen", "exec*", "spawn*", "fork", "kill"],
        )],
        description: "process control via os module",
    },
    PatternRule {
        needles: &[
            Needle::Attr("subprocess", &[]),
            Needle::Attr("pty", &[]),
            Needle::Attr("commands", &[]),
        ],
        description: "shell or subprocess access",
    },
    PatternRule {
        needles: &[Needle::Attr("socket", &[]), Needle::Attr("ctypes", &[])],
        description: "socket or foreign-function access",
    },
    PatternRule {
        needles: &[Needle::Attr(
            "sys",
            &["modules", "path", "settrace", "setprofile", "exit", "argv"],
        )],
        description: "interpreter state access",
    },
    PatternRule {
        needles: &[
            Needle::Word("putenv"),
            Needle::Word("unsetenv"),
            Needle::Attr("os", &["environ"]),
            Needle::WordBefore("environ", '['),
        ],
        description: "environment mutation",
    },
    PatternRule {
        needles: &[
            Needle::Attr("os", &["_exit"]),
            Needle::Pair("raise", "SystemExit"),
        ],
        description: "abrupt termination",
    },
    PatternRule {
        needles: &[
            Needle::Text("file://"),
            Needle::Text("ftp://"),
            Needle::Text("data://"),
        ],
        description: "dangerous URI scheme",
    },
];

/// Validate submitted source against the policy.
///
/// Returns the first [`SecurityFinding`] or `Ok(())` when every pass is clean.
pub fn validate(source: &str, policy: &PolicyConfiguration) -> Result<(), SecurityFinding> {
    check_length(source, policy)?;
    lexical_pass(source, policy)?;
    let normalized = normalize(source);
    pattern_pass(&normalized)?;
    complexity_pass(&normalized)
}

fn check_length(source: &str, policy: &PolicyConfiguration) -> Result<(), SecurityFinding> {
    if source.len() > policy.max_source_length {
        return Err(SecurityFinding::new(
            ViolationKind::LengthExceeded,
            format!(
                "source is {} bytes, limit is {}",
                source.len(),
                policy.max_source_length
            ),
            None,
        ));
    }
    Ok(())
}

/// Token pass: denied call sites, denied class names, denied keywords, the
/// dynamic-evaluation token category, and bracket-nesting depth.
fn lexical_pass(source: &str, policy: &PolicyConfiguration) -> Result<(), SecurityFinding> {
    let tokens = tokenize(source);
    let mut depth: usize = 0;
    let mut prev_was_class = false;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::DynamicEval => {
                return Err(SecurityFinding::new(
                    ViolationKind::DeniedSymbol,
                    token.lower(),
                    Some(token.line),
                ));
            }
            TokenKind::Ident => {
                let lower = token.lower();

                if policy.is_keyword_denied(&lower) {
                    return Err(SecurityFinding::new(
                        ViolationKind::DeniedSymbol,
                        lower,
                        Some(token.line),
                    ));
                }

                // Class names count as symbol positions.
                if prev_was_class && policy.is_symbol_denied(&lower) {
                    return Err(SecurityFinding::new(
                        ViolationKind::DeniedSymbol,
                        lower,
                        Some(token.line),
                    ));
                }

                // Call sites: identifier immediately followed by an opener.
                let followed_by_call = tokens.get(i + 1).map(|t| t.is_op('(')).unwrap_or(false);
                if followed_by_call && policy.is_symbol_denied(&lower) {
                    return Err(SecurityFinding::new(
                        ViolationKind::DeniedSymbol,
                        lower,
                        Some(token.line),
                    ));
                }

                prev_was_class = lower == "class";
                continue;
            }
            TokenKind::Op => {
                let c = token.text.chars().next().unwrap_or(' ');
                if matches!(c, '(' | '[' | '{') {
                    depth += 1;
                    if depth > MAX_NESTING_DEPTH {
                        return Err(SecurityFinding::new(
                            ViolationKind::ExcessiveNesting,
                            format!("nesting depth exceeds {}", MAX_NESTING_DEPTH),
                            Some(token.line),
                        ));
                    }
                } else if matches!(c, ')' | ']' | '}') {
                    depth = depth.saturating_sub(1);
                }
            }
            TokenKind::Str | TokenKind::Number => {}
        }
        prev_was_class = false;
    }

    Ok(())
}

/// Pattern pass over normalized source (string and comment bodies blanked).
fn pattern_pass(normalized: &str) -> Result<(), SecurityFinding> {
    for rule in PATTERN_RULES.iter() {
        let hit = rule
            .needles
            .iter()
            .filter_map(|needle| needle.find(normalized))
            .min();
        if let Some(at) = hit {
            let line = normalized[..at].matches('\n').count() + 1;
            return Err(SecurityFinding::new(
                ViolationKind::DeniedPattern,
                rule.description,
                Some(line),
            ));
        }
    }
    Ok(())
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte offset past any whitespace starting at `at`.
fn skip_whitespace(hay: &str, mut at: usize) -> usize {
    while let Some(c) = hay[at..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        at += c.len_utf8();
    }
    at
}

/// The identifier run starting at `at`, possibly empty.
fn ident_at(hay: &str, at: usize) -> &str {
    let end = hay[at..]
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map(|(i, _)| at + i)
        .unwrap_or(hay.len());
    &hay[at..end]
}

/// Byte offsets where `word` occurs at word boundaries.
fn word_positions<'a>(hay: &'a str, word: &'a str) -> impl Iterator<Item = usize> + 'a {
    hay.match_indices(word).filter_map(move |(at, _)| {
        let before = hay[..at].chars().next_back();
        let after = hay[at + word.len()..].chars().next();
        let bounded = !before.map(is_word_char).unwrap_or(false)
            && !after.map(is_word_char).unwrap_or(false);
        bounded.then_some(at)
    })
}

fn attr_matches(spec: &str, ident: &str) -> bool {
    match spec.strip_suffix('*') {
        Some(prefix) => ident.starts_with(prefix),
        None => ident == spec,
    }
}

impl Needle {
    /// Earliest match position in `hay`, if any.
    fn find(&self, hay: &str) -> Option<usize> {
        match *self {
            Needle::Word(word) => word_positions(hay, word).next(),
            Needle::Attr(base, attrs) => word_positions(hay, base).find(|&at| {
                let mut i = skip_whitespace(hay, at + base.len());
                if !hay[i..].starts_with('.') {
                    return false;
                }
                i = skip_whitespace(hay, i + 1);
                let ident = ident_at(hay, i);
                !ident.is_empty()
                    && (attrs.is_empty() || attrs.iter().any(|spec| attr_matches(spec, ident)))
            }),
            Needle::Pair(first, second) => word_positions(hay, first).find(|&at| {
                let i = skip_whitespace(hay, at + first.len());
                i > at + first.len() && ident_at(hay, i) == second
            }),
            Needle::WordBefore(word, after) => word_positions(hay, word).find(|&at| {
                let i = skip_whitespace(hay, at + word.len());
                hay[i..].starts_with(after)
            }),
            Needle::Text(text) => hay.find(text),
        }
    }
}

/// Complexity pass: count definition and loop keywords in normalized source.
fn complexity_pass(normalized: &str) -> Result<(), SecurityFinding> {
    let count = |word| word_positions(normalized, word).count();

    let defs = count("def") + count("lambda");
    if defs > MAX_FUNCTION_DEFS {
        return Err(SecurityFinding::new(
            ViolationKind::ExcessiveComplexity,
            format!("{} function definitions, limit is {}", defs, MAX_FUNCTION_DEFS),
            None,
        ));
    }

    let loops = count("for") + count("while");
    if loops > MAX_LOOPS {
        return Err(SecurityFinding::new(
            ViolationKind::ExcessiveComplexity,
            format!("{} loop constructs, limit is {}", loops, MAX_LOOPS),
            None,
        ));
    }

    Ok(())
}
