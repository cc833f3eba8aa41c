//! Token scanner for submitted guest source.
//!
//! A deliberately small lexer exposing exactly the token surface the security
//! analyzer consumes: identifiers with line numbers, string/comment spans,
//! single-character operators, and a dedicated dynamic-evaluation category for
//! the guest's code-injection builtins.

/// Identifiers classified as dynamic evaluation regardless of policy.
const DYNAMIC_EVAL_IDENTS: &[&str] = &["eval", "exec", "compile", "__import__"];

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident,
    /// One of the guest's dynamic-evaluation builtins.
    DynamicEval,
    /// String literal (text is the delimiter only; contents are dropped).
    Str,
    /// Numeric literal.
    Number,
    /// Single-character operator or punctuation.
    Op,
}

/// A scanned token with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    /// The token text lowercased, for case-insensitive policy matching.
    pub fn lower(&self) -> String {
        self.text.to_ascii_lowercase()
    }

    /// Whether this token is the given single-character operator.
    pub fn is_op(&self, ch: char) -> bool {
        self.kind == TokenKind::Op && self.text.len() == 1 && self.text.starts_with(ch)
    }
}

/// Tokenize guest source. Never fails: unterminated strings run to end of
/// input, and unknown bytes are emitted as operator tokens.
pub fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            let (consumed, newlines) = scan_string(&chars[i..]);
            tokens.push(Token {
                kind: TokenKind::Str,
                text: c.to_string(),
                line,
            });
            line += newlines;
            i += consumed;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            // String prefixes (r"", f'', rb"", ...) belong to the literal.
            if word.len() <= 2
                && word.chars().all(|p| "rbfuRBFU".contains(p))
                && i < chars.len()
                && (chars[i] == '"' || chars[i] == '\'')
            {
                let quote = chars[i];
                let (consumed, newlines) = scan_string(&chars[i..]);
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: quote.to_string(),
                    line,
                });
                line += newlines;
                i += consumed;
                continue;
            }

            let kind = if DYNAMIC_EVAL_IDENTS.contains(&word.to_ascii_lowercase().as_str()) {
                TokenKind::DynamicEval
            } else {
                TokenKind::Ident
            };
            tokens.push(Token {
                kind,
                text: word,
                line,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_')
            {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: chars[start..i].iter().collect(),
                line,
            });
            continue;
        }

        tokens.push(Token {
            kind: TokenKind::Op,
            text: c.to_string(),
            line,
        });
        i += 1;
    }

    tokens
}

/// Scan a string literal starting at its opening quote (after any prefix).
/// Returns (chars consumed, newlines crossed). Handles triple quotes and
/// backslash escapes; an unterminated literal runs to end of input.
fn scan_string(chars: &[char]) -> (usize, usize) {
    let quote = chars[0];
    let triple = chars.len() >= 3 && chars[1] == quote && chars[2] == quote;
    let mut newlines = 0;

    if triple {
        let mut i = 3;
        while i < chars.len() {
            if chars[i] == '\n' {
                newlines += 1;
            }
            if chars[i] == '\\' {
                i += 2;
                continue;
            }
            if chars[i] == quote
                && i + 2 < chars.len()
                && chars[i + 1] == quote
                && chars[i + 2] == quote
            {
                return (i + 3, newlines);
            }
            i += 1;
        }
        (chars.len(), newlines)
    } else {
        let mut i = 1;
        while i < chars.len() {
            match chars[i] {
                '\\' => i += 2,
                '\n' => {
                    // Single-quoted literals do not span lines.
                    return (i, newlines);
                }
                c if c == quote => return (i + 1, newlines),
                _ => i += 1,
            }
        }
        (chars.len(), newlines)
    }
}

/// Blank comment bodies and string-literal bodies, keeping the delimiters, so
/// textual rules are not defeated by (or falsely triggered on) literal content.
pub fn normalize(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '#' {
            out.push('#');
            i += 1;
            while i < chars.len() && chars[i] != '\n' {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            let (consumed, _) = scan_string(&chars[i..]);
            for (offset, ch) in chars[i..i + consumed].iter().enumerate() {
                let is_delim = offset == 0
                    || offset == consumed - 1
                    || (consumed >= 6 && (offset < 3 || offset >= consumed - 3) && *ch == c);
                if is_delim && *ch == c {
                    out.push(*ch);
                } else if *ch == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            i += consumed;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}
