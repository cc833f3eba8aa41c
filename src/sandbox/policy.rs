//! Denylist policy for submitted source.
//!
//! A [`PolicyConfiguration`] is immutable per execution: mutators build a new
//! value which the sandbox swaps in between executions, never mid-flight.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::sandbox::config::SandboxOptions;

/// Symbols denied at call sites and class positions by the lexical pass.
///
/// Targets the guest's ambient-capability surface: dynamic evaluation,
/// filesystem handles, introspection, abrupt termination, debug hooks.
const DEFAULT_DENIED_SYMBOLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "open",
    "input",
    "breakpoint",
    "exit",
    "quit",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "memoryview",
];

/// Keywords denied as bare tokens. `import` covers both statement forms
/// (`import x` and `from x import y`).
const DEFAULT_DENIED_KEYWORDS: &[&str] = &["import"];

/// Builtins documented as remaining usable. Not separately enforced; the
/// denylist is the enforcement mechanism.
const DEFAULT_ALLOWED_FUNCTIONS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "divmod", "enumerate", "filter", "float", "format",
    "frozenset", "hash", "int", "isinstance", "len", "list", "map", "max", "min", "pow", "print",
    "range", "repr", "reversed", "round", "set", "sorted", "str", "sum", "tuple", "zip",
];

/// Immutable-per-execution security policy and resource ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfiguration {
    /// Lowercased symbol names rejected at call sites and class positions.
    pub denied_symbols: BTreeSet<String>,
    /// Lowercased bare tokens rejected anywhere in the source.
    pub denied_keywords: BTreeSet<String>,
    /// Documentation-only allowlist of builtins expected to keep working.
    pub allowed_functions: BTreeSet<String>,
    /// Maximum guest memory in bytes.
    pub memory_limit_bytes: u64,
    /// Wall-clock execution ceiling.
    pub max_execution: Duration,
    /// Maximum accepted source length in bytes.
    pub max_source_length: usize,
    /// History ring-buffer capacity.
    pub history_capacity: usize,
}

impl PolicyConfiguration {
    /// Derive a policy from sandbox options, using the default denylists.
    ///
    /// All numeric limits are positive by construction: the options builder
    /// clamps each one to its floor.
    pub fn from_options(options: &SandboxOptions) -> Self {
        Self {
            denied_symbols: DEFAULT_DENIED_SYMBOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            denied_keywords: DEFAULT_DENIED_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_functions: DEFAULT_ALLOWED_FUNCTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            memory_limit_bytes: options.memory_limit_bytes(),
            max_execution: options.max_execution(),
            max_source_length: options.max_code_length,
            history_capacity: options.max_history_size,
        }
    }

    /// Return a copy with `name` added to the allowlist and removed from the
    /// symbol denylist.
    pub fn with_allowed_function(&self, name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let mut next = self.clone();
        next.denied_symbols.remove(&name);
        next.allowed_functions.insert(name);
        next
    }

    /// Return a copy with `name` added to the symbol denylist and removed from
    /// the allowlist.
    pub fn with_denied_function(&self, name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let mut next = self.clone();
        next.allowed_functions.remove(&name);
        next.denied_symbols.insert(name);
        next
    }

    /// Check whether a lowercased symbol is denied.
    pub fn is_symbol_denied(&self, lowercase_name: &str) -> bool {
        self.denied_symbols.contains(lowercase_name)
    }

    /// Check whether a lowercased token matches a denied keyword.
    pub fn is_keyword_denied(&self, lowercase_token: &str) -> bool {
        self.denied_keywords.contains(lowercase_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_options_limits_positive() {
        let policy = PolicyConfiguration::from_options(&SandboxOptions::default());
        assert!(policy.memory_limit_bytes > 0);
        assert!(policy.max_execution > Duration::ZERO);
        assert!(policy.max_source_length > 0);
        assert!(policy.history_capacity > 0);
    }

    #[test]
    fn test_default_denylists() {
        let policy = PolicyConfiguration::from_options(&SandboxOptions::default());
        assert!(policy.is_symbol_denied("eval"));
        assert!(policy.is_symbol_denied("open"));
        assert!(policy.is_keyword_denied("import"));
        assert!(!policy.is_symbol_denied("print"));
        assert!(policy.allowed_functions.contains("print"));
    }

    #[test]
    fn test_allow_function_moves_between_sets() {
        let policy = PolicyConfiguration::from_options(&SandboxOptions::default());
        let relaxed = policy.with_allowed_function("open");

        assert!(!relaxed.is_symbol_denied("open"));
        assert!(relaxed.allowed_functions.contains("open"));
        // The original is untouched: mutators replace, never mutate in place.
        assert!(policy.is_symbol_denied("open"));
    }

    #[test]
    fn test_deny_function_is_case_insensitive() {
        let policy = PolicyConfiguration::from_options(&SandboxOptions::default());
        let tightened = policy.with_denied_function("Print");

        assert!(tightened.is_symbol_denied("print"));
        assert!(!tightened.allowed_functions.contains("print"));
    }
}
