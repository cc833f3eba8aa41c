//! Error taxonomy for the sandbox.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category of a static security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The submitted source exceeds the configured maximum length.
    LengthExceeded,
    /// A denied symbol or keyword was found by the lexical pass.
    DeniedSymbol,
    /// A textual pattern rule matched the normalized source.
    DeniedPattern,
    /// Bracket nesting exceeds the fixed ceiling.
    ExcessiveNesting,
    /// Too many function definitions or loop constructs.
    ExcessiveComplexity,
}

impl ViolationKind {
    /// Stable name recorded in `ExecutionOutcome::error_kind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::LengthExceeded => "LengthExceeded",
            ViolationKind::DeniedSymbol => "DeniedSymbol",
            ViolationKind::DeniedPattern => "DeniedPattern",
            ViolationKind::ExcessiveNesting => "ExcessiveNesting",
            ViolationKind::ExcessiveComplexity => "ExcessiveComplexity",
        }
    }
}

/// A single static-analysis breach. The analyzer stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// Which rule class fired.
    pub kind: ViolationKind,
    /// Human-readable detail, e.g. the denied symbol name.
    pub detail: String,
    /// 1-based source line, when the pass tracks one.
    pub line: Option<usize>,
}

impl SecurityFinding {
    pub fn new(kind: ViolationKind, detail: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            line,
        }
    }
}

impl std::fmt::Display for SecurityFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: {} (line {})", self.kind.as_str(), self.detail, line),
            None => write!(f, "{}: {}", self.kind.as_str(), self.detail),
        }
    }
}

/// Errors that can occur while setting up or running the sandbox.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Static analysis vetoed the source before execution.
    #[error("security violation: {0}")]
    SecurityViolation(SecurityFinding),

    /// A cooperative resource guard tripped inside the guest.
    #[error("resource guard fault: {0}")]
    GuardFault(String),

    /// A guest warning was promoted to an error by the escalation handler.
    #[error("escalated runtime {exception_type}: {message}")]
    EscalatedRuntime {
        /// The guest exception type (e.g. "DeprecationWarning").
        exception_type: String,
        /// The exception message.
        message: String,
        /// The full guest traceback, if available.
        traceback: Option<String>,
    },

    /// Working-directory or artifact I/O failed.
    #[error("environment error: {0}")]
    Environment(String),

    /// A second execution was started while one was already in flight.
    #[error("another execution is already in flight on this sandbox instance")]
    ConcurrentExecution,

    /// The execution exceeded the configured wall-clock ceiling.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The guest exceeded the configured memory ceiling.
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    /// Failed to initialize the Wasm runtime.
    #[error("failed to initialize runtime: {0}")]
    RuntimeInit(#[source] anyhow::Error),

    /// Failed to compile or instantiate the interpreter module.
    #[error("failed to load interpreter module: {0}")]
    ModuleLoad(#[source] anyhow::Error),

    /// A guest exception escaped execution.
    #[error("guest {exception_type}: {message}")]
    GuestException {
        /// The guest exception type (e.g. "ValueError").
        exception_type: String,
        /// The exception message.
        message: String,
        /// The full guest traceback, if available.
        traceback: Option<String>,
    },

    /// Execution failed for a reason other than a guest exception.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// I/O error during execution.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The interpreter wasm file was not found.
    #[error("interpreter wasm not found at: {0}")]
    InterpreterNotFound(String),
}

impl SandboxError {
    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents a memory limit breach.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, SandboxError::MemoryLimitExceeded(_))
    }

    /// Check if this error represents a static security violation.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, SandboxError::SecurityViolation(_))
    }

    /// Check if this error represents a guest exception.
    pub fn is_guest_exception(&self) -> bool {
        matches!(self, SandboxError::GuestException { .. })
    }

    /// The stable kind string recorded in `ExecutionOutcome::error_kind`.
    pub fn kind_str(&self) -> String {
        match self {
            SandboxError::SecurityViolation(finding) => finding.kind.as_str().to_string(),
            SandboxError::GuardFault(_) => "GuardFault".to_string(),
            SandboxError::EscalatedRuntime { exception_type, .. } => exception_type.clone(),
            SandboxError::Environment(_) => "EnvironmentError".to_string(),
            SandboxError::ConcurrentExecution => "ConcurrentExecutionError".to_string(),
            SandboxError::Timeout(_) => "Timeout".to_string(),
            SandboxError::MemoryLimitExceeded(_) => "MemoryLimitExceeded".to_string(),
            SandboxError::RuntimeInit(_) => "RuntimeInit".to_string(),
            SandboxError::ModuleLoad(_) => "ModuleLoad".to_string(),
            SandboxError::GuestException { exception_type, .. } => exception_type.clone(),
            SandboxError::ExecutionFailed(_) => "ExecutionFailed".to_string(),
            SandboxError::Io(_) => "IoError".to_string(),
            SandboxError::Config(_) => "ConfigError".to_string(),
            SandboxError::InterpreterNotFound(_) => "InterpreterNotFound".to_string(),
        }
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Parse a guest Python exception from captured stderr.
///
/// Extracts the exception type, message, and traceback from the interpreter's
/// standard error output format.
pub fn parse_guest_exception(stderr: &str) -> Option<SandboxError> {
    if stderr.trim().is_empty() {
        return None;
    }

    let lines: Vec<&str> = stderr.lines().collect();

    // The exception header is the last unindented "SomethingError: message" line.
    let mut exception_line = None;
    let mut traceback_start = None;

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Traceback (most recent call last):") {
            traceback_start = Some(i);
        }
        if !line.starts_with(' ')
            && !line.is_empty()
            && !line.starts_with("Traceback")
            && looks_like_exception(line)
        {
            exception_line = Some((i, *line));
        }
    }

    let (line_idx, exception_str) = exception_line?;
    let (exception_type, message) = match exception_str.find(':') {
        Some(colon) => (
            exception_str[..colon].trim().to_string(),
            exception_str[colon + 1..].trim().to_string(),
        ),
        None => (exception_str.trim().to_string(), String::new()),
    };

    let traceback = traceback_start.map(|start| lines[start..=line_idx].join("\n"));

    Some(SandboxError::GuestException {
        exception_type,
        message,
        traceback,
    })
}

/// Check if a line looks like a Python exception header.
fn looks_like_exception(line: &str) -> bool {
    let exception_suffixes = ["Error", "Exception", "Warning"];
    let standalone_exceptions = [
        "KeyboardInterrupt",
        "SystemExit",
        "StopIteration",
        "GeneratorExit",
    ];

    let first_char = line.chars().next();
    if !first_char.map(|c| c.is_ascii_uppercase()).unwrap_or(false) {
        return false;
    }

    let follows_ok = |after_idx: usize| {
        after_idx >= line.len()
            || line.as_bytes()[after_idx] == b':'
            || line.as_bytes()[after_idx] == b' '
            || line.as_bytes()[after_idx] == b'\n'
    };

    for suffix in exception_suffixes.iter() {
        if let Some(idx) = line.find(suffix) {
            if follows_ok(idx + suffix.len()) {
                return true;
            }
        }
    }

    standalone_exceptions
        .iter()
        .any(|exc| line.starts_with(exc) && follows_ok(exc.len()))
}
