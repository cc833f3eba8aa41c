//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError, SecurityFinding, ViolationKind};
pub use crate::sandbox::{
    config::{SandboxOptions, SandboxOptionsPatch},
    executor::{ExecutionOutcome, SnippetSandbox},
    history::Statistics,
};
