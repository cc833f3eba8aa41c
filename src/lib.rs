//! # Guardbox
//!
//! Policy-guarded execution of short, semi-trusted Python snippets in
//! WebAssembly isolation — for plugin hooks, user-supplied rule or formula
//! evaluation, and scripted extensions that must not require spawning an
//! external process.
//!
//! Every submitted snippet passes a static security pipeline (length check,
//! lexical denylist pass, textual pattern pass over normalized source, and a
//! complexity pass) before it is instrumented with cooperative resource
//! guards, materialized into a restricted-permission execution unit, and run
//! by a RustPython interpreter under Wasmtime:
//!
//! - **Denylist validation**: dangerous symbols, keywords, and patterns are
//!   rejected before any code runs
//! - **Memory limits**: enforced at the runtime's memory-growth check points
//!   and by an embedded guest-side guard
//! - **Timeout protection**: epoch-based interruption plus a guest-side time
//!   guard at line-event interrupt points
//! - **Filesystem isolation**: only the instance's private working directory
//!   is visible to the guest, read-only
//! - **Network and process isolation**: no sockets, no subprocesses
//!
//! ## Example
//!
//! ```rust,ignore
//! use guardbox::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = SandboxOptions::builder()
//!         .memory_limit_mb(64)
//!         .max_execution_time_s(5)
//!         .build();
//!
//!     let sandbox = SnippetSandbox::new(options)?;
//!     let outcome = sandbox.execute("print(sum(range(10)))", None).await?;
//!
//!     assert!(outcome.is_success());
//!     assert_eq!(outcome.output.trim(), "45");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! This is a defense-in-depth mitigation, not a true isolation boundary:
//! static inspection cannot catch everything static inspection cannot see,
//! and resource enforcement is cooperative — it relies on check points the
//! runtime offers during execution. Tight, interrupt-free native operations
//! cannot be preempted mid-flight. The layers are:
//!
//! 1. **Static analysis**: denylisted symbols, patterns, and structural
//!    ceilings vetted before execution
//! 2. **WebAssembly sandboxing**: the guest has no direct host access
//! 3. **WASI restrictions**: one read-only preopened directory, no network
//! 4. **Resource guards**: advisory memory/time checks at cooperative
//!    interrupt points, backed by hard runtime ceilings

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError, SecurityFinding, ViolationKind};
pub use sandbox::cache::{global_cache, ModuleCache};
pub use sandbox::config::{SandboxOptions, SandboxOptionsBuilder, SandboxOptionsPatch};
pub use sandbox::executor::{ExecutionOutcome, SnippetSandbox};
pub use sandbox::history::{HistoryEntry, Statistics};
pub use sandbox::policy::PolicyConfiguration;
