//! Guest I/O capture through WASI memory pipes.

use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};

/// Ceiling on captured bytes per stream.
const MAX_CAPTURED_BYTES: usize = 4 * 1024 * 1024;

/// Pipes wired into the guest's stdin/stdout/stderr for one execution.
pub struct ExecutionIo {
    stdin: MemoryInputPipe,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl ExecutionIo {
    /// Create pipes with optional stdin content.
    pub fn new(input: Option<&str>) -> Self {
        Self {
            stdin: MemoryInputPipe::new(
                input.map(|s| s.as_bytes().to_vec()).unwrap_or_default(),
            ),
            stdout: MemoryOutputPipe::new(MAX_CAPTURED_BYTES),
            stderr: MemoryOutputPipe::new(MAX_CAPTURED_BYTES),
        }
    }

    /// Stdin pipe for the WASI context.
    pub fn stdin(&self) -> MemoryInputPipe {
        self.stdin.clone()
    }

    /// Stdout pipe for the WASI context.
    pub fn stdout(&self) -> MemoryOutputPipe {
        self.stdout.clone()
    }

    /// Stderr pipe for the WASI context.
    pub fn stderr(&self) -> MemoryOutputPipe {
        self.stderr.clone()
    }

    /// Captured stdout as a string.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout.contents()).to_string()
    }

    /// Captured stderr as a string.
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr.contents()).to_string()
    }
}

impl Default for ExecutionIo {
    fn default() -> Self {
        Self::new(None)
    }
}
