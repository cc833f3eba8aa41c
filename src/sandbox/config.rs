//! Sandbox configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

/// Hard floors applied by [`SandboxOptionsBuilder::build`].
const MIN_MEMORY_LIMIT_MB: u64 = 1;
const MIN_EXECUTION_TIME_S: u64 = 1;
const MIN_CODE_LENGTH: usize = 100;
const MIN_HISTORY_SIZE: usize = 10;

/// Configuration for a snippet sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Maximum guest memory in megabytes.
    pub memory_limit_mb: u64,
    /// Maximum wall-clock execution time in seconds.
    pub max_execution_time_s: u64,
    /// Maximum accepted source length in bytes.
    pub max_code_length: usize,
    /// Private working directory for materialized execution units.
    pub temp_dir: PathBuf,
    /// Maximum number of retained history entries.
    pub max_history_size: usize,
    /// Path to the RustPython wasm file.
    pub interpreter_path: PathBuf,
    /// Epoch interruption interval for cooperative timeout checks.
    pub epoch_tick_interval: Duration,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            memory_limit_mb: 256,
            max_execution_time_s: 10,
            max_code_length: 50_000,
            temp_dir: std::env::temp_dir().join("guardbox"),
            max_history_size: 100,
            interpreter_path: PathBuf::from("assets/rustpython.wasm"),
            epoch_tick_interval: Duration::from_millis(10),
        }
    }
}

impl SandboxOptions {
    /// Create a new builder for SandboxOptions.
    pub fn builder() -> SandboxOptionsBuilder {
        SandboxOptionsBuilder::default()
    }

    /// Memory limit in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }

    /// Wall-clock ceiling as a `Duration`.
    pub fn max_execution(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_s)
    }

    /// Apply a partial update, clamping every changed field to its floor.
    pub fn apply(&mut self, patch: SandboxOptionsPatch) {
        if let Some(mb) = patch.memory_limit_mb {
            self.memory_limit_mb = mb.max(MIN_MEMORY_LIMIT_MB);
        }
        if let Some(secs) = patch.max_execution_time_s {
            self.max_execution_time_s = secs.max(MIN_EXECUTION_TIME_S);
        }
        if let Some(len) = patch.max_code_length {
            self.max_code_length = len.max(MIN_CODE_LENGTH);
        }
        if let Some(dir) = patch.temp_dir {
            self.temp_dir = dir;
        }
        if let Some(size) = patch.max_history_size {
            self.max_history_size = size.max(MIN_HISTORY_SIZE);
        }
        if let Some(path) = patch.interpreter_path {
            self.interpreter_path = path;
        }
    }
}

/// Partial update for [`SandboxOptions`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SandboxOptionsPatch {
    pub memory_limit_mb: Option<u64>,
    pub max_execution_time_s: Option<u64>,
    pub max_code_length: Option<usize>,
    pub temp_dir: Option<PathBuf>,
    pub max_history_size: Option<usize>,
    pub interpreter_path: Option<PathBuf>,
}

/// Builder for creating SandboxOptions instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxOptionsBuilder {
    memory_limit_mb: Option<u64>,
    max_execution_time_s: Option<u64>,
    max_code_length: Option<usize>,
    temp_dir: Option<PathBuf>,
    max_history_size: Option<usize>,
    interpreter_path: Option<PathBuf>,
    epoch_tick_interval: Option<Duration>,
}

impl SandboxOptionsBuilder {
    /// Set the maximum guest memory in megabytes.
    pub fn memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Set the maximum execution time in seconds.
    pub fn max_execution_time_s(mut self, secs: u64) -> Self {
        self.max_execution_time_s = Some(secs);
        self
    }

    /// Set the maximum accepted source length in bytes.
    pub fn max_code_length(mut self, len: usize) -> Self {
        self.max_code_length = Some(len);
        self
    }

    /// Set the private working directory.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set the history capacity.
    pub fn max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = Some(size);
        self
    }

    /// Set the path to the RustPython wasm interpreter.
    pub fn interpreter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter_path = Some(path.into());
        self
    }

    /// Set the epoch tick interval for timeout checking.
    pub fn epoch_tick_interval(mut self, interval: Duration) -> Self {
        self.epoch_tick_interval = Some(interval);
        self
    }

    /// Build the SandboxOptions, clamping each limit to its floor.
    pub fn build(self) -> SandboxOptions {
        let default = SandboxOptions::default();
        SandboxOptions {
            memory_limit_mb: self
                .memory_limit_mb
                .unwrap_or(default.memory_limit_mb)
                .max(MIN_MEMORY_LIMIT_MB),
            max_execution_time_s: self
                .max_execution_time_s
                .unwrap_or(default.max_execution_time_s)
                .max(MIN_EXECUTION_TIME_S),
            max_code_length: self
                .max_code_length
                .unwrap_or(default.max_code_length)
                .max(MIN_CODE_LENGTH),
            temp_dir: self.temp_dir.unwrap_or(default.temp_dir),
            max_history_size: self
                .max_history_size
                .unwrap_or(default.max_history_size)
                .max(MIN_HISTORY_SIZE),
            interpreter_path: self.interpreter_path.unwrap_or(default.interpreter_path),
            epoch_tick_interval: self
                .epoch_tick_interval
                .unwrap_or(default.epoch_tick_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SandboxOptions::default();
        assert_eq!(options.memory_limit_mb, 256);
        assert_eq!(options.max_execution_time_s, 10);
        assert_eq!(options.max_code_length, 50_000);
        assert_eq!(options.max_history_size, 100);
        assert_eq!(options.memory_limit_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let options = SandboxOptions::builder()
            .memory_limit_mb(32)
            .max_execution_time_s(5)
            .max_code_length(1_000)
            .max_history_size(20)
            .build();

        assert_eq!(options.memory_limit_mb, 32);
        assert_eq!(options.max_execution(), Duration::from_secs(5));
        assert_eq!(options.max_code_length, 1_000);
        assert_eq!(options.max_history_size, 20);
    }

    #[test]
    fn test_builder_clamps_floors() {
        let options = SandboxOptions::builder()
            .memory_limit_mb(0)
            .max_execution_time_s(0)
            .max_code_length(5)
            .max_history_size(1)
            .build();

        assert_eq!(options.memory_limit_mb, 1);
        assert_eq!(options.max_execution_time_s, 1);
        assert_eq!(options.max_code_length, 100);
        assert_eq!(options.max_history_size, 10);
    }

    #[test]
    fn test_patch_applies_and_clamps() {
        let mut options = SandboxOptions::default();
        options.apply(SandboxOptionsPatch {
            memory_limit_mb: Some(0),
            max_code_length: Some(2_000),
            ..Default::default()
        });

        assert_eq!(options.memory_limit_mb, 1);
        assert_eq!(options.max_code_length, 2_000);
        // Untouched fields keep their values.
        assert_eq!(options.max_execution_time_s, 10);
    }
}
