//! Execution environment management: ambient interpreter settings and the
//! private working directory holding materialized execution units.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{Result, SandboxError};

/// Process-wide instance counter feeding unique prefixes.
static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Guest directory the working directory is preopened as.
pub const GUEST_WORK_DIR: &str = "/box";

/// Deny-all marker written into the working directory on first use.
const DENY_MARKER_NAME: &str = ".deny-all";

/// Ambient interpreter-invocation settings, snapshotted and restored around
/// every execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    /// Promote guest warnings to errors (the error-escalation handler).
    pub warnings_as_errors: bool,
    /// Verbose interpreter output.
    pub verbose: bool,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            warnings_as_errors: false,
            verbose: false,
        }
    }
}

impl EnvSettings {
    /// Interpreter flags realizing these settings.
    pub fn interpreter_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.warnings_as_errors {
            args.push("-W".to_string());
            args.push("error".to_string());
        }
        if self.verbose {
            args.push("-v".to_string());
        }
        args
    }
}

/// A materialized, instrumented execution artifact. Exclusively owned by the
/// lifecycle controller for one execution and unconditionally disposed at its
/// end.
#[derive(Debug)]
pub struct ExecutionUnit {
    /// Host path of the artifact.
    pub path: PathBuf,
    file_name: String,
}

impl ExecutionUnit {
    /// Path of the artifact as seen from inside the guest.
    pub fn guest_path(&self) -> String {
        format!("{}/{}", GUEST_WORK_DIR, self.file_name)
    }
}

/// Owns the instance's working directory, unique prefix, and ambient settings.
pub struct EnvironmentManager {
    work_dir: PathBuf,
    prefix: String,
    settings: Mutex<EnvSettings>,
    unit_seq: AtomicU64,
}

impl EnvironmentManager {
    /// Create a manager rooted under `temp_dir`. No filesystem access happens
    /// until the first materialization.
    pub fn new(temp_dir: &Path) -> Self {
        let prefix = format!(
            "gbx{}_{}",
            std::process::id(),
            INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            work_dir: temp_dir.join(&prefix),
            prefix,
            settings: Mutex::new(EnvSettings::default()),
            unit_seq: AtomicU64::new(0),
        }
    }

    /// The per-instance unique prefix; also names the generated guard routines.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The instance-owned working directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Capture the current ambient settings.
    pub fn snapshot(&self) -> EnvSettings {
        self.settings.lock().unwrap().clone()
    }

    /// Reinstate previously captured settings.
    pub fn restore(&self, settings: EnvSettings) {
        *self.settings.lock().unwrap() = settings;
    }

    /// Apply the per-execution settings: install the error-escalation handler.
    pub fn install_execution_settings(&self) {
        self.settings.lock().unwrap().warnings_as_errors = true;
    }

    /// Write instrumented source into a freshly named, minimally-permissioned
    /// artifact inside the working directory.
    pub fn materialize(&self, instrumented_source: &str) -> Result<ExecutionUnit> {
        self.ensure_work_dir()?;

        let file_name = format!(
            "{}_unit_{}.py",
            self.prefix,
            self.unit_seq.fetch_add(1, Ordering::Relaxed)
        );
        let path = self.work_dir.join(&file_name);

        std::fs::write(&path, instrumented_source)
            .map_err(|e| SandboxError::Environment(format!("failed to write unit: {}", e)))?;
        restrict_permissions(&path, 0o600)?;

        debug!(unit = %path.display(), "materialized execution unit");
        Ok(ExecutionUnit { path, file_name })
    }

    /// Delete the artifact. Failure is logged, never escalated.
    pub fn dispose(&self, unit: ExecutionUnit) {
        if let Err(e) = std::fs::remove_file(&unit.path) {
            warn!(unit = %unit.path.display(), error = %e, "failed to remove execution unit");
        }
    }

    /// Sweep stale artifacts and remove the working directory.
    pub fn cleanup(&self) {
        if !self.work_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.work_dir) {
            warn!(dir = %self.work_dir.display(), error = %e, "failed to remove working directory");
        }
    }

    /// Create the working directory with restrictive permissions and the
    /// deny-all marker on first use.
    fn ensure_work_dir(&self) -> Result<()> {
        if self.work_dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            SandboxError::Environment(format!(
                "failed to create working directory {}: {}",
                self.work_dir.display(),
                e
            ))
        })?;
        restrict_permissions(&self.work_dir, 0o700)?;

        let marker = self.work_dir.join(DENY_MARKER_NAME);
        std::fs::write(&marker, "deny from all\n")
            .map_err(|e| SandboxError::Environment(format!("failed to write deny marker: {}", e)))?;
        Ok(())
    }
}

impl Drop for EnvironmentManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        SandboxError::Environment(format!(
            "failed to restrict permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
