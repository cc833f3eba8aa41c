//! Execution lifecycle controller.
//!
//! Orchestrates validate, wrap, materialize, run, cleanup for every execution.
//! Failures inside the sandbox never escape as errors: callers always receive
//! an [`ExecutionOutcome`], with `success = false` and an error kind on
//! failure. Only caller misuse (a second execution while one is in flight)
//! returns an `Err`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wasmtime::{Engine, Linker, Module, Store};
use wasmtime_wasi::preview1;
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

use crate::error::{parse_guest_exception, Result, SandboxError};
use crate::sandbox::analyzer;
use crate::sandbox::cache::global_cache;
use crate::sandbox::config::{SandboxOptions, SandboxOptionsPatch};
use crate::sandbox::environment::{EnvSettings, EnvironmentManager, GUEST_WORK_DIR};
use crate::sandbox::history::{ExecutionHistory, HistoryEntry, Statistics};
use crate::sandbox::io::ExecutionIo;
use crate::sandbox::limits::{StoreData, StoreLimiterExt};
use crate::sandbox::policy::PolicyConfiguration;
use crate::sandbox::wrapper::{self, FAULT_MARKER};

/// Pause between batch items, letting transient resource pressure subside.
const BATCH_ITEM_PAUSE: Duration = Duration::from_millis(50);

/// Immutable record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether the snippet ran to completion without a fault.
    pub success: bool,
    /// Captured guest stdout.
    pub output: String,
    /// Failure message, if any.
    pub error_message: Option<String>,
    /// Stable failure kind, if any (e.g. "DeniedSymbol", "GuardFault").
    pub error_kind: Option<String>,
    /// Wall-clock duration of the whole lifecycle in seconds.
    pub execution_time_seconds: f64,
    /// Guest memory in use at the last check point.
    pub memory_used_bytes: u64,
    /// Highest guest memory observed during the execution.
    pub peak_memory_bytes: u64,
    /// Caller-supplied or generated identifier.
    pub identifier: String,
    /// Unix timestamp when the execution started.
    pub timestamp: u64,
}

impl ExecutionOutcome {
    /// Check if the execution was successful.
    pub fn is_success(&self) -> bool {
        self.success
    }

    fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            identifier: self.identifier.clone(),
            success: self.success,
            error_kind: self.error_kind.clone(),
            execution_time_seconds: self.execution_time_seconds,
            memory_used_bytes: self.memory_used_bytes,
            timestamp: self.timestamp,
        }
    }
}

/// Raw result of running one execution unit in the Wasm runtime.
struct RawExecution {
    stdout: String,
    stderr: String,
    exit_code: i32,
    memory_used: u64,
    peak_memory: u64,
    memory_tripped: bool,
}

/// Clears the single-flight flag when an execution ends, however it ends.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// A guarded execution environment for semi-trusted snippets.
///
/// One instance permits at most one in-flight execution; concurrent callers
/// receive [`SandboxError::ConcurrentExecution`] and must serialize externally
/// or use separate instances.
pub struct SnippetSandbox {
    options: Mutex<SandboxOptions>,
    policy: Mutex<Arc<PolicyConfiguration>>,
    engine: Engine,
    environment: EnvironmentManager,
    history: Mutex<ExecutionHistory>,
    in_flight: AtomicBool,
    exec_seq: AtomicU64,
}

impl SnippetSandbox {
    /// Create a new sandbox. The interpreter module is compiled lazily on the
    /// first execution that survives validation, so construction and rejection
    /// paths never touch the wasm artifact.
    pub fn new(options: SandboxOptions) -> Result<Self> {
        let mut engine_config = wasmtime::Config::new();
        engine_config.epoch_interruption(true);

        let engine = Engine::new(&engine_config).map_err(|e| {
            SandboxError::RuntimeInit(anyhow::anyhow!("failed to create engine: {}", e))
        })?;

        let policy = Arc::new(PolicyConfiguration::from_options(&options));
        let environment = EnvironmentManager::new(&options.temp_dir);
        let history = ExecutionHistory::new(options.max_history_size);

        Ok(Self {
            options: Mutex::new(options),
            policy: Mutex::new(policy),
            engine,
            environment,
            history: Mutex::new(history),
            in_flight: AtomicBool::new(false),
            exec_seq: AtomicU64::new(0),
        })
    }

    /// Execute a snippet, returning its outcome.
    ///
    /// In-sandbox failures (security rejection, guard faults, guest
    /// exceptions, resource breaches) are reported inside the outcome, never
    /// as `Err`. `Err` is reserved for caller misuse.
    pub async fn execute(&self, source: &str, identifier: Option<&str>) -> Result<ExecutionOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SandboxError::ConcurrentExecution);
        }
        let _flight = InFlightGuard {
            flag: &self.in_flight,
        };

        let identifier = identifier.map(str::to_string).unwrap_or_else(|| {
            format!("exec_{}", self.exec_seq.fetch_add(1, Ordering::Relaxed) + 1)
        });
        let started = Instant::now();
        let timestamp = unix_timestamp();
        let policy = Arc::clone(&self.policy.lock().unwrap());
        let env_before = self.environment.snapshot();

        let stripped = strip_code_fences(source);

        // Validation failures short-circuit before instrumentation and
        // materialization; no artifact is created for rejected source.
        if let Err(finding) = analyzer::validate(&stripped, &policy) {
            debug!(%identifier, %finding, "rejected by static analysis");
            let outcome = self.failed_outcome(
                identifier,
                &SandboxError::SecurityViolation(finding),
                started,
                timestamp,
                0,
                0,
            );
            self.record(&outcome);
            return Ok(outcome);
        }

        let instrumented = wrapper::wrap(&stripped, &policy, self.environment.prefix());
        let unit = match self.environment.materialize(&instrumented) {
            Ok(unit) => unit,
            Err(e) => {
                let outcome = self.failed_outcome(identifier, &e, started, timestamp, 0, 0);
                self.record(&outcome);
                return Ok(outcome);
            }
        };

        self.environment.install_execution_settings();
        let exec_settings = self.environment.snapshot();

        let run_result = self.run_unit(unit.guest_path(), exec_settings, &policy).await;

        // Guaranteed cleanup: dispose the unit and restore the environment
        // regardless of how execution ended.
        self.environment.dispose(unit);
        self.environment.restore(env_before);

        let outcome = match run_result {
            Ok(raw) => self.classify(identifier, raw, started, timestamp),
            Err(e) => self.failed_outcome(identifier, &e, started, timestamp, 0, 0),
        };
        self.record(&outcome);
        Ok(outcome)
    }

    /// Execute a batch of snippets strictly sequentially.
    ///
    /// Each item's failure is isolated to its own outcome; one denied or
    /// faulting snippet never aborts the batch.
    pub async fn execute_batch(
        &self,
        batch: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, ExecutionOutcome>> {
        let mut results = BTreeMap::new();
        let last_index = batch.len().saturating_sub(1);

        for (i, (key, source)) in batch.into_iter().enumerate() {
            let outcome = match self.execute(&source, Some(&key)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.failed_outcome(key.clone(), &e, Instant::now(), unix_timestamp(), 0, 0)
                }
            };
            results.insert(key, outcome);

            if i < last_index {
                tokio::time::sleep(BATCH_ITEM_PAUSE).await;
            }
        }

        Ok(results)
    }

    /// Aggregate statistics derived from history plus live memory readings.
    pub fn statistics(&self) -> Statistics {
        self.history.lock().unwrap().statistics()
    }

    /// The most recent `limit` history entries, oldest to newest.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.lock().unwrap().recent(limit)
    }

    /// Clear history and the execution counter.
    pub fn reset_history(&self) {
        self.history.lock().unwrap().reset();
    }

    /// Apply a partial options update. Resource ceilings in the policy are
    /// rebuilt; denylist customizations are preserved. The policy value is
    /// replaced atomically, never mutated in place.
    pub fn set_config(&self, patch: SandboxOptionsPatch) -> &Self {
        let mut options = self.options.lock().unwrap();
        options.apply(patch);

        let mut policy_slot = self.policy.lock().unwrap();
        let mut next = (**policy_slot).clone();
        next.memory_limit_bytes = options.memory_limit_bytes();
        next.max_execution = options.max_execution();
        next.max_source_length = options.max_code_length;
        next.history_capacity = options.max_history_size;
        *policy_slot = Arc::new(next);

        self.history
            .lock()
            .unwrap()
            .set_capacity(options.max_history_size);
        self
    }

    /// Move a symbol to the allowlist.
    pub fn add_allowed_function(&self, name: &str) -> &Self {
        let mut policy_slot = self.policy.lock().unwrap();
        *policy_slot = Arc::new(policy_slot.with_allowed_function(name));
        self
    }

    /// Move a symbol to the denylist.
    pub fn add_denied_function(&self, name: &str) -> &Self {
        let mut policy_slot = self.policy.lock().unwrap();
        *policy_slot = Arc::new(policy_slot.with_denied_function(name));
        self
    }

    /// Current options snapshot.
    pub fn options(&self) -> SandboxOptions {
        self.options.lock().unwrap().clone()
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<PolicyConfiguration> {
        Arc::clone(&self.policy.lock().unwrap())
    }

    /// Explicit teardown: sweep artifacts and the working directory. Also
    /// runs automatically when the sandbox is dropped.
    pub fn cleanup(&self) {
        self.environment.cleanup();
    }

    /// Run a materialized unit under the Wasm runtime: a blocking execution
    /// task raced against an epoch ticker and a timeout.
    async fn run_unit(
        &self,
        unit_guest_path: String,
        settings: EnvSettings,
        policy: &PolicyConfiguration,
    ) -> Result<RawExecution> {
        let options = self.options.lock().unwrap().clone();
        let timeout = policy.max_execution;
        let epoch_interval = options.epoch_tick_interval;
        let max_memory = policy.memory_limit_bytes;
        let engine = self.engine.clone();
        let work_dir = self.environment.work_dir().to_path_buf();

        let module = global_cache().get_or_compile(&engine, &options.interpreter_path)?;

        // Epoch deadline in ticks; the ticker advances one tick per interval.
        let deadline_ticks =
            (timeout.as_millis() / epoch_interval.as_millis().max(1)).max(1) as u64;

        let ticker_engine = engine.clone();
        let ticker_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(epoch_interval);
            loop {
                interval.tick().await;
                ticker_engine.increment_epoch();
            }
        });

        let exec_engine = engine.clone();
        let exec_handle = tokio::task::spawn_blocking(move || {
            run_unit_sync(
                &exec_engine,
                &module,
                &work_dir,
                &unit_guest_path,
                &settings,
                max_memory,
                deadline_ticks,
            )
        });

        let result = tokio::select! {
            result = exec_handle => {
                ticker_handle.abort();
                match result {
                    Ok(inner) => inner,
                    Err(e) => Err(SandboxError::ExecutionFailed(format!("task panicked: {}", e))),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                ticker_handle.abort();
                engine.increment_epoch(); // Force the epoch trap.
                Err(SandboxError::Timeout(timeout))
            }
        };

        result
    }

    /// Convert a raw run into an outcome, classifying faults by precedence:
    /// memory breach, guest guard fault, guest exception, nonzero exit.
    fn classify(
        &self,
        identifier: String,
        raw: RawExecution,
        started: Instant,
        timestamp: u64,
    ) -> ExecutionOutcome {
        if raw.memory_tripped {
            return self.failed_outcome(
                identifier,
                &SandboxError::MemoryLimitExceeded(
                    "memory limit exceeded during execution".to_string(),
                ),
                started,
                timestamp,
                raw.memory_used,
                raw.peak_memory,
            );
        }

        if let Some((kind, message)) = parse_guard_fault(&raw.stderr) {
            return self.failed_outcome(
                identifier,
                &SandboxError::GuardFault(format!("{} guard tripped: {}", kind, message)),
                started,
                timestamp,
                raw.memory_used,
                raw.peak_memory,
            );
        }

        if raw.exit_code != 0 {
            let error = match parse_guest_exception(&raw.stderr) {
                Some(SandboxError::GuestException {
                    exception_type,
                    message,
                    traceback,
                }) if exception_type.ends_with("Warning") => SandboxError::EscalatedRuntime {
                    exception_type,
                    message,
                    traceback,
                },
                Some(e) => e,
                None => SandboxError::ExecutionFailed(format!(
                    "interpreter exited with code {}",
                    raw.exit_code
                )),
            };
            return self.failed_outcome(
                identifier,
                &error,
                started,
                timestamp,
                raw.memory_used,
                raw.peak_memory,
            );
        }

        ExecutionOutcome {
            success: true,
            output: raw.stdout,
            error_message: None,
            error_kind: None,
            execution_time_seconds: started.elapsed().as_secs_f64(),
            memory_used_bytes: raw.memory_used,
            peak_memory_bytes: raw.peak_memory,
            identifier,
            timestamp,
        }
    }

    fn failed_outcome(
        &self,
        identifier: String,
        error: &SandboxError,
        started: Instant,
        timestamp: u64,
        memory_used: u64,
        peak_memory: u64,
    ) -> ExecutionOutcome {
        ExecutionOutcome {
            success: false,
            output: String::new(),
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind_str()),
            execution_time_seconds: started.elapsed().as_secs_f64(),
            memory_used_bytes: memory_used,
            peak_memory_bytes: peak_memory,
            identifier,
            timestamp,
        }
    }

    fn record(&self, outcome: &ExecutionOutcome) {
        self.history.lock().unwrap().record(outcome.to_history_entry());
    }
}

impl Drop for SnippetSandbox {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Synchronous unit execution; runs on a blocking task.
fn run_unit_sync(
    engine: &Engine,
    module: &Module,
    work_dir: &std::path::Path,
    unit_guest_path: &str,
    settings: &EnvSettings,
    max_memory: u64,
    deadline_ticks: u64,
) -> Result<RawExecution> {
    let io = ExecutionIo::new(None);

    let mut args = vec!["python".to_string()];
    args.extend(settings.interpreter_args());
    args.push(unit_guest_path.to_string());

    // WASI context: read-only preopen of the instance work dir, nothing else.
    let mut builder = WasiCtxBuilder::new();
    builder.args(&args);
    builder.stdin(io.stdin());
    builder.stdout(io.stdout());
    builder.stderr(io.stderr());
    builder
        .preopened_dir(work_dir, GUEST_WORK_DIR, DirPerms::READ, FilePerms::READ)
        .map_err(|e| {
            SandboxError::RuntimeInit(anyhow::anyhow!("failed to preopen work dir: {}", e))
        })?;
    let wasi_ctx = builder.build_p1();

    let store_data = StoreData::new(max_memory, wasi_ctx);
    let mut store = Store::new(engine, store_data);
    store.configure_limiter();

    store.epoch_deadline_trap();
    store.set_epoch_deadline(deadline_ticks);

    let mut linker = Linker::new(engine);
    preview1::add_to_linker_sync(&mut linker, |data: &mut StoreData| &mut data.wasi)
        .map_err(|e| SandboxError::RuntimeInit(anyhow::anyhow!("failed to link WASI: {}", e)))?;

    let instance = linker.instantiate(&mut store, module).map_err(|e| {
        if store.data().limiter.tripped() {
            return SandboxError::MemoryLimitExceeded(
                "memory limit exceeded during instantiation".to_string(),
            );
        }
        SandboxError::ModuleLoad(anyhow::anyhow!("failed to instantiate: {}", e))
    })?;

    let start = instance
        .get_typed_func::<(), ()>(&mut store, "_start")
        .map_err(|e| {
            SandboxError::ModuleLoad(anyhow::anyhow!("failed to get _start function: {}", e))
        })?;

    let exit_code = match start.call(&mut store, ()) {
        Ok(()) => 0,
        Err(e) => {
            if store.data().limiter.tripped() {
                return Err(SandboxError::MemoryLimitExceeded(
                    "memory limit exceeded during execution".to_string(),
                ));
            }
            if e.to_string().contains("epoch") || e.to_string().contains("interrupt") {
                return Err(SandboxError::Timeout(Duration::from_secs(0)));
            }
            if let Some(exit) = e.downcast_ref::<I32Exit>() {
                exit.0
            } else {
                return Err(SandboxError::ExecutionFailed(e.to_string()));
            }
        }
    };

    store.data_mut().limiter.disarm();

    Ok(RawExecution {
        stdout: io.stdout_str(),
        stderr: io.stderr_str(),
        exit_code,
        memory_used: store.data().limiter.current_memory(),
        peak_memory: store.data().limiter.peak_memory(),
        memory_tripped: store.data().limiter.tripped(),
    })
}

/// Strip incidental Markdown code fences around a snippet. Pure text
/// normalization; anything that is not a leading/trailing fence is untouched.
fn strip_code_fences(source: &str) -> String {
    let trimmed = source.trim();
    if !trimmed.starts_with("```") {
        return source.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines
        .first()
        .map(|l| l.starts_with("```"))
        .unwrap_or(false)
    {
        lines.remove(0);
    }
    if lines.last().map(|l| l.trim() == "```").unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

/// Parse the structured guard-fault marker emitted by the instrumentation.
fn parse_guard_fault(stderr: &str) -> Option<(String, String)> {
    let line = stderr.lines().find(|l| l.starts_with(FAULT_MARKER))?;
    let value: serde_json::Value = serde_json::from_str(&line[FAULT_MARKER.len()..]).ok()?;
    Some((
        value.get("kind")?.as_str()?.to_string(),
        value.get("message")?.as_str()?.to_string(),
    ))
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sandbox() -> SnippetSandbox {
        let options = SandboxOptions::builder()
            .temp_dir(std::env::temp_dir().join("guardbox-exec-tests"))
            .build();
        SnippetSandbox::new(options).unwrap()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```python\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fences("```\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fences("x = 1"), "x = 1");
        // Fences in the middle are not incidental markers.
        assert_eq!(strip_code_fences("x = '```'"), "x = '```'");
    }

    #[test]
    fn test_parse_guard_fault_marker() {
        let stderr = format!(
            "{}{{\"kind\": \"time\", \"message\": \"elapsed time exceeds threshold 9s\"}}\n",
            FAULT_MARKER
        );
        let (kind, message) = parse_guard_fault(&stderr).unwrap();
        assert_eq!(kind, "time");
        assert!(message.contains("elapsed"));

        assert!(parse_guard_fault("ordinary stderr text").is_none());
    }

    #[tokio::test]
    async fn test_denied_source_fails_without_artifact() {
        let sandbox = test_sandbox();
        let outcome = sandbox.execute("import os", None).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("DeniedSymbol"));
        // Rejection happens before materialization; nothing was written.
        assert!(!sandbox.environment.work_dir().exists());
    }

    #[tokio::test]
    async fn test_oversize_source_fails_without_artifact() {
        let sandbox = test_sandbox();
        sandbox.set_config(SandboxOptionsPatch {
            max_code_length: Some(100),
            ..Default::default()
        });

        let source = "x = 1\n".repeat(100);
        let outcome = sandbox.execute(&source, None).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("LengthExceeded"));
        assert!(!sandbox.environment.work_dir().exists());
    }

    #[tokio::test]
    async fn test_single_flight_rejects_reentry() {
        let sandbox = test_sandbox();
        sandbox.in_flight.store(true, Ordering::SeqCst);

        let result = sandbox.execute("x = 1", None).await;
        assert!(matches!(result, Err(SandboxError::ConcurrentExecution)));

        // The rejected attempt must not clear the in-flight flag.
        assert!(sandbox.in_flight.load(Ordering::SeqCst));
        sandbox.in_flight.store(false, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_rejections_are_recorded_in_history() {
        let sandbox = test_sandbox();
        sandbox.execute("import os", Some("first")).await.unwrap();
        sandbox.execute("open('x')", Some("second")).await.unwrap();

        let entries = sandbox.history(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "first");
        assert_eq!(entries[1].identifier, "second");
        assert!(entries.iter().all(|e| !e.success));

        let stats = sandbox.statistics();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_generated_identifiers_are_distinct() {
        let sandbox = test_sandbox();
        let a = sandbox.execute("import os", None).await.unwrap();
        let b = sandbox.execute("import os", None).await.unwrap();
        assert_ne!(a.identifier, b.identifier);
    }

    #[tokio::test]
    async fn test_batch_isolates_denied_items() {
        let sandbox = test_sandbox();
        let mut batch = BTreeMap::new();
        batch.insert("a".to_string(), "import os".to_string());
        batch.insert("b".to_string(), "eval('1')".to_string());

        let results = sandbox.execute_batch(batch).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["a"].error_kind.as_deref(), Some("DeniedSymbol"));
        assert_eq!(results["b"].error_kind.as_deref(), Some("DeniedSymbol"));
        assert_eq!(results["a"].identifier, "a");
    }

    #[tokio::test]
    async fn test_environment_restored_after_rejection() {
        let sandbox = test_sandbox();
        let before = sandbox.environment.snapshot();
        sandbox.execute("import os", None).await.unwrap();
        assert_eq!(sandbox.environment.snapshot(), before);
    }

    #[tokio::test]
    async fn test_environment_restored_across_mixed_sequence() {
        let sandbox = test_sandbox();
        let before = sandbox.environment.snapshot();

        // Rejections and materialized runs interleaved; the snapshot must be
        // back to its prior state after every single one.
        for source in ["import os", "x = 1", "eval('1')", "print(2)", "open('f')", "y = 3"] {
            let _ = sandbox.execute(source, None).await.unwrap();
            assert_eq!(sandbox.environment.snapshot(), before, "after {:?}", source);
        }
    }

    #[tokio::test]
    async fn test_policy_mutators() {
        let sandbox = test_sandbox();

        // print() is benign by default.
        let ok = sandbox.execute("print(1)", None).await.unwrap();
        // Without the interpreter asset present, this fails at module load,
        // not at validation.
        assert_ne!(ok.error_kind.as_deref(), Some("DeniedSymbol"));

        sandbox.add_denied_function("print");
        let denied = sandbox.execute("print(1)", None).await.unwrap();
        assert_eq!(denied.error_kind.as_deref(), Some("DeniedSymbol"));

        sandbox.add_allowed_function("print");
        let allowed = sandbox.execute("print(1)", None).await.unwrap();
        assert_ne!(allowed.error_kind.as_deref(), Some("DeniedSymbol"));
    }

    #[tokio::test]
    async fn test_set_config_rebuilds_limits_keeps_denylist_edits() {
        let sandbox = test_sandbox();
        sandbox.add_denied_function("myfunc");

        sandbox.set_config(SandboxOptionsPatch {
            memory_limit_mb: Some(64),
            max_history_size: Some(15),
            ..Default::default()
        });

        let policy = sandbox.policy();
        assert_eq!(policy.memory_limit_bytes, 64 * 1024 * 1024);
        assert_eq!(policy.history_capacity, 15);
        assert!(policy.is_symbol_denied("myfunc"));
    }

    #[tokio::test]
    async fn test_history_bound_after_overflow() {
        let sandbox = test_sandbox();
        sandbox.set_config(SandboxOptionsPatch {
            max_history_size: Some(10),
            ..Default::default()
        });

        for i in 0..13 {
            sandbox
                .execute("import os", Some(&format!("run{}", i)))
                .await
                .unwrap();
        }

        let entries = sandbox.history(100);
        assert_eq!(entries.len(), 10);
        assert_eq!(entries.first().unwrap().identifier, "run3");
        assert_eq!(entries.last().unwrap().identifier, "run12");
    }

    #[tokio::test]
    async fn test_reset_history() {
        let sandbox = test_sandbox();
        sandbox.execute("import os", None).await.unwrap();
        sandbox.reset_history();

        assert!(sandbox.history(10).is_empty());
        assert_eq!(sandbox.statistics().total_executions, 0);
    }
}
