//! Host-side resource guarding for the Wasm store.
//!
//! The limiter is consulted by the runtime at every guest memory-growth
//! request, which are the host's cooperative check points. Enforcement between
//! check points is best-effort by design.

use wasmtime::{ResourceLimiter, Store};

/// Lifecycle of a guard within one execution. Armed on store creation; a
/// breach at a check point moves it to Tripped; the lifecycle controller
/// disarms it when the execution ends. Never shared across executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Armed,
    Tripped,
    Disarmed,
}

/// Resource limiter enforcing the memory ceiling and recording usage.
pub struct MemoryLimiter {
    max_memory: u64,
    current_memory: u64,
    peak_memory: u64,
    max_table_elements: u64,
    phase: GuardPhase,
}

impl MemoryLimiter {
    /// Create an armed limiter with the given memory ceiling in bytes.
    pub fn new(max_memory: u64) -> Self {
        Self {
            max_memory,
            current_memory: 0,
            peak_memory: 0,
            max_table_elements: 10_000,
            phase: GuardPhase::Armed,
        }
    }

    /// Whether a check point observed a breach.
    pub fn tripped(&self) -> bool {
        self.phase == GuardPhase::Tripped
    }

    /// Current guard phase.
    pub fn phase(&self) -> GuardPhase {
        self.phase
    }

    /// Mark the guard disarmed at the end of the execution.
    pub fn disarm(&mut self) {
        if self.phase == GuardPhase::Armed {
            self.phase = GuardPhase::Disarmed;
        }
    }

    /// Memory in use at the last check point.
    pub fn current_memory(&self) -> u64 {
        self.current_memory
    }

    /// Highest memory ever observed during this execution.
    pub fn peak_memory(&self) -> u64 {
        self.peak_memory
    }

    /// The configured ceiling.
    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }
}

impl ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        let desired_bytes = desired as u64;

        if desired_bytes > self.max_memory {
            self.phase = GuardPhase::Tripped;
            return Ok(false);
        }

        self.current_memory = desired_bytes;
        if desired_bytes > self.peak_memory {
            self.peak_memory = desired_bytes;
        }
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired as u64 > self.max_table_elements {
            self.phase = GuardPhase::Tripped;
            return Ok(false);
        }
        Ok(true)
    }
}

/// Store data carrying the limiter and the guest's WASI context.
pub struct StoreData {
    pub limiter: MemoryLimiter,
    pub wasi: wasmtime_wasi::preview1::WasiP1Ctx,
}

impl StoreData {
    pub fn new(max_memory: u64, wasi: wasmtime_wasi::preview1::WasiP1Ctx) -> Self {
        Self {
            limiter: MemoryLimiter::new(max_memory),
            wasi,
        }
    }
}

/// Extension trait wiring the limiter into a store.
pub trait StoreLimiterExt {
    fn configure_limiter(&mut self);
}

impl StoreLimiterExt for Store<StoreData> {
    fn configure_limiter(&mut self) {
        self.limiter(|data| &mut data.limiter);
    }
}
