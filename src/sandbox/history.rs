//! Bounded execution history and derived statistics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Compact projection of one execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub identifier: String,
    pub success: bool,
    pub error_kind: Option<String>,
    pub execution_time_seconds: f64,
    pub memory_used_bytes: u64,
    pub timestamp: u64,
}

/// Aggregate statistics derived on demand; nothing here is stored redundantly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Executions since construction or the last reset, including evicted ones.
    pub total_executions: u64,
    /// Entries currently retained.
    pub recorded: usize,
    pub successes: usize,
    pub failures: usize,
    /// Fraction of retained entries that succeeded; 0.0 when empty.
    pub success_rate: f64,
    pub total_execution_time_seconds: f64,
    pub average_execution_time_seconds: f64,
    /// Live current process memory, read from the runtime.
    pub current_memory_bytes: u64,
    /// Live peak process memory, read from the runtime.
    pub peak_memory_bytes: u64,
}

/// FIFO ring of execution summaries, bounded by the policy's history capacity.
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    total_executions: u64,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_executions: 0,
        }
    }

    /// Append an entry, evicting the oldest once capacity is exceeded.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.total_executions += 1;
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Replace the capacity, evicting oldest entries if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The most recent `limit` entries, oldest to newest.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear entries and the execution counter.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.total_executions = 0;
    }

    /// Derive aggregate statistics from the retained entries plus live
    /// process memory readings.
    pub fn statistics(&self) -> Statistics {
        let recorded = self.entries.len();
        let successes = self.entries.iter().filter(|e| e.success).count();
        let failures = recorded - successes;
        let total_time: f64 = self.entries.iter().map(|e| e.execution_time_seconds).sum();

        Statistics {
            total_executions: self.total_executions,
            recorded,
            successes,
            failures,
            success_rate: if recorded == 0 {
                0.0
            } else {
                successes as f64 / recorded as f64
            },
            total_execution_time_seconds: total_time,
            average_execution_time_seconds: if recorded == 0 {
                0.0
            } else {
                total_time / recorded as f64
            },
            current_memory_bytes: current_process_memory(),
            peak_memory_bytes: peak_process_memory(),
        }
    }
}

/// Resident set size of this process in bytes, zero where unavailable.
#[cfg(target_os = "linux")]
pub fn current_process_memory() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| {
            s.split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4096)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn current_process_memory() -> u64 {
    0
}

/// Peak resident set size of this process in bytes, zero where unavailable.
#[cfg(target_os = "linux")]
pub fn peak_process_memory() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines()
                .find(|line| line.starts_with("VmHWM:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
        })
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn peak_process_memory() -> u64 {
    0
}
