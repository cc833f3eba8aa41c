//! Source instrumentation: embeds cooperative guard routines around validated
//! source before materialization.
//!
//! The generated preamble defines a guard fault class, a throttled memory
//! guard, and a time guard, all named from the instance's unique prefix and
//! defined only if absent. Guards are registered at the guest's line-event
//! interrupt points via `sys.settrace` when available, with a fallback to
//! plain sequential execution. An excepthook disarms the guards on any
//! escaping fault and emits one uniform structured-fault line to stderr
//! before delegating to the default hook. The user source is appended
//! verbatim so observable output is unchanged.

use std::fmt::Write;

use crate::sandbox::policy::PolicyConfiguration;

/// Guards trip at this fraction of the configured ceiling.
const GUARD_MARGIN: f64 = 0.9;
/// Minimum interval between memory-guard checks, bounding overhead.
const MEM_CHECK_MIN_INTERVAL_SECS: f64 = 0.05;
/// Nominal bytes per allocated block for the guest's usage estimate.
const BYTES_PER_BLOCK: u64 = 512;

/// Marker prefixing the structured guard-fault line on guest stderr.
pub const FAULT_MARKER: &str = "__GUARDBOX_FAULT__ ";

/// Wrap validated source with the instrumentation preamble and footer.
pub fn wrap(source: &str, policy: &PolicyConfiguration, prefix: &str) -> String {
    let mem_threshold = (policy.memory_limit_bytes as f64 * GUARD_MARGIN) as u64;
    let time_threshold = policy.max_execution.as_secs_f64() * GUARD_MARGIN;

    let mut out = String::with_capacity(source.len() + 2048);

    let w = |out: &mut String, line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    w(&mut out, &format!("import sys as _sys_{prefix}"));
    w(&mut out, &format!("import time as _time_{prefix}"));
    w(&mut out, &format!("if \"_mem_guard_{prefix}\" not in globals():"));
    w(&mut out, &format!("    class _Fault_{prefix}(Exception):"));
    w(&mut out, "        def __init__(self, kind, message):");
    w(&mut out, "            Exception.__init__(self, message)");
    w(&mut out, "            self.kind = kind");
    w(&mut out, &format!("    def _mem_guard_{prefix}():"));
    w(&mut out, "        g = globals()");
    w(&mut out, &format!("        now = _time_{prefix}.monotonic()"));
    let _ = writeln!(
        out,
        "        if now - g.get(\"_mem_last_{prefix}\", 0.0) < {MEM_CHECK_MIN_INTERVAL_SECS}:"
    );
    w(&mut out, "            return");
    w(&mut out, &format!("        g[\"_mem_last_{prefix}\"] = now"));
    w(&mut out, "        try:");
    let _ = writeln!(
        out,
        "            used = _sys_{prefix}.getallocatedblocks() * {BYTES_PER_BLOCK}"
    );
    w(&mut out, "        except Exception:");
    w(&mut out, "            return");
    let _ = writeln!(out, "        if used > {mem_threshold}:");
    let _ = writeln!(
        out,
        "            raise _Fault_{prefix}(\"memory\", \"estimated memory %d bytes exceeds threshold {mem_threshold}\" % used)"
    );
    w(&mut out, &format!("    def _time_guard_{prefix}():"));
    w(&mut out, "        g = globals()");
    w(&mut out, &format!("        start = g.get(\"_start_{prefix}\")"));
    w(&mut out, "        if start is None:");
    let _ = writeln!(
        out,
        "            g[\"_start_{prefix}\"] = _time_{prefix}.monotonic()"
    );
    w(&mut out, "            return");
    let _ = writeln!(
        out,
        "        if _time_{prefix}.monotonic() - start > {time_threshold}:"
    );
    let _ = writeln!(
        out,
        "            raise _Fault_{prefix}(\"time\", \"elapsed time exceeds threshold {time_threshold}s\")"
    );
    w(&mut out, &format!("def _trace_{prefix}(frame, event, arg):"));
    w(&mut out, "    if event == \"line\":");
    w(&mut out, &format!("        _time_guard_{prefix}()"));
    w(&mut out, &format!("        _mem_guard_{prefix}()"));
    w(&mut out, &format!("    return _trace_{prefix}"));
    w(&mut out, &format!("_orig_hook_{prefix} = _sys_{prefix}.excepthook"));
    w(&mut out, &format!("def _hook_{prefix}(exc_type, exc, tb):"));
    w(&mut out, &format!("    if hasattr(_sys_{prefix}, \"settrace\"):"));
    w(&mut out, &format!("        _sys_{prefix}.settrace(None)"));
    w(&mut out, &format!("    if isinstance(exc, _Fault_{prefix}):"));
    w(
        &mut out,
        "        msg = str(exc).replace(\"\\\\\", \"\\\\\\\\\").replace('\"', '\\\\\"')",
    );
    let _ = writeln!(
        out,
        "        _sys_{prefix}.stderr.write('{FAULT_MARKER}{{\"kind\": \"%s\", \"message\": \"%s\"}}\\n' % (exc.kind, msg))"
    );
    w(&mut out, &format!("    _orig_hook_{prefix}(exc_type, exc, tb)"));
    w(&mut out, &format!("_sys_{prefix}.excepthook = _hook_{prefix}"));
    w(&mut out, &format!("if hasattr(_sys_{prefix}, \"settrace\"):"));
    w(&mut out, &format!("    _time_guard_{prefix}()"));
    w(&mut out, &format!("    _sys_{prefix}.settrace(_trace_{prefix})"));

    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }

    w(&mut out, &format!("if hasattr(_sys_{prefix}, \"settrace\"):"));
    w(&mut out, &format!("    _sys_{prefix}.settrace(None)"));

    out
}
