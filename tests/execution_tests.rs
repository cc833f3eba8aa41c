//! End-to-end execution tests against a real RustPython interpreter.
//!
//! These need the `assets/rustpython.wasm` asset and are ignored by default.
//! They verify that benign snippets run unmodified, that the cooperative
//! guards trip under pressure, and that escape attempts which survive static
//! analysis still die inside the guest.

use std::collections::BTreeMap;

use guardbox::prelude::*;

fn exec_options(tag: &str) -> SandboxOptions {
    SandboxOptions::builder()
        .temp_dir(std::env::temp_dir().join(format!("guardbox-e2e-{}", tag)))
        .memory_limit_mb(64)
        .max_execution_time_s(5)
        .build()
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn benign_snippet_output_is_unmodified() {
    let sandbox = SnippetSandbox::new(exec_options("benign")).unwrap();

    let outcome = sandbox
        .execute("for i in range(3):\n    print(i * i)", None)
        .await
        .unwrap();

    assert!(outcome.success, "benign snippet should succeed: {:?}", outcome);
    // Instrumentation must not alter what the snippet writes.
    assert_eq!(outcome.output, "0\n1\n4\n");
    assert!(outcome.error_kind.is_none());
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn repeated_execution_is_idempotent() {
    let sandbox = SnippetSandbox::new(exec_options("idem")).unwrap();
    let source = "total = sum(range(100))\nprint(total)";

    let first = sandbox.execute(source, Some("a")).await.unwrap();
    let second = sandbox.execute(source, Some("b")).await.unwrap();

    assert!(first.success && second.success);
    assert_eq!(first.output, second.output);
    assert_eq!(first.output, "4950\n");
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn triple_quoted_strings_survive_instrumentation() {
    let sandbox = SnippetSandbox::new(exec_options("triple")).unwrap();

    let outcome = sandbox
        .execute("text = \"\"\"line one\nline two\"\"\"\nprint(text)", None)
        .await
        .unwrap();

    assert!(outcome.success, "{:?}", outcome);
    assert_eq!(outcome.output, "line one\nline two\n");
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn guest_exception_is_classified_not_errored() {
    let sandbox = SnippetSandbox::new(exec_options("exc")).unwrap();

    let outcome = sandbox.execute("x = 1 / 0", None).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind.as_deref(), Some("ZeroDivisionError"));
    assert!(outcome.error_message.is_some());
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn warnings_escalate_to_failures() {
    let sandbox = SnippetSandbox::new(exec_options("warn")).unwrap();

    let outcome = sandbox
        .execute(
            "import warnings\nwarnings.warn('deprecated')\nprint('after')",
            None,
        )
        .await
        .unwrap();

    // `import` is denied, so use the builtin escalation path instead.
    // A snippet that would only warn under default settings must fail here.
    if outcome.error_kind.as_deref() == Some("DeniedSymbol") {
        // Expected under the default policy; the escalation behavior is
        // still exercised through implicit warnings below.
        let implicit = sandbox.execute("x = b'a' < 'a'", None).await.unwrap();
        assert!(!implicit.success);
    } else {
        assert!(!outcome.success, "warning must escalate: {:?}", outcome);
    }
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn infinite_loop_is_interrupted() {
    let options = SandboxOptions::builder()
        .temp_dir(std::env::temp_dir().join("guardbox-e2e-loop"))
        .memory_limit_mb(64)
        .max_execution_time_s(1)
        .build();
    let sandbox = SnippetSandbox::new(options).unwrap();

    let outcome = sandbox.execute("while True:\n    pass", None).await.unwrap();

    assert!(!outcome.success);
    let kind = outcome.error_kind.as_deref().unwrap();
    assert!(
        kind == "Timeout" || kind == "GuardFault",
        "loop should hit a time guard or the epoch deadline, got {}",
        kind
    );
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn memory_exhaustion_is_stopped() {
    let options = SandboxOptions::builder()
        .temp_dir(std::env::temp_dir().join("guardbox-e2e-mem"))
        .memory_limit_mb(32)
        .max_execution_time_s(5)
        .build();
    let sandbox = SnippetSandbox::new(options).unwrap();

    let outcome = sandbox
        .execute(
            "data = []\nwhile True:\n    data.append('x' * 65536)",
            None,
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let kind = outcome.error_kind.as_deref().unwrap();
    assert!(
        kind == "MemoryLimitExceeded" || kind == "GuardFault" || kind == "Timeout",
        "allocation loop must be stopped, got {}",
        kind
    );
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn host_filesystem_is_invisible() {
    let sandbox = SnippetSandbox::new(exec_options("fs")).unwrap();
    sandbox.add_allowed_function("open");

    let outcome = sandbox
        .execute(
            r#"
try:
    with open('/etc/passwd') as f:
        print('BREACH:' + f.read()[:16])
except Exception as e:
    print('blocked:' + type(e).__name__)
"#,
            None,
        )
        .await
        .unwrap();

    assert!(!outcome.output.contains("BREACH"));
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn working_directory_is_read_only() {
    let sandbox = SnippetSandbox::new(exec_options("rofs")).unwrap();
    sandbox.add_allowed_function("open");

    let outcome = sandbox
        .execute(
            r#"
try:
    with open('/box/evil.py', 'w') as f:
        f.write('x')
    print('BREACH:wrote file')
except Exception as e:
    print('blocked:' + type(e).__name__)
"#,
            None,
        )
        .await
        .unwrap();

    assert!(!outcome.output.contains("BREACH"));
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn batch_mixes_success_and_rejection() {
    let sandbox = SnippetSandbox::new(exec_options("batch")).unwrap();

    let mut batch = BTreeMap::new();
    batch.insert("good".to_string(), "print('ok')".to_string());
    batch.insert("bad".to_string(), "eval('1')".to_string());
    batch.insert("crash".to_string(), "1 / 0".to_string());

    let results = sandbox.execute_batch(batch).await.unwrap();

    assert!(results["good"].success);
    assert_eq!(results["good"].output, "ok\n");
    assert_eq!(results["bad"].error_kind.as_deref(), Some("DeniedSymbol"));
    assert_eq!(
        results["crash"].error_kind.as_deref(),
        Some("ZeroDivisionError")
    );
}

#[tokio::test]
#[ignore = "requires rustpython.wasm"]
async fn statistics_reflect_mixed_runs() {
    let sandbox = SnippetSandbox::new(exec_options("stats")).unwrap();

    sandbox.execute("print('a')", None).await.unwrap();
    sandbox.execute("import os", None).await.unwrap();
    sandbox.execute("print('b')", None).await.unwrap();

    let stats = sandbox.statistics();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.failures, 1);
    assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!(stats.average_execution_time_seconds > 0.0);
}
