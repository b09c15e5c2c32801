//! Deadline-bounded Python execution, one worker process per entry.
//!
//! **WARNING:** The worker runs generated code with minimal isolation
//! (isolated-mode interpreter, cleared environment, in-memory stdio).
//! This is NOT a true sandbox: there is no seccomp, chroot, namespace,
//! or cgroup isolation. Do not run untrusted code in security-sensitive
//! environments without additional OS-level sandboxing.

use std::process::Stdio;
use std::time::Duration;

use passbench_core::{PassbenchError, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::debug;

use crate::metrics::Outcome;
use crate::resolver;

/// Driver program run as `python -I -c <DRIVER>`.
///
/// It swaps `sys.stdin`/`sys.stdout`/`sys.stderr` for in-memory buffers
/// before any generated code runs, keeping the real pipe handles
/// private, then speaks a JSON-lines protocol over them: receive the
/// job, define the submission, report defined functions, apply the
/// alias the parent chose, run each assertion, report each step.
const DRIVER: &str = r#"
import io, json, sys, types

_in = sys.stdin
_out = sys.stdout
sys.stdin = io.StringIO()
sys.stdout = io.StringIO()
sys.stderr = io.StringIO()

def _send(obj):
    _out.write(json.dumps(obj) + "\n")
    _out.flush()

def _recv():
    line = _in.readline()
    if not line:
        raise SystemExit(1)
    return json.loads(line)

def _reset_streams():
    sys.stdin = io.StringIO()
    sys.stdout = io.StringIO()
    sys.stderr = io.StringIO()

_job = _recv()
_ns = {}
try:
    exec(_job["code"], _ns, _ns)
except BaseException as e:
    _send({"event": "fatal", "phase": "define", "error": type(e).__name__, "detail": str(e)[:400]})
    raise SystemExit(0)

_functions = [k for k, v in _ns.items() if isinstance(v, types.FunctionType)]
_send({"event": "defined", "functions": _functions})

_cmd = _recv()
_alias = _cmd.get("alias")
if _alias and _alias.get("define") in _ns:
    _ns[_alias["expect"]] = _ns[_alias["define"]]

for _i, _test in enumerate(_job["tests"]):
    _reset_streams()
    try:
        exec(_test, _ns, _ns)
    except AssertionError as e:
        _send({"event": "step", "index": _i, "status": "assert_fail", "error": "AssertionError", "detail": str(e)[:400]})
        break
    except BaseException as e:
        _send({"event": "step", "index": _i, "status": "error", "error": type(e).__name__, "detail": str(e)[:400]})
        break
    _send({"event": "step", "index": _i, "status": "ok"})

_send({"event": "done"})
raise SystemExit(0)
"#;

/// One protocol message from the worker.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WorkerEvent {
    Defined {
        functions: Vec<String>,
    },
    Fatal {
        #[serde(default)]
        error: String,
        #[serde(default)]
        detail: String,
    },
    Step {
        index: usize,
        status: StepStatus,
        #[serde(default)]
        error: String,
        #[serde(default)]
        detail: String,
    },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StepStatus {
    Ok,
    AssertFail,
    Error,
}

/// A protocol read, separated from line-level I/O errors.
enum Reply {
    Event(WorkerEvent),
    Eof,
    DeadlineExpired,
}

/// Where execution was when the deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPhase {
    /// While the submission itself was being defined.
    Define,
    /// While running assertions; carries how many had already passed.
    Assertion(usize),
}

/// Terminal result of executing one entry in its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Every assertion held.
    Pass,
    /// Assertion `step` (0-based) raised `AssertionError`.
    FailAssert { step: usize },
    /// Assertion `step` raised something else, or the worker died
    /// mid-assertion.
    RuntimeError { step: usize, detail: String },
    /// The submission failed to define.
    CompileError { detail: String },
    /// The deadline expired and the worker was killed.
    Timeout { phase: ExecPhase },
}

impl EntryOutcome {
    /// Human-readable error detail, where the outcome carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            EntryOutcome::RuntimeError { detail, .. } => Some(detail),
            EntryOutcome::CompileError { detail } => Some(detail),
            _ => None,
        }
    }
}

impl From<&EntryOutcome> for Outcome {
    fn from(outcome: &EntryOutcome) -> Self {
        match outcome {
            EntryOutcome::Pass => Outcome::Pass,
            EntryOutcome::FailAssert { .. } => Outcome::FailAssert,
            EntryOutcome::RuntimeError { .. } => Outcome::RuntimeError,
            EntryOutcome::CompileError { .. } => Outcome::CompileError,
            EntryOutcome::Timeout { .. } => Outcome::Timeout,
        }
    }
}

/// Per-entry Python executor.
///
/// Each call to [`run_entry`](Self::run_entry) spawns a fresh worker, so
/// no state can survive from one entry to the next. Every protocol read
/// runs under its own wall-clock deadline; an expired deadline kills the
/// worker (`kill_on_drop` backs up the explicit kill) and classifies
/// the entry as a timeout instead of hanging the batch.
pub struct ExecutionSandbox {
    /// Python interpreter command (default: "python3")
    python_cmd: String,

    /// Deadline applied to each protocol read
    timeout: Duration,
}

impl Default for ExecutionSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSandbox {
    pub fn new() -> Self {
        Self {
            python_cmd: "python3".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    pub fn with_python_cmd(mut self, cmd: String) -> Self {
        self.python_cmd = cmd;
        self
    }

    /// Execute one submission against its assertions.
    ///
    /// `Err` means the worker could not be driven at all (spawn failure,
    /// protocol I/O failure); every result of actually running the code,
    /// including the worker dying mid-entry, comes back as an
    /// [`EntryOutcome`].
    pub async fn run_entry(&self, code: &str, tests: &[String]) -> Result<EntryOutcome> {
        // Preserve PATH so the interpreter can be found after env_clear.
        let path_env =
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/usr/local/bin:/bin".to_string());

        let mut child = Command::new(&self.python_cmd)
            .arg("-I")
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", &path_env)
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PassbenchError::Other("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PassbenchError::Other("worker stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let job = serde_json::json!({ "code": code, "tests": tests });
        stdin.write_all(job.to_string().as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        // Define phase.
        let functions = match self.next_event(&mut lines).await? {
            Reply::Event(WorkerEvent::Defined { functions }) => functions,
            Reply::Event(WorkerEvent::Fatal { error, detail }) => {
                return Ok(EntryOutcome::CompileError {
                    detail: join_detail(&error, &detail),
                });
            }
            Reply::DeadlineExpired => {
                child.kill().await.ok();
                return Ok(EntryOutcome::Timeout {
                    phase: ExecPhase::Define,
                });
            }
            Reply::Eof => {
                let tail = drain_stderr(child.stderr.take()).await;
                return Ok(EntryOutcome::CompileError {
                    detail: eof_detail("worker exited during definition", &tail),
                });
            }
            Reply::Event(other) => {
                return Err(PassbenchError::Other(format!(
                    "worker protocol violation: unexpected {other:?} before definition reply"
                )));
            }
        };

        // Alias phase: bind the name the assertions expect to the closest
        // defined function.
        let expected = resolver::expected_names(tests).into_iter().next();
        let alias = expected
            .as_deref()
            .and_then(|name| resolver::choose_alias(name, &functions).map(|d| (name.to_string(), d)));
        let cmd = match &alias {
            Some((expect, define)) => {
                debug!(expect = %expect, define = %define, "aliasing expected function");
                serde_json::json!({ "alias": { "expect": expect, "define": define } })
            }
            None => serde_json::json!({ "alias": null }),
        };
        stdin.write_all(cmd.to_string().as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        // Assertion phase.
        let mut ok_steps = 0usize;
        loop {
            match self.next_event(&mut lines).await? {
                Reply::Event(WorkerEvent::Step {
                    index,
                    status,
                    error,
                    detail,
                }) => match status {
                    StepStatus::Ok => {
                        ok_steps = index + 1;
                        if ok_steps >= tests.len() {
                            return Ok(EntryOutcome::Pass);
                        }
                    }
                    StepStatus::AssertFail => {
                        return Ok(EntryOutcome::FailAssert { step: index });
                    }
                    StepStatus::Error => {
                        return Ok(EntryOutcome::RuntimeError {
                            step: index,
                            detail: join_detail(&error, &detail),
                        });
                    }
                },
                Reply::Event(WorkerEvent::Done) => return Ok(EntryOutcome::Pass),
                Reply::DeadlineExpired => {
                    child.kill().await.ok();
                    return Ok(EntryOutcome::Timeout {
                        phase: ExecPhase::Assertion(ok_steps),
                    });
                }
                Reply::Eof => {
                    let tail = drain_stderr(child.stderr.take()).await;
                    return Ok(EntryOutcome::RuntimeError {
                        step: ok_steps,
                        detail: eof_detail("worker exited mid-assertion", &tail),
                    });
                }
                Reply::Event(other) => {
                    return Err(PassbenchError::Other(format!(
                        "worker protocol violation: unexpected {other:?} during assertions"
                    )));
                }
            }
        }
    }

    /// Read one protocol line under a fresh deadline.
    async fn next_event(&self, lines: &mut Lines<BufReader<ChildStdout>>) -> Result<Reply> {
        match tokio::time::timeout(self.timeout, lines.next_line()).await {
            Err(_) => Ok(Reply::DeadlineExpired),
            Ok(Ok(None)) => Ok(Reply::Eof),
            Ok(Ok(Some(line))) => {
                let event = serde_json::from_str::<WorkerEvent>(&line)
                    .map_err(|e| PassbenchError::Other(format!("worker protocol violation: {e}")))?;
                Ok(Reply::Event(event))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }
}

/// Salvage the last line the worker wrote to its real stderr before it
/// died. Usually empty: the driver redirects Python-level stderr, so
/// only interpreter startup failures and hard crashes land here.
async fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut buf = String::new();
    let _ = tokio::time::timeout(Duration::from_millis(200), stderr.read_to_string(&mut buf)).await;
    let mut tail = buf
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .to_string();
    tail.truncate(400);
    tail
}

fn join_detail(kind: &str, detail: &str) -> String {
    match (kind.is_empty(), detail.is_empty()) {
        (true, true) => String::new(),
        (false, true) => kind.to_string(),
        (true, false) => detail.to_string(),
        (false, false) => format!("{kind}: {detail}"),
    }
}

fn eof_detail(context: &str, stderr_tail: &str) -> String {
    if stderr_tail.is_empty() {
        context.to_string()
    } else {
        format!("{context}: {stderr_tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tests_of(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_assertions_pass() {
        let sandbox = ExecutionSandbox::new();
        let code = "def add(a, b):\n    return a + b";
        let tests = tests_of(&["assert add(1, 2) == 3", "assert add(2, 2) == 4"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_assertion_failure_reports_step() {
        let sandbox = ExecutionSandbox::new();
        let code = "def add(a, b):\n    return a - b"; // Wrong!
        let tests = tests_of(&["assert add(0, 0) == 0", "assert add(1, 2) == 3"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::FailAssert { step: 1 });
    }

    #[tokio::test]
    async fn test_syntax_error_is_compile_error() {
        let sandbox = ExecutionSandbox::new();
        let code = "def add(a, b)\n    return a + b"; // Missing colon
        let tests = tests_of(&["assert add(1, 2) == 3"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        match outcome {
            EntryOutcome::CompileError { detail } => {
                assert!(detail.contains("SyntaxError"), "detail: {detail}");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_define_time_raise_is_compile_error() {
        let sandbox = ExecutionSandbox::new();
        let code = "raise ValueError('boom')";
        let tests = tests_of(&["assert True"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        match outcome {
            EntryOutcome::CompileError { detail } => {
                assert!(detail.contains("ValueError"), "detail: {detail}");
                assert!(detail.contains("boom"), "detail: {detail}");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_define_time_exit_is_compile_error() {
        let sandbox = ExecutionSandbox::new();
        let code = "import sys\nsys.exit(3)";
        let tests = tests_of(&["assert True"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert!(matches!(outcome, EntryOutcome::CompileError { .. }), "got {outcome:?}");
    }

    #[tokio::test]
    async fn test_worker_death_during_define_is_compile_error() {
        let sandbox = ExecutionSandbox::new();
        // os._exit skips exception handling entirely, so unlike sys.exit
        // no fatal event precedes the EOF.
        let code = "import os\nos._exit(1)";
        let tests = tests_of(&["assert True"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        match outcome {
            EntryOutcome::CompileError { detail } => {
                assert!(
                    detail.contains("worker exited during definition"),
                    "detail: {detail}"
                );
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_runtime_error_in_assertion() {
        let sandbox = ExecutionSandbox::new();
        // Two defined functions so the single-candidate fallback cannot
        // silently alias the unknown name.
        let code = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b";
        let tests = tests_of(&["assert missing_fn(1) == 1"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        match outcome {
            EntryOutcome::RuntimeError { step, detail } => {
                assert_eq!(step, 0);
                assert!(detail.contains("NameError"), "detail: {detail}");
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_death_mid_assertion_is_runtime_error() {
        let sandbox = ExecutionSandbox::new();
        let code = "import os\ndef ok():\n    return 1\n\ndef die():\n    os._exit(1)";
        let tests = tests_of(&["assert ok() == 1", "assert die()"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        match outcome {
            EntryOutcome::RuntimeError { step, detail } => {
                // One step was acknowledged before the worker vanished.
                assert_eq!(step, 1);
                assert!(
                    detail.contains("worker exited mid-assertion"),
                    "detail: {detail}"
                );
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_define_timeout() {
        let sandbox = ExecutionSandbox::new().with_timeout(1);
        let code = "while True:\n    pass";
        let tests = tests_of(&["assert True"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(
            outcome,
            EntryOutcome::Timeout {
                phase: ExecPhase::Define
            }
        );
    }

    #[tokio::test]
    async fn test_assertion_timeout_reports_progress() {
        let sandbox = ExecutionSandbox::new().with_timeout(1);
        let code = "def quick():\n    return 1\n\ndef spin():\n    while True:\n        pass";
        let tests = tests_of(&["assert quick() == 1", "assert spin()"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(
            outcome,
            EntryOutcome::Timeout {
                phase: ExecPhase::Assertion(1)
            }
        );
    }

    #[tokio::test]
    async fn test_alias_rescues_misnamed_function() {
        let sandbox = ExecutionSandbox::new();
        let code = "def Add(a, b):\n    return a + b";
        let tests = tests_of(&["assert add(1, 2) == 3"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_namespace_persists_across_assertions() {
        let sandbox = ExecutionSandbox::new();
        let code = "state = []\ndef push(x):\n    state.append(x)\n    return len(state)";
        let tests = tests_of(&["assert push(1) == 1", "assert push(2) == 2"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_entries_do_not_share_state() {
        let sandbox = ExecutionSandbox::new();
        let first = sandbox
            .run_entry(
                "FLAG = 1\ndef f():\n    return FLAG",
                &tests_of(&["assert f() == 1"]),
            )
            .await
            .unwrap();
        assert_eq!(first, EntryOutcome::Pass);

        // FLAG must not be visible to a later entry.
        let second = sandbox
            .run_entry(
                "def g():\n    return FLAG",
                &tests_of(&["assert g() == 1"]),
            )
            .await
            .unwrap();
        assert!(
            matches!(second, EntryOutcome::RuntimeError { .. }),
            "got {second:?}"
        );
    }

    #[tokio::test]
    async fn test_user_prints_cannot_break_protocol() {
        let sandbox = ExecutionSandbox::new();
        // The submission prints a line that looks exactly like a protocol
        // message; it must land in the in-memory buffer, not the pipe.
        let code = "print('{\"event\": \"done\"}')\ndef f():\n    return 1";
        let tests = tests_of(&["assert f() == 1"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_user_stdin_read_sees_empty_buffer() {
        let sandbox = ExecutionSandbox::new();
        let code = "import sys\ndata = sys.stdin.read()\ndef f():\n    return data";
        let tests = tests_of(&["assert f() == ''"]);

        let outcome = sandbox.run_entry(code, &tests).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_empty_test_list_is_vacuous_pass() {
        let sandbox = ExecutionSandbox::new();
        let outcome = sandbox.run_entry("def f():\n    return 1", &[]).await.unwrap();
        assert_eq!(outcome, EntryOutcome::Pass);
    }

    #[tokio::test]
    async fn test_unknown_interpreter_is_an_error() {
        let sandbox = ExecutionSandbox::new().with_python_cmd("definitely-not-a-python".to_string());
        let result = sandbox.run_entry("def f():\n    return 1", &[]).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_join_detail_forms() {
        assert_eq!(join_detail("NameError", "name 'x' is not defined"),
            "NameError: name 'x' is not defined");
        assert_eq!(join_detail("SystemExit", ""), "SystemExit");
        assert_eq!(join_detail("", "orphan detail"), "orphan detail");
        assert_eq!(join_detail("", ""), "");
    }
}
