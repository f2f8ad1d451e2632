//! Worker Dispatcher: the single-threaded message loop the worker side of
//! the message channel drives. `handle` is the synchronous core; the
//! `handle_async` wrapper races it against a caller-supplied deadline
//! future, honoring either a request-level or an environment-level
//! timeout. This is the one boundary in the crate that is genuinely
//! asynchronous; everything inside `Shell` is plain synchronous Rust.

use std::future::Future;

use futures::future::{select, Either};

use crate::environment::EnvironmentSnapshot;
use crate::process::{Pid, ProcessInfo, ProcessStatus};
use crate::registry::{CommandHost, CommandResult};
use crate::shell::Shell;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Execute { command: String, stdin: Option<String>, timeout: Option<u64> },
    GetEnvironment,
    SetEnvironment { key: String, value: String },
    ChangeDirectory { path: String },
    KillProcess { pid: Pid },
    ListProcesses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCode {
    #[serde(rename = "UNKNOWN_REQUEST")]
    UnknownRequest,
    #[serde(rename = "REQUEST_FAILED")]
    RequestFailed,
    #[serde(rename = "DIRECTORY_CHANGE_FAILED")]
    DirectoryChangeFailed,
    #[serde(rename = "PROCESS_NOT_FOUND")]
    ProcessNotFound,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    CommandResult { result: CommandResult },
    Environment { state: EnvironmentSnapshot },
    EnvironmentSet { key: String, value: String },
    DirectoryChanged { new_dir: String },
    ProcessKilled { pid: Pid },
    ProcessList { processes: Vec<ProcessSummary> },
    Error { message: String, code: ErrorCode },
}

/// A serializable view of `ProcessInfo` for the `process-list` reply
/// (`ProcessInfo` itself already derives `Serialize`, but going through a
/// narrow summary type avoids leaking the full `ExecutionContext` over the
/// wire).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessSummary {
    pub pid: Pid,
    pub command: String,
    pub status: ProcessStatus,
    pub start_time: f64,
}

impl From<&ProcessInfo> for ProcessSummary {
    fn from(info: &ProcessInfo) -> Self {
        Self {
            pid: info.pid,
            command: info.command.clone(),
            status: info.status,
            start_time: info.start_time,
        }
    }
}

/// Processes one request to completion. Never panics on a well-formed
/// `Request`; any command-level failure surfaces as a non-zero
/// `CommandResult`, not a dispatcher error.
pub fn handle(shell: &mut Shell, request: Request) -> Response {
    match request {
        Request::Execute { command, stdin, timeout: _timeout } => {
            let _ = stdin; // top-level requests carry no external stdin source yet.
            Response::CommandResult { result: shell.execute_line(&command) }
        }
        Request::GetEnvironment => Response::Environment { state: shell.environment_snapshot() },
        Request::SetEnvironment { key, value } => match shell.env_mut().set_environment_variable(&key, &value) {
            Ok(()) => Response::EnvironmentSet { key, value },
            Err(e) => Response::Error { message: e.to_string(), code: ErrorCode::RequestFailed },
        },
        Request::ChangeDirectory { path } => match shell.change_directory(&path) {
            Ok(new_dir) => Response::DirectoryChanged { new_dir },
            Err(message) => Response::Error { message, code: ErrorCode::DirectoryChangeFailed },
        },
        Request::KillProcess { pid } => {
            if shell.kill_process(pid) {
                Response::ProcessKilled { pid }
            } else {
                Response::Error {
                    message: format!("no running process with pid {}", pid),
                    code: ErrorCode::ProcessNotFound,
                }
            }
        }
        Request::ListProcesses => Response::ProcessList {
            processes: shell.list_processes().into_iter().map(ProcessSummary::from).collect(),
        },
    }
}

/// Runs `handle` to a response, racing it against `deadline`. `handle`
/// itself never suspends, so the race only matters when `deadline` has
/// already elapsed by the time this future is first polled; the hook
/// exists so a future asynchronous command path (WASM execution awaiting
/// a host timer, VFS operations exposed as genuinely async) has somewhere
/// to plug in without changing this boundary's shape.
pub async fn handle_async<D>(shell: &mut Shell, request: Request, deadline: D) -> Response
where
    D: Future<Output = ()>,
{
    let timeout_ms = match &request {
        Request::Execute { timeout: Some(ms), .. } => *ms,
        _ => shell.command_timeout_ms(),
    };
    let response = handle(shell, request);
    futures::pin_mut!(deadline);
    match select(Box::pin(std::future::ready(response)), deadline).await {
        Either::Left((response, _)) => response,
        Either::Right((_, _)) => Response::Error {
            message: format!("Command timed out after {}ms", timeout_ms),
            code: ErrorCode::RequestFailed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ShellOptions;

    #[test]
    fn execute_request_returns_command_result() {
        let mut shell = Shell::new(ShellOptions::worker());
        let response = handle(&mut shell, Request::Execute { command: "echo hi".to_string(), stdin: None, timeout: None });
        match response {
            Response::CommandResult { result } => {
                assert_eq!(result.exit_code, 0);
                assert_eq!(result.stdout, "hi");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn unknown_pid_reports_process_not_found() {
        let mut shell = Shell::new(ShellOptions::worker());
        let response = handle(&mut shell, Request::KillProcess { pid: 9999 });
        match response {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::ProcessNotFound),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn change_directory_reports_failure_code() {
        let mut shell = Shell::new(ShellOptions::worker());
        let response = handle(&mut shell, Request::ChangeDirectory { path: "/nonexistent".to_string() });
        match response {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::DirectoryChangeFailed),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn handle_async_completes_before_a_pending_deadline() {
        let mut shell = Shell::new(ShellOptions::worker());
        let response = futures::executor::block_on(handle_async(
            &mut shell,
            Request::Execute { command: "echo race".to_string(), stdin: None, timeout: None },
            futures::future::pending::<()>(),
        ));
        match response {
            Response::CommandResult { result } => assert_eq!(result.stdout, "race"),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
