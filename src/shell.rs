//! The `Shell` façade: bundles the VFS, environment, registry, WASM
//! loader, job controller, and completion engine into the one object the
//! dispatcher (and the native CLI) drives. Implements `CommandHost` so
//! builtins and the pipeline engine can reach every piece through a single
//! trait object, and `run_source`/`change_directory` close the dependency
//! loop those two needed without `registry` depending on `script`.

use std::collections::HashMap;

use crate::completion::providers::{CommandsProvider, EnvironmentVariablesProvider, FilesProvider, OptionsProvider};
use crate::completion::{CompletionContext, CompletionEngine, CompletionOptions, CompletionResult};
use crate::environment::{Environment, EnvironmentSnapshot, ShellOptions};
use crate::job::JobController;
use crate::parser::{self, CommandList, LogicalOp};
use crate::pipeline::{self, PipelineExecutionResult};
use crate::process::{Pid, ProcessInfo};
use crate::registry::{CommandHost, CommandResult, Registry};
use crate::script;
use crate::vfs::Vfs;
use crate::wasm::WasmLoader;

const WASM_CACHE_CAPACITY: usize = 10;
const MAX_JOBS: usize = 32;

/// Reads the wall clock. `web_sys::Performance::now()` in the worker
/// build, `SystemTime` natively.
#[cfg(target_arch = "wasm32")]
fn wall_clock_ms() -> f64 {
    web_sys::window().and_then(|w| w.performance()).map(|p| p.now()).unwrap_or(0.0)
}

#[cfg(not(target_arch = "wasm32"))]
fn wall_clock_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

pub struct Shell {
    vfs: Vfs,
    env: Environment,
    registry: Registry,
    wasm: WasmLoader,
    jobs: JobController,
    completion: CompletionEngine,
    source_depth: usize,
}

impl Shell {
    pub fn new(options: ShellOptions) -> Self {
        let registry = Registry::with_builtins();
        let mut completion = CompletionEngine::new();
        completion.register(Box::new(CommandsProvider::new(registry.names().iter().map(|s| s.to_string()).collect())));
        completion.register(Box::new(FilesProvider));
        completion.register(Box::new(EnvironmentVariablesProvider));
        completion.register(Box::new(OptionsProvider));

        Self {
            vfs: Vfs::seeded(wall_clock_ms()),
            env: Environment::new(options),
            registry,
            wasm: WasmLoader::new(WASM_CACHE_CAPACITY),
            jobs: JobController::new(MAX_JOBS),
            completion,
            source_depth: 0,
        }
    }

    pub fn main_shell() -> Self {
        Self::new(ShellOptions::main_shell())
    }

    pub fn worker() -> Self {
        Self::new(ShellOptions::worker())
    }

    pub fn environment_snapshot(&self) -> EnvironmentSnapshot {
        self.env.snapshot()
    }

    pub fn command_timeout_ms(&self) -> u64 {
        self.env.options.command_timeout_ms
    }

    pub fn wasm_cache_len(&self) -> usize {
        self.wasm.cache_len()
    }

    pub fn unload_wasm_module(&mut self, key: &str) {
        self.wasm.unload_module(key);
    }

    pub fn kill_process(&mut self, pid: Pid) -> bool {
        let now = self.now_ms();
        let killed = self.env.kill_process(pid, now);
        if killed {
            self.jobs.transition(pid, crate::process::ProcessStatus::Killed);
        }
        killed
    }

    pub fn get_process(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.env.get_process(pid)
    }

    pub fn list_processes(&self) -> Vec<&ProcessInfo> {
        self.env.list_processes()
    }

    /// Parses and runs one line (a full `CommandList`: pipelines joined by
    /// `&&`/`||`/`;`), short-circuiting `&&` on nonzero exit and `||` on
    /// zero exit same as the statement-sequencing rule in scripts.
    pub fn execute_line(&mut self, input: &str) -> CommandResult {
        let env_vars = self.env.variables().clone();
        let parsed = match parser::parse_command_pipeline(input, Some(&env_vars)) {
            Ok(list) => list,
            Err(e) => return self.parse_error_result(input, &e.to_string()),
        };
        self.run_command_list(&parsed)
    }

    fn run_command_list(&mut self, list: &CommandList) -> CommandResult {
        let mut last = pipeline::execute_pipeline(&list.first, self, String::new());
        self.track_job(&last);
        for (op, stage) in &list.rest {
            let run_next = match op {
                LogicalOp::Sequence => true,
                LogicalOp::And => last.exit_code == 0,
                LogicalOp::Or => last.exit_code != 0,
            };
            if !run_next {
                continue;
            }
            last = pipeline::execute_pipeline(stage, self, String::new());
            self.track_job(&last);
        }
        last.into_command_result()
    }

    fn track_job(&mut self, result: &PipelineExecutionResult) {
        self.jobs.track(result.pid, result.command.clone(), false);
        let status = if result.exit_code == 0 {
            crate::process::ProcessStatus::Completed
        } else {
            crate::process::ProcessStatus::Failed
        };
        self.jobs.transition(result.pid, status);
    }

    fn parse_error_result(&mut self, input: &str, message: &str) -> CommandResult {
        let now = self.now_ms();
        let ctx = self.env.create_execution_context(None, None);
        let pid = ctx.pid;
        let _ = self.env.start_process(input.to_string(), ctx, now);
        self.env.complete_process(pid, 1, now);
        CommandResult {
            process_id: pid,
            command: input.to_string(),
            stdout: String::new(),
            stderr: message.to_string(),
            exit_code: 1,
            execution_time: 0.0,
        }
    }

    /// Builds a `CompletionContext` (fetching the VFS directory listing
    /// the `Files` provider needs) and runs the completion engine.
    pub fn complete(&self, input: &str, cursor: usize, options: &CompletionOptions) -> CompletionResult {
        let working_directory = self.env.working_directory().to_string();
        let directory_entries = self
            .vfs
            .detailed_listing(&working_directory, ".")
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|e| (e.name, matches!(e.entry_type, crate::vfs::EntryType::Directory)))
                    .collect()
            })
            .unwrap_or_default();
        let ctx = CompletionContext::derive(input, cursor, working_directory, self.env.variables().clone(), directory_entries);
        self.completion.complete(&ctx, options)
    }
}

impl CommandHost for Shell {
    fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    fn vfs_mut(&mut self) -> &mut Vfs {
        &mut self.vfs
    }

    fn env(&self) -> &Environment {
        &self.env
    }

    fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    fn now_ms(&self) -> f64 {
        wall_clock_ms()
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn change_directory(&mut self, path: &str) -> Result<String, String> {
        let vfs = &self.vfs;
        self.env.change_directory(vfs, path).map_err(|e| e.to_string())
    }

    fn run_source(&mut self, path: &str) -> Result<(i32, String, String), String> {
        if self.source_depth >= script::MAX_SOURCE_DEPTH {
            return Err(format!("recursion limit ({}) exceeded", script::MAX_SOURCE_DEPTH));
        }
        let working_directory = self.env.working_directory().to_string();
        let content = self.vfs.read_file(&working_directory, path).map_err(|e| e.to_string())?;
        if content.trim().is_empty() {
            return Ok((0, "Script is empty".to_string(), String::new()));
        }
        self.source_depth += 1;
        let result = script::execute_script(self, &content, self.source_depth);
        self.source_depth -= 1;
        result.map(|r| (r.exit_code, r.stdout, r.stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executes_simple_command() {
        let mut shell = Shell::main_shell();
        let result = shell.execute_line("echo hi");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hi");
    }

    #[test]
    fn and_operator_short_circuits_on_failure() {
        let mut shell = Shell::main_shell();
        let result = shell.execute_line("ghost && echo unreachable");
        assert_eq!(result.exit_code, 127);
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn or_operator_runs_fallback_on_failure() {
        let mut shell = Shell::main_shell();
        let result = shell.execute_line("ghost || echo fallback");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "fallback");
    }

    #[test]
    fn semicolon_runs_both_regardless_of_exit() {
        let mut shell = Shell::main_shell();
        let result = shell.execute_line("ghost; echo still-ran");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "still-ran");
    }

    #[test]
    fn cd_then_pwd_reflects_new_directory() {
        let mut shell = Shell::main_shell();
        shell.execute_line("cd documents");
        let result = shell.execute_line("pwd");
        assert_eq!(result.stdout, "/home/user/documents");
    }

    #[test]
    fn source_runs_a_script_file() {
        let mut shell = Shell::main_shell();
        shell.vfs_mut().write_file("/home/user", "greet.sh", "echo hello from script\n", 0.0).unwrap();
        let result = shell.execute_line("source greet.sh");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello from script");
    }

    #[test]
    fn empty_script_reports_empty_message() {
        let mut shell = Shell::main_shell();
        shell.vfs_mut().write_file("/home/user", "empty.sh", "", 0.0).unwrap();
        let result = shell.execute_line("source empty.sh");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "Script is empty");
    }

    #[test]
    fn completion_suggests_commands_for_new_token() {
        let shell = Shell::main_shell();
        let result = shell.complete("ec", 2, &CompletionOptions::default());
        assert!(result.suggestions.iter().any(|s| s.text == "echo"));
    }
}
