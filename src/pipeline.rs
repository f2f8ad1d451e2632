//! Pipeline Engine.
//!
//! Wires each stage's stdout into the next stage's stdin, applies input
//! and output redirections, and short-circuits on the first nonzero exit
//! code. Dispatch is built around `Registry::get` returning an owned
//! `Rc<dyn Command>` specifically so a lookup can outlive the mutable
//! borrow of `host` that `execute` itself needs.

use crate::parser::{Pipeline, RedirectOp};
use crate::process::{ExecutionContext, Pid};
use crate::registry::{CommandHost, CommandOutcome, CommandResult};

/// One stage's contribution to the pipeline: the command line that ran
/// and what it produced.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The full outcome of running one pipeline: per-stage detail plus the
/// aggregate view the dispatcher turns into a `CommandResult`.
#[derive(Debug, Clone)]
pub struct PipelineExecutionResult {
    pub pid: Pid,
    pub command: String,
    pub stages: Vec<StageResult>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time: f64,
}

impl PipelineExecutionResult {
    pub fn into_command_result(self) -> CommandResult {
        CommandResult {
            process_id: self.pid,
            command: self.command,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
            execution_time: self.execution_time,
        }
    }
}

pub fn compose_command_string(pipeline: &Pipeline) -> String {
    pipeline
        .commands
        .iter()
        .map(|stage| {
            let mut parts = vec![stage.name.clone()];
            parts.extend(stage.args.iter().cloned());
            parts.join(" ")
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn abort(
    pid: Pid,
    command: String,
    stages: Vec<StageResult>,
    stderr: String,
    exit_code: i32,
    start: f64,
    host: &dyn CommandHost,
) -> PipelineExecutionResult {
    PipelineExecutionResult {
        pid,
        command,
        stages,
        stdout: String::new(),
        stderr,
        exit_code,
        execution_time: host.now_ms() - start,
    }
}

/// Runs `pipeline` to completion (or to its first failing stage).
/// `stdin` is the pipeline's top-level input; `args` (unused beyond
/// logging) is absent since each stage supplies its own args from the
/// parse. `host` supplies the VFS, environment, and registry.
pub fn execute_pipeline(pipeline: &Pipeline, host: &mut dyn CommandHost, stdin: String) -> PipelineExecutionResult {
    let start = host.now_ms();
    let command_string = compose_command_string(pipeline);

    let working_directory = host.env().working_directory().to_string();
    let env_vars = host.env().variables().clone();
    let base_ctx = host.env_mut().create_execution_context(Some(stdin.clone()), None);
    let pid = base_ctx.pid;
    let _ = host.env_mut().start_process(command_string.clone(), base_ctx, start);

    let mut current_input = stdin;
    let mut stages = Vec::with_capacity(pipeline.commands.len());
    let mut final_exit_code = 0;
    let mut final_stdout = String::new();
    let mut accumulated_stderr = String::new();

    let stage_count = pipeline.commands.len();
    for (index, stage) in pipeline.commands.iter().enumerate() {
        let is_last = index + 1 == stage_count;

        if !stage.input_redirects.is_empty() {
            let mut combined = String::new();
            let mut read_failed = None;
            for redirect in &stage.input_redirects {
                match host.vfs().read_file(&working_directory, &redirect.target) {
                    Ok(content) => combined.push_str(&content),
                    Err(e) => {
                        read_failed = Some(e.to_string());
                        break;
                    }
                }
            }
            match read_failed {
                Some(message) => {
                    let now = host.now_ms();
                    host.env_mut().complete_process(pid, 1, now);
                    return abort(pid, command_string, stages, message, 1, start, host);
                }
                None => current_input = combined,
            }
        }

        let Some(command) = host.registry().get(&stage.name) else {
            let message = format!("Command not found: {}", stage.name);
            let now = host.now_ms();
            host.env_mut().complete_process(pid, 127, now);
            return abort(pid, command_string, stages, message, 127, start, host);
        };

        let ctx = ExecutionContext {
            pid,
            working_directory: working_directory.clone(),
            env: env_vars.clone(),
            stdin: current_input.clone(),
            args: stage.args.clone(),
        };
        let CommandOutcome { stdout, stderr, exit_code } = command.execute(&stage.args, &ctx, host);

        if !accumulated_stderr.is_empty() && !stderr.is_empty() {
            accumulated_stderr.push('\n');
        }
        accumulated_stderr.push_str(&stderr);

        // Every output-redirect operator (`>`, `>>`, `2>`, `&>`) is a
        // diverting write regardless of stage position, so a non-empty
        // `output_redirects` always qualifies — there is no operator that
        // means "pass through unchanged".
        let has_output_redirects = !stage.output_redirects.is_empty();

        if has_output_redirects {
            let now = host.now_ms();
            for redirect in &stage.output_redirects {
                let write_result = match redirect.op {
                    RedirectOp::Output => host.vfs_mut().write_file(&working_directory, &redirect.target, &stdout, now),
                    RedirectOp::Append => {
                        let existing = host.vfs().read_file(&working_directory, &redirect.target).unwrap_or_default();
                        host.vfs_mut().write_file(&working_directory, &redirect.target, &format!("{}{}", existing, stdout), now)
                    }
                    RedirectOp::ErrorOutput => host.vfs_mut().write_file(&working_directory, &redirect.target, &stderr, now),
                    RedirectOp::Combined => {
                        host.vfs_mut().write_file(&working_directory, &redirect.target, &format!("{}{}", stdout, stderr), now)
                    }
                    RedirectOp::Input => Ok(()),
                };
                if let Err(e) = write_result {
                    let now = host.now_ms();
                    host.env_mut().complete_process(pid, 1, now);
                    return abort(pid, command_string, stages, e.to_string(), 1, start, host);
                }
            }
        }

        stages.push(StageResult {
            command: format!("{} {}", stage.name, stage.args.join(" ")).trim().to_string(),
            stdout: stdout.clone(),
            stderr: stderr.clone(),
            exit_code,
        });

        if exit_code != 0 {
            final_exit_code = exit_code;
            final_stdout = stdout;
            let now = host.now_ms();
            host.env_mut().complete_process(pid, final_exit_code, now);
            return PipelineExecutionResult {
                pid,
                command: command_string,
                stages,
                stdout: final_stdout,
                stderr: accumulated_stderr,
                exit_code: final_exit_code,
                execution_time: now - start,
            };
        }

        current_input = stdout.clone();
        if is_last {
            final_stdout = if has_output_redirects { String::new() } else { stdout };
        }
    }

    let now = host.now_ms();
    host.env_mut().complete_process(pid, final_exit_code, now);
    PipelineExecutionResult {
        pid,
        command: command_string,
        stages,
        stdout: final_stdout,
        stderr: accumulated_stderr,
        exit_code: final_exit_code,
        execution_time: now - start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, ShellOptions};
    use crate::registry::Registry;
    use crate::vfs::Vfs;

    struct TestHost {
        vfs: Vfs,
        env: Environment,
        registry: Registry,
        clock: f64,
    }

    impl CommandHost for TestHost {
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
            self.clock
        }
        fn registry(&self) -> &Registry {
            &self.registry
        }
        fn change_directory(&mut self, path: &str) -> Result<String, String> {
            let vfs = &self.vfs;
            self.env.change_directory(vfs, path).map_err(|e| e.to_string())
        }
        fn run_source(&mut self, _path: &str) -> Result<(i32, String, String), String> {
            Err("scripts are not executed in this test harness".to_string())
        }
    }

    fn host() -> TestHost {
        TestHost {
            vfs: Vfs::seeded(0.0),
            env: Environment::new(ShellOptions::main_shell()),
            registry: Registry::with_builtins(),
            clock: 0.0,
        }
    }

    fn parse(input: &str) -> Pipeline {
        crate::parser::parse_command_pipeline(input, Some(&std::collections::HashMap::new()))
            .unwrap()
            .first
    }

    #[test]
    fn single_command_runs_and_completes() {
        let mut h = host();
        let result = execute_pipeline(&parse("echo hello world"), &mut h, String::new());
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello world");
    }

    #[test]
    fn unknown_command_reports_127() {
        let mut h = host();
        let result = execute_pipeline(&parse("ghost"), &mut h, String::new());
        assert_eq!(result.exit_code, 127);
        assert_eq!(result.stderr, "Command not found: ghost");
    }

    #[test]
    fn pipeline_chains_stdout_to_stdin() {
        let mut h = host();
        h.vfs_mut().write_file("/home/user", "numbers.txt", "b\na\nc\n", 0.0).unwrap();
        let result = execute_pipeline(&parse("cat numbers.txt"), &mut h, String::new());
        assert_eq!(result.stdout, "b\na\nc\n");
    }

    #[test]
    fn output_redirect_on_last_stage_empties_final_stdout() {
        let mut h = host();
        let result = execute_pipeline(&parse("echo hi > out.txt"), &mut h, String::new());
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "");
        assert_eq!(h.vfs().read_file("/home/user", "out.txt").unwrap(), "hi");
    }

    #[test]
    fn append_redirect_preserves_existing_content() {
        let mut h = host();
        h.vfs_mut().write_file("/home/user", "log.txt", "first\n", 0.0).unwrap();
        let result = execute_pipeline(&parse("echo second >> log.txt"), &mut h, String::new());
        assert_eq!(result.exit_code, 0);
        assert_eq!(h.vfs().read_file("/home/user", "log.txt").unwrap(), "first\nsecond");
    }

    #[test]
    fn failing_stage_short_circuits() {
        let mut h = host();
        let result = execute_pipeline(&parse("cat /nope"), &mut h, String::new());
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("No such file or directory"));
    }
}
