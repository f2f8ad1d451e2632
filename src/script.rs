//! Script Executor.
//!
//! Runs a parsed `Script` statement by statement through the same
//! `Registry`/`Environment` a single interactive line uses, via
//! `pipeline::execute_pipeline`. Each statement's leading `KEY=VALUE`
//! assignments are applied to the environment only for that statement's
//! invocation, then reverted — matching the per-command-invocation scoping
//! a POSIX shell gives `KEY=VALUE cmd`.

use std::collections::HashMap;

use crate::parser::{self, ParsedCommand, Pipeline, Redirect, Script};
use crate::pipeline::{self, PipelineExecutionResult};
use crate::registry::CommandHost;

/// How deep `source` may recurse before this crate refuses to go further.
/// A cycle of scripts sourcing each other would otherwise recurse forever;
/// 16 is generous for any legitimate nesting and cheap to enforce.
pub const MAX_SOURCE_DEPTH: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct ScriptResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptResult {
    fn extend_from(&mut self, stage: &PipelineExecutionResult) {
        if !self.stdout.is_empty() && !stage.stdout.is_empty() {
            self.stdout.push('\n');
        }
        self.stdout.push_str(&stage.stdout);
        if !self.stderr.is_empty() && !stage.stderr.is_empty() {
            self.stderr.push('\n');
        }
        self.stderr.push_str(&stage.stderr);
        self.exit_code = stage.exit_code;
    }
}

/// Parses and runs `source` line by line. `depth` is the nesting level of
/// this invocation (1 for a top-level `source`, incremented by the caller
/// for each further level); exceeding `MAX_SOURCE_DEPTH` is an error, not a
/// panic, since it is reachable from ordinary (if pathological) scripts.
pub fn execute_script(host: &mut dyn CommandHost, source: &str, depth: usize) -> Result<ScriptResult, String> {
    if depth > MAX_SOURCE_DEPTH {
        return Err(format!("recursion limit ({}) exceeded", MAX_SOURCE_DEPTH));
    }

    let script = parser::parse_script(source).map_err(|e| e.to_string())?;
    run_statements(host, &script)
}

fn run_statements(host: &mut dyn CommandHost, script: &Script) -> Result<ScriptResult, String> {
    let mut result = ScriptResult::default();
    for statement in &script.statements {
        let outcome = run_with_temporary_env(host, &statement.assignments, |host| {
            let env_vars = host.env().variables().clone();
            let expanded = expand_pipeline(&statement.pipeline, &env_vars);
            pipeline::execute_pipeline(&expanded, host, String::new())
        });
        result.extend_from(&outcome);
        if outcome.exit_code != 0 {
            break;
        }
    }
    Ok(result)
}

fn run_with_temporary_env<F>(host: &mut dyn CommandHost, assignments: &[(String, String)], f: F) -> PipelineExecutionResult
where
    F: FnOnce(&mut dyn CommandHost) -> PipelineExecutionResult,
{
    let previous: Vec<(String, Option<String>)> = assignments
        .iter()
        .map(|(name, _)| (name.clone(), host.env().get_variable(name).cloned()))
        .collect();
    for (name, value) in assignments {
        let _ = host.env_mut().set_environment_variable(name, value);
    }

    let outcome = f(host);

    for (name, prior) in previous {
        match prior {
            Some(value) => {
                let _ = host.env_mut().set_environment_variable(&name, &value);
            }
            None => {
                let _ = host.env_mut().unset_variable(&name);
            }
        }
    }
    outcome
}

/// Expands `$NAME`/`${NAME}` references in a pipeline's command names,
/// arguments, and redirect targets against `env`. Quote-kind tracking does
/// not survive script parsing (`parse_script` discards it along with the
/// rest of the tokenizer's intermediate state), so unlike a single
/// interactive line, a single-quoted literal inside a script is expanded
/// the same as an unquoted one — a deliberate, documented simplification.
fn expand_pipeline(pipeline: &Pipeline, env: &HashMap<String, String>) -> Pipeline {
    Pipeline {
        background: pipeline.background,
        commands: pipeline.commands.iter().map(|cmd| expand_command(cmd, env)).collect(),
    }
}

fn expand_command(cmd: &ParsedCommand, env: &HashMap<String, String>) -> ParsedCommand {
    ParsedCommand {
        name: parser::expand_variables(&cmd.name, env),
        args: cmd.args.iter().map(|a| parser::expand_variables(a, env)).collect(),
        input_redirects: cmd.input_redirects.iter().map(|r| expand_redirect(r, env)).collect(),
        output_redirects: cmd.output_redirects.iter().map(|r| expand_redirect(r, env)).collect(),
    }
}

fn expand_redirect(redirect: &Redirect, env: &HashMap<String, String>) -> Redirect {
    Redirect {
        op: redirect.op,
        target: parser::expand_variables(&redirect.target, env),
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
            0.0
        }
        fn registry(&self) -> &Registry {
            &self.registry
        }
        fn change_directory(&mut self, path: &str) -> Result<String, String> {
            let vfs = &self.vfs;
            self.env.change_directory(vfs, path).map_err(|e| e.to_string())
        }
        fn run_source(&mut self, _path: &str) -> Result<(i32, String, String), String> {
            Err("nested source is not exercised by this test harness".to_string())
        }
    }

    fn host() -> TestHost {
        TestHost {
            vfs: Vfs::seeded(0.0),
            env: Environment::new(ShellOptions::main_shell()),
            registry: Registry::with_builtins(),
        }
    }

    #[test]
    fn statements_run_in_sequence_and_concatenate_output() {
        let mut h = host();
        let result = execute_script(&mut h, "echo one\necho two\n", 1).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "one\ntwo");
    }

    #[test]
    fn failing_statement_stops_the_script() {
        let mut h = host();
        let result = execute_script(&mut h, "ghost\necho never\n", 1).unwrap();
        assert_eq!(result.exit_code, 127);
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn assignment_is_scoped_to_its_statement() {
        let mut h = host();
        let result = execute_script(&mut h, "GREETING=hi echo $GREETING\necho [$GREETING]\n", 1).unwrap();
        assert_eq!(result.stdout, "hi\n[]");
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut h = host();
        let err = execute_script(&mut h, "echo hi\n", MAX_SOURCE_DEPTH + 1).unwrap_err();
        assert!(err.contains("recursion limit"));
    }

    #[test]
    fn variable_expansion_uses_live_environment() {
        let mut h = host();
        let result = execute_script(&mut h, "echo $HOME\n", 1).unwrap();
        assert_eq!(result.stdout, "/home/user");
    }
}
