//! Shell environment: working directory, env vars, options, and the
//! process table.

use std::collections::HashMap;
use std::fmt;

use crate::process::{ExecutionContext, Pid, ProcessInfo, ProcessLimitError, ProcessTable};
use crate::vfs::Vfs;

/// Tunable knobs named throughout the component design: process limits,
/// timeouts, and the handful of session-wide display settings.
#[derive(Debug, Clone)]
pub struct ShellOptions {
    pub max_processes: usize,
    pub command_timeout_ms: u64,
    pub debug: bool,
    pub prompt: String,
}

impl ShellOptions {
    pub fn main_shell() -> Self {
        Self {
            max_processes: 10,
            command_timeout_ms: 30_000,
            debug: false,
            prompt: "$ ".to_string(),
        }
    }

    pub fn worker() -> Self {
        Self {
            max_processes: 5,
            command_timeout_ms: 15_000,
            debug: false,
            prompt: "$ ".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentError {
    pub message: String,
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EnvironmentError {}

impl From<ProcessLimitError> for EnvironmentError {
    fn from(e: ProcessLimitError) -> Self {
        Self { message: e.to_string() }
    }
}

/// Immutable snapshot of environment state, suitable for serializing back
/// to the dispatcher caller.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EnvironmentSnapshot {
    pub working_directory: String,
    pub variables: HashMap<String, String>,
}

pub(crate) fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Owns working directory, environment variables, shell options, and the
/// process table. Created once per shell session.
pub struct Environment {
    working_directory: String,
    variables: HashMap<String, String>,
    pub options: ShellOptions,
    pub processes: ProcessTable,
}

impl Environment {
    pub fn new(options: ShellOptions) -> Self {
        let mut variables = HashMap::new();
        variables.insert("HOME".to_string(), "/home/user".to_string());
        variables.insert("USER".to_string(), "user".to_string());
        variables.insert("SHELL".to_string(), "/bin/moo-dang".to_string());
        variables.insert(
            "PATH".to_string(),
            "/bin:/usr/bin:/usr/local/bin:/wasm".to_string(),
        );
        variables.insert("PWD".to_string(), "/home/user".to_string());
        variables.insert("TERM".to_string(), "moo-dang-web".to_string());
        variables.insert("LANG".to_string(), "en_US.UTF-8".to_string());
        variables.insert("LC_ALL".to_string(), "en_US.UTF-8".to_string());
        variables.insert("COLUMNS".to_string(), "80".to_string());
        variables.insert("LINES".to_string(), "24".to_string());

        let max_processes = options.max_processes;
        Self {
            working_directory: "/home/user".to_string(),
            variables,
            options,
            processes: ProcessTable::new(max_processes),
        }
    }

    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            working_directory: self.working_directory.clone(),
            variables: self.variables.clone(),
        }
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn get_variable(&self, name: &str) -> Option<&String> {
        self.variables.get(name)
    }

    pub fn change_directory(&mut self, vfs: &Vfs, path: &str) -> Result<String, EnvironmentError> {
        let resolved = vfs
            .change_directory(&self.working_directory, path)
            .map_err(|e| EnvironmentError { message: e.message })?;
        self.working_directory = resolved.clone();
        self.variables.insert("PWD".to_string(), resolved.clone());
        Ok(resolved)
    }

    pub fn set_environment_variable(&mut self, name: &str, value: &str) -> Result<(), EnvironmentError> {
        let name = name.trim();
        if !is_valid_var_name(name) {
            return Err(EnvironmentError {
                message: format!("invalid variable name: {}", name),
            });
        }
        self.variables.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Removes a variable. Per the reference behavior (kept deliberately,
    /// see the open question on `unset`), this sets the value to the
    /// empty string rather than deleting the key — `printenv NAME` then
    /// prints an empty line for an unset-but-known name, and nothing at
    /// all for a name that was never set.
    pub fn unset_variable(&mut self, name: &str) -> Result<(), EnvironmentError> {
        if !is_valid_var_name(name) {
            return Err(EnvironmentError {
                message: format!("invalid variable name: {}", name),
            });
        }
        self.variables.insert(name.to_string(), String::new());
        Ok(())
    }

    pub fn set_terminal_size(&mut self, columns: u32, lines: u32) {
        self.variables.insert("COLUMNS".to_string(), columns.to_string());
        self.variables.insert("LINES".to_string(), lines.to_string());
    }

    pub fn create_execution_context(&mut self, stdin: Option<String>, args: Option<Vec<String>>) -> ExecutionContext {
        let pid = self.processes.next_pid();
        ExecutionContext {
            pid,
            working_directory: self.working_directory.clone(),
            env: self.variables.clone(),
            stdin: stdin.unwrap_or_default(),
            args: args.unwrap_or_default(),
        }
    }

    pub fn start_process(&mut self, command: String, context: ExecutionContext, now: f64) -> Result<Pid, EnvironmentError> {
        Ok(self.processes.start_process(command, context, now)?)
    }

    pub fn complete_process(&mut self, pid: Pid, exit_code: i32, now: f64) {
        self.processes.complete_process(pid, exit_code, now);
    }

    pub fn kill_process(&mut self, pid: Pid, now: f64) -> bool {
        self.processes.kill_process(pid, now)
    }

    pub fn get_process(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.processes.get(pid)
    }

    pub fn list_processes(&self) -> Vec<&ProcessInfo> {
        self.processes.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let env = Environment::new(ShellOptions::main_shell());
        assert_eq!(env.working_directory(), "/home/user");
        assert_eq!(env.get_variable("HOME").unwrap(), "/home/user");
        assert_eq!(env.get_variable("PATH").unwrap(), "/bin:/usr/bin:/usr/local/bin:/wasm");
    }

    #[test]
    fn change_directory_updates_pwd() {
        let vfs = Vfs::seeded(0.0);
        let mut env = Environment::new(ShellOptions::main_shell());
        env.change_directory(&vfs, "documents").unwrap();
        assert_eq!(env.working_directory(), "/home/user/documents");
        assert_eq!(env.get_variable("PWD").unwrap(), "/home/user/documents");
    }

    #[test]
    fn change_directory_rejects_missing_path() {
        let vfs = Vfs::seeded(0.0);
        let mut env = Environment::new(ShellOptions::main_shell());
        assert!(env.change_directory(&vfs, "/nonexistent").is_err());
        assert_eq!(env.working_directory(), "/home/user");
    }

    #[test]
    fn invalid_variable_name_rejected() {
        let mut env = Environment::new(ShellOptions::main_shell());
        assert!(env.set_environment_variable("1BAD", "x").is_err());
        assert!(env.set_environment_variable("GOOD_NAME", "x").is_ok());
    }

    #[test]
    fn unset_sets_empty_rather_than_removing() {
        let mut env = Environment::new(ShellOptions::main_shell());
        env.unset_variable("HOME").unwrap();
        assert_eq!(env.get_variable("HOME").unwrap(), "");
        assert!(env.get_variable("NEVER_SET").is_none());
    }

    #[test]
    fn pid_counter_increments() {
        let mut env = Environment::new(ShellOptions::main_shell());
        let a = env.create_execution_context(None, None).pid;
        let b = env.create_execution_context(None, None).pid;
        assert!(b > a);
    }
}
