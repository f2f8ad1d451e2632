//! Command registry: a trait-object map from name to an object
//! implementing `execute`, per the "model dynamic dispatch collections as
//! interface-with-methods" guidance. Individual builtins live in
//! `builtins.rs`.

mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::environment::Environment;
use crate::process::ExecutionContext;
use crate::vfs::Vfs;

/// The outcome of one command invocation, before the pipeline engine
/// attaches PID/command-string/timing to build a full `CommandResult`.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: 0 }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code }
    }
}

/// The externally visible result of one full command invocation (the
/// Command contract's `CommandResult`). Field names serialize to the
/// camelCase wire shape over the worker channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub process_id: u64,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time: f64,
}

/// Base error carrying a command name and exit code; `InvalidArgument`
/// and `FileOperation` specialize it with exit 1. Command implementations
/// catch errors of this shape and format `name: message`.
#[derive(Debug, Clone)]
pub enum ShellCommandError {
    InvalidArgument { command: String, message: String },
    FileOperation { command: String, message: String },
}

impl ShellCommandError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn formatted(&self) -> String {
        match self {
            Self::InvalidArgument { command, message } | Self::FileOperation { command, message } => {
                format!("{}: {}", command, message)
            }
        }
    }
}

impl fmt::Display for ShellCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl std::error::Error for ShellCommandError {}

/// What a builtin needs beyond its own args: VFS, the shared environment,
/// a wall-clock reading, and (for `source`) a way to run another script
/// without the registry depending on the script executor directly.
pub trait CommandHost {
    fn vfs(&self) -> &Vfs;
    fn vfs_mut(&mut self) -> &mut Vfs;
    fn env(&self) -> &Environment;
    fn env_mut(&mut self) -> &mut Environment;
    fn now_ms(&self) -> f64;
    fn registry(&self) -> &Registry;
    /// Changes the working directory, delegating to `Environment::change_directory`.
    /// Lives on the host trait (rather than being called as
    /// `host.env_mut().change_directory(host.vfs(), ...)` from `cd`) because
    /// that call would need to borrow `host` both immutably and mutably at
    /// once; the facade that implements `CommandHost` holds both pieces
    /// directly and has no such conflict.
    fn change_directory(&mut self, path: &str) -> Result<String, String>;
    /// Runs the script at `path` (relative to the current command's
    /// invocation) and returns its aggregate exit code, stdout, stderr.
    /// Implemented by the top-level shell facade, which owns the script
    /// executor and the recursion-depth bound.
    fn run_source(&mut self, path: &str) -> Result<(i32, String, String), String>;
}

/// Contract every builtin and external-command stub satisfies.
pub trait Command {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn execute(&self, args: &[String], ctx: &ExecutionContext, host: &mut dyn CommandHost) -> CommandOutcome;
}

/// Commands are stored behind `Rc` rather than `Box` so a lookup can be
/// cloned out and held independently of the registry's own borrow —
/// dispatch needs to call `execute(..., host)` while `host` also owns the
/// registry, which a borrowed `&dyn Command` tied to that same borrow
/// could not survive.
pub struct Registry {
    commands: HashMap<String, Rc<dyn Command>>,
}

impl Registry {
    pub fn with_builtins() -> Self {
        let mut registry = Self { commands: HashMap::new() };
        for cmd in builtins::all() {
            registry.register(cmd);
        }
        registry
    }

    pub fn register(&mut self, command: Rc<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|c| c.description())
    }
}

/// Splits `PATH` on `:` and probes `dir/name` for each entry, returning
/// the first hit. A name containing `/` is returned as-is without a
/// search (mirroring the reference PATH-resolution rule).
pub fn resolve_path(name: &str, path_var: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    if name.contains('/') {
        return if exists(name) { Some(name.to_string()) } else { None };
    }
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = format!("{}/{}", dir.trim_end_matches('/'), name);
        if exists(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resolution_probes_each_dir() {
        let path = "/bin:/usr/bin";
        let hit = resolve_path("ls", path, |p| p == "/usr/bin/ls");
        assert_eq!(hit, Some("/usr/bin/ls".to_string()));
    }

    #[test]
    fn path_resolution_returns_none_when_absent() {
        let hit = resolve_path("ghost", "/bin:/usr/bin", |_| false);
        assert_eq!(hit, None);
    }

    #[test]
    fn slash_containing_name_probed_directly() {
        let hit = resolve_path("./script", "/bin", |p| p == "./script");
        assert_eq!(hit, Some("./script".to_string()));
    }

    #[test]
    fn builtin_registry_contains_spec_table() {
        let registry = Registry::with_builtins();
        for name in [
            "cd", "ls", "cat", "echo", "pwd", "export", "env", "unset", "which", "source", "help",
            "clear", "printenv",
        ] {
            assert!(registry.contains(name), "missing builtin: {}", name);
        }
    }
}
