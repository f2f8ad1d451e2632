//! Process table: PID allocation and lifecycle bookkeeping.
//!
//! Lives on the same single worker thread as everything else, so no
//! locking is needed for the table or the PID counter.

use std::collections::HashMap;

pub type Pid = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcessStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

/// A per-invocation snapshot handed to command implementations. Immutable
/// once constructed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExecutionContext {
    pub pid: Pid,
    pub working_directory: String,
    pub env: HashMap<String, String>,
    pub stdin: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub command: String,
    pub start_time: f64,
    pub context: ExecutionContext,
    pub status: ProcessStatus,
}

/// How long a retired process entry lingers so status queries still
/// resolve, before `sweep` removes it.
const COMPLETED_RETENTION_MS: f64 = 1000.0;
const KILLED_RETENTION_MS: f64 = 500.0;

struct Retiring {
    pid: Pid,
    remove_at: f64,
}

/// Owns the PID counter and the live process table.
pub struct ProcessTable {
    next_pid: Pid,
    processes: HashMap<Pid, ProcessInfo>,
    retiring: Vec<Retiring>,
    pub max_processes: usize,
}

impl ProcessTable {
    pub fn new(max_processes: usize) -> Self {
        Self {
            next_pid: 1,
            processes: HashMap::new(),
            retiring: Vec::new(),
            max_processes,
        }
    }

    /// Allocates a new PID. Strictly increasing across the table's
    /// lifetime, never reused.
    pub fn next_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Inserts a running entry, refusing when the table is at capacity.
    pub fn start_process(&mut self, command: String, context: ExecutionContext, now: f64) -> Result<Pid, ProcessLimitError> {
        if self.processes.len() >= self.max_processes {
            return Err(ProcessLimitError { max: self.max_processes });
        }
        let pid = context.pid;
        self.processes.insert(
            pid,
            ProcessInfo {
                pid,
                command,
                start_time: now,
                context,
                status: ProcessStatus::Running,
            },
        );
        Ok(pid)
    }

    /// Transitions a running process to completed/failed based on the
    /// exit code, scheduling removal after the short retention window.
    pub fn complete_process(&mut self, pid: Pid, exit_code: i32, now: f64) {
        if let Some(info) = self.processes.get_mut(&pid) {
            info.status = if exit_code == 0 {
                ProcessStatus::Completed
            } else {
                ProcessStatus::Failed
            };
            self.retiring.push(Retiring {
                pid,
                remove_at: now + COMPLETED_RETENTION_MS,
            });
        }
    }

    /// Transitions a running process to killed. Returns whether a
    /// transition actually occurred (no-op if already retired or absent).
    pub fn kill_process(&mut self, pid: Pid, now: f64) -> bool {
        match self.processes.get_mut(&pid) {
            Some(info) if info.status == ProcessStatus::Running => {
                info.status = ProcessStatus::Killed;
                self.retiring.push(Retiring {
                    pid,
                    remove_at: now + KILLED_RETENTION_MS,
                });
                true
            }
            _ => false,
        }
    }

    /// Removes any retired entries whose retention window has elapsed.
    pub fn sweep(&mut self, now: f64) {
        let mut remaining = Vec::with_capacity(self.retiring.len());
        for entry in self.retiring.drain(..) {
            if entry.remove_at <= now {
                self.processes.remove(&entry.pid);
            } else {
                remaining.push(entry);
            }
        }
        self.retiring = remaining;
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    pub fn list(&self) -> Vec<&ProcessInfo> {
        let mut all: Vec<&ProcessInfo> = self.processes.values().collect();
        all.sort_by_key(|p| p.pid);
        all
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessLimitError {
    pub max: usize,
}

impl std::fmt::Display for ProcessLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "maximum concurrent processes reached ({})", self.max)
    }
}

impl std::error::Error for ProcessLimitError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pid: Pid) -> ExecutionContext {
        ExecutionContext {
            pid,
            working_directory: "/".to_string(),
            env: HashMap::new(),
            stdin: String::new(),
            args: Vec::new(),
        }
    }

    #[test]
    fn pids_are_monotonic() {
        let mut table = ProcessTable::new(10);
        let a = table.next_pid();
        let b = table.next_pid();
        assert!(b > a);
    }

    #[test]
    fn start_process_respects_limit() {
        let mut table = ProcessTable::new(1);
        table.start_process("a".into(), ctx(1), 0.0).unwrap();
        assert!(table.start_process("b".into(), ctx(2), 0.0).is_err());
    }

    #[test]
    fn complete_then_sweep_removes_entry() {
        let mut table = ProcessTable::new(10);
        table.start_process("a".into(), ctx(1), 0.0).unwrap();
        table.complete_process(1, 0, 0.0);
        assert_eq!(table.get(1).unwrap().status, ProcessStatus::Completed);
        table.sweep(COMPLETED_RETENTION_MS + 1.0);
        assert!(table.get(1).is_none());
    }

    #[test]
    fn kill_process_returns_false_when_not_running() {
        let mut table = ProcessTable::new(10);
        assert!(!table.kill_process(99, 0.0));
        table.start_process("a".into(), ctx(1), 0.0).unwrap();
        assert!(table.kill_process(1, 0.0));
        assert!(!table.kill_process(1, 0.0));
    }
}
