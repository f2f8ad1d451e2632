//! Job controller: tracks foreground/background jobs mirrored from the
//! process table, with an explicit subscriber list for completion
//! notifications rather than a single callback slot.

use std::collections::HashMap;

use crate::process::{Pid, ProcessStatus};

#[derive(Debug, Clone)]
pub struct Job {
    pub pid: Pid,
    pub command: String,
    pub background: bool,
    pub status: ProcessStatus,
}

/// A registered listener's handle. Dropping it does nothing; call
/// `JobController::unsubscribe` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub struct JobController {
    jobs: HashMap<Pid, Job>,
    listeners: Vec<(SubscriptionId, Box<dyn FnMut(&Job)>)>,
    next_subscription: u64,
    max_jobs: usize,
}

impl JobController {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            listeners: Vec::new(),
            next_subscription: 1,
            max_jobs,
        }
    }

    /// Registers a listener invoked on every job transition. Returns a
    /// handle to pass to `unsubscribe`. A listener is only ever skipped
    /// for subsequent calls, never allowed to abort the transition it
    /// observed.
    pub fn subscribe(&mut self, listener: Box<dyn FnMut(&Job)>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(existing, _)| *existing != id);
    }

    pub fn track(&mut self, pid: Pid, command: String, background: bool) -> Option<()> {
        if self.jobs.len() >= self.max_jobs {
            return None;
        }
        self.jobs.insert(
            pid,
            Job {
                pid,
                command,
                background,
                status: ProcessStatus::Running,
            },
        );
        Some(())
    }

    pub fn transition(&mut self, pid: Pid, status: ProcessStatus) {
        if let Some(job) = self.jobs.get_mut(&pid) {
            job.status = status;
            for (_, listener) in self.listeners.iter_mut() {
                listener(job);
            }
        }
    }

    pub fn get(&self, pid: Pid) -> Option<&Job> {
        self.jobs.get(&pid)
    }

    pub fn retire(&mut self, pid: Pid) {
        self.jobs.remove(&pid);
    }

    pub fn list(&self) -> Vec<&Job> {
        let mut all: Vec<&Job> = self.jobs.values().collect();
        all.sort_by_key(|j| j.pid);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn notifies_subscribers_on_transition() {
        let mut jobs = JobController::new(10);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        jobs.subscribe(Box::new(move |job| {
            seen_clone.borrow_mut().push(job.status);
        }));
        jobs.track(1, "sleep".to_string(), true);
        jobs.transition(1, ProcessStatus::Completed);
        assert_eq!(seen.borrow().as_slice(), &[ProcessStatus::Completed]);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let mut jobs = JobController::new(10);
        let count = Rc::new(RefCell::new(0));
        let count_clone = count.clone();
        let id = jobs.subscribe(Box::new(move |_| {
            *count_clone.borrow_mut() += 1;
        }));
        jobs.track(1, "x".to_string(), false);
        jobs.transition(1, ProcessStatus::Running);
        jobs.unsubscribe(id);
        jobs.transition(1, ProcessStatus::Completed);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn max_jobs_throttle() {
        let mut jobs = JobController::new(1);
        assert!(jobs.track(1, "a".to_string(), false).is_some());
        assert!(jobs.track(2, "b".to_string(), false).is_none());
    }
}
