//! The tracked process slot.

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::time::Instant;

use super::ProcessStatus;
use super::tail::StderrTail;

/// A stop in progress; survives cancellation of the `stop()` that began it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Termination {
    /// End of the grace window
    pub deadline: Instant,
    /// Forced kill already sent
    pub killed: bool,
}

/// One logical process slot. Replaced, never shared, on every start.
#[derive(Debug)]
pub struct ProcessHandle {
    status: ProcessStatus,
    child: Option<Child>,
    pid: Option<u32>,
    detail: Option<String>,
    started_at: Option<DateTime<Utc>>,
    stderr: Option<StderrTail>,
    termination: Option<Termination>,
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::stopped()
    }
}

impl ProcessHandle {
    /// Empty slot
    pub fn stopped() -> Self {
        Self {
            status: ProcessStatus::Stopped,
            child: None,
            pid: None,
            detail: None,
            started_at: None,
            stderr: None,
            termination: None,
        }
    }

    /// Slot reserved for a launch in progress
    pub fn starting() -> Self {
        Self {
            status: ProcessStatus::Starting,
            ..Self::stopped()
        }
    }

    /// Slot holding a live process
    pub(super) fn running(child: Child, stderr: Option<StderrTail>) -> Self {
        Self {
            status: ProcessStatus::Running,
            pid: child.id(),
            child: Some(child),
            detail: None,
            started_at: Some(Utc::now()),
            stderr,
            termination: None,
        }
    }

    /// Slot whose launch failed
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::Failed,
            detail: Some(detail.into()),
            ..Self::stopped()
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit or error detail of a failed slot
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether an OS process is attached to this slot
    pub fn is_tracked(&self) -> bool {
        self.child.is_some()
    }

    pub(super) fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    pub(super) fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub(super) fn begin_termination(&mut self, deadline: Instant) {
        self.termination = Some(Termination {
            deadline,
            killed: false,
        });
    }

    pub(super) fn mark_killed(&mut self) {
        if let Some(termination) = self.termination.as_mut() {
            termination.killed = true;
        }
    }

    pub(super) fn stderr_snapshot(&self) -> Option<String> {
        self.stderr.as_ref().map(StderrTail::snapshot).filter(|s| !s.is_empty())
    }

    /// Mark a tracked process as exited on its own
    pub(super) fn mark_exited(&mut self, detail: String) {
        self.status = ProcessStatus::Failed;
        self.child = None;
        self.detail = Some(match self.stderr_snapshot() {
            Some(stderr) => format!("{}\nstderr: {}", detail, stderr),
            None => detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_handle() {
        let handle = ProcessHandle::stopped();
        assert_eq!(handle.status(), ProcessStatus::Stopped);
        assert!(!handle.is_tracked());
        assert!(handle.pid().is_none());
        assert!(handle.started_at().is_none());
    }

    #[test]
    fn test_starting_handle() {
        let handle = ProcessHandle::starting();
        assert_eq!(handle.status(), ProcessStatus::Starting);
        assert!(!handle.is_tracked());
    }

    #[test]
    fn test_failed_handle_keeps_detail() {
        let handle = ProcessHandle::failed("No such file or directory");
        assert_eq!(handle.status(), ProcessStatus::Failed);
        assert_eq!(handle.detail(), Some("No such file or directory"));
    }

    #[test]
    fn test_termination_state() {
        let mut handle = ProcessHandle::stopped();
        assert!(handle.termination().is_none());

        let deadline = Instant::now();
        handle.begin_termination(deadline);
        assert_eq!(
            handle.termination(),
            Some(Termination {
                deadline,
                killed: false
            })
        );

        handle.mark_killed();
        assert!(handle.termination().is_some_and(|t| t.killed));
    }
}
