use crate::vm::breakpoint::{BreakpointEvent, WatchpointEvent};
use crate::vm::thread::ThreadId;
use std::fmt::{Display, Formatter};
use strum_macros::{Display, IntoStaticStr};

/// Debuggee process state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, IntoStaticStr)]
pub enum ProcessState {
    #[strum(serialize = "no process")]
    NoProcess,
    #[strum(serialize = "stopped")]
    Stopped,
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "terminated")]
    Terminated,
}

/// Immutable snapshot of the debuggee state, delivered with every state change notification.
///
/// `serial` grows monotonically with every new state, notifications carrying a state that is not
/// newer than the last processed one are redundant.
#[derive(Clone, Debug)]
pub struct VmState {
    pub serial: u64,
    pub process_state: ProcessState,
    /// Live threads in creation order.
    pub threads: Vec<ThreadId>,
    pub threads_started: Vec<ThreadId>,
    pub threads_died: Vec<ThreadId>,
    /// Threads stopped at a breakpoint, in the order reported by the debuggee.
    pub breakpoint_events: Vec<BreakpointEvent>,
    pub watchpoint_event: Option<WatchpointEvent>,
    pub in_gc: bool,
}

impl VmState {
    pub fn new(serial: u64, process_state: ProcessState) -> Self {
        Self {
            serial,
            process_state,
            threads: vec![],
            threads_started: vec![],
            threads_died: vec![],
            breakpoint_events: vec![],
            watchpoint_event: None,
            in_gc: false,
        }
    }

    /// Initial state of a session without process.
    pub fn no_process() -> Self {
        Self::new(0, ProcessState::NoProcess)
    }

    pub fn with_threads(mut self, threads: impl IntoIterator<Item = ThreadId>) -> Self {
        self.threads = threads.into_iter().collect();
        self
    }

    pub fn with_breakpoint_event(mut self, event: BreakpointEvent) -> Self {
        self.breakpoint_events.push(event);
        self
    }

    pub fn with_watchpoint_event(mut self, event: WatchpointEvent) -> Self {
        self.watchpoint_event = Some(event);
        self
    }

    /// Return true if this state was produced after state with serial `other`.
    pub fn newer_than(&self, other: Option<u64>) -> bool {
        match other {
            None => true,
            Some(serial) => self.serial > serial,
        }
    }

    /// Breakpoint event for a thread, if the thread is stopped at a breakpoint.
    pub fn breakpoint_event(&self, thread: ThreadId) -> Option<&BreakpointEvent> {
        self.breakpoint_events.iter().find(|e| e.thread == thread)
    }
}

impl Display for VmState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state #{} ({}, {} threads",
            self.serial,
            self.process_state,
            self.threads.len()
        )?;
        if self.in_gc {
            f.write_str(", in GC")?;
        }
        f.write_str(")")
    }
}
