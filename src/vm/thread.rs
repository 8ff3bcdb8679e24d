use crate::vm::address::Address;
use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Identity of a debuggee thread.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

impl Display for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of a single frame in a thread call stack.
///
/// Every stack walk produces new frame snapshots, so frames must be compared with
/// [`StackFrame::is_same_frame`] rather than with `==`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StackFrame {
    /// Owner thread.
    pub thread: ThreadId,
    /// Frame number, zero for the topmost frame.
    pub position: usize,
    /// Instruction pointer.
    pub ip: Address,
    /// Canonical frame address, stable while the frame is alive.
    pub cfa: Address,
    pub function: Option<String>,
}

impl StackFrame {
    pub fn is_top(&self) -> bool {
        self.position == 0
    }

    /// True if both snapshots describe the same activation record of the same thread.
    pub fn is_same_frame(&self, other: &StackFrame) -> bool {
        self.thread == other.thread && self.cfa == other.cfa
    }
}

impl Display for StackFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "thread {} frame {} at {}",
            self.thread, self.position, self.ip
        )?;
        if let Some(ref function) = self.function {
            write!(f, " in {function}")?;
        }
        Ok(())
    }
}
