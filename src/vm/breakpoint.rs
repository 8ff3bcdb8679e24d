use crate::vm::address::{Address, MemoryRegion};
use crate::vm::code::CodeLocation;
use crate::vm::thread::ThreadId;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct BreakpointId(pub u32);

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct WatchpointId(pub u32);

impl Display for BreakpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for WatchpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Breakpoint as seen by the inspector. Identity is the breakpoint number.
#[derive(Clone, Debug)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub location: CodeLocation,
    pub enabled: bool,
}

impl Breakpoint {
    pub fn is_same(&self, other: &Breakpoint) -> bool {
        self.id == other.id
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "breakpoint {} at {}", self.id, self.location)?;
        if !self.enabled {
            f.write_str(" (disabled)")?;
        }
        Ok(())
    }
}

/// Memory watchpoint, triggers on access to any address inside `region`.
#[derive(Clone, Debug)]
pub struct Watchpoint {
    pub id: WatchpointId,
    pub region: MemoryRegion,
    pub enabled: bool,
}

impl Watchpoint {
    pub fn is_same(&self, other: &Watchpoint) -> bool {
        self.id == other.id
    }
}

impl Display for Watchpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "watchpoint {} on {}", self.id, self.region)
    }
}

/// Thread stopped at a breakpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakpointEvent {
    pub thread: ThreadId,
    pub breakpoint: BreakpointId,
}

/// Thread triggered a watchpoint while accessing `address`.
#[derive(Clone, Debug)]
pub struct WatchpointEvent {
    pub thread: ThreadId,
    pub watchpoint: Watchpoint,
    pub address: Address,
}
