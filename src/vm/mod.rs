//! Debuggee facade.
//!
//! The inspector never owns a VM process, it observes and controls one through the [`Vm`] trait.
//! Implementations deliver asynchronous notifications (state changes, breakpoint and watchpoint
//! set changes) through a [`VmNotifier`] obtained at subscription, possibly from any thread.

pub mod address;
pub mod breakpoint;
pub mod code;
pub mod object;
pub mod scripted;
pub mod state;
pub mod thread;

pub use crate::inspection::notify::VmNotifier;
pub use address::{Address, MemoryRegion};
pub use breakpoint::{
    Breakpoint, BreakpointEvent, BreakpointId, Watchpoint, WatchpointEvent, WatchpointId,
};
pub use code::{CodeLocation, MethodKey};
pub use object::{HeapObject, ObjectId, ObjectKind};
pub use state::{ProcessState, VmState};
pub use thread::{StackFrame, ThreadId};

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// VM can't accept a request right now, for example another request is in progress.
    #[error("VM busy")]
    Busy,
    #[error("no VM process")]
    NoProcess,
    #[error("VM process is not stopped")]
    NotStopped,
    #[error("VM process is not running")]
    NotRunning,
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),
    #[error("breakpoint {0} not found")]
    BreakpointNotFound(BreakpointId),
    #[error("watchpoint {0} not found")]
    WatchpointNotFound(WatchpointId),
    #[error("can't place breakpoint at {0}")]
    InvalidLocation(CodeLocation),
    #[error("stack walk failed for thread {0}")]
    StackWalk(ThreadId),
    #[error("no frame to return from in thread {0}")]
    NoFrame(ThreadId),
}

pub type VmResult<T> = Result<T, VmError>;

/// Interface of inspected VM.
pub trait Vm {
    /// Return most recent state snapshot.
    fn state(&self) -> VmState;

    /// Register receiver of VM notifications.
    fn subscribe(&self, notifier: VmNotifier);

    /// Walk the thread stack. Frames are ordered from the topmost one.
    fn frames(&self, thread: ThreadId) -> VmResult<Vec<StackFrame>>;

    fn is_live(&self, thread: ThreadId) -> bool;

    fn instruction_pointer(&self, thread: ThreadId) -> VmResult<Address>;

    fn thread_name(&self, thread: ThreadId) -> Option<String>;

    /// Memory region allocated for the thread stack.
    fn stack_region(&self, thread: ThreadId) -> Option<MemoryRegion>;

    /// Find a known memory region that contains an address.
    fn region_containing(&self, addr: Address) -> Option<MemoryRegion>;

    fn memory_regions(&self) -> Vec<MemoryRegion>;

    fn breakpoints(&self) -> Vec<Breakpoint>;

    fn set_breakpoint(&self, location: &CodeLocation) -> VmResult<Breakpoint>;

    fn remove_breakpoint(&self, id: BreakpointId) -> VmResult<()>;

    fn enable_breakpoint(&self, id: BreakpointId, enabled: bool) -> VmResult<()>;

    fn watchpoints(&self) -> Vec<Watchpoint>;

    fn set_watchpoint(&self, region: &MemoryRegion) -> VmResult<Watchpoint>;

    fn remove_watchpoint(&self, id: WatchpointId) -> VmResult<()>;

    fn find_object(&self, id: ObjectId) -> Option<HeapObject>;

    fn resume(&self) -> VmResult<()>;

    fn pause(&self) -> VmResult<()>;

    fn single_step(&self, thread: ThreadId) -> VmResult<()>;

    fn step_over(&self, thread: ThreadId) -> VmResult<()>;

    fn return_from_frame(&self, thread: ThreadId) -> VmResult<()>;

    fn run_to_instruction(&self, thread: ThreadId, addr: Address) -> VmResult<()>;

    fn terminate(&self) -> VmResult<()>;
}
