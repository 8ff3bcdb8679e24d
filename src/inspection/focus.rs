//! User focus: the items of interest currently selected in the inspection session.
//!
//! Every setter applies a fixed, one-step cascade policy so that selecting one kind of item
//! produces a consistent view of the others:
//!
//! * code location -> stack frame of the focused thread whose IP is at the location
//! * thread -> remembered frame, else breakpoint the thread is stopped at, else top frame;
//!   then the thread stack memory region
//! * stack frame -> owner thread (first), then code location at the frame IP
//! * address -> memory region containing the address
//! * breakpoint -> top frame of a thread stopped at the breakpoint, else breakpoint location
//!
//! A setter that is already active in the current call chain is never re-entered, so cascades
//! always terminate.

use crate::inspection::listener::ListenerSet;
use crate::vm::{
    Address, Breakpoint, CodeLocation, HeapObject, MemoryRegion, StackFrame, ThreadId, Vm,
    Watchpoint,
};
use crate::{ins_trace, muted_error};
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

const TRACE_VALUE: u8 = 2;

/// Observer of focus changes. All callbacks are invoked after the new value is stored.
pub trait FocusListener {
    fn thread_focus_set(&self, _old: Option<ThreadId>, _thread: Option<ThreadId>) {}

    fn stack_frame_focus_changed(&self, _old: Option<&StackFrame>, _frame: Option<&StackFrame>) {}

    fn code_location_focus_set(&self, _location: &CodeLocation, _interactive: bool) {}

    fn address_focus_changed(&self, _old: Address, _address: Address) {}

    fn memory_region_focus_changed(
        &self,
        _old: Option<&MemoryRegion>,
        _region: Option<&MemoryRegion>,
    ) {
    }

    fn breakpoint_focus_set(&self, _old: Option<&Breakpoint>, _breakpoint: Option<&Breakpoint>) {}

    fn watchpoint_focus_set(&self, _old: Option<&Watchpoint>, _watchpoint: Option<&Watchpoint>) {}

    fn heap_object_focus_changed(&self, _old: Option<&HeapObject>, _object: Option<&HeapObject>) {}
}

#[derive(Clone, Copy, Debug)]
enum Category {
    Thread,
    StackFrame,
    CodeLocation,
    Address,
    MemoryRegion,
    Breakpoint,
    Watchpoint,
    HeapObject,
}

impl Category {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

fn same_by<T>(a: Option<&T>, b: Option<&T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Holder of the current user focus.
///
/// Owned by the inspection and mutated on the inspection thread only.
pub struct Focus {
    vm: Rc<dyn Vm>,
    thread: Option<ThreadId>,
    stack_frame: Option<StackFrame>,
    code_location: CodeLocation,
    address: Address,
    memory_region: Option<MemoryRegion>,
    breakpoint: Option<Breakpoint>,
    watchpoint: Option<Watchpoint>,
    heap_object: Option<HeapObject>,
    /// Last frame selected for each thread while it had focus.
    frame_memory: HashMap<ThreadId, StackFrame>,
    listeners: ListenerSet<dyn FocusListener>,
    /// Setters active in the current call chain.
    active: u8,
}

impl Focus {
    pub fn new(vm: Rc<dyn Vm>) -> Self {
        Self {
            vm,
            thread: None,
            stack_frame: None,
            code_location: CodeLocation::Unknown,
            address: Address::ZERO,
            memory_region: None,
            breakpoint: None,
            watchpoint: None,
            heap_object: None,
            frame_memory: HashMap::new(),
            listeners: ListenerSet::default(),
            active: 0,
        }
    }

    pub fn add_listener(&self, listener: Rc<dyn FocusListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn FocusListener>) {
        self.listeners.remove(listener);
    }

    /// Shared handle to the listener set, listeners may use it to (un)register during a callback.
    pub fn listeners(&self) -> ListenerSet<dyn FocusListener> {
        self.listeners.clone()
    }

    /// Forget everything, including remembered frames. Listeners are not notified.
    pub fn clear_all(&mut self) {
        ins_trace!(TRACE_VALUE, target: "focus", "clear all");
        self.thread = None;
        self.stack_frame = None;
        self.code_location = CodeLocation::Unknown;
        self.address = Address::ZERO;
        self.memory_region = None;
        self.breakpoint = None;
        self.watchpoint = None;
        self.heap_object = None;
        self.frame_memory.clear();
    }

    fn notify(&self, f: impl Fn(&dyn FocusListener)) {
        for listener in self.listeners.snapshot() {
            f(listener.as_ref());
        }
    }

    /// Run a setter unless the same setter is already active in this call chain.
    fn guarded(&mut self, category: Category, f: impl FnOnce(&mut Self)) {
        let bit = category.bit();
        if self.active & bit != 0 {
            ins_trace!(TRACE_VALUE, target: "focus", "{category:?} cascade suppressed");
            return;
        }
        self.active |= bit;
        f(self);
        self.active &= !bit;
    }

    fn frames(&self, thread: ThreadId) -> Vec<StackFrame> {
        muted_error!(self.vm.frames(thread), "stack walk:").unwrap_or_default()
    }

    // ------------------------------------------- thread ------------------------------------------

    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    pub fn has_thread(&self) -> bool {
        self.thread.is_some()
    }

    /// Frame last selected in a thread, if any.
    pub fn remembered_frame(&self, thread: ThreadId) -> Option<&StackFrame> {
        self.frame_memory.get(&thread)
    }

    pub fn set_thread(&mut self, thread: Option<ThreadId>) {
        self.guarded(Category::Thread, |focus| focus.apply_thread(thread));
    }

    fn apply_thread(&mut self, thread: Option<ThreadId>) {
        if self.thread == thread {
            return;
        }
        let old = mem::replace(&mut self.thread, thread);
        ins_trace!(TRACE_VALUE, target: "focus", "thread: {old:?} -> {thread:?}");
        self.notify(|l| l.thread_focus_set(old, thread));

        let Some(thread) = thread else {
            self.drop_thread_context(old);
            return;
        };

        let frames = self.frames(thread);
        let remembered = self
            .frame_memory
            .get(&thread)
            .and_then(|remembered| frames.iter().find(|f| f.is_same_frame(remembered)))
            .cloned();

        if let Some(frame) = remembered {
            self.set_stack_frame(frame, false);
        } else if let Some(breakpoint) = self.breakpoint_of(thread) {
            self.set_breakpoint(Some(breakpoint));
        } else if let Some(top) = frames.into_iter().next() {
            self.set_stack_frame(top, false);
        }

        if let Some(stack) = self.vm.stack_region(thread) {
            self.set_memory_region(Some(stack));
        }
    }

    /// No thread in focus: its frame, code location and stack memory go too.
    fn drop_thread_context(&mut self, old: Option<ThreadId>) {
        let stack = old.and_then(|t| self.vm.stack_region(t));
        let frame = self.stack_frame.take();
        let own_stack = self.memory_region.as_ref().is_some_and(|region| {
            stack.as_ref() == Some(region)
                || frame.as_ref().is_some_and(|f| region.contains(f.cfa))
        });

        if let Some(frame) = frame {
            ins_trace!(TRACE_VALUE, target: "focus", "stack frame: {frame} -> none");
            self.notify(|l| l.stack_frame_focus_changed(Some(&frame), None));
        }
        if !self.code_location.is_unknown() {
            self.code_location = CodeLocation::Unknown;
            self.notify(|l| l.code_location_focus_set(&CodeLocation::Unknown, false));
        }
        if own_stack {
            self.set_memory_region(None);
        }
    }

    /// Breakpoint a thread is currently stopped at.
    fn breakpoint_of(&self, thread: ThreadId) -> Option<Breakpoint> {
        let state = self.vm.state();
        let event = state.breakpoint_event(thread)?;
        self.vm
            .breakpoints()
            .into_iter()
            .find(|bp| bp.id == event.breakpoint)
    }

    // ------------------------------------------- stack frame -------------------------------------

    pub fn stack_frame(&self) -> Option<&StackFrame> {
        self.stack_frame.as_ref()
    }

    pub fn has_stack_frame(&self) -> bool {
        self.stack_frame.is_some()
    }

    /// Select a frame, the frame owner thread gets focus first.
    ///
    /// # Arguments
    ///
    /// * `frame`: frame to select
    /// * `interactive`: true if selection is made directly by user
    pub fn set_stack_frame(&mut self, frame: StackFrame, interactive: bool) {
        self.guarded(Category::StackFrame, |focus| {
            focus.apply_stack_frame(frame, interactive, false)
        });
    }

    /// Select a frame even if the same frame is already selected, used to refresh the focus
    /// after the VM has executed.
    pub fn reset_stack_frame(&mut self, frame: StackFrame) {
        self.guarded(Category::StackFrame, |focus| {
            focus.apply_stack_frame(frame, false, true)
        });
    }

    fn apply_stack_frame(&mut self, frame: StackFrame, interactive: bool, force: bool) {
        if self.thread != Some(frame.thread) {
            self.set_thread(Some(frame.thread));
        }

        let same = self
            .stack_frame
            .as_ref()
            .is_some_and(|current| current.is_same_frame(&frame));
        if same && !force {
            return;
        }

        self.frame_memory.insert(frame.thread, frame.clone());
        let old = self.stack_frame.replace(frame.clone());
        ins_trace!(TRACE_VALUE, target: "focus", "stack frame: {frame}");
        self.notify(|l| l.stack_frame_focus_changed(old.as_ref(), Some(&frame)));

        if force || self.code_location.address() != Some(frame.ip) {
            self.guarded(Category::CodeLocation, |focus| {
                focus.apply_code_location(CodeLocation::Machine(frame.ip), interactive, force)
            });
        }
    }

    // ------------------------------------------- code location -----------------------------------

    pub fn code_location(&self) -> &CodeLocation {
        &self.code_location
    }

    pub fn has_code_location(&self) -> bool {
        !self.code_location.is_unknown()
    }

    /// Select a code location. The cascade to the stack frame runs even if the location is
    /// already selected.
    pub fn set_code_location(&mut self, location: CodeLocation, interactive: bool) {
        self.guarded(Category::CodeLocation, |focus| {
            focus.apply_code_location(location, interactive, false)
        });
    }

    fn apply_code_location(&mut self, location: CodeLocation, interactive: bool, force: bool) {
        if force || self.code_location != location {
            self.code_location = location.clone();
            ins_trace!(TRACE_VALUE, target: "focus", "code location: {location}");
            self.notify(|l| l.code_location_focus_set(&location, interactive));
        }

        let (Some(thread), Some(addr)) = (self.thread, location.address()) else {
            return;
        };
        if let Some(frame) = self.frames(thread).into_iter().find(|f| f.ip == addr) {
            self.set_stack_frame(frame, false);
        }
    }

    // ------------------------------------------- address -----------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_zero()
    }

    /// Select a memory address, zero address clears the selection.
    pub fn set_address(&mut self, address: Address) {
        self.guarded(Category::Address, |focus| focus.apply_address(address));
    }

    fn apply_address(&mut self, address: Address) {
        if self.address == address {
            return;
        }
        let old = mem::replace(&mut self.address, address);
        ins_trace!(TRACE_VALUE, target: "focus", "address: {address}");
        self.notify(|l| l.address_focus_changed(old, address));

        if address.is_zero() {
            return;
        }
        if let Some(region) = self.vm.region_containing(address) {
            self.set_memory_region(Some(region));
        }
    }

    // ------------------------------------------- memory region -----------------------------------

    pub fn memory_region(&self) -> Option<&MemoryRegion> {
        self.memory_region.as_ref()
    }

    pub fn has_memory_region(&self) -> bool {
        self.memory_region.is_some()
    }

    pub fn set_memory_region(&mut self, region: Option<MemoryRegion>) {
        self.guarded(Category::MemoryRegion, |focus| {
            if focus.memory_region == region {
                return;
            }
            let old = mem::replace(&mut focus.memory_region, region);
            ins_trace!(TRACE_VALUE, target: "focus", "memory region: {:?}", focus.memory_region);
            let new = focus.memory_region.clone();
            focus.notify(|l| l.memory_region_focus_changed(old.as_ref(), new.as_ref()));
        });
    }

    // ------------------------------------------- breakpoint --------------------------------------

    pub fn breakpoint(&self) -> Option<&Breakpoint> {
        self.breakpoint.as_ref()
    }

    pub fn has_breakpoint(&self) -> bool {
        self.breakpoint.is_some()
    }

    /// Select a breakpoint. The cascade runs even if the breakpoint is already selected.
    pub fn set_breakpoint(&mut self, breakpoint: Option<Breakpoint>) {
        self.guarded(Category::Breakpoint, |focus| {
            focus.apply_breakpoint(breakpoint)
        });
    }

    fn apply_breakpoint(&mut self, breakpoint: Option<Breakpoint>) {
        let same = same_by(
            self.breakpoint.as_ref(),
            breakpoint.as_ref(),
            Breakpoint::is_same,
        );
        let old = mem::replace(&mut self.breakpoint, breakpoint.clone());
        if !same {
            ins_trace!(TRACE_VALUE, target: "focus", "breakpoint: {breakpoint:?}");
            self.notify(|l| l.breakpoint_focus_set(old.as_ref(), breakpoint.as_ref()));
        }

        let Some(breakpoint) = breakpoint else {
            return;
        };

        let state = self.vm.state();
        let stopped_here: Vec<ThreadId> = state
            .breakpoint_events
            .iter()
            .filter(|e| e.breakpoint == breakpoint.id && self.vm.is_live(e.thread))
            .map(|e| e.thread)
            .collect();
        let thread = match self.thread {
            Some(current) if stopped_here.contains(&current) => Some(current),
            _ => stopped_here.first().copied(),
        };

        match thread.and_then(|t| self.frames(t).into_iter().next()) {
            Some(top) => self.set_stack_frame(top, false),
            None => self.set_code_location(breakpoint.location.clone(), false),
        }
    }

    // ------------------------------------------- watchpoint --------------------------------------

    pub fn watchpoint(&self) -> Option<&Watchpoint> {
        self.watchpoint.as_ref()
    }

    pub fn has_watchpoint(&self) -> bool {
        self.watchpoint.is_some()
    }

    pub fn set_watchpoint(&mut self, watchpoint: Option<Watchpoint>) {
        self.guarded(Category::Watchpoint, |focus| {
            let same = same_by(
                focus.watchpoint.as_ref(),
                watchpoint.as_ref(),
                Watchpoint::is_same,
            );
            let old = mem::replace(&mut focus.watchpoint, watchpoint.clone());
            if !same {
                ins_trace!(TRACE_VALUE, target: "focus", "watchpoint: {watchpoint:?}");
                focus.notify(|l| l.watchpoint_focus_set(old.as_ref(), watchpoint.as_ref()));
            }
        });
    }

    // ------------------------------------------- heap object -------------------------------------

    pub fn heap_object(&self) -> Option<&HeapObject> {
        self.heap_object.as_ref()
    }

    pub fn has_heap_object(&self) -> bool {
        self.heap_object.is_some()
    }

    pub fn set_heap_object(&mut self, object: Option<HeapObject>) {
        self.guarded(Category::HeapObject, |focus| {
            let same = same_by(
                focus.heap_object.as_ref(),
                object.as_ref(),
                HeapObject::is_same,
            );
            if same {
                return;
            }
            let old = mem::replace(&mut focus.heap_object, object.clone());
            ins_trace!(TRACE_VALUE, target: "focus", "heap object: {:?}", object.as_ref().map(|o| o.id));
            focus.notify(|l| l.heap_object_focus_changed(old.as_ref(), object.as_ref()));
        });
    }
}
