//! Inspection commands.
//!
//! Each command is an [`Action`]: a named procedure over the inspection plus an optional rule that
//! computes whether the command is currently enabled. Commands whose enablement depends on the
//! session state are registered as refreshable and re-evaluated on every refresh pass, in
//! registration order.

use crate::inspection::error::{Error, InspectionResult};
use crate::inspection::Inspection;
use crate::ins_trace;
use crate::vm::{Address, CodeLocation, MemoryRegion, ObjectId, ThreadId};
use indexmap::IndexMap;
use std::cell::Cell;
use std::rc::Rc;
use strum_macros::{Display, EnumString, IntoStaticStr};

const TRACE_VALUE: u8 = 2;

/// Size of a memory word watched by [`ActionKind::WatchSelectedWord`].
const WORD_SIZE: u64 = 8;

/// A command over the inspection session.
pub trait Action {
    fn name(&self) -> &str;

    /// Do the work. Errors are reported to the user by the caller.
    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()>;

    /// Compute the enabled state from the current session and focus.
    /// Called on every refresh pass, must not have side effects on the session.
    fn refresh(&self, _inspection: &Inspection, _force: bool) -> bool {
        true
    }
}

/// Action together with its enabled state.
pub struct InspectorAction {
    action: Box<dyn Action>,
    enabled: Cell<bool>,
}

impl InspectorAction {
    pub fn new(action: impl Action + 'static) -> Rc<Self> {
        Rc::new(Self {
            action: Box::new(action),
            enabled: Cell::new(true),
        })
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Recompute enabled state.
    pub fn refresh(&self, inspection: &Inspection, force: bool) {
        self.enabled.set(self.action.refresh(inspection, force));
    }

    pub(super) fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        self.action.procedure(inspection)
    }
}

/// Standard shared actions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumString, IntoStaticStr)]
pub enum ActionKind {
    #[strum(serialize = "refresh")]
    RefreshAll,
    #[strum(serialize = "pause")]
    Pause,
    #[strum(serialize = "resume")]
    Resume,
    #[strum(serialize = "stepi")]
    SingleStep,
    #[strum(serialize = "next")]
    StepOver,
    #[strum(serialize = "finish")]
    ReturnFromFrame,
    #[strum(serialize = "run-to")]
    RunToInstruction,
    #[strum(serialize = "toggle-break")]
    ToggleBreakpoint,
    #[strum(serialize = "remove-break")]
    RemoveSelectedBreakpoint,
    #[strum(serialize = "remove-all-breaks")]
    RemoveAllBreakpoints,
    #[strum(serialize = "enable-break")]
    EnableSelectedBreakpoint,
    #[strum(serialize = "disable-break")]
    DisableSelectedBreakpoint,
    #[strum(serialize = "watch")]
    WatchSelectedWord,
    #[strum(serialize = "remove-watch")]
    RemoveSelectedWatchpoint,
    #[strum(serialize = "remove-all-watches")]
    RemoveAllWatchpoints,
    #[strum(serialize = "stack-memory")]
    ViewThreadStackMemory,
    #[strum(serialize = "terminate")]
    Terminate,
}

/// Registry of shared actions.
pub struct InspectionActions {
    actions: IndexMap<ActionKind, Rc<InspectorAction>>,
    /// Actions with state that may go stale, in registration order.
    refreshable: Vec<Rc<InspectorAction>>,
}

impl Default for InspectionActions {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectionActions {
    pub fn new() -> Self {
        let mut actions = Self {
            actions: IndexMap::new(),
            refreshable: vec![],
        };

        actions.register(ActionKind::RefreshAll, RefreshAll, false);
        actions.register(ActionKind::Pause, DebugPause, true);
        actions.register(ActionKind::Resume, DebugResume, true);
        actions.register(ActionKind::SingleStep, DebugSingleStep, true);
        actions.register(ActionKind::StepOver, DebugStepOver, true);
        actions.register(ActionKind::ReturnFromFrame, DebugReturnFromFrame, true);
        actions.register(ActionKind::RunToInstruction, DebugRunToInstruction, true);
        actions.register(ActionKind::ToggleBreakpoint, ToggleBreakpoint, true);
        actions.register(
            ActionKind::RemoveSelectedBreakpoint,
            RemoveSelectedBreakpoint,
            true,
        );
        actions.register(ActionKind::RemoveAllBreakpoints, RemoveAllBreakpoints, true);
        actions.register(
            ActionKind::EnableSelectedBreakpoint,
            SetSelectedBreakpointEnabled(true),
            true,
        );
        actions.register(
            ActionKind::DisableSelectedBreakpoint,
            SetSelectedBreakpointEnabled(false),
            true,
        );
        actions.register(ActionKind::WatchSelectedWord, WatchSelectedWord, true);
        actions.register(
            ActionKind::RemoveSelectedWatchpoint,
            RemoveSelectedWatchpoint,
            true,
        );
        actions.register(ActionKind::RemoveAllWatchpoints, RemoveAllWatchpoints, true);
        actions.register(
            ActionKind::ViewThreadStackMemory,
            ViewThreadStackMemory,
            true,
        );
        actions.register(ActionKind::Terminate, TerminateVm, true);

        actions
    }

    fn register(&mut self, kind: ActionKind, action: impl Action + 'static, refreshable: bool) {
        let action = InspectorAction::new(action);
        if refreshable {
            self.refreshable.push(action.clone());
        }
        self.actions.insert(kind, action);
    }

    /// Add an externally created action to the refresh list.
    pub fn register_refreshable(&mut self, action: Rc<InspectorAction>) {
        if !self.refreshable.iter().any(|a| Rc::ptr_eq(a, &action)) {
            self.refreshable.push(action);
        }
    }

    pub fn get(&self, kind: ActionKind) -> Option<Rc<InspectorAction>> {
        self.actions.get(&kind).cloned()
    }

    /// Shared actions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, &Rc<InspectorAction>)> {
        self.actions.iter().map(|(kind, action)| (*kind, action))
    }

    /// Recompute enabled state of all refreshable actions.
    pub fn refresh(&self, inspection: &Inspection, force: bool) {
        ins_trace!(TRACE_VALUE, target: "actions", "refresh {} actions, force: {force}", self.refreshable.len());
        for action in &self.refreshable {
            action.refresh(inspection, force);
        }
    }
}

fn focused_thread(inspection: &Inspection) -> InspectionResult<ThreadId> {
    inspection.focus().thread().ok_or(Error::NoSelection("thread"))
}

fn thread_and_ready(inspection: &Inspection) -> bool {
    inspection.focus().has_thread() && inspection.is_vm_ready()
}

// ------------------------------------------- general -------------------------------------------

struct RefreshAll;

impl Action for RefreshAll {
    fn name(&self) -> &str {
        "Refresh all views"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        inspection.refresh_all(true);
        Ok(())
    }
}

struct TerminateVm;

impl Action for TerminateVm {
    fn name(&self) -> &str {
        "Terminate VM process"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        Ok(inspection.vm().terminate()?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.has_process()
    }
}

// ------------------------------------------- execution control ---------------------------------

struct DebugPause;

impl Action for DebugPause {
    fn name(&self) -> &str {
        "Pause process"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        Ok(inspection.vm().pause()?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.focus().has_thread() && inspection.is_vm_running()
    }
}

struct DebugResume;

impl Action for DebugResume {
    fn name(&self) -> &str {
        "Resume"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        Ok(inspection.vm().resume()?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        thread_and_ready(inspection)
    }
}

struct DebugSingleStep;

impl Action for DebugSingleStep {
    fn name(&self) -> &str {
        "Single instruction step"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let thread = focused_thread(inspection)?;
        Ok(inspection.vm().single_step(thread)?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        thread_and_ready(inspection)
    }
}

struct DebugStepOver;

impl Action for DebugStepOver {
    fn name(&self) -> &str {
        "Step over"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let thread = focused_thread(inspection)?;
        Ok(inspection.vm().step_over(thread)?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        thread_and_ready(inspection)
    }
}

struct DebugReturnFromFrame;

impl Action for DebugReturnFromFrame {
    fn name(&self) -> &str {
        "Return from frame"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let thread = focused_thread(inspection)?;
        Ok(inspection.vm().return_from_frame(thread)?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        thread_and_ready(inspection)
    }
}

struct DebugRunToInstruction;

impl Action for DebugRunToInstruction {
    fn name(&self) -> &str {
        "Run to selected instruction"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let thread = focused_thread(inspection)?;
        let addr = inspection
            .focus()
            .code_location()
            .address()
            .ok_or(Error::NoSelection("instruction"))?;
        Ok(inspection.vm().run_to_instruction(thread, addr)?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        thread_and_ready(inspection) && inspection.focus().code_location().address().is_some()
    }
}

// ------------------------------------------- breakpoints ---------------------------------------

struct ToggleBreakpoint;

impl Action for ToggleBreakpoint {
    fn name(&self) -> &str {
        "Toggle breakpoint at selected location"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let location = inspection.focus().code_location().clone();
        if location.is_unknown() {
            return Err(Error::NoSelection("code location"));
        }

        let existing = inspection
            .vm()
            .breakpoints()
            .into_iter()
            .find(|bp| bp.location == location);
        match existing {
            Some(bp) => {
                inspection.vm().remove_breakpoint(bp.id)?;
                if inspection
                    .focus()
                    .breakpoint()
                    .is_some_and(|selected| selected.is_same(&bp))
                {
                    inspection.focus_mut().set_breakpoint(None);
                }
            }
            None => {
                let bp = inspection.vm().set_breakpoint(&location)?;
                inspection.focus_mut().set_breakpoint(Some(bp));
            }
        }
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.has_process() && inspection.focus().has_code_location()
    }
}

struct RemoveSelectedBreakpoint;

impl Action for RemoveSelectedBreakpoint {
    fn name(&self) -> &str {
        "Remove selected breakpoint"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let bp = inspection
            .focus()
            .breakpoint()
            .map(|bp| bp.id)
            .ok_or(Error::NoSelection("breakpoint"))?;
        inspection.vm().remove_breakpoint(bp)?;
        inspection.focus_mut().set_breakpoint(None);
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.has_process() && inspection.focus().has_breakpoint()
    }
}

struct RemoveAllBreakpoints;

impl Action for RemoveAllBreakpoints {
    fn name(&self) -> &str {
        "Remove all breakpoints"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        inspection.focus_mut().set_breakpoint(None);
        for bp in inspection.vm().breakpoints() {
            inspection.vm().remove_breakpoint(bp.id)?;
        }
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.has_process() && !inspection.vm().breakpoints().is_empty()
    }
}

struct SetSelectedBreakpointEnabled(bool);

impl Action for SetSelectedBreakpointEnabled {
    fn name(&self) -> &str {
        if self.0 {
            "Enable selected breakpoint"
        } else {
            "Disable selected breakpoint"
        }
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let bp = inspection
            .focus()
            .breakpoint()
            .map(|bp| bp.id)
            .ok_or(Error::NoSelection("breakpoint"))?;
        Ok(inspection.vm().enable_breakpoint(bp, self.0)?)
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        let Some(selected) = inspection.focus().breakpoint() else {
            return false;
        };
        // the focus keeps a snapshot, the VM knows the actual state
        inspection
            .vm()
            .breakpoints()
            .iter()
            .any(|bp| bp.is_same(selected) && bp.enabled != self.0)
    }
}

// ------------------------------------------- watchpoints ---------------------------------------

struct WatchSelectedWord;

impl Action for WatchSelectedWord {
    fn name(&self) -> &str {
        "Watch memory word at selected address"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let addr = inspection.focus().address();
        if addr.is_zero() {
            return Err(Error::NoSelection("address"));
        }
        let region = MemoryRegion::new(format!("word {addr}"), addr, WORD_SIZE);
        let watchpoint = inspection.vm().set_watchpoint(&region)?;
        inspection.focus_mut().set_watchpoint(Some(watchpoint));
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.has_process() && inspection.focus().has_address()
    }
}

struct RemoveSelectedWatchpoint;

impl Action for RemoveSelectedWatchpoint {
    fn name(&self) -> &str {
        "Remove selected watchpoint"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let watchpoint = inspection
            .focus()
            .watchpoint()
            .map(|w| w.id)
            .ok_or(Error::NoSelection("watchpoint"))?;
        inspection.vm().remove_watchpoint(watchpoint)?;
        inspection.focus_mut().set_watchpoint(None);
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.focus().has_watchpoint()
    }
}

struct RemoveAllWatchpoints;

impl Action for RemoveAllWatchpoints {
    fn name(&self) -> &str {
        "Remove all watchpoints"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        inspection.focus_mut().set_watchpoint(None);
        for watchpoint in inspection.vm().watchpoints() {
            inspection.vm().remove_watchpoint(watchpoint.id)?;
        }
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        !inspection.vm().watchpoints().is_empty()
    }
}

// ------------------------------------------- memory --------------------------------------------

struct ViewThreadStackMemory;

impl Action for ViewThreadStackMemory {
    fn name(&self) -> &str {
        "View memory for selected thread's stack"
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let thread = focused_thread(inspection)?;
        let stack = inspection
            .vm()
            .stack_region(thread)
            .ok_or_else(|| Error::NotFound(format!("stack of thread {thread}")))?;
        inspection.focus_mut().set_memory_region(Some(stack));
        Ok(())
    }

    fn refresh(&self, inspection: &Inspection, _: bool) -> bool {
        inspection.focus().has_thread()
    }
}

// ------------------------------------------- one-shot actions ----------------------------------

struct ViewMemoryAt {
    name: String,
    text: String,
}

impl Action for ViewMemoryAt {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let addr = Address::parse_hex(&self.text)
            .filter(|addr| !addr.is_zero())
            .ok_or_else(|| Error::InvalidAddress(self.text.clone()))?;
        inspection.focus_mut().set_address(addr);
        Ok(())
    }
}

/// Action: select a memory address typed by user (hex).
pub fn view_memory_at(text: impl Into<String>) -> Rc<InspectorAction> {
    let text = text.into();
    InspectorAction::new(ViewMemoryAt {
        name: format!("View memory at {text}"),
        text,
    })
}

struct InspectObjectById {
    name: String,
    text: String,
}

impl Action for InspectObjectById {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let digits = self.text.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        let id = u64::from_str_radix(digits, 16)
            .map(ObjectId)
            .map_err(|_| Error::InvalidHexId(self.text.clone()))?;
        let object = inspection
            .vm()
            .find_object(id)
            .ok_or_else(|| Error::NotFound(format!("object {id}")))?;
        let origin = object.origin;
        inspection.focus_mut().set_heap_object(Some(object));
        inspection.focus_mut().set_address(origin);
        Ok(())
    }
}

/// Action: select a heap object by its hex id typed by user.
pub fn inspect_object_by_hex_id(text: impl Into<String>) -> Rc<InspectorAction> {
    let text = text.into();
    InspectorAction::new(InspectObjectById {
        name: format!("Inspect object {text}"),
        text,
    })
}

struct SelectMemoryRegion {
    name: String,
    region: String,
}

impl Action for SelectMemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let region = inspection
            .vm()
            .memory_regions()
            .into_iter()
            .find(|r| r.name == self.region)
            .ok_or_else(|| Error::NotFound(format!("memory region `{}`", self.region)))?;
        inspection.focus_mut().set_memory_region(Some(region));
        Ok(())
    }
}

/// Action: select a memory region by name.
pub fn select_memory_region(name: impl Into<String>) -> Rc<InspectorAction> {
    let region = name.into();
    InspectorAction::new(SelectMemoryRegion {
        name: format!("Select memory region {region}"),
        region,
    })
}

struct SetBreakpointAt {
    name: String,
    location: CodeLocation,
}

impl Action for SetBreakpointAt {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        let bp = inspection.vm().set_breakpoint(&self.location)?;
        inspection.focus_mut().set_breakpoint(Some(bp));
        Ok(())
    }
}

/// Action: set a breakpoint at a code location and select it.
pub fn set_breakpoint_at(location: CodeLocation) -> Rc<InspectorAction> {
    InspectorAction::new(SetBreakpointAt {
        name: format!("Set breakpoint at {location}"),
        location,
    })
}

struct SelectThread {
    name: String,
    thread: ThreadId,
}

impl Action for SelectThread {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedure(&self, inspection: &mut Inspection) -> InspectionResult<()> {
        if !inspection.vm().is_live(self.thread) {
            return Err(Error::NotFound(format!("thread {}", self.thread)));
        }
        inspection.focus_mut().set_thread(Some(self.thread));
        Ok(())
    }
}

/// Action: bring a thread into focus.
pub fn select_thread(thread: ThreadId) -> Rc<InspectorAction> {
    InspectorAction::new(SelectThread {
        name: format!("Select thread {thread}"),
        thread,
    })
}
