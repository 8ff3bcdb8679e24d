//! Scripted VM: a [`Vm`] that replays a prepared scenario instead of driving a real process.
//!
//! Scenario describes threads (with their stacks and call frames), memory regions, heap objects,
//! initial breakpoints and a list of stops. Every execution request moves the VM to the next stop.

use crate::vm::{
    Address, Breakpoint, BreakpointEvent, BreakpointId, CodeLocation, HeapObject, MemoryRegion,
    ObjectId, ProcessState, StackFrame, ThreadId, Vm, VmError, VmNotifier, VmResult, VmState,
    Watchpoint, WatchpointEvent, WatchpointId,
};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::path::Path;

/// Length of an instruction for the stepping commands.
const INSTRUCTION_LEN: i64 = 4;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSpec {
    pub ip: Address,
    pub cfa: Address,
    #[serde(default)]
    pub function: Option<String>,
}

impl FrameSpec {
    pub fn new(ip: impl Into<Address>, cfa: impl Into<Address>, function: &str) -> Self {
        Self {
            ip: ip.into(),
            cfa: cfa.into(),
            function: Some(function.to_string()),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadSpec {
    pub id: ThreadId,
    #[serde(default)]
    pub name: Option<String>,
    pub stack: MemoryRegion,
    /// Call frames, topmost first.
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

/// What happens during the next execution request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Stop {
    /// Thread that executed, first thread if not set.
    pub thread: Option<ThreadId>,
    /// New instruction pointer of the executed thread top frame.
    pub ip: Option<Address>,
    /// Memory access made by the executed thread, triggers a watchpoint covering the address.
    pub watch: Option<Address>,
    pub started: Vec<ThreadSpec>,
    pub died: Vec<ThreadId>,
    pub in_gc: bool,
}

/// Scripted session description, usually loaded from a TOML file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub threads: Vec<ThreadSpec>,
    pub regions: Vec<MemoryRegion>,
    pub objects: Vec<HeapObject>,
    /// Machine code addresses with breakpoints set before the start.
    pub breakpoints: Vec<Address>,
    pub stops: Vec<Stop>,
}

impl Scenario {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

struct ScriptedThread {
    name: Option<String>,
    stack: MemoryRegion,
    frames: Vec<FrameSpec>,
}

struct Inner {
    threads: IndexMap<ThreadId, ScriptedThread>,
    regions: Vec<MemoryRegion>,
    objects: IndexMap<ObjectId, HeapObject>,
    breakpoints: IndexMap<BreakpointId, Breakpoint>,
    watchpoints: IndexMap<WatchpointId, Watchpoint>,
    next_id: u32,
    stops: VecDeque<Stop>,
    state: VmState,
    /// Threads started or died since last state.
    started: Vec<ThreadId>,
    died: Vec<ThreadId>,
    in_gc: bool,
    busy: bool,
    broken_stack_walks: bool,
}

impl Inner {
    fn insert_thread(&mut self, thread: ThreadSpec) {
        self.started.push(thread.id);
        self.threads.insert(
            thread.id,
            ScriptedThread {
                name: thread.name,
                stack: thread.stack,
                frames: thread.frames,
            },
        );
    }

    fn check_not_busy(&self) -> VmResult<()> {
        if self.busy {
            return Err(VmError::Busy);
        }
        Ok(())
    }

    fn check_stopped(&self) -> VmResult<()> {
        self.check_not_busy()?;
        match self.state.process_state {
            ProcessState::Stopped => Ok(()),
            ProcessState::NoProcess | ProcessState::Terminated => Err(VmError::NoProcess),
            ProcessState::Running => Err(VmError::NotStopped),
        }
    }

    fn thread_mut(&mut self, thread: ThreadId) -> VmResult<&mut ScriptedThread> {
        self.threads
            .get_mut(&thread)
            .ok_or(VmError::ThreadNotFound(thread))
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn add_breakpoint(&mut self, location: CodeLocation) -> VmResult<Breakpoint> {
        if location.is_unknown() {
            return Err(VmError::InvalidLocation(location));
        }
        let bp = Breakpoint {
            id: BreakpointId(self.next_id()),
            location,
            enabled: true,
        };
        self.breakpoints.insert(bp.id, bp.clone());
        Ok(bp)
    }

    /// Build the next state snapshot and make it current.
    fn next_state(
        &mut self,
        process_state: ProcessState,
        access: Option<(ThreadId, Address)>,
    ) -> VmState {
        let mut state = VmState::new(self.state.serial + 1, process_state)
            .with_threads(self.threads.keys().copied());
        state.threads_started = mem::take(&mut self.started);
        state.threads_died = mem::take(&mut self.died);
        state.in_gc = self.in_gc;

        if process_state == ProcessState::Stopped {
            for (id, thread) in &self.threads {
                let Some(top) = thread.frames.first() else {
                    continue;
                };
                state.breakpoint_events.extend(
                    self.breakpoints
                        .values()
                        .filter(|bp| bp.enabled && bp.location.address() == Some(top.ip))
                        .map(|bp| BreakpointEvent {
                            thread: *id,
                            breakpoint: bp.id,
                        }),
                );
            }

            if let Some((thread, address)) = access {
                state.watchpoint_event = self
                    .watchpoints
                    .values()
                    .find(|w| w.enabled && w.region.contains(address))
                    .map(|w| WatchpointEvent {
                        thread,
                        watchpoint: w.clone(),
                        address,
                    });
            }
        }

        self.state = state.clone();
        state
    }

    fn apply_stop(&mut self, stop: Stop) -> Option<(ThreadId, Address)> {
        for thread in stop.started {
            self.insert_thread(thread);
        }
        for id in stop.died {
            if self.threads.shift_remove(&id).is_some() {
                self.died.push(id);
            }
        }

        let thread = stop.thread.or_else(|| self.threads.keys().next().copied());
        if let (Some(id), Some(ip)) = (thread, stop.ip) {
            if let Some(thread) = self.threads.get_mut(&id) {
                match thread.frames.first_mut() {
                    Some(top) => top.ip = ip,
                    None => thread.frames.push(FrameSpec {
                        ip,
                        cfa: thread.stack.end(),
                        function: None,
                    }),
                }
            }
        }
        self.in_gc = stop.in_gc;

        thread.zip(stop.watch)
    }

    /// States emitted by an execution request that ends with `stop`.
    fn execute(&mut self, stop: Stop) -> Vec<VmState> {
        let running = self.next_state(ProcessState::Running, None);
        let access = self.apply_stop(stop);
        let stopped = self.next_state(ProcessState::Stopped, access);
        vec![running, stopped]
    }

    fn terminate(&mut self) -> VmState {
        self.died = self.threads.drain(..).map(|(id, _)| id).collect();
        self.in_gc = false;
        self.next_state(ProcessState::Terminated, None)
    }
}

/// VM double that replays a [`Scenario`].
///
/// All notifications are sent after the internal state is updated and never while it is borrowed.
pub struct ScriptedVm {
    inner: RefCell<Inner>,
    notifiers: RefCell<Vec<VmNotifier>>,
}

impl Default for ScriptedVm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedVm {
    /// Create a VM without a process.
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Inner {
                threads: IndexMap::new(),
                regions: vec![],
                objects: IndexMap::new(),
                breakpoints: IndexMap::new(),
                watchpoints: IndexMap::new(),
                next_id: 0,
                stops: VecDeque::new(),
                state: VmState::no_process(),
                started: vec![],
                died: vec![],
                in_gc: false,
                busy: false,
                broken_stack_walks: false,
            }),
            notifiers: RefCell::new(vec![]),
        }
    }

    pub fn from_scenario(scenario: Scenario) -> Self {
        let vm = Self::new();
        {
            let mut inner = vm.inner.borrow_mut();
            for thread in scenario.threads {
                inner.insert_thread(thread);
            }
            inner.regions = scenario.regions;
            for object in scenario.objects {
                inner.objects.insert(object.id, object);
            }
            for addr in scenario.breakpoints {
                // machine locations are never rejected
                let _ = inner.add_breakpoint(CodeLocation::Machine(addr));
            }
            inner.stops = scenario.stops.into();
        }
        vm
    }

    pub fn add_thread(&self, thread: ThreadSpec) {
        self.inner.borrow_mut().insert_thread(thread);
    }

    pub fn add_region(&self, region: MemoryRegion) {
        self.inner.borrow_mut().regions.push(region);
    }

    pub fn add_object(&self, object: HeapObject) {
        self.inner.borrow_mut().objects.insert(object.id, object);
    }

    /// Append a stop to the end of the script.
    pub fn push_stop(&self, stop: Stop) {
        self.inner.borrow_mut().stops.push_back(stop);
    }

    /// Start the process, it stops right away.
    pub fn start(&self) {
        let state = self
            .inner
            .borrow_mut()
            .next_state(ProcessState::Stopped, None);
        debug!(target: "vm", "process started");
        self.emit(vec![state]);
    }

    /// Stop the process as if it stopped by itself, with no execution request.
    pub fn stop_with(&self, stop: Stop) {
        let state = {
            let mut inner = self.inner.borrow_mut();
            let access = inner.apply_stop(stop);
            inner.next_state(ProcessState::Stopped, access)
        };
        self.emit(vec![state]);
    }

    /// Deliver the current state once more.
    pub fn redeliver_state(&self) {
        let state = self.inner.borrow().state.clone();
        self.emit(vec![state]);
    }

    /// Make all control requests fail with [`VmError::Busy`].
    pub fn set_busy(&self, busy: bool) {
        self.inner.borrow_mut().busy = busy;
    }

    /// Make all stack walks fail.
    pub fn set_stack_walks_fail(&self, fail: bool) {
        self.inner.borrow_mut().broken_stack_walks = fail;
    }

    fn emit(&self, states: Vec<VmState>) {
        let notifiers = self.notifiers.borrow().clone();
        for state in states {
            debug!(target: "vm", "new {state}");
            for notifier in &notifiers {
                notifier.vm_state_changed(state.clone());
            }
        }
    }

    fn emit_breakpoints_changed(&self) {
        let notifiers = self.notifiers.borrow().clone();
        notifiers.iter().for_each(VmNotifier::breakpoints_changed);
    }

    fn emit_watchpoints_changed(&self) {
        let notifiers = self.notifiers.borrow().clone();
        notifiers.iter().for_each(VmNotifier::watchpoints_changed);
    }

    /// Run the executing request `f` against a stopped process, then replay the next stop.
    fn execute_with(
        &self,
        f: impl FnOnce(&mut Inner) -> VmResult<Stop>,
    ) -> VmResult<()> {
        let states = {
            let mut inner = self.inner.borrow_mut();
            inner.check_stopped()?;
            let stop = f(&mut *inner)?;
            inner.execute(stop)
        };
        self.emit(states);
        Ok(())
    }

    fn step(&self, thread: ThreadId) -> VmResult<()> {
        self.execute_with(|inner| {
            let top = inner
                .thread_mut(thread)?
                .frames
                .first()
                .ok_or(VmError::NoFrame(thread))?
                .ip;
            Ok(Stop {
                thread: Some(thread),
                ip: Some(top.offset(INSTRUCTION_LEN)),
                ..Stop::default()
            })
        })
    }
}

impl Vm for ScriptedVm {
    fn state(&self) -> VmState {
        self.inner.borrow().state.clone()
    }

    fn subscribe(&self, notifier: VmNotifier) {
        self.notifiers.borrow_mut().push(notifier);
    }

    fn frames(&self, thread: ThreadId) -> VmResult<Vec<StackFrame>> {
        let inner = self.inner.borrow();
        if inner.broken_stack_walks {
            return Err(VmError::StackWalk(thread));
        }
        let scripted = inner
            .threads
            .get(&thread)
            .ok_or(VmError::ThreadNotFound(thread))?;
        Ok(scripted
            .frames
            .iter()
            .enumerate()
            .map(|(position, frame)| StackFrame {
                thread,
                position,
                ip: frame.ip,
                cfa: frame.cfa,
                function: frame.function.clone(),
            })
            .collect())
    }

    fn is_live(&self, thread: ThreadId) -> bool {
        self.inner.borrow().threads.contains_key(&thread)
    }

    fn instruction_pointer(&self, thread: ThreadId) -> VmResult<Address> {
        let inner = self.inner.borrow();
        let scripted = inner
            .threads
            .get(&thread)
            .ok_or(VmError::ThreadNotFound(thread))?;
        scripted
            .frames
            .first()
            .map(|f| f.ip)
            .ok_or(VmError::NoFrame(thread))
    }

    fn thread_name(&self, thread: ThreadId) -> Option<String> {
        self.inner.borrow().threads.get(&thread)?.name.clone()
    }

    fn stack_region(&self, thread: ThreadId) -> Option<MemoryRegion> {
        self.inner
            .borrow()
            .threads
            .get(&thread)
            .map(|t| t.stack.clone())
    }

    fn region_containing(&self, addr: Address) -> Option<MemoryRegion> {
        self.memory_regions()
            .into_iter()
            .find(|region| region.contains(addr))
    }

    fn memory_regions(&self) -> Vec<MemoryRegion> {
        let inner = self.inner.borrow();
        inner
            .regions
            .iter()
            .cloned()
            .chain(inner.threads.values().map(|t| t.stack.clone()))
            .collect()
    }

    fn breakpoints(&self) -> Vec<Breakpoint> {
        self.inner.borrow().breakpoints.values().cloned().collect()
    }

    fn set_breakpoint(&self, location: &CodeLocation) -> VmResult<Breakpoint> {
        let bp = {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            inner.add_breakpoint(location.clone())?
        };
        debug!(target: "vm", "{bp} set");
        self.emit_breakpoints_changed();
        Ok(bp)
    }

    fn remove_breakpoint(&self, id: BreakpointId) -> VmResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            inner
                .breakpoints
                .shift_remove(&id)
                .ok_or(VmError::BreakpointNotFound(id))?;
        }
        self.emit_breakpoints_changed();
        Ok(())
    }

    fn enable_breakpoint(&self, id: BreakpointId, enabled: bool) -> VmResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            inner
                .breakpoints
                .get_mut(&id)
                .ok_or(VmError::BreakpointNotFound(id))?
                .enabled = enabled;
        }
        self.emit_breakpoints_changed();
        Ok(())
    }

    fn watchpoints(&self) -> Vec<Watchpoint> {
        self.inner.borrow().watchpoints.values().cloned().collect()
    }

    fn set_watchpoint(&self, region: &MemoryRegion) -> VmResult<Watchpoint> {
        let watchpoint = {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            let watchpoint = Watchpoint {
                id: WatchpointId(inner.next_id()),
                region: region.clone(),
                enabled: true,
            };
            inner.watchpoints.insert(watchpoint.id, watchpoint.clone());
            watchpoint
        };
        debug!(target: "vm", "{watchpoint} set");
        self.emit_watchpoints_changed();
        Ok(watchpoint)
    }

    fn remove_watchpoint(&self, id: WatchpointId) -> VmResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            inner
                .watchpoints
                .shift_remove(&id)
                .ok_or(VmError::WatchpointNotFound(id))?;
        }
        self.emit_watchpoints_changed();
        Ok(())
    }

    fn find_object(&self, id: ObjectId) -> Option<HeapObject> {
        self.inner.borrow().objects.get(&id).cloned()
    }

    fn resume(&self) -> VmResult<()> {
        let states = {
            let mut inner = self.inner.borrow_mut();
            inner.check_stopped()?;
            match inner.stops.pop_front() {
                Some(stop) => inner.execute(stop),
                None => {
                    let running = inner.next_state(ProcessState::Running, None);
                    vec![running, inner.terminate()]
                }
            }
        };
        self.emit(states);
        Ok(())
    }

    fn pause(&self) -> VmResult<()> {
        let state = {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            if inner.state.process_state != ProcessState::Running {
                return Err(VmError::NotRunning);
            }
            inner.next_state(ProcessState::Stopped, None)
        };
        self.emit(vec![state]);
        Ok(())
    }

    fn single_step(&self, thread: ThreadId) -> VmResult<()> {
        self.step(thread)
    }

    fn step_over(&self, thread: ThreadId) -> VmResult<()> {
        self.step(thread)
    }

    fn return_from_frame(&self, thread: ThreadId) -> VmResult<()> {
        self.execute_with(|inner| {
            let frames = &mut inner.thread_mut(thread)?.frames;
            if frames.len() < 2 {
                return Err(VmError::NoFrame(thread));
            }
            frames.remove(0);
            Ok(Stop {
                thread: Some(thread),
                ..Stop::default()
            })
        })
    }

    fn run_to_instruction(&self, thread: ThreadId, addr: Address) -> VmResult<()> {
        self.execute_with(|inner| {
            inner.thread_mut(thread)?;
            Ok(Stop {
                thread: Some(thread),
                ip: Some(addr),
                ..Stop::default()
            })
        })
    }

    fn terminate(&self) -> VmResult<()> {
        let state = {
            let mut inner = self.inner.borrow_mut();
            inner.check_not_busy()?;
            if matches!(
                inner.state.process_state,
                ProcessState::NoProcess | ProcessState::Terminated
            ) {
                return Err(VmError::NoProcess);
            }
            inner.terminate()
        };
        self.emit(vec![state]);
        Ok(())
    }
}
