use std::cell::{Cell, RefCell};
use std::rc::Rc;
use vminspect::config::InspectionConfig;
use vminspect::inspection::focus::FocusListener;
use vminspect::inspection::listener::InspectionListener;
use vminspect::inspection::{Inspection, InspectorGui};
use vminspect::vm::scripted::{FrameSpec, ScriptedVm, ThreadSpec};
use vminspect::vm::{
    Address, Breakpoint, BreakpointId, CodeLocation, HeapObject, MemoryRegion, ObjectId, ObjectKind,
    StackFrame, ThreadId, Watchpoint, WatchpointId,
};

pub const T1: ThreadId = ThreadId(1);
pub const T2: ThreadId = ThreadId(2);

pub fn addr(value: u64) -> Address {
    Address::from(value)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    // focus
    Thread(Option<ThreadId>),
    StackFrame(Option<Address>),
    CodeLocation(CodeLocation),
    Address(Address),
    MemoryRegion(Option<String>),
    Breakpoint(Option<BreakpointId>),
    Watchpoint(Option<WatchpointId>),
    HeapObject(Option<ObjectId>),
    // inspection
    Refresh(bool),
    ThreadState(ThreadId),
    BreakpointSet,
    WatchpointSet,
    Configuration,
    Terminated,
    Ending,
}

/// Records every focus and inspection event.
#[derive(Default)]
pub struct RecordingListener {
    events: RefCell<Vec<Event>>,
}

impl RecordingListener {
    pub fn take(&self) -> Vec<Event> {
        self.events.take()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl FocusListener for RecordingListener {
    fn thread_focus_set(&self, _: Option<ThreadId>, thread: Option<ThreadId>) {
        self.push(Event::Thread(thread));
    }

    fn stack_frame_focus_changed(&self, _: Option<&StackFrame>, frame: Option<&StackFrame>) {
        self.push(Event::StackFrame(frame.map(|f| f.cfa)));
    }

    fn code_location_focus_set(&self, location: &CodeLocation, _: bool) {
        self.push(Event::CodeLocation(location.clone()));
    }

    fn address_focus_changed(&self, _: Address, address: Address) {
        self.push(Event::Address(address));
    }

    fn memory_region_focus_changed(&self, _: Option<&MemoryRegion>, region: Option<&MemoryRegion>) {
        self.push(Event::MemoryRegion(region.map(|r| r.name.clone())));
    }

    fn breakpoint_focus_set(&self, _: Option<&Breakpoint>, breakpoint: Option<&Breakpoint>) {
        self.push(Event::Breakpoint(breakpoint.map(|bp| bp.id)));
    }

    fn watchpoint_focus_set(&self, _: Option<&Watchpoint>, watchpoint: Option<&Watchpoint>) {
        self.push(Event::Watchpoint(watchpoint.map(|w| w.id)));
    }

    fn heap_object_focus_changed(&self, _: Option<&HeapObject>, object: Option<&HeapObject>) {
        self.push(Event::HeapObject(object.map(|o| o.id)));
    }
}

impl InspectionListener for RecordingListener {
    fn vm_state_changed(&self, _: &Inspection, force: bool) -> anyhow::Result<()> {
        self.push(Event::Refresh(force));
        Ok(())
    }

    fn thread_state_changed(&self, _: &Inspection, thread: ThreadId) {
        self.push(Event::ThreadState(thread));
    }

    fn breakpoint_state_changed(&self, _: &Inspection) {
        self.push(Event::BreakpointSet);
    }

    fn watchpoint_set_changed(&self, _: &Inspection) {
        self.push(Event::WatchpointSet);
    }

    fn view_configuration_changed(&self, _: &Inspection) {
        self.push(Event::Configuration);
    }

    fn vm_process_terminated(&self, _: &Inspection) {
        self.push(Event::Terminated);
    }

    fn inspection_ending(&self, _: &Inspection) {
        self.push(Event::Ending);
    }
}

/// View that always fails to refresh.
#[derive(Default)]
pub struct BrokenView {
    pub attempts: Cell<u32>,
}

impl InspectionListener for BrokenView {
    fn vm_state_changed(&self, _: &Inspection, _: bool) -> anyhow::Result<()> {
        self.attempts.set(self.attempts.get() + 1);
        anyhow::bail!("view is broken")
    }
}

#[derive(Default)]
pub struct TestGui {
    pub errors: RefCell<Vec<(String, String)>>,
    pub busy: RefCell<Vec<bool>>,
}

impl TestGui {
    pub fn messages(&self) -> Vec<String> {
        self.errors.borrow().iter().map(|(_, m)| m.clone()).collect()
    }
}

impl InspectorGui for TestGui {
    fn error_message(&self, title: &str, message: &str) {
        self.errors
            .borrow_mut()
            .push((title.to_string(), message.to_string()));
    }

    fn show_busy(&self, busy: bool) {
        self.busy.borrow_mut().push(busy);
    }
}

pub fn heap() -> MemoryRegion {
    MemoryRegion::new("heap", 0x10000_u64, 0x10000)
}

/// VM with two threads (`T1` with two frames, `T2` with one), a heap region and one object.
/// Process is not started.
pub fn two_threads_vm() -> Rc<ScriptedVm> {
    let vm = ScriptedVm::new();
    vm.add_thread(ThreadSpec {
        id: T1,
        name: Some("main".to_string()),
        stack: MemoryRegion::new("stack #1", 0x7000_u64, 0x1000),
        frames: vec![
            FrameSpec::new(0x4000_u64, 0x7f00_u64, "run"),
            FrameSpec::new(0x5000_u64, 0x7f80_u64, "main"),
        ],
    });
    vm.add_thread(ThreadSpec {
        id: T2,
        name: Some("worker".to_string()),
        stack: MemoryRegion::new("stack #2", 0x9000_u64, 0x1000),
        frames: vec![FrameSpec::new(0x6000_u64, 0x9f00_u64, "work")],
    });
    vm.add_region(heap());
    vm.add_object(HeapObject {
        id: ObjectId(0x10),
        origin: addr(0x10100),
        kind: ObjectKind::Tuple {
            class: "java.lang.Thread".to_string(),
        },
    });
    Rc::new(vm)
}

pub struct Session {
    pub vm: Rc<ScriptedVm>,
    pub inspection: Inspection,
    pub listener: Rc<RecordingListener>,
    pub gui: Rc<TestGui>,
}

/// Inspection over a VM, listener registered both for focus and inspection events.
pub fn session(vm: Rc<ScriptedVm>) -> Session {
    let gui = Rc::new(TestGui::default());
    let inspection = Inspection::new(vm.clone(), gui.clone(), InspectionConfig::default());
    let listener = Rc::new(RecordingListener::default());
    inspection.add_listener(listener.clone());
    inspection.focus().add_listener(listener.clone());
    Session {
        vm,
        inspection,
        listener,
        gui,
    }
}

/// Session over a started VM with all start notifications processed.
pub fn started_session() -> Session {
    let vm = two_threads_vm();
    let mut session = session(vm);
    session.vm.start();
    session.inspection.process_pending();
    session.listener.take();
    session
}
