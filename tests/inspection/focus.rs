use crate::common::{addr, heap, two_threads_vm, Event, RecordingListener, T1, T2};
use std::rc::Rc;
use vminspect::inspection::focus::Focus;
use vminspect::vm::scripted::{FrameSpec, ScriptedVm, ThreadSpec};
use vminspect::vm::{CodeLocation, MemoryRegion, Vm};

fn focus_over(vm: Rc<ScriptedVm>) -> (Focus, Rc<RecordingListener>) {
    let focus = Focus::new(vm);
    let listener = Rc::new(RecordingListener::default());
    focus.add_listener(listener.clone());
    (focus, listener)
}

#[test]
fn test_noop_setters_do_not_notify() {
    let vm = two_threads_vm();
    vm.start();
    let frames = vm.frames(T1).unwrap();
    let bp = vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x4100)))
        .unwrap();
    let watchpoint = vm
        .set_watchpoint(&MemoryRegion::new("word", 0x10100_u64, 8))
        .unwrap();
    let object = vm.find_object(vminspect::vm::ObjectId(0x10)).unwrap();
    let (mut focus, listener) = focus_over(vm.clone());

    focus.set_thread(Some(T1));
    focus.set_stack_frame(frames[1].clone(), true);
    focus.set_address(addr(0x10100));
    focus.set_breakpoint(Some(bp.clone()));
    focus.set_watchpoint(Some(watchpoint.clone()));
    focus.set_heap_object(Some(object.clone()));
    assert!(!listener.take().is_empty());

    focus.set_thread(Some(T1));
    // a fresh stack walk gives new snapshots of the same frames
    let fresh = vm.frames(T1).unwrap();
    focus.set_stack_frame(fresh[1].clone(), true);
    focus.set_code_location(focus.code_location().clone(), true);
    focus.set_address(addr(0x10100));
    focus.set_memory_region(focus.memory_region().cloned());
    focus.set_breakpoint(Some(bp));
    focus.set_watchpoint(Some(watchpoint));
    focus.set_heap_object(Some(object));

    assert_eq!(listener.take(), vec![]);
}

#[test]
fn test_region_follows_address() {
    let vm = Rc::new(ScriptedVm::new());
    let r1 = MemoryRegion::new("R1", 0x1000_u64, 0x1000);
    let r2 = MemoryRegion::new("R2", 0x3000_u64, 0x1000);
    vm.add_region(r1.clone());
    vm.add_region(r2.clone());
    let (mut focus, listener) = focus_over(vm);

    focus.clear_all();
    focus.set_memory_region(Some(r1.clone()));
    assert!(focus.has_memory_region());
    assert_eq!(focus.memory_region(), Some(&r1));

    focus.set_memory_region(Some(r2));
    focus.set_address(addr(0x1500));
    assert!(focus.has_address());
    assert_eq!(focus.memory_region(), Some(&r1));
    assert_eq!(
        listener.take(),
        vec![
            Event::MemoryRegion(Some("R1".to_string())),
            Event::MemoryRegion(Some("R2".to_string())),
            Event::Address(addr(0x1500)),
            Event::MemoryRegion(Some("R1".to_string())),
        ]
    );

    // no region contains the address, region selection is kept
    focus.set_address(addr(0x9_0000));
    assert_eq!(focus.memory_region(), Some(&r1));
}

#[test]
fn test_breakpoint_without_stopped_thread_selects_location() {
    let vm = two_threads_vm();
    vm.start();
    let location = CodeLocation::Machine(addr(0x4100));
    let bp = vm.set_breakpoint(&location).unwrap();

    let (mut focus, first) = focus_over(vm);
    let second = Rc::new(RecordingListener::default());
    focus.add_listener(second.clone());

    focus.set_breakpoint(Some(bp.clone()));

    let expected = vec![
        Event::Breakpoint(Some(bp.id)),
        Event::CodeLocation(location.clone()),
    ];
    assert_eq!(first.take(), expected);
    assert_eq!(second.take(), expected);
    assert_eq!(focus.code_location(), &location);
}

#[test]
fn test_breakpoint_selects_stopped_thread() {
    let vm = two_threads_vm();
    let bp = vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x6000)))
        .unwrap();
    vm.start();
    assert_eq!(vm.state().breakpoint_events.len(), 1);

    let (mut focus, _) = focus_over(vm);
    focus.set_thread(Some(T1));
    focus.set_breakpoint(Some(bp));

    assert_eq!(focus.thread(), Some(T2));
    assert_eq!(focus.stack_frame().unwrap().cfa, addr(0x9f00));
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x6000)));
}

#[test]
fn test_thread_selects_its_breakpoint() {
    let vm = two_threads_vm();
    let bp = vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x6000)))
        .unwrap();
    vm.start();

    let (mut focus, _) = focus_over(vm);
    focus.set_thread(Some(T2));

    assert_eq!(focus.breakpoint().map(|b| b.id), Some(bp.id));
    assert_eq!(focus.stack_frame().unwrap().thread, T2);
    assert_eq!(focus.memory_region().unwrap().name, "stack #2");
}

#[test]
fn test_thread_frame_round_trip() {
    let vm = two_threads_vm();
    vm.start();
    let (mut focus, _) = focus_over(vm.clone());

    focus.set_thread(Some(T1));
    assert!(focus.stack_frame().unwrap().is_top());
    assert_eq!(focus.memory_region().unwrap().name, "stack #1");

    let caller = vm.frames(T1).unwrap()[1].clone();
    focus.set_stack_frame(caller, true);
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x5000)));

    focus.set_thread(Some(T2));
    assert_eq!(focus.stack_frame().unwrap().cfa, addr(0x9f00));

    focus.set_thread(Some(T1));
    assert_eq!(focus.stack_frame().unwrap().cfa, addr(0x7f80));
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x5000)));
}

#[test]
fn test_forgotten_frame_falls_back_to_top() {
    let vm = two_threads_vm();
    vm.start();
    let (mut focus, _) = focus_over(vm.clone());

    focus.set_thread(Some(T1));
    focus.set_thread(Some(T2));
    // remembered top frame of T1 is gone
    vm.return_from_frame(T1).unwrap();

    focus.set_thread(Some(T1));
    let frame = focus.stack_frame().unwrap();
    assert!(frame.is_top());
    assert_eq!(frame.cfa, addr(0x7f80));
}

#[test]
fn test_cascade_terminates() {
    let vm = two_threads_vm();
    vm.start();
    let (mut focus, listener) = focus_over(vm.clone());
    focus.set_thread(Some(T1));
    listener.take();

    // frame of other thread: thread first, thread cascade must not re-enter frame selection
    let frame = vm.frames(T2).unwrap()[0].clone();
    focus.set_stack_frame(frame, true);

    assert_eq!(
        listener.take(),
        vec![
            Event::Thread(Some(T2)),
            Event::MemoryRegion(Some("stack #2".to_string())),
            Event::StackFrame(Some(addr(0x9f00))),
            Event::CodeLocation(CodeLocation::Machine(addr(0x6000))),
        ]
    );

    // location of a frame: one frame change, location is not set twice
    focus.set_thread(Some(T1));
    listener.take();
    focus.set_code_location(CodeLocation::Machine(addr(0x5000)), true);
    assert_eq!(
        listener.take(),
        vec![
            Event::CodeLocation(CodeLocation::Machine(addr(0x5000))),
            Event::StackFrame(Some(addr(0x7f80))),
        ]
    );
}

#[test]
fn test_reset_frame_forces_notification() {
    let vm = two_threads_vm();
    vm.start();
    let (mut focus, listener) = focus_over(vm.clone());
    focus.set_thread(Some(T1));
    listener.take();

    let top = vm.frames(T1).unwrap()[0].clone();
    focus.reset_stack_frame(top);
    assert_eq!(
        listener.take(),
        vec![
            Event::StackFrame(Some(addr(0x7f00))),
            Event::CodeLocation(CodeLocation::Machine(addr(0x4000))),
        ]
    );
}

#[test]
fn test_clear_all_is_silent() {
    let vm = two_threads_vm();
    vm.start();
    let (mut focus, listener) = focus_over(vm);
    focus.set_thread(Some(T1));
    focus.set_address(addr(0x10100));
    listener.take();

    focus.clear_all();
    assert!(listener.take().is_empty());
    assert!(!focus.has_thread());
    assert!(!focus.has_stack_frame());
    assert!(!focus.has_code_location());
    assert!(!focus.has_address());
    assert!(!focus.has_memory_region());
    assert!(focus.remembered_frame(T1).is_none());

    focus.set_memory_region(Some(heap()));
    assert_eq!(listener.take().len(), 1);
}

#[test]
fn test_same_breakpoint_selected_again_returns_to_stopped_thread() {
    let vm = two_threads_vm();
    let bp = vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x6000)))
        .unwrap();
    vm.start();
    let (mut focus, listener) = focus_over(vm.clone());

    focus.set_breakpoint(Some(bp.clone()));
    assert_eq!(focus.thread(), Some(T2));

    let caller = vm.frames(T1).unwrap()[1].clone();
    focus.set_stack_frame(caller, true);
    assert_eq!(focus.thread(), Some(T1));
    assert_eq!(focus.breakpoint().map(|b| b.id), Some(bp.id));
    listener.take();

    focus.set_breakpoint(Some(bp));
    assert_eq!(
        listener.take(),
        vec![
            Event::Thread(Some(T2)),
            Event::MemoryRegion(Some("stack #2".to_string())),
            Event::StackFrame(Some(addr(0x9f00))),
            Event::CodeLocation(CodeLocation::Machine(addr(0x6000))),
        ]
    );
    assert!(focus.stack_frame().unwrap().is_top());
}

#[test]
fn test_same_code_location_selected_again_moves_frame() {
    let vm = ScriptedVm::new();
    // recursive call, both frames at the same instruction
    vm.add_thread(ThreadSpec {
        id: T1,
        name: None,
        stack: MemoryRegion::new("stack #1", 0x7000_u64, 0x1000),
        frames: vec![
            FrameSpec::new(0x4000_u64, 0x7f00_u64, "fact"),
            FrameSpec::new(0x4000_u64, 0x7f80_u64, "fact"),
        ],
    });
    let vm = Rc::new(vm);
    vm.start();
    let (mut focus, listener) = focus_over(vm.clone());

    focus.set_thread(Some(T1));
    let outer = vm.frames(T1).unwrap()[1].clone();
    focus.set_stack_frame(outer, true);
    assert_eq!(focus.stack_frame().unwrap().cfa, addr(0x7f80));
    listener.take();

    focus.set_code_location(CodeLocation::Machine(addr(0x4000)), true);
    assert_eq!(listener.take(), vec![Event::StackFrame(Some(addr(0x7f00)))]);
    assert!(focus.stack_frame().unwrap().is_top());
}
