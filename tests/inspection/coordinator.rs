use crate::common::{
    addr, heap, session, started_session, two_threads_vm, BrokenView, Event, RecordingListener,
    T1, T2,
};
use serial_test::serial;
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use vminspect::config::InspectionConfig;
use vminspect::inspection::components::Component;
use vminspect::inspection::listener::InspectionListener;
use vminspect::vm::scripted::Stop;
use vminspect::vm::{CodeLocation, MemoryRegion, ProcessState, Vm};

#[test]
fn test_initial_thread_choice() {
    let vm = two_threads_vm();
    vm.start();
    let session = session(vm);

    let focus = session.inspection.focus();
    assert_eq!(focus.thread(), Some(T1));
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x4000)));
    assert!(focus.stack_frame().unwrap().is_top());
}

#[test]
fn test_start_after_construction() {
    let mut session = session(two_threads_vm());
    assert!(!session.inspection.focus().has_thread());
    assert!(!session.inspection.has_process());

    session.vm.start();
    assert_eq!(session.inspection.process_pending(), 1);

    assert_eq!(session.inspection.focus().thread(), Some(T1));
    assert_eq!(
        session.inspection.focus().code_location(),
        &CodeLocation::Machine(addr(0x4000))
    );
    assert_eq!(
        session
            .listener
            .count(|e| matches!(e, Event::ThreadState(_))),
        2
    );
    assert!(session.inspection.has_process());
}

#[test]
fn test_unchanged_threads_report_focused_thread_only() {
    let mut session = started_session();
    session.vm.stop_with(Stop::default());
    session.inspection.process_pending();

    let threads: Vec<_> = session
        .listener
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::ThreadState(_)))
        .collect();
    assert_eq!(threads, vec![Event::ThreadState(T1)]);
}

#[test]
fn test_thread_death_refocuses_live_thread() {
    let mut session = started_session();
    session.inspection.focus_mut().set_thread(Some(T2));

    session.vm.stop_with(Stop {
        died: vec![T2],
        ..Stop::default()
    });
    session.inspection.process_pending();

    assert_eq!(session.inspection.focus().thread(), Some(T1));
    assert!(session
        .listener
        .events()
        .contains(&Event::ThreadState(T2)));
}

#[test]
fn test_watchpoint_stop_wins_over_breakpoint() {
    let mut session = started_session();
    let watchpoint = session
        .vm
        .set_watchpoint(&MemoryRegion::new("word", 0x10100_u64, 8))
        .unwrap();
    session
        .vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x6000)))
        .unwrap();
    session.inspection.process_pending();

    session.vm.stop_with(Stop {
        thread: Some(T1),
        ip: Some(addr(0x4010)),
        watch: Some(addr(0x10104)),
        ..Stop::default()
    });
    session.inspection.process_pending();

    let state = session.vm.state();
    assert!(!state.breakpoint_events.is_empty());
    let focus = session.inspection.focus();
    assert_eq!(focus.thread(), Some(T1));
    assert_eq!(focus.address(), addr(0x10104));
    assert_eq!(focus.watchpoint().map(|w| w.id), Some(watchpoint.id));
    assert_eq!(focus.memory_region(), Some(&heap()));
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x4010)));
}

#[test]
fn test_breakpoint_stop_focuses_stopped_thread() {
    let mut session = started_session();
    let bp = session
        .vm
        .set_breakpoint(&CodeLocation::Machine(addr(0x6000)))
        .unwrap();
    session.inspection.process_pending();
    assert_eq!(session.inspection.focus().thread(), Some(T1));

    session.vm.stop_with(Stop {
        thread: Some(T1),
        ip: Some(addr(0x4010)),
        ..Stop::default()
    });
    session.inspection.process_pending();

    let focus = session.inspection.focus();
    assert_eq!(focus.thread(), Some(T2));
    assert_eq!(focus.breakpoint().map(|b| b.id), Some(bp.id));
    assert_eq!(focus.code_location(), &CodeLocation::Machine(addr(0x6000)));
}

#[test]
fn test_stop_refreshes_code_location() {
    let mut session = started_session();
    session.vm.stop_with(Stop::default());
    session.inspection.process_pending();

    // same frame, code location is set again
    assert_eq!(
        session
            .listener
            .count(|e| *e == Event::CodeLocation(CodeLocation::Machine(addr(0x4000)))),
        1
    );
}

#[test]
fn test_duplicate_state_processed_once() {
    let mut session = started_session();
    session.vm.stop_with(Stop::default());
    session.vm.redeliver_state();
    session.vm.redeliver_state();
    assert_eq!(session.inspection.process_pending(), 3);

    // one update after the start, one after the stop
    assert_eq!(*session.gui.busy.borrow(), vec![true, false, true, false]);
    assert_eq!(
        session.inspection.state_history().last().map(|s| s.serial),
        Some(session.vm.state().serial)
    );
}

#[test]
fn test_busy_cleared_on_error() {
    let mut session = started_session();
    session.vm.set_stack_walks_fail(true);
    session.vm.stop_with(Stop::default());
    session.inspection.process_pending();

    assert!(!session.inspection.is_busy());
    assert_eq!(session.gui.busy.borrow().last(), Some(&false));
    let messages = session.gui.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("could not update view"));
}

#[test]
fn test_process_termination() {
    let mut session = started_session();
    session.vm.terminate().unwrap();
    session.inspection.process_pending();

    assert!(!session.inspection.has_process());
    assert!(!session.inspection.focus().has_thread());
    assert!(!session.inspection.focus().has_code_location());
    assert_eq!(
        session.listener.count(|e| *e == Event::Terminated),
        1
    );
    assert_eq!(session.inspection.current_title(), "VM Process terminated");
}

#[test]
fn test_failing_view_does_not_stop_refresh() {
    let session = started_session();
    let broken = Rc::new(BrokenView::default());
    let first: Rc<dyn InspectionListener> = broken.clone();
    let recording: Rc<dyn InspectionListener> = session.listener.clone();
    session.inspection.remove_listener(&recording);
    session.inspection.add_listener(first);
    session.inspection.add_listener(session.listener.clone());

    session.inspection.refresh_all(true);
    assert_eq!(broken.attempts.get(), 1);
    assert_eq!(session.listener.take(), vec![Event::Refresh(true)]);
}

#[test]
fn test_listener_removed_during_pass() {
    struct SelfRemoving {
        me: std::cell::RefCell<Option<Rc<dyn InspectionListener>>>,
        calls: Cell<u32>,
    }

    impl InspectionListener for SelfRemoving {
        fn vm_state_changed(
            &self,
            inspection: &vminspect::inspection::Inspection,
            _: bool,
        ) -> anyhow::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if let Some(me) = self.me.take() {
                inspection.remove_listener(&me);
            }
            Ok(())
        }
    }

    let session = started_session();
    let listener = Rc::new(SelfRemoving {
        me: Default::default(),
        calls: Cell::new(0),
    });
    let dyn_listener: Rc<dyn InspectionListener> = listener.clone();
    *listener.me.borrow_mut() = Some(dyn_listener.clone());
    session.inspection.add_listener(dyn_listener);

    session.inspection.refresh_all(false);
    session.inspection.refresh_all(false);
    assert_eq!(listener.calls.get(), 1);
    // other listeners are not affected
    assert_eq!(session.listener.count(|e| *e == Event::Refresh(false)), 2);
}

#[test]
fn test_work_marshaled_from_background_thread() {
    let mut session = started_session();
    session
        .inspection
        .spawn_background("scanner", |stop, notifier| {
            if !stop.is_stopped() {
                notifier.invoke_later(|inspection| {
                    inspection.focus_mut().set_address(addr(0x10100));
                });
            }
        })
        .unwrap();

    let mut processed = 0;
    for _ in 0..50 {
        processed += session
            .inspection
            .wait_and_process(Duration::from_millis(100));
        if processed > 0 {
            break;
        }
    }
    assert_eq!(processed, 1);
    assert_eq!(session.inspection.focus().address(), addr(0x10100));
    assert_eq!(session.inspection.focus().memory_region(), Some(&heap()));
}

#[test]
fn test_state_notification_from_other_thread() {
    let mut session = started_session();
    let notifier = session.inspection.notifier();
    let state = session.vm.state();

    std::thread::spawn(move || notifier.vm_state_changed(state))
        .join()
        .unwrap();

    // same state again, skipped
    assert_eq!(session.inspection.process_pending(), 1);
    assert_eq!(*session.gui.busy.borrow(), vec![true, false]);
}

#[test]
#[serial]
fn test_apply_config() {
    let mut session = started_session();
    session.inspection.apply_config(InspectionConfig {
        trace_level: 0,
        state_history_len: 1,
    });

    assert_eq!(session.inspection.config().state_history_len, 1);
    assert_eq!(session.inspection.state_history().count(), 1);
    assert_eq!(
        session.listener.take(),
        vec![Event::Configuration, Event::Refresh(true)]
    );
    vminspect::log::set_trace_level(InspectionConfig::default().trace_level);
}

#[test]
fn test_title() {
    let mut session = started_session();
    assert_eq!(session.inspection.current_title(), "VM Process stopped");

    session.vm.stop_with(Stop {
        in_gc: true,
        ..Stop::default()
    });
    session.inspection.process_pending();
    assert_eq!(
        session.inspection.current_title(),
        "VM Process stopped, in GC"
    );
}

struct Notepad {
    closed: Rc<Cell<bool>>,
}

impl Component for Notepad {
    fn close(&mut self) {
        self.closed.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_quit() {
    let mut session = started_session();
    let closed = Rc::new(Cell::new(false));
    session.inspection.components_mut().get_or_create(|| Notepad {
        closed: closed.clone(),
    });
    assert!(session.inspection.components().contains::<Notepad>());

    session.inspection.quit();

    assert!(closed.get());
    assert!(session.inspection.components().is_empty());
    assert_eq!(session.listener.events(), vec![Event::Ending]);
    assert_eq!(session.vm.state().process_state, ProcessState::Terminated);
}

#[test]
fn test_second_listener_not_notified_twice() {
    let session = started_session();
    let listener = Rc::new(RecordingListener::default());
    session.inspection.add_listener(listener.clone());
    session.inspection.add_listener(listener.clone());

    session.inspection.refresh_all(false);
    assert_eq!(listener.take(), vec![Event::Refresh(false)]);
}

#[test]
fn test_all_threads_died_drops_thread_context() {
    let mut session = started_session();
    session.inspection.focus_mut().set_thread(Some(T2));
    assert_eq!(
        session.inspection.focus().memory_region().unwrap().name,
        "stack #2"
    );
    session.listener.take();

    session.vm.stop_with(Stop {
        died: vec![T1, T2],
        ..Stop::default()
    });
    session.inspection.process_pending();

    let focus = session.inspection.focus();
    assert_eq!(focus.thread(), None);
    assert!(!focus.has_stack_frame());
    assert_eq!(focus.code_location(), &CodeLocation::Unknown);
    assert!(!focus.has_memory_region());
    assert!(session.gui.messages().is_empty());

    let events = session.listener.events();
    assert!(events.contains(&Event::Thread(None)));
    assert!(events.contains(&Event::StackFrame(None)));
    assert!(events.contains(&Event::CodeLocation(CodeLocation::Unknown)));
    assert!(events.contains(&Event::MemoryRegion(None)));
}
