//! Inspection session: the coordinator between the inspected VM, the user focus, the views and the
//! shared actions.
//!
//! VM notifications may come from any thread. They are never handled at the call site but queued
//! into the session inbox and handled one at a time by the thread that owns the [`Inspection`],
//! so focus and actions are never touched concurrently.

pub mod actions;
pub mod components;
pub mod error;
pub mod focus;
pub mod listener;
pub mod names;
pub mod notify;
pub mod worker;

use crate::config::InspectionConfig;
use crate::inspection::actions::{ActionKind, InspectionActions, InspectorAction};
use crate::inspection::components::Components;
use crate::inspection::error::{Error, InspectionResult};
use crate::inspection::focus::Focus;
use crate::inspection::listener::{InspectionListener, ListenerSet};
use crate::inspection::names::NameDisplay;
use crate::inspection::notify::{Inbox, Notification, VmNotifier};
use crate::inspection::worker::{BackgroundJob, StopFlag};
use crate::vm::{ProcessState, ThreadId, Vm, VmState};
use crate::{ins_trace, weak_error};
use itertools::Itertools;
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

const TRACE_VALUE: u8 = 1;

/// Presentation layer services used by the inspection.
pub trait InspectorGui {
    /// Show an error to the user.
    fn error_message(&self, title: &str, message: &str);

    /// Busy indicator, shown while the session updates after a VM stop.
    fn show_busy(&self, _busy: bool) {}
}

/// Raises the busy flag and clears it on drop.
struct BusyGuard {
    gui: Rc<dyn InspectorGui>,
    busy: Rc<Cell<bool>>,
}

impl BusyGuard {
    fn new(gui: Rc<dyn InspectorGui>, busy: Rc<Cell<bool>>) -> Self {
        busy.set(true);
        gui.show_busy(true);
        Self { gui, busy }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.set(false);
        self.gui.show_busy(false);
    }
}

/// Inspection session.
pub struct Inspection {
    vm: Rc<dyn Vm>,
    gui: Rc<dyn InspectorGui>,
    config: InspectionConfig,
    focus: Focus,
    actions: InspectionActions,
    listeners: ListenerSet<dyn InspectionListener>,
    notifier: VmNotifier,
    inbox: Inbox,
    /// Serial of the last fully processed VM state.
    last_state_processed: Option<u64>,
    /// Live threads as of the last processed stop.
    known_threads: Vec<ThreadId>,
    busy: Rc<Cell<bool>>,
    history: VecDeque<VmState>,
    components: Components,
    jobs: Vec<BackgroundJob>,
    names: NameDisplay,
    /// Name of the action in progress, used as a title for error messages.
    current_action: Option<String>,
}

impl Inspection {
    /// Start an inspection session over a VM. Must be called on the thread that will own the
    /// session: all notifications are handled there.
    pub fn new(vm: Rc<dyn Vm>, gui: Rc<dyn InspectorGui>, config: InspectionConfig) -> Self {
        crate::log::set_trace_level(config.trace_level);
        let (notifier, inbox) = notify::inbox();
        vm.subscribe(notifier.clone());

        let state = vm.state();
        let mut inspection = Self {
            focus: Focus::new(vm.clone()),
            vm,
            gui,
            config,
            actions: InspectionActions::new(),
            listeners: ListenerSet::default(),
            notifier,
            inbox,
            last_state_processed: Some(state.serial),
            known_threads: state.threads.clone(),
            busy: Rc::new(Cell::new(false)),
            history: VecDeque::new(),
            components: Components::default(),
            jobs: vec![],
            names: NameDisplay::default(),
            current_action: None,
        };
        inspection.record_state(&state);

        if state.process_state != ProcessState::NoProcess {
            if let Some(&thread) = state.threads.first() {
                inspection.focus.set_thread(Some(thread));
                if let Some(ip) = weak_error!(inspection.vm.instruction_pointer(thread)) {
                    inspection.focus.set_code_location(ip.into(), false);
                }
            }
        }
        info!(target: "inspection", "inspection started, {state}");

        inspection.actions.refresh(&inspection, true);
        inspection
    }

    pub fn vm(&self) -> &dyn Vm {
        self.vm.as_ref()
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    /// Focus for selection changes, all mutations go through the focus setters.
    pub fn focus_mut(&mut self) -> &mut Focus {
        &mut self.focus
    }

    pub fn actions(&self) -> &InspectionActions {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut InspectionActions {
        &mut self.actions
    }

    pub fn names(&self) -> &NameDisplay {
        &self.names
    }

    /// Handle for VM implementations and background work to reach this session.
    pub fn notifier(&self) -> VmNotifier {
        self.notifier.clone()
    }

    pub fn add_listener(&self, listener: Rc<dyn InspectionListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn InspectionListener>) {
        self.listeners.remove(listener);
    }

    /// True while the session updates after a VM stop.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    pub fn has_process(&self) -> bool {
        matches!(
            self.vm.state().process_state,
            ProcessState::Stopped | ProcessState::Running
        )
    }

    pub fn is_vm_running(&self) -> bool {
        self.vm.state().process_state == ProcessState::Running
    }

    /// True if the VM is stopped and may accept commands.
    pub fn is_vm_ready(&self) -> bool {
        self.vm.state().process_state == ProcessState::Stopped
    }

    /// Title for the main window, for example `VM Process stopped, in GC`.
    pub fn current_title(&self) -> String {
        let state = self.vm.state();
        let mut title = format!("VM Process {}", state.process_state);
        if state.in_gc {
            title.push_str(", in GC");
        }
        title
    }

    /// Recently processed VM states, oldest first.
    pub fn state_history(&self) -> impl Iterator<Item = &VmState> {
        self.history.iter()
    }

    fn record_state(&mut self, state: &VmState) {
        self.history.push_back(state.clone());
        while self.history.len() > self.config.state_history_len {
            self.history.pop_front();
        }
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut Components {
        &mut self.components
    }

    // ------------------------------------------- notifications -----------------------------------

    /// Handle all queued notifications. Return number of handled notifications.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(notification) = self.inbox.try_next() {
            self.handle(notification);
            processed += 1;
        }
        processed
    }

    /// Wait until a notification comes (or timeout expires), then handle all queued notifications.
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        match self.inbox.next_timeout(timeout) {
            Some(notification) => {
                self.handle(notification);
                1 + self.process_pending()
            }
            None => 0,
        }
    }

    fn handle(&mut self, notification: Notification) {
        match notification {
            Notification::VmStateChanged(state) => self.process_vm_state_change(state),
            Notification::BreakpointsChanged => {
                ins_trace!(TRACE_VALUE, "breakpoint set changed");
                for listener in self.listeners.snapshot() {
                    listener.breakpoint_state_changed(self);
                }
                self.actions.refresh(self, false);
            }
            Notification::WatchpointsChanged => {
                ins_trace!(TRACE_VALUE, "watchpoint set changed");
                for listener in self.listeners.snapshot() {
                    listener.watchpoint_set_changed(self);
                }
                self.actions.refresh(self, false);
            }
            Notification::Invoke(task) => task(self),
        }
    }

    fn process_vm_state_change(&mut self, state: VmState) {
        if !state.newer_than(self.last_state_processed) {
            debug!(
                target: "inspection",
                "redundant state change skipped: {state}, last processed: {:?}",
                self.last_state_processed
            );
            return;
        }
        ins_trace!(TRACE_VALUE, "process {state}");
        self.last_state_processed = Some(state.serial);
        self.record_state(&state);

        match state.process_state {
            ProcessState::Stopped => self.update_after_stopped(&state),
            ProcessState::Terminated => {
                info!(target: "inspection", "VM process terminated");
                self.focus.clear_all();
                for listener in self.listeners.snapshot() {
                    listener.vm_process_terminated(self);
                }
                // listeners may select things of a dead process
                self.focus.clear_all();
                self.known_threads.clear();
                self.actions.refresh(self, false);
            }
            ProcessState::Running | ProcessState::NoProcess => self.refresh_all(false),
        }

        self.actions.refresh(self, true);
    }

    /// Update the session after the VM has stopped: notify views about thread changes, refresh
    /// them, then focus on the cause of the stop.
    ///
    /// Errors are reported, never returned. The session is marked as busy while the update runs.
    pub fn update_after_stopped(&mut self, state: &VmState) {
        let _busy = BusyGuard::new(self.gui.clone(), self.busy.clone());

        if let Err(e) = self.try_update_after_stopped(state) {
            let e = Error::unexpected("could not update view", e);
            self.report_error(&e);
        }
    }

    fn try_update_after_stopped(&mut self, state: &VmState) -> InspectionResult<()> {
        // if stopped at a breakpoint it will be selected again below
        self.focus.set_breakpoint(None);

        let focus_alive = self.focus.thread().is_some_and(|t| self.vm.is_live(t));
        if !focus_alive {
            let live = state.threads.iter().copied().find(|t| self.vm.is_live(*t));
            debug!(target: "inspection", "no live thread in focus, refocus on {live:?}");
            self.focus.set_thread(live);
        }

        self.notify_thread_changes(state);
        self.refresh_all(false);

        if let Some(event) = &state.watchpoint_event {
            ins_trace!(TRACE_VALUE, "stopped by {} at {}", event.watchpoint, event.address);
            self.focus.set_thread(Some(event.thread));
            self.focus.set_watchpoint(Some(event.watchpoint.clone()));
            self.focus.set_address(event.address);
        } else if !state.breakpoint_events.is_empty() {
            let stopped = state
                .breakpoint_events
                .iter()
                .map(|e| e.thread)
                .find(|t| self.vm.is_live(*t));
            match stopped {
                Some(thread) => self.focus.set_thread(Some(thread)),
                None => {
                    let focus_alive = self.focus.thread().is_some_and(|t| self.vm.is_live(t));
                    if !focus_alive {
                        return Err(Error::StaleFocus("selected thread no longer valid"));
                    }
                }
            }
        }

        if let Some(thread) = self.focus.thread() {
            if let Some(top) = self.vm.frames(thread)?.into_iter().next() {
                self.focus.reset_stack_frame(top);
            }
        }
        Ok(())
    }

    /// Tell views which threads changed. If no threads were started or died only the focused
    /// one is reported.
    fn notify_thread_changes(&mut self, state: &VmState) {
        let previous: HashSet<ThreadId> = self.known_threads.iter().copied().collect();
        let current: HashSet<ThreadId> = state.threads.iter().copied().collect();

        let started = state.threads.iter().filter(|t| !previous.contains(t));
        let died = self.known_threads.iter().filter(|t| !current.contains(t));
        let mut changed: Vec<ThreadId> = started.chain(died).copied().unique().collect();
        if changed.is_empty() {
            changed.extend(self.focus.thread());
        }
        self.known_threads = state.threads.clone();

        ins_trace!(TRACE_VALUE, "threads changed: {changed:?}");
        for listener in self.listeners.snapshot() {
            for thread in &changed {
                listener.thread_state_changed(self, *thread);
            }
        }
    }

    // ------------------------------------------- refresh -----------------------------------------

    /// Refresh all views and actions. A failing view does not prevent others from refreshing.
    ///
    /// # Arguments
    ///
    /// * `force`: bypass any view-local caching
    pub fn refresh_all(&self, force: bool) {
        for listener in self.listeners.snapshot() {
            weak_error!(listener.vm_state_changed(self, force), "view refresh:");
        }
        self.actions.refresh(self, force);
    }

    /// Apply new settings, views are told and refreshed.
    pub fn apply_config(&mut self, config: InspectionConfig) {
        crate::log::set_trace_level(config.trace_level);
        self.config = config;
        while self.history.len() > self.config.state_history_len {
            self.history.pop_front();
        }
        for listener in self.listeners.snapshot() {
            listener.view_configuration_changed(self);
        }
        self.refresh_all(true);
    }

    // ------------------------------------------- actions -----------------------------------------

    /// Run an action if it is enabled. Failures are reported to the user, then pending
    /// notifications are handled and views refreshed.
    pub fn perform(&mut self, action: &Rc<InspectorAction>) {
        if !action.is_enabled() {
            debug!(target: "actions", "`{}` is disabled, skipped", action.name());
            return;
        }
        ins_trace!(TRACE_VALUE, target: "actions", "perform `{}`", action.name());

        self.current_action = Some(action.name().to_string());
        match action.procedure(self) {
            Ok(()) => {}
            Err(Error::VmBusy) => self.announce_vm_busy_failure(action.name()),
            Err(e) => self.report_error(&e),
        }
        self.current_action = None;

        self.process_pending();
        self.refresh_all(false);
    }

    /// Run a standard action. Return false if there is no such action.
    pub fn perform_kind(&mut self, kind: ActionKind) -> bool {
        match self.actions.get(kind) {
            Some(action) => {
                self.perform(&action);
                true
            }
            None => false,
        }
    }

    /// Tell the user that the VM refused a request.
    pub fn announce_vm_busy_failure(&self, attempted: &str) {
        warn!(target: "actions", "`{attempted}` failed: VM busy");
        self.gui
            .error_message(&self.current_title(), &format!("{attempted} failed: VM Busy"));
    }

    fn report_error(&self, e: &Error) {
        if e.is_fatal() {
            error!(target: "inspection", "{e:#}");
        } else {
            warn!(target: "inspection", "{e:#}");
        }
        let title = self
            .current_action
            .clone()
            .unwrap_or_else(|| self.current_title());
        self.gui.error_message(&title, &e.to_string());
    }

    // ------------------------------------------- background work ---------------------------------

    /// Run work on a dedicated thread. The work reaches the session through the notifier.
    pub fn spawn_background<F>(&mut self, name: &str, work: F) -> std::io::Result<()>
    where
        F: FnOnce(StopFlag, VmNotifier) + Send + 'static,
    {
        self.jobs.retain(|job| !job.is_finished());
        let job = BackgroundJob::spawn(name, self.notifier.clone(), work)?;
        self.jobs.push(job);
        Ok(())
    }

    // ------------------------------------------- shutdown ----------------------------------------

    /// End the session: views are told, background work stopped, components closed and the VM
    /// process terminated if it is still alive.
    pub fn quit(&mut self) {
        for listener in self.listeners.snapshot() {
            listener.inspection_ending(self);
        }
        for job in self.jobs.drain(..) {
            debug!(target: "inspection", "stop background job `{}`", job.name());
            job.join();
        }
        self.components.close_all();

        if self.has_process() {
            if let Err(e) = self.vm.terminate() {
                warn!(target: "inspection", "error during VM termination: {e}");
            }
        }
        info!(target: "inspection", "inspection finished");
    }
}
