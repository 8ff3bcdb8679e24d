use crate::inspection::Inspection;
use crate::ins_trace;
use crate::vm::VmState;
use std::fmt::{Debug, Formatter};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const TRACE_VALUE: u8 = 2;

/// Deferred job executed on the inspection thread.
pub type UiTask = dyn FnOnce(&mut Inspection) + Send;

/// Message delivered to the inspection inbox.
pub enum Notification {
    VmStateChanged(VmState),
    BreakpointsChanged,
    WatchpointsChanged,
    Invoke(Box<UiTask>),
}

impl Debug for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::VmStateChanged(state) => write!(f, "VmStateChanged({state})"),
            Notification::BreakpointsChanged => f.write_str("BreakpointsChanged"),
            Notification::WatchpointsChanged => f.write_str("WatchpointsChanged"),
            Notification::Invoke(_) => f.write_str("Invoke"),
        }
    }
}

/// Sending side of the inspection inbox, handed to the VM at subscription.
///
/// May be used from any thread. Notifications never run on the caller thread: they are queued and
/// processed one at a time by the thread that owns the [`Inspection`].
#[derive(Clone)]
pub struct VmNotifier {
    tx: Sender<Notification>,
    owner: thread::ThreadId,
}

impl VmNotifier {
    /// Notify about a new VM state.
    pub fn vm_state_changed(&self, state: VmState) {
        ins_trace!(
            TRACE_VALUE,
            "{}notified {state}, started: {:?}, died: {:?}",
            self.trace_prefix(),
            state.threads_started,
            state.threads_died
        );
        self.send(Notification::VmStateChanged(state));
    }

    /// Notify that the set of breakpoints (or one of them) has changed.
    pub fn breakpoints_changed(&self) {
        ins_trace!(TRACE_VALUE, "{}breakpoints changed", self.trace_prefix());
        self.send(Notification::BreakpointsChanged);
    }

    /// Notify that the set of watchpoints (or one of them) has changed.
    pub fn watchpoints_changed(&self) {
        ins_trace!(TRACE_VALUE, "{}watchpoints changed", self.trace_prefix());
        self.send(Notification::WatchpointsChanged);
    }

    /// Schedule a job on the inspection thread.
    pub fn invoke_later<F>(&self, f: F)
    where
        F: FnOnce(&mut Inspection) + Send + 'static,
    {
        self.send(Notification::Invoke(Box::new(f)));
    }

    /// True if called from the thread that owns the inspection.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn trace_prefix(&self) -> String {
        if self.is_owner_thread() {
            return String::new();
        }
        format!("[{}] ", thread::current().name().unwrap_or("worker"))
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            log::debug!(target: "inspection", "inspection closed, notification dropped");
        }
    }
}

/// Receiving side of the inspection inbox.
pub struct Inbox {
    rx: Receiver<Notification>,
}

impl Inbox {
    /// Return next queued notification without blocking.
    pub fn try_next(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Wait for next notification, `None` on timeout or when all senders are gone.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Notification> {
        match self.rx.recv_timeout(timeout) {
            Ok(notification) => Some(notification),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Create an inbox owned by the current thread.
pub fn inbox() -> (VmNotifier, Inbox) {
    let (tx, rx) = channel();
    (
        VmNotifier {
            tx,
            owner: thread::current().id(),
        },
        Inbox { rx },
    )
}
