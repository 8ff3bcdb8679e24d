use crate::inspection::Inspection;
use crate::vm::ThreadId;
use std::cell::RefCell;
use std::rc::Rc;

/// Observer set that tolerates registration changes during notification.
///
/// Every fan-out pass works on a snapshot of the set, so listeners added or removed while a
/// notification is in flight affect only subsequent passes.
pub struct ListenerSet<T: ?Sized> {
    listeners: Rc<RefCell<Vec<Rc<T>>>>,
}

impl<T: ?Sized> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: Rc::default(),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    /// Add listener, adding the same listener twice has no effect.
    pub fn add(&self, listener: Rc<T>) {
        let mut listeners = self.listeners.borrow_mut();
        if !listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Rc<T>) {
        self.listeners
            .borrow_mut()
            .retain(|l| !Rc::ptr_eq(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Copy of current listeners, in registration order.
    pub fn snapshot(&self) -> Vec<Rc<T>> {
        self.listeners.borrow().clone()
    }
}

/// View-level observer of the inspection session.
///
/// Callbacks receive the inspection read-only, they must not expect any of their own changes
/// to the session to be visible to other listeners of the same pass.
pub trait InspectionListener {
    /// The VM state may have changed, `force` asks to bypass any view-local caching.
    fn vm_state_changed(&self, _inspection: &Inspection, _force: bool) -> anyhow::Result<()> {
        Ok(())
    }

    /// A thread started, died or changed its state.
    fn thread_state_changed(&self, _inspection: &Inspection, _thread: ThreadId) {}

    fn breakpoint_state_changed(&self, _inspection: &Inspection) {}

    fn watchpoint_set_changed(&self, _inspection: &Inspection) {}

    /// Display or style settings have changed.
    fn view_configuration_changed(&self, _inspection: &Inspection) {}

    fn vm_process_terminated(&self, _inspection: &Inspection) {}

    fn inspection_ending(&self, _inspection: &Inspection) {}
}
