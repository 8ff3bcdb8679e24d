//! Standard, human readable names for entities of the inspected VM.

use crate::vm::{HeapObject, ObjectKind, StackFrame, ThreadId, Vm};

/// Maximum length of a string literal shown inside a reference label.
const MAX_STRING_LEN: usize = 20;

/// Produces short names for threads, frames and heap object references.
pub struct NameDisplay {
    max_string_len: usize,
}

impl Default for NameDisplay {
    fn default() -> Self {
        Self {
            max_string_len: MAX_STRING_LEN,
        }
    }
}

impl NameDisplay {
    pub fn short_thread_name(&self, vm: &dyn Vm, thread: ThreadId) -> String {
        match vm.thread_name(thread) {
            Some(name) => format!("{name} [{}]", thread.0),
            None => format!("thread [{}]", thread.0),
        }
    }

    pub fn frame_name(&self, frame: &StackFrame) -> String {
        let function = frame.function.as_deref().unwrap_or("<native>");
        format!("{function} @ {}", frame.ip)
    }

    /// Label for a reference to a heap object, generic label if the layout is unknown.
    pub fn reference_label(&self, object: &HeapObject) -> String {
        match &object.kind {
            ObjectKind::Tuple { class } => format!("{} {}", object.id, short_class(class)),
            ObjectKind::Array { element, length } => {
                format!("{} {}[{length}]", object.id, short_class(element))
            }
            ObjectKind::Hub { class } => format!("{} Hub({})", object.id, short_class(class)),
            ObjectKind::ClassActor { class } => {
                format!("{} ClassActor({})", object.id, short_class(class))
            }
            ObjectKind::MethodActor { holder, name } => {
                format!("{} MethodActor({}.{name})", object.id, short_class(holder))
            }
            ObjectKind::String { value } => {
                format!("{} \"{}\"", object.id, self.abbreviate(value))
            }
            ObjectKind::Unknown => self.generic_label(object),
        }
    }

    fn generic_label(&self, object: &HeapObject) -> String {
        format!("{} @ {}", object.id, object.origin)
    }

    fn abbreviate<'a>(&self, s: &'a str) -> std::borrow::Cow<'a, str> {
        if s.chars().count() <= self.max_string_len {
            return s.into();
        }
        let head: String = s.chars().take(self.max_string_len).collect();
        format!("{head}...").into()
    }
}

/// Class name without package.
fn short_class(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
