use crate::vm::address::Address;
use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Identity of a heap object in the debuggee.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:#x}>", self.0)
    }
}

/// Layout variant of a heap object.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    Tuple { class: String },
    Array { element: String, length: usize },
    Hub { class: String },
    ClassActor { class: String },
    MethodActor { holder: String, name: String },
    String { value: String },
    Unknown,
}

/// Reference to a heap object in the debuggee.
#[derive(Clone, Debug, Deserialize)]
pub struct HeapObject {
    pub id: ObjectId,
    pub origin: Address,
    #[serde(flatten)]
    pub kind: ObjectKind,
}

impl HeapObject {
    pub fn is_same(&self, other: &HeapObject) -> bool {
        self.id == other.id
    }
}
