use crate::vm::address::Address;
use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Abstract method identity: holder, name and signature.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Deserialize)]
pub struct MethodKey {
    pub holder: String,
    pub name: String,
    pub signature: String,
}

impl MethodKey {
    pub fn new(
        holder: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }
}

impl Display for MethodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.holder, self.name, self.signature)
    }
}

/// Location in code: a machine code address, a bytecode position or a whole method.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum CodeLocation {
    /// Sentinel location, nothing is selected.
    #[default]
    Unknown,
    Machine(Address),
    Bytecode {
        method: MethodKey,
        bci: u32,
    },
    Method(MethodKey),
}

impl CodeLocation {
    /// Machine address of location if it resolves to one.
    pub fn address(&self) -> Option<Address> {
        match self {
            CodeLocation::Machine(addr) if !addr.is_zero() => Some(*addr),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CodeLocation::Unknown)
    }
}

impl From<Address> for CodeLocation {
    fn from(addr: Address) -> Self {
        CodeLocation::Machine(addr)
    }
}

impl Display for CodeLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeLocation::Unknown => f.write_str("<unknown location>"),
            CodeLocation::Machine(addr) => write!(f, "{addr}"),
            CodeLocation::Bytecode { method, bci } => write!(f, "{method} bci={bci}"),
            CodeLocation::Method(method) => write!(f, "{method}"),
        }
    }
}
