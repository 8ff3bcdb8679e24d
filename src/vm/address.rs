use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Machine address in the inspected VM. Zero address means "no address".
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    pub const ZERO: Address = Address(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn offset(self, offset: i64) -> Address {
        if offset >= 0 {
            self.0.wrapping_add(offset as u64)
        } else {
            self.0.wrapping_sub(offset.unsigned_abs())
        }
        .into()
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Parse an address from user input, accepts `0x` prefixed or bare hex digits.
    pub fn parse_hex(text: &str) -> Option<Address> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Address)
    }
}

impl From<u64> for Address {
    fn from(addr: u64) -> Self {
        Address(addr)
    }
}

impl From<usize> for Address {
    fn from(addr: usize) -> Self {
        Address(addr as u64)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!("{:#016X}", self.0))
    }
}

/// Named, bounded range of VM memory: `[start, start + size)`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Deserialize)]
pub struct MemoryRegion {
    pub name: String,
    pub start: Address,
    pub size: u64,
}

impl MemoryRegion {
    pub fn new(name: impl Into<String>, start: impl Into<Address>, size: u64) -> Self {
        Self {
            name: name.into(),
            start: start.into(),
            size,
        }
    }

    /// First address past the region, saturates at the top of the address space.
    pub fn end(&self) -> Address {
        Address(self.start.0.saturating_add(self.size))
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end()
    }
}

impl Display for MemoryRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{} - {})", self.name, self.start, self.end())
    }
}
