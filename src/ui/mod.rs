//! Minimal console presentation of an inspection session.

pub mod console;
pub mod print;
