pub mod config;
pub mod inspection;
pub mod log;
pub mod ui;
pub mod vm;
