mod common;

mod coordinator;
mod focus;
