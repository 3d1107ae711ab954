//! mnemo gateway: the turn engine, its message bus, and the `mnemo` CLI.

pub mod bootstrap;
pub mod bus;
pub mod cli;
pub mod context;
pub mod runtime;
