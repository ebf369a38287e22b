//! Command-line interface for running and inspecting the gateway

pub mod server;

pub use server::*;
