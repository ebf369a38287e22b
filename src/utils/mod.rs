//! Utility functions for the gateway

pub mod http;
pub mod time;
pub mod logging;

pub use http::*;
pub use time::*;
pub use logging::*;
