//! Resilient hygiene analysis over a hosted vision API

pub mod client;
pub mod error;
pub mod response;
pub mod service;

pub use client::{GeminiClient, VisionClient};
pub use error::AnalysisError;
pub use response::parse_analysis;
pub use service::{AnalysisService, RetryPolicy};
