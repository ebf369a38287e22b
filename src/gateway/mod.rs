//! HTTP surface: server loop, rate-limit gate and API handlers

pub mod handlers;
pub mod image;
pub mod server;

pub use image::{decode_image, ImageError, ImagePayload};
pub use server::{handle_request, AppState, GatewayServer};
