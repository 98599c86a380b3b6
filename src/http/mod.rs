//! HTTP front end: routing, the rate limit gate, and the server loop.

mod error;
mod server;
mod service;

pub use error::ApiError;
pub use server::{serve_listener, HttpServer};
pub use service::{router, AppState, ViewParams, ViewResponse};
