//! HTTP request handlers

#[path = "health.rs"]
mod health_endpoint;
pub mod square;

pub use health_endpoint::health;
pub use square::{get_stream, SquareHandlerState, StreamQueryParams};
