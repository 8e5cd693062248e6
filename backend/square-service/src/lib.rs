//! Square Service Library
//!
//! Serves the public discovery feed ("Square"): given a seed content item,
//! assembles a deterministic, paginated sequence of related items through a
//! tiered relatedness engine with cursor pagination, a randomized subtype
//! fallback pool, and a hard anti-addiction cap on feed depth.
//!
//! # Modules
//!
//! - `handlers`: HTTP request handlers for the stream and health endpoints
//! - `models`: subtypes, visibility scopes, content records, response shapes
//! - `registry`: content kind registry and subtype resolution rules
//! - `stream`: tier set, page assembly engine, cursor and cap primitives
//! - `services`: page assembly orchestration and collaborator seams
//! - `db`: read-only Postgres candidate repository
//! - `error`: error types and HTTP mapping
//! - `config`: configuration management
//! - `metrics`: observability and metrics collection

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod services;
pub mod stream;

pub use config::Config;
pub use error::{AppError, Result};
