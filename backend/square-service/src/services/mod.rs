//! Business logic layer

pub mod square;
pub mod store;

pub use square::{SquareService, StreamRequest};
pub use store::{CandidateStore, ItemSerializer, RegistryPayloadSerializer};
