//! Database access layer

pub mod candidate_repo;

pub use candidate_repo::PgCandidateStore;
