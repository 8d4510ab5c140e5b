//! Core data models for the enrichment run.

pub mod failure;
pub mod record;

pub use failure::{Failure, FailureKind};
pub use record::{Record, ResultEntry};
