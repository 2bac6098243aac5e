//! `writeq-core`: domain building blocks for the write queue.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): the
//! job identifier, the immutable job payload, and the pending-job record the
//! retry engine works on.

pub mod error;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use id::JobUid;
pub use job::{Job, PendingJob};
