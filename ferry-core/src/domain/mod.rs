//! Core domain types
//!
//! The job record is the single source of truth for a job. It is created by
//! the submitter, mutated by the worker and read by the status reader. Work
//! messages only ever point at a record.

pub mod job;
pub mod message;
pub mod operation;
