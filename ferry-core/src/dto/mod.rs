//! Data Transfer Objects for the HTTP boundary
//!
//! Shapes returned by the gateway and consumed by the CLI.

pub mod job;
