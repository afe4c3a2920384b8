//! Ferry Core
//!
//! Core types shared by every Ferry service.
//!
//! This crate contains:
//! - Domain types: the job record, its status machine, and the work message
//! - DTOs: client-facing shapes used by the gateway and the CLI
//! - Text helpers for bounding what ends up in logs and records

pub mod domain;
pub mod dto;
pub mod text;
