//! Nodegate - First-Fit Admission Control
//!
//! This crate implements an admission-control layer for a fleet of backend
//! nodes. Each node carries its own request-count and byte-throughput limits;
//! incoming work is admitted by the first configured node with spare capacity,
//! and all counter updates are serialized through a single registry lock.

pub mod admission;
pub mod config;
pub mod error;
pub mod http;
pub mod simulate;
