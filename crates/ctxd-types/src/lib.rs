//! Shared domain types for the ctxd context manager.
//!
//! This crate contains no I/O. Every other workspace crate depends on it.

pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod inference;
pub mod session;
