//! Infrastructure implementations for ctxd.
//!
//! Context store backends (in-memory, SQLite, replicated keygroup), the SQLite
//! session history store, the llama.cpp inference client, and configuration
//! loading.

pub mod backend;
pub mod config;
pub mod llama;
pub mod memory;
pub mod replicated;
pub mod sqlite;
