//! Core context-management protocol for ctxd.
//!
//! This crate defines the capability traits (context store, history store,
//! inference provider) that `ctxd-infra` implements, and the protocol that
//! coordinates them: per-session locking, optimistic turn validation, the
//! request pipeline and the background commit. It never depends on
//! `ctxd-infra` or on any database or HTTP crate.

pub mod history;
pub mod inference;
pub mod lock;
pub mod pipeline;
pub mod store;
pub mod template;
pub mod turn;
pub mod updater;

#[cfg(test)]
pub(crate) mod test_support;
