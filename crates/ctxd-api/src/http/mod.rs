//! HTTP layer for ctxd.
//!
//! `POST /completion` is the context-managed completion endpoint. Session
//! administration lives under `/api/v1/` and uses the envelope format.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
