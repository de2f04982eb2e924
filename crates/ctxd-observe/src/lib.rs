//! Observability setup for ctxd: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
