//! # Observability
//!
//! Prometheus metrics for the operator. Logging goes through `tracing` and is
//! configured once in `runtime::initialization`.

pub mod metrics;
