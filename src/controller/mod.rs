//! # Controller
//!
//! Controller implementation for the Istio custom resource.
//!
//! ## Sub-modules
//!
//! - `reconciler` - Reconciliation pipeline, context, and status updates
//! - `backoff` - Fibonacci backoff for error requeues
//! - `server` - HTTP server for metrics and health probes

pub mod backoff;
pub mod reconciler;
pub mod server;
