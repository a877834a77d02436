//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, managed resource operations, requeues
//! - `restart_metrics` - Sidecar restart rollout (runs, restarted and failed workloads)

pub mod controller_metrics;
pub mod registry;
pub mod restart_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use restart_metrics::*;
