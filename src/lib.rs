//! Istio Mesh Operator Library
//!
//! Reconciliation and sidecar restart engine for the Istio module operator.
//! Tests are included in the module files and in `tests/`.

pub mod cluster;
pub mod clusterconfig;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod resources;
pub mod restart;
pub mod runtime;

// Re-export CRD types for convenience
pub use crd::*;
