//! Installation Controller Library
//!
//! Converges `Installation` and `ClusterInstallation` resources into a
//! multi-component application spanning an install namespace and a set of
//! target namespaces.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod desired;
pub mod instance;
pub mod observability;
pub mod runtime;

// Re-export CRD types for convenience
pub use crd::*;
