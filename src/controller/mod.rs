//! # Controller
//!
//! The reconcile engine and the components it sequences.
//!
//! ## Sub-modules
//!
//! - `applier` - the single write path: fetch-or-create, merge, own, replace
//! - `backoff` - per-resource error backoff
//! - `cluster` - cluster API trait and its `kube::Client` implementation
//! - `conditions` - condition helpers and component health projection
//! - `conflict` - ownership conflict reporting
//! - `deployment` - workload convergence with delete-and-recreate recovery
//! - `error` - API and reconcile error types
//! - `merge` - pure live/desired merge functions per kind
//! - `namespaces` - target namespace set: RBAC, per-namespace certificates, stale cleanup
//! - `reconciler` - orchestration of one pass and the finalizer protocol
//! - `resources` - the closed set of managed kinds
//! - `server` - metrics and probe endpoints
//! - `tls` - cert-manager bootstrap

pub mod applier;
pub mod backoff;
pub mod cluster;
pub mod conditions;
pub mod conflict;
pub mod deployment;
pub mod error;
pub mod merge;
pub mod namespaces;
pub mod reconciler;
pub mod resources;
pub mod server;
pub mod tls;
