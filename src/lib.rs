//! Tracescope: Trace Ingestion and Snapshot Reconstruction
//!
//! Loads recorded browser execution traces of any supported vintage, migrates
//! them to the current event schema, folds them into a queryable model of
//! contexts, actions, pages and resources, and rebuilds self-contained HTML
//! documents for every captured DOM snapshot.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod registry;
pub mod snapshot;
pub mod tooling;
pub mod trace;
pub mod types;

pub use backend::{backend_for_locator, TraceBackend};
pub use error::TraceError;
pub use model::{MultiTraceModel, TraceModel};
pub use registry::TraceRegistry;
pub use snapshot::{SnapshotRenderer, SnapshotStorage};
