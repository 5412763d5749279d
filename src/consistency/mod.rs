//! Consistency Engine
//!
//! Continuously verifies that the same business metric, computed by
//! different data paths, agrees within tolerance (the SSOT guarantee).

pub mod engine;
pub mod registry;

pub use engine::{
    CheckStatus, ConsistencyCheckResult, ConsistencyEngine, ConsistencyReport, OverallStatus,
};
pub use registry::{CheckDefinition, CheckRegistry, CheckSeverity};
