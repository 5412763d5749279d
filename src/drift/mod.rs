//! Drift Detector & Model Safety Governor
//!
//! Watches a deployed decision model for behavioral drift against its
//! baseline and drives the model's operational status through a strict,
//! escalate-only state machine. The governor is the only component
//! allowed to change that status.

pub mod detector;
pub mod governor;
pub mod monitor;
pub mod thresholds;

pub use detector::{DriftDetector, DriftSeverity, DriftSignal, DriftSignalType, SignalStore};
pub use governor::{next_status, ModelGovernanceState, ModelStatus, SafetyGovernor, Transition};
pub use monitor::{DetectionOutcome, ModelMonitor};
pub use thresholds::{DriftDirection, ThresholdRow, ThresholdTable};
