//! Drift severity thresholds
//!
//! Metric-specific static configuration mapping a drift delta to a
//! severity bucket. Injected into the detector at construction; never
//! derived at runtime.

use crate::drift::detector::{DriftSeverity, DriftSignalType};

/// Which direction of movement counts as harm for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftDirection {
    /// Growth over baseline is the problem (error rates, PSI)
    IncreaseIsBad,
    /// Loss against baseline is the problem (accuracy)
    DecreaseIsBad,
}

/// Severity ladder for one monitored metric
#[derive(Debug, Clone)]
pub struct ThresholdRow {
    pub metric: String,
    pub signal_type: DriftSignalType,
    pub direction: DriftDirection,
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl ThresholdRow {
    /// Bucket a raw delta (current - baseline) into a severity
    pub fn bucket(&self, delta: f64) -> DriftSeverity {
        let harm = match self.direction {
            DriftDirection::IncreaseIsBad => delta,
            DriftDirection::DecreaseIsBad => -delta,
        };

        if harm > self.critical {
            DriftSeverity::Critical
        } else if harm > self.high {
            DriftSeverity::High
        } else if harm > self.medium {
            DriftSeverity::Medium
        } else {
            DriftSeverity::Low
        }
    }
}

/// The full table of monitored metrics
pub struct ThresholdTable {
    rows: Vec<ThresholdRow>,
}

impl ThresholdTable {
    pub fn new(rows: Vec<ThresholdRow>) -> Self {
        Self { rows }
    }

    /// Standard thresholds for the decision-support model
    pub fn standard() -> Self {
        Self::new(vec![
            ThresholdRow {
                metric: "calibration_error".to_string(),
                signal_type: DriftSignalType::ConfidenceCalibration,
                direction: DriftDirection::IncreaseIsBad,
                critical: 0.15,
                high: 0.08,
                medium: 0.04,
            },
            ThresholdRow {
                metric: "accuracy".to_string(),
                signal_type: DriftSignalType::OutcomeShift,
                direction: DriftDirection::DecreaseIsBad,
                critical: 0.20,
                high: 0.10,
                medium: 0.05,
            },
            ThresholdRow {
                metric: "automation_false_positive_rate".to_string(),
                signal_type: DriftSignalType::AutomationRisk,
                direction: DriftDirection::IncreaseIsBad,
                critical: 0.12,
                high: 0.06,
                medium: 0.03,
            },
            ThresholdRow {
                metric: "population_stability_index".to_string(),
                signal_type: DriftSignalType::FeatureDistribution,
                direction: DriftDirection::IncreaseIsBad,
                critical: 0.25,
                high: 0.10,
                medium: 0.05,
            },
        ])
    }

    pub fn rows(&self) -> &[ThresholdRow] {
        &self.rows
    }

    pub fn row(&self, metric: &str) -> Option<&ThresholdRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }
}
