//! Pending-percentage to priority mapping.

use crate::features::reminders::model::Priority;
use serde::{Deserialize, Serialize};

/// Lower bounds (inclusive, in percent) for each tier above `Low`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        PriorityThresholds {
            critical: 80.0,
            high: 50.0,
            medium: 25.0,
        }
    }
}

/// Percentage of the ordered quantity still pending. A non-positive order counts as 1 unit.
pub fn pending_percentage(pending_qty: f64, ordered_qty: f64) -> f64 {
    let ordered = if ordered_qty > 0.0 { ordered_qty } else { 1.0 };
    (pending_qty / ordered) * 100.0
}

pub fn classify(pending_qty: f64, ordered_qty: f64, thresholds: &PriorityThresholds) -> Priority {
    let percent = pending_percentage(pending_qty, ordered_qty);
    if percent >= thresholds.critical {
        Priority::Critical
    } else if percent >= thresholds.high {
        Priority::High
    } else if percent >= thresholds.medium {
        Priority::Medium
    } else {
        Priority::Low
    }
}
