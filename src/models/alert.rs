//! Alert model mirroring the `alerts` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 3] = [AlertSeverity::Low, AlertSeverity::Medium, AlertSeverity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        }
    }
}

/// An environmental alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default, alias = "description")]
    pub message: String,
    pub alert_type: String,
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Alert {
    /// Coordinates, if the alert is tied to a place.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}
