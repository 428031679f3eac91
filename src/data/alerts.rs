//! Alert helpers.

use chrono::Utc;
use serde_json::json;

use super::resources::ALERTS;
use super::{synth, DataService, Fetched};
use crate::client::{Filter, Query};
use crate::models::Alert;

impl DataService {
    /// Latest alerts, newest first.
    pub async fn fetch_alerts(&self, limit: usize) -> Fetched<Vec<Alert>> {
        let now = Utc::now();
        let query = Query::from(ALERTS).order("created_at", false).limit(limit);

        self.fetch_rows_or("alerts", query, || {
            synth::alerts(&mut rand::thread_rng(), now, limit, None)
        })
        .await
    }

    /// Latest alerts of one type, newest first.
    pub async fn fetch_alerts_of_type(&self, alert_type: &str, limit: usize) -> Fetched<Vec<Alert>> {
        let now = Utc::now();
        let query = Query::from(ALERTS)
            .eq("alert_type", alert_type)
            .order("created_at", false)
            .limit(limit);

        self.fetch_rows_or("alerts", query, || {
            synth::alerts(&mut rand::thread_rng(), now, limit, Some(alert_type))
        })
        .await
    }

    /// Flag an alert as read. The returned alert always has `is_read` set
    /// unless the policy is strict and the write failed.
    pub async fn mark_alert_read(&self, alert: &Alert) -> Fetched<Alert> {
        let mut read = alert.clone();
        read.is_read = true;

        match self
            .source
            .update(ALERTS, &[Filter::eq("id", &alert.id)], json!({ "is_read": true }))
            .await
        {
            Ok(_) => {
                tracing::debug!(alert_id = %alert.id, "Alert marked as read");
                Fetched::Real(read)
            }
            Err(e) => self.write_fallback("alert", e, read),
        }
    }
}
