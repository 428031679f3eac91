//! Energy reading helpers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::resources::ENERGY_READINGS;
use super::{synth, DataService, Fetched};
use crate::client::Query;
use crate::models::{EnergyReading, EnergySource, Period};

impl DataService {
    /// Readings within the period, newest first, at most `limit` rows.
    ///
    /// On failure, `limit` synthesized points with one reading per source each.
    pub async fn fetch_energy_readings(
        &self,
        period: Period,
        limit: usize,
    ) -> Fetched<Vec<EnergyReading>> {
        let now = Utc::now();
        let start = now - period.lookback();

        let query = Query::from(ENERGY_READINGS)
            .gte("timestamp", start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .lte("timestamp", now.to_rfc3339_opts(SecondsFormat::Secs, true))
            .order("timestamp", false)
            .limit(limit);

        self.fetch_rows_or("energy readings", query, || {
            synth::energy_readings(&mut rand::thread_rng(), now, period.step(), limit)
        })
        .await
    }

    /// Latest readings regardless of age, for the dashboard.
    pub async fn fetch_recent_energy_readings(&self, limit: usize) -> Fetched<Vec<EnergyReading>> {
        let now = Utc::now();
        let query = Query::from(ENERGY_READINGS)
            .order("timestamp", false)
            .limit(limit);

        self.fetch_rows_or("energy readings", query, || {
            synth::energy_readings(&mut rand::thread_rng(), now, Period::Week.step(), limit)
        })
        .await
    }
}

/// Total for one energy source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceTotal {
    pub source: EnergySource,
    pub total: f64,
    /// Share of the grand total in percent
    pub share: f64,
}

/// Aggregate view over a set of readings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnergySummary {
    pub totals: Vec<SourceTotal>,
    pub total: f64,
    /// Mean of the per-timestamp sums
    pub average_per_point: f64,
}

pub fn summarize_energy(readings: &[EnergyReading]) -> EnergySummary {
    if readings.is_empty() {
        return EnergySummary::default();
    }

    let mut per_source: BTreeMap<EnergySource, f64> = BTreeMap::new();
    let mut points = BTreeSet::new();
    for reading in readings {
        *per_source.entry(reading.reading_type).or_default() += reading.reading_value;
        points.insert(reading.timestamp);
    }

    let total: f64 = per_source.values().sum();
    let totals = per_source
        .into_iter()
        .map(|(source, sum)| SourceTotal {
            source,
            total: sum,
            share: if total > 0.0 { sum / total * 100.0 } else { 0.0 },
        })
        .collect();

    EnergySummary {
        totals,
        total,
        average_per_point: total / points.len() as f64,
    }
}
