//! Chart and map payloads built from fetched records.
//!
//! Shapes follow what the mobile chart and map components consume, so a
//! screen can hand them over unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Alert, AlertSeverity, DisasterZone, EnergyReading, EnergySource, ForestRegion, Period};

/// Centre used when there is nothing to place on the map.
pub const DEFAULT_MAP_CENTER: (f64, f64) = (37.7749, -122.4194);

const FOREST_HEALTH_COLOR: &str = "#22C55E";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub color: String,
    pub data: Vec<f64>,
}

fn bucket_of(timestamp: DateTime<Utc>, period: Period) -> DateTime<Utc> {
    let width = match period {
        Period::Day => Duration::hours(1),
        Period::Week | Period::Month => Duration::days(1),
    };
    timestamp.duration_trunc(width).unwrap_or(timestamp)
}

fn bucket_label(bucket: DateTime<Utc>, period: Period) -> String {
    let format = match period {
        Period::Day => "%-I%P",
        Period::Week => "%a",
        Period::Month => "%b %-d",
    };
    bucket.format(format).to_string()
}

/// Per-source totals over time, oldest bucket first.
///
/// Buckets are hours for a day and calendar days otherwise. Only sources
/// that appear in `readings` get a dataset.
pub fn energy_chart(readings: &[EnergyReading], period: Period) -> ChartData {
    let mut buckets: BTreeMap<DateTime<Utc>, BTreeMap<EnergySource, f64>> = BTreeMap::new();
    for reading in readings {
        *buckets
            .entry(bucket_of(reading.timestamp, period))
            .or_default()
            .entry(reading.reading_type)
            .or_default() += reading.reading_value;
    }

    let labels = buckets.keys().map(|b| bucket_label(*b, period)).collect();
    let datasets = EnergySource::ALL
        .iter()
        .filter(|source| readings.iter().any(|r| r.reading_type == **source))
        .map(|source| Dataset {
            label: source.display_name().to_string(),
            color: source.color().to_string(),
            data: buckets
                .values()
                .map(|totals| totals.get(source).copied().unwrap_or(0.0))
                .collect(),
        })
        .collect();

    ChartData { labels, datasets }
}

/// Health score per region, labelled with the first three letters of its name.
pub fn forest_health_chart(regions: &[ForestRegion]) -> ChartData {
    ChartData {
        labels: regions
            .iter()
            .map(|r| r.region_name.chars().take(3).collect())
            .collect(),
        datasets: vec![Dataset {
            label: "Health".to_string(),
            color: FOREST_HEALTH_COLOR.to_string(),
            data: regions.iter().map(|r| r.health).collect(),
        }],
    }
}

/// A point on the map. Intensity is on a 0-10 scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapMarker {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub intensity: f64,
    pub kind: String,
    #[serde(default)]
    pub radius_meters: Option<f64>,
}

pub fn disaster_markers(zones: &[DisasterZone]) -> Vec<MapMarker> {
    zones
        .iter()
        .map(|zone| MapMarker {
            id: zone.id.clone(),
            label: zone.name.clone(),
            description: zone.description.clone(),
            lat: zone.lat,
            lng: zone.lng,
            intensity: zone.intensity,
            kind: zone.disaster_type.clone(),
            radius_meters: zone.radius_meters,
        })
        .collect()
}

fn severity_intensity(severity: Option<AlertSeverity>) -> f64 {
    match severity {
        Some(AlertSeverity::Low) => 3.0,
        Some(AlertSeverity::Medium) => 6.0,
        Some(AlertSeverity::High) => 9.0,
        None => 5.0,
    }
}

/// Markers for the alerts that carry coordinates.
pub fn alert_markers(alerts: &[Alert]) -> Vec<MapMarker> {
    alerts
        .iter()
        .filter_map(|alert| {
            let (lat, lng) = alert.position()?;
            Some(MapMarker {
                id: alert.id.clone(),
                label: alert.title.clone(),
                description: Some(alert.message.clone()),
                lat,
                lng,
                intensity: severity_intensity(alert.severity),
                kind: alert.alert_type.clone(),
                radius_meters: None,
            })
        })
        .collect()
}

/// Mean position of the markers, or [`DEFAULT_MAP_CENTER`] when there are none.
pub fn map_center(markers: &[MapMarker]) -> (f64, f64) {
    if markers.is_empty() {
        return DEFAULT_MAP_CENTER;
    }
    let n = markers.len() as f64;
    let (lat, lng) = markers
        .iter()
        .fold((0.0, 0.0), |(lat, lng), m| (lat + m.lat, lng + m.lng));
    (lat / n, lng / n)
}
