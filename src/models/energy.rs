//! Energy reading model mirroring the `energy_readings` table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kind of energy source a reading belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EnergySource {
    Solar,
    Wind,
    Hydro,
    Biomass,
    Geothermal,
}

impl EnergySource {
    /// Every source, in display order.
    pub const ALL: [EnergySource; 5] = [
        EnergySource::Solar,
        EnergySource::Wind,
        EnergySource::Hydro,
        EnergySource::Biomass,
        EnergySource::Geothermal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergySource::Solar => "solar",
            EnergySource::Wind => "wind",
            EnergySource::Hydro => "hydro",
            EnergySource::Biomass => "biomass",
            EnergySource::Geothermal => "geothermal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "solar" => Some(EnergySource::Solar),
            "wind" => Some(EnergySource::Wind),
            "hydro" => Some(EnergySource::Hydro),
            "biomass" => Some(EnergySource::Biomass),
            "geothermal" => Some(EnergySource::Geothermal),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EnergySource::Solar => "Solar",
            EnergySource::Wind => "Wind",
            EnergySource::Hydro => "Hydro",
            EnergySource::Biomass => "Biomass",
            EnergySource::Geothermal => "Geothermal",
        }
    }

    /// Chart colour for this source.
    pub fn color(&self) -> &'static str {
        match self {
            EnergySource::Solar => "#F59E0B",
            EnergySource::Wind => "#3B82F6",
            EnergySource::Hydro => "#06B6D4",
            EnergySource::Biomass => "#10B981",
            EnergySource::Geothermal => "#EF4444",
        }
    }
}

/// A single metered value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyReading {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub reading_type: EnergySource,
    pub reading_value: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

pub const DEFAULT_UNIT: &str = "kWh";

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

/// Time window a chart covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    #[default]
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Period::Day),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            _ => None,
        }
    }

    /// How far back from now a query for this period reaches.
    pub fn lookback(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
        }
    }

    /// Spacing between consecutive points on a chart of this period.
    pub fn step(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(4),
            Period::Week => Duration::days(1),
            Period::Month => Duration::days(7),
        }
    }
}
