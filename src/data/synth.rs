//! Synthesis of substitute records for when the backend cannot provide them.
//!
//! All generators take the clock reading and the random source as
//! arguments so callers (and tests) control both.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::client::User;
use crate::models::{
    Alert, AlertSeverity, EnergyReading, EnergySource, Preferences, Profile, DEFAULT_UNIT,
};

/// Inclusive range of synthesized reading values, in kWh.
pub const READING_MIN: f64 = 20.0;
pub const READING_MAX: f64 = 120.0;

/// Upper bound on points or alerts a single call synthesizes.
pub const MAX_SYNTHESIZED: usize = 1_000;

/// Gap between consecutive synthesized alerts.
pub const ALERT_SPACING_HOURS: i64 = 4;

/// Centre of the area synthesized geographic alerts are scattered around.
const ALERT_AREA_CENTER: (f64, f64) = (37.7749, -122.4194);
const ALERT_AREA_SPREAD: f64 = 0.5;

struct AlertKind {
    alert_type: &'static str,
    title: &'static str,
    messages: &'static [&'static str],
    geographic: bool,
}

const ALERT_KINDS: &[AlertKind] = &[
    AlertKind {
        alert_type: "deforestation",
        title: "Deforestation Detected",
        messages: &[
            "Satellite imagery shows canopy loss in a monitored region.",
            "Unusual clearing activity detected near a protected area.",
        ],
        geographic: true,
    },
    AlertKind {
        alert_type: "energy",
        title: "Energy Usage Spike",
        messages: &[
            "Consumption is 30% above your weekly average.",
            "Standby power draw increased overnight.",
        ],
        geographic: false,
    },
    AlertKind {
        alert_type: "disaster",
        title: "Disaster Warning",
        messages: &[
            "Flood risk rising after heavy rainfall upstream.",
            "Wildfire reported within 50 km of your area.",
        ],
        geographic: true,
    },
    AlertKind {
        alert_type: "air_quality",
        title: "Air Quality Alert",
        messages: &[
            "PM2.5 levels exceed the recommended limit.",
            "Ozone concentration is elevated this afternoon.",
        ],
        geographic: true,
    },
];

const ALERT_SOURCES: &[&str] = &[
    "Satellite Imagery",
    "Smart Grid Monitor",
    "Drone Recon",
    "Community Report",
    "Sensor Network",
];

const GENERIC_MESSAGE: &str = "Automated monitoring flagged activity for review.";

/// In-memory profile for a user without a stored record.
pub fn profile_for(user: &User, now: DateTime<Utc>) -> Profile {
    Profile {
        id: user.id.clone(),
        full_name: Some(user.display_name()),
        bio: Some(String::new()),
        username: None,
        avatar_url: None,
        updated_at: Some(now),
        preferences: Some(Preferences::default()),
    }
}

/// `limit` points spaced `step` apart going back from `now`, one reading per source each.
///
/// Rows come newest first, sources in their fixed order within a point.
/// `limit` is capped at [`MAX_SYNTHESIZED`].
pub fn energy_readings<R: Rng>(
    rng: &mut R,
    now: DateTime<Utc>,
    step: Duration,
    limit: usize,
) -> Vec<EnergyReading> {
    let limit = limit.min(MAX_SYNTHESIZED);
    let mut readings = Vec::with_capacity(limit * EnergySource::ALL.len());
    for i in 0..limit as i64 {
        let Some(timestamp) = Duration::try_seconds(step.num_seconds().saturating_mul(i))
            .and_then(|offset| now.checked_sub_signed(offset))
        else {
            break;
        };
        for source in EnergySource::ALL {
            let raw: f64 = rng.gen_range(READING_MIN..=READING_MAX);
            readings.push(EnergyReading {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp,
                reading_type: source,
                reading_value: (raw * 10.0).round() / 10.0,
                unit: DEFAULT_UNIT.to_string(),
            });
        }
    }
    readings
}

/// `limit` alerts four hours apart going back from `now`, newest first.
///
/// With `only_type` set, every alert has that type. `limit` is capped at
/// [`MAX_SYNTHESIZED`].
pub fn alerts<R: Rng>(
    rng: &mut R,
    now: DateTime<Utc>,
    limit: usize,
    only_type: Option<&str>,
) -> Vec<Alert> {
    (0..limit.min(MAX_SYNTHESIZED) as i64)
        .map(|i| {
            let created_at = now - Duration::hours(ALERT_SPACING_HOURS * i);
            let kind = match only_type {
                Some(t) => ALERT_KINDS.iter().find(|k| k.alert_type == t),
                None => ALERT_KINDS.choose(rng),
            };
            let (alert_type, title, message, geographic) = match kind {
                Some(kind) => (
                    kind.alert_type.to_string(),
                    kind.title.to_string(),
                    kind.messages.choose(rng).copied().unwrap_or(GENERIC_MESSAGE),
                    kind.geographic,
                ),
                None => {
                    let t = only_type.unwrap_or("general");
                    (t.to_string(), title_case(t), GENERIC_MESSAGE, false)
                }
            };

            let (latitude, longitude) = if geographic {
                (
                    Some(ALERT_AREA_CENTER.0 + rng.gen_range(-ALERT_AREA_SPREAD..=ALERT_AREA_SPREAD)),
                    Some(ALERT_AREA_CENTER.1 + rng.gen_range(-ALERT_AREA_SPREAD..=ALERT_AREA_SPREAD)),
                )
            } else {
                (None, None)
            };

            Alert {
                id: uuid::Uuid::new_v4().to_string(),
                created_at,
                title,
                message: message.to_string(),
                alert_type,
                severity: AlertSeverity::ALL.choose(rng).copied(),
                source: ALERT_SOURCES.choose(rng).map(|s| s.to_string()),
                is_read: false,
                latitude,
                longitude,
            }
        })
        .collect()
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
