//! Field data shown on the map, forest and drone screens, plus community posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An active disaster area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisasterZone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub intensity: f64,
    pub disaster_type: String,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub timestamp: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Health metrics for a monitored forest region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestRegion {
    pub id: String,
    pub region_name: String,
    /// Health score in percent (0-100)
    pub health: f64,
    /// Yearly CO2 absorption in tonnes
    pub co2_absorption: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of a drone reconnaissance flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroneScan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub location_name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    pub scan_type: String,
    #[serde(default)]
    pub findings: Option<String>,
}

/// Request body for submitting a drone scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDroneScan {
    pub location_name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    pub scan_type: String,
    #[serde(default)]
    pub findings: Option<String>,
}

/// Public face of a post or comment author, embedded from `profiles`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Author {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub content: String,
    #[serde(rename = "profiles", default)]
    pub author: Option<Author>,
}

/// A community post.
///
/// `author` and `comments` are only filled when the read embeds them;
/// `liked` is per viewer and never stored on the post row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "profiles", default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub liked: bool,
}

/// Row written when creating a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPost {
    pub content: String,
    pub user_id: String,
}
