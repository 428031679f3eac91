//! User profile model mirroring the `profiles` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys starting with this marker live only in memory and are never written back.
pub const MEMORY_ONLY_PREFIX: char = '_';

/// Columns of `profiles` the client is allowed to write.
pub const PERSISTED_FIELDS: &[&str] = &["full_name", "bio", "updated_at"];

/// Name used when neither metadata nor email yields one.
pub const PLACEHOLDER_NAME: &str = "EcoNexus User";

/// Per-user preference toggles. There is no backing column for these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_true")]
    pub data_sharing: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: true,
            dark_mode: false,
            data_sharing: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Memory-only; present on synthesized or locally edited profiles.
    #[serde(
        rename = "_preferences",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preferences: Option<Preferences>,
}

impl Profile {
    /// Whether this profile carries any memory-only field.
    pub fn has_memory_only_fields(&self) -> bool {
        self.preferences.is_some()
    }

    /// Effective preferences, defaulted when none are held.
    pub fn preferences_or_default(&self) -> Preferences {
        self.preferences.unwrap_or_default()
    }

    /// Apply an edit in memory.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.full_name {
            self.full_name = Some(name.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(prefs) = update.preferences {
            self.preferences = Some(prefs);
        }
    }

    /// Payload for the remote write: persisted columns only.
    pub fn remote_payload(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let Value::Object(all) = serde_json::to_value(self)? else {
            return Ok(Map::new());
        };
        Ok(strip_memory_only(all))
    }
}

/// Keep only persisted columns and drop anything carrying the memory-only marker.
pub fn strip_memory_only(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(key, _)| !key.starts_with(MEMORY_ONLY_PREFIX))
        .filter(|(key, _)| PERSISTED_FIELDS.contains(&key.as_str()))
        .collect()
}

/// Edit submitted from the profile screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(rename = "_preferences", default)]
    pub preferences: Option<Preferences>,
}
