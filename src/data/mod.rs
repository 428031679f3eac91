//! Data-access helpers.
//!
//! Each helper reads or writes one remote resource and never fails loudly:
//! remote errors are logged and folded into a [`Fetched`] value. When a read
//! fails, the [`FallbackPolicy`] decides between handing back synthesized
//! substitute data and reporting the failure.

mod alerts;
mod energy;
mod field;
mod profile;
pub mod synth;
mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use energy::{summarize_energy, EnergySummary, SourceTotal};
pub use field::{forest_energy_impact, POST_FEED_COLUMNS};
pub use watch::{watch_resource, ResourceWatch};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{DataSource, Query};
use crate::errors::AppError;

/// Remote resource names.
pub mod resources {
    pub const PROFILES: &str = "profiles";
    pub const ENERGY_READINGS: &str = "energy_readings";
    pub const ALERTS: &str = "alerts";
    pub const DISASTER_ZONES: &str = "disaster_zones";
    pub const FOREST_DATA: &str = "forest_data";
    pub const DRONE_SCANS: &str = "drone_scans";
    pub const POSTS: &str = "posts";
    pub const LIKES: &str = "likes";
}

/// Outcome of a helper call, tagged with where the data came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// Returned (or accepted) by the backend
    Real(T),
    /// Made up locally because the backend could not provide it
    Synthesized(T),
    /// No data; only produced under [`FallbackPolicy::Strict`] or for writes
    Failed(AppError),
}

/// Provenance tag without the payload, for serialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Real,
    Synthesized,
    Failed,
}

impl<T> Fetched<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Fetched::Real(data) | Fetched::Synthesized(data) => Some(data),
            Fetched::Failed(_) => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Fetched::Real(data) | Fetched::Synthesized(data) => Some(data),
            Fetched::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            Fetched::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Fetched::Real(_))
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, Fetched::Synthesized(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Fetched::Failed(_))
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Fetched::Real(_) => Provenance::Real,
            Fetched::Synthesized(_) => Provenance::Synthesized,
            Fetched::Failed(_) => Provenance::Failed,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Real(data) => Fetched::Real(f(data)),
            Fetched::Synthesized(data) => Fetched::Synthesized(f(data)),
            Fetched::Failed(err) => Fetched::Failed(err),
        }
    }
}

impl<T: Default> Fetched<T> {
    /// Payload, or an empty value when the call failed.
    pub fn data_or_default(self) -> T {
        self.into_data().unwrap_or_default()
    }
}

/// What to do when a read fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Substitute plausible local data so views always have something to show
    #[default]
    Synthesize,
    /// Report the failure as [`Fetched::Failed`]
    Strict,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::Synthesize => "synthesize",
            FallbackPolicy::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "synthesize" => Some(FallbackPolicy::Synthesize),
            "strict" => Some(FallbackPolicy::Strict),
            _ => None,
        }
    }
}

/// Resource-specific helpers over a shared [`DataSource`].
#[derive(Clone)]
pub struct DataService {
    source: Arc<dyn DataSource>,
    policy: FallbackPolicy,
}

impl DataService {
    pub fn new(source: Arc<dyn DataSource>, policy: FallbackPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Fold a failed read into the policy's fallback.
    fn fallback<T>(&self, context: &str, error: AppError, synthesize: impl FnOnce() -> T) -> Fetched<T> {
        match self.policy {
            FallbackPolicy::Synthesize => {
                tracing::warn!("Using synthesized {}: {}", context, error);
                Fetched::Synthesized(synthesize())
            }
            FallbackPolicy::Strict => {
                tracing::error!("Error fetching {}: {}", context, error);
                Fetched::Failed(error)
            }
        }
    }

    /// Fold a failed write: keep the local value unless the policy is strict.
    fn write_fallback<T>(&self, context: &str, error: AppError, local: T) -> Fetched<T> {
        tracing::warn!("Error writing {}: {}", context, error);
        match self.policy {
            FallbackPolicy::Synthesize => Fetched::Synthesized(local),
            FallbackPolicy::Strict => Fetched::Failed(error),
        }
    }

    /// Read and decode rows, synthesizing on failure.
    async fn fetch_rows_or<T: DeserializeOwned>(
        &self,
        context: &str,
        query: Query,
        synthesize: impl FnOnce() -> Vec<T>,
    ) -> Fetched<Vec<T>> {
        match self.source.select(&query).await.and_then(decode_rows) {
            Ok(rows) => Fetched::Real(rows),
            Err(e) => self.fallback(context, e, synthesize),
        }
    }

    /// Insert one row and decode what the backend stored.
    async fn insert_one<T: DeserializeOwned>(&self, resource: &str, row: Value) -> Fetched<T> {
        let result = self
            .source
            .insert(resource, row)
            .await
            .and_then(decode_rows::<T>)
            .and_then(|rows| {
                rows.into_iter()
                    .next()
                    .ok_or_else(|| AppError::Internal(format!("Insert into {} returned no row", resource)))
            });

        match result {
            Ok(stored) => Fetched::Real(stored),
            Err(e) => {
                tracing::error!("Error inserting into {}: {}", resource, e);
                Fetched::Failed(e)
            }
        }
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AppError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(AppError::from))
        .collect()
}
