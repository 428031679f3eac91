//! Profile read/write helpers.

use chrono::Utc;
use serde_json::{Map, Value};

use super::resources::PROFILES;
use super::{decode_rows, synth, DataService, Fetched};
use crate::client::{Filter, Query, User};
use crate::errors::AppError;
use crate::models::{Preferences, Profile, ProfileUpdate};

impl DataService {
    /// Load the user's profile, synthesizing one when none is stored.
    pub async fn fetch_profile(&self, user: &User) -> Fetched<Profile> {
        let query = Query::from(PROFILES).eq("id", &user.id).limit(1);

        match self.source.select(&query).await.and_then(decode_rows::<Profile>) {
            Ok(rows) => match rows.into_iter().next() {
                Some(profile) => Fetched::Real(profile),
                None => self.fallback(
                    "profile",
                    AppError::NotFound(format!("No profile stored for user {}", user.id)),
                    || synth::profile_for(user, Utc::now()),
                ),
            },
            Err(e) => self.fallback("profile", e, || synth::profile_for(user, Utc::now())),
        }
    }

    /// Merge `update` into the current profile and persist the safe subset.
    ///
    /// The returned profile is the full merged object, memory-only fields
    /// included; it is `Real` only if the remote write went through.
    pub async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Fetched<Profile> {
        let now = Utc::now();
        let mut profile = self
            .fetch_profile(user)
            .await
            .into_data()
            .unwrap_or_else(|| synth::profile_for(user, now));

        profile.preferences.get_or_insert_with(Preferences::default);
        profile.merge(&update);
        profile.updated_at = Some(now);

        let payload = match profile.remote_payload() {
            Ok(payload) => payload,
            Err(e) => return self.write_fallback("profile", e.into(), profile),
        };

        match self.persist_profile(&user.id, payload).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "Profile updated");
                Fetched::Real(profile)
            }
            Err(e) => self.write_fallback("profile", e, profile),
        }
    }

    async fn persist_profile(&self, id: &str, payload: Map<String, Value>) -> Result<(), AppError> {
        let updated = self
            .source
            .update(PROFILES, &[Filter::eq("id", id)], Value::Object(payload.clone()))
            .await?;

        // No row yet: create it.
        if updated.is_empty() {
            let mut row = payload;
            row.insert("id".to_string(), Value::String(id.to_string()));
            self.source.upsert(PROFILES, Value::Object(row)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::data::testing::FakeSource;
    use crate::data::FallbackPolicy;
    use crate::models::MEMORY_ONLY_PREFIX;

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: Some("jane.doe@example.com".to_string()),
            user_metadata: Default::default(),
        }
    }

    fn service(source: &Arc<FakeSource>, policy: FallbackPolicy) -> DataService {
        DataService::new(source.clone(), policy)
    }

    #[tokio::test]
    async fn test_stored_profile_is_real() {
        let source = Arc::new(FakeSource::new().with_table(
            "profiles",
            vec![json!({"id": "user-1", "full_name": "Jane", "bio": "Hi", "updated_at": null})],
        ));
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .fetch_profile(&user())
            .await;

        assert!(fetched.is_real());
        let profile = fetched.into_data().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Jane"));
        assert!(!profile.has_memory_only_fields());
    }

    #[tokio::test]
    async fn test_missing_row_synthesizes_from_email() {
        let source = Arc::new(FakeSource::new().with_table("profiles", vec![]));
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .fetch_profile(&user())
            .await;

        assert!(fetched.is_synthesized());
        let profile = fetched.into_data().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("jane.doe"));
        assert!(profile.has_memory_only_fields());
    }

    #[tokio::test]
    async fn test_missing_table_synthesizes_same_shape() {
        let source = Arc::new(FakeSource::new());
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .fetch_profile(&user())
            .await;

        assert!(fetched.is_synthesized());
        assert_eq!(fetched.data().unwrap().id, "user-1");
    }

    #[tokio::test]
    async fn test_strict_policy_reports_missing_profile() {
        let source = Arc::new(FakeSource::new());
        let fetched = service(&source, FallbackPolicy::Strict)
            .fetch_profile(&user())
            .await;

        assert!(matches!(fetched, Fetched::Failed(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_never_sends_memory_only_fields() {
        let source = Arc::new(FakeSource::new().with_table(
            "profiles",
            vec![json!({"id": "user-1", "full_name": "Jane", "bio": null})],
        ));
        let prefs = Preferences {
            notifications: false,
            dark_mode: true,
            data_sharing: false,
        };
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .update_profile(
                &user(),
                ProfileUpdate {
                    full_name: Some("Jane Doe".to_string()),
                    bio: Some("Cyclist".to_string()),
                    preferences: Some(prefs),
                },
            )
            .await;

        assert!(fetched.is_real());
        let profile = fetched.into_data().unwrap();
        assert_eq!(profile.preferences, Some(prefs));
        assert_eq!(profile.full_name.as_deref(), Some("Jane Doe"));

        let writes = source.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].op, "update");
        let body = writes[0].body.as_object().unwrap();
        assert!(body.keys().all(|k| !k.starts_with(MEMORY_ONLY_PREFIX)));
        assert_eq!(body["full_name"], "Jane Doe");
        assert_eq!(body["bio"], "Cyclist");
        assert!(body.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn test_update_of_stored_row_keeps_memory_only_fields() {
        let source = Arc::new(FakeSource::new().with_table(
            "profiles",
            vec![json!({"id": "user-1", "full_name": "Jane", "bio": null})],
        ));
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .update_profile(
                &user(),
                ProfileUpdate {
                    bio: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(fetched.is_real());
        let profile = fetched.into_data().unwrap();
        assert_eq!(profile.bio.as_deref(), Some("x"));
        assert_eq!(profile.full_name.as_deref(), Some("Jane"));
        assert!(profile.has_memory_only_fields());
        assert_eq!(profile.preferences, Some(Preferences::default()));
        assert!(source.writes()[0]
            .body
            .as_object()
            .unwrap()
            .keys()
            .all(|k| !k.starts_with(MEMORY_ONLY_PREFIX)));
    }

    #[tokio::test]
    async fn test_update_without_row_upserts_with_id() {
        let source = Arc::new(FakeSource::new().with_table("profiles", vec![]));
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .update_profile(
                &user(),
                ProfileUpdate {
                    bio: Some("New here".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(fetched.is_real());
        let writes = source.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].op, "upsert");
        assert_eq!(writes[1].body["id"], "user-1");
        assert_eq!(writes[1].body["full_name"], "jane.doe");
        assert!(writes[1]
            .body
            .as_object()
            .unwrap()
            .keys()
            .all(|k| !k.starts_with(MEMORY_ONLY_PREFIX)));
        assert_eq!(source.rows("profiles").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_returns_local_merge() {
        let source = Arc::new(FakeSource::new());
        let fetched = service(&source, FallbackPolicy::Synthesize)
            .update_profile(
                &user(),
                ProfileUpdate {
                    full_name: Some("J".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(fetched.is_synthesized());
        let profile = fetched.into_data().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("J"));
        assert!(profile.has_memory_only_fields());
        assert!(source
            .writes()
            .iter()
            .all(|w| w.body.as_object().unwrap().keys().all(|k| !k.starts_with('_'))));
    }
}
