//! Disaster, forest, drone and community helpers.
//!
//! Reads here have no synthesized substitute: on failure they hand back an
//! empty list (or `Failed` under the strict policy).

use std::collections::HashSet;

use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::resources::{DISASTER_ZONES, DRONE_SCANS, FOREST_DATA, LIKES, POSTS};
use super::{decode_rows, DataService, Fetched};
use crate::client::{Filter, Query, User};
use crate::errors::AppError;
use crate::models::{DisasterZone, DroneScan, ForestRegion, NewDroneScan, NewPost, Post};

/// How far back active disaster zones are shown.
const DISASTER_WINDOW_DAYS: i64 = 7;

/// Post columns plus the embedded author and comment threads.
pub const POST_FEED_COLUMNS: &str =
    "*,profiles(username,avatar_url),comments(id,content,profiles(username))";

#[derive(Deserialize)]
struct LikeRow {
    post_id: String,
}

impl DataService {
    /// Active disaster zones reported within the last week.
    pub async fn fetch_disaster_zones(&self) -> Fetched<Vec<DisasterZone>> {
        let since = Utc::now() - Duration::days(DISASTER_WINDOW_DAYS);
        let query = Query::from(DISASTER_ZONES)
            .gte("timestamp", since.to_rfc3339_opts(SecondsFormat::Secs, true))
            .eq("active", true);

        self.fetch_rows_or("disaster zones", query, Vec::new).await
    }

    /// Forest regions by name, optionally narrowed to names containing `filter`.
    pub async fn fetch_forest_regions(&self, filter: Option<&str>) -> Fetched<Vec<ForestRegion>> {
        let mut query = Query::from(FOREST_DATA).order("region_name", true);
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            query = query.ilike("region_name", format!("%{}%", filter));
        }

        self.fetch_rows_or("forest data", query, Vec::new).await
    }

    pub async fn fetch_drone_scans(&self, limit: usize) -> Fetched<Vec<DroneScan>> {
        let query = Query::from(DRONE_SCANS)
            .order("created_at", false)
            .limit(limit);

        self.fetch_rows_or("drone scans", query, Vec::new).await
    }

    pub async fn submit_drone_scan(&self, user: &User, scan: NewDroneScan) -> Fetched<DroneScan> {
        let mut row = match serde_json::to_value(&scan) {
            Ok(row) => row,
            Err(e) => return Fetched::Failed(e.into()),
        };
        if let Some(obj) = row.as_object_mut() {
            obj.insert("user_id".to_string(), Value::String(user.id.clone()));
        }

        self.insert_one(DRONE_SCANS, row).await
    }

    /// Community feed, newest first, with authors and comments embedded.
    pub async fn fetch_posts(&self, limit: usize) -> Fetched<Vec<Post>> {
        let query = Query::from(POSTS)
            .select(POST_FEED_COLUMNS)
            .order("created_at", false)
            .limit(limit);

        self.fetch_rows_or("posts", query, Vec::new).await
    }

    /// [`fetch_posts`](Self::fetch_posts) with `liked` set for `viewer`.
    ///
    /// Without a viewer every post is unliked. A failed likes lookup leaves
    /// the feed as is.
    pub async fn fetch_feed(&self, viewer: Option<&User>, limit: usize) -> Fetched<Vec<Post>> {
        let feed = self.fetch_posts(limit).await;
        let Some(viewer) = viewer else {
            return feed;
        };
        let liked = match self.liked_post_ids(viewer).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(user_id = %viewer.id, "Error fetching likes: {}", e);
                return feed;
            }
        };

        feed.map(|posts| {
            posts
                .into_iter()
                .map(|mut post| {
                    post.liked = liked.contains(&post.id);
                    post
                })
                .collect()
        })
    }

    async fn liked_post_ids(&self, user: &User) -> Result<HashSet<String>, AppError> {
        let query = Query::from(LIKES).select("post_id").eq("user_id", &user.id);
        let rows = self.source.select(&query).await.and_then(decode_rows::<LikeRow>)?;
        Ok(rows.into_iter().map(|row| row.post_id).collect())
    }

    /// Like the post, or remove the like if there already is one.
    ///
    /// Returns whether the post is liked afterwards.
    pub async fn toggle_like(&self, user: &User, post_id: &str) -> Fetched<bool> {
        let filters = [Filter::eq("post_id", post_id), Filter::eq("user_id", &user.id)];
        let query = filters
            .iter()
            .cloned()
            .fold(Query::from(LIKES).select("id"), Query::filter);

        let result = match self.source.select(&query).await {
            Ok(existing) if existing.is_empty() => self
                .source
                .insert(LIKES, json!({ "post_id": post_id, "user_id": user.id }))
                .await
                .map(|_| true),
            Ok(_) => self.source.delete(LIKES, &filters).await.map(|_| false),
            Err(e) => Err(e),
        };

        match result {
            Ok(liked) => {
                tracing::debug!(user_id = %user.id, post_id, liked, "Like toggled");
                Fetched::Real(liked)
            }
            Err(e) => {
                tracing::error!("Error toggling like on post {}: {}", post_id, e);
                Fetched::Failed(e)
            }
        }
    }

    pub async fn create_post(&self, user: &User, content: &str) -> Fetched<Post> {
        let content = content.trim();
        if content.is_empty() {
            return Fetched::Failed(AppError::Validation("Post content cannot be empty".to_string()));
        }

        let row = NewPost {
            content: content.to_string(),
            user_id: user.id.clone(),
        };
        match serde_json::to_value(&row) {
            Ok(row) => self.insert_one(POSTS, row).await,
            Err(e) => Fetched::Failed(e.into()),
        }
    }
}

/// Estimated CO2 absorption across regions, weighted by health.
pub fn forest_energy_impact(regions: &[ForestRegion]) -> f64 {
    regions
        .iter()
        .map(|r| r.health / 100.0 * r.co2_absorption)
        .sum()
}
