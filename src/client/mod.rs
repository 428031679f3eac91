//! Backend client wrapper.
//!
//! One shared handle configured with the backend URL and public key. It
//! speaks PostgREST for resources, GoTrue for auth (see [`auth`]) and the
//! Phoenix realtime protocol for change notifications (see [`realtime`]).

pub mod auth;
pub mod query;
pub mod realtime;

pub use auth::{AuthApi, AuthChange, AuthEvent, Session, SignUpOutcome, User, SESSION_KEY};
pub use query::{Filter, FilterOp, Order, Query};
pub use realtime::{ChangeEvent, ChangeKind, Subscription};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::config::Config;
use crate::errors::AppError;
use crate::storage::KeyValueStore;

/// Generic row access on named remote resources.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Read rows matching the query.
    async fn select(&self, query: &Query) -> Result<Vec<Value>, AppError>;

    /// Insert one row or an array of rows; returns what was stored.
    async fn insert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError>;

    /// Patch every row matching the filters; returns the updated rows.
    async fn update(
        &self,
        resource: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError>;

    /// Insert, merging into existing rows on primary key conflict.
    async fn upsert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError>;

    /// Remove every row matching the filters; returns the removed rows.
    async fn delete(&self, resource: &str, filters: &[Filter]) -> Result<Vec<Value>, AppError>;
}

/// Source of insert/update/delete notifications for a resource.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, resource: &str) -> Result<Subscription, AppError>;
}

/// Behaviour switches for the client handle.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Refresh the access token in the background before it expires
    pub auto_refresh_token: bool,
    /// Keep the session in the key-value store across restarts
    pub persist_session: bool,
    /// Per-request timeout; none by default
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            request_timeout: None,
        }
    }
}

/// Shared handle to the hosted backend.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    store: Arc<dyn KeyValueStore>,
    options: ClientOptions,
    session: RwLock<Option<Session>>,
    auth_events: broadcast::Sender<AuthChange>,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        store: Arc<dyn KeyValueStore>,
        options: ClientOptions,
    ) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let (auth_events, _) = broadcast::channel(16);

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            store,
            options,
            session: RwLock::new(None),
            auth_events,
        })
    }

    /// Build the client from loaded configuration with default options.
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self, AppError> {
        Self::new(
            &config.backend_url,
            &config.anon_key,
            store,
            ClientOptions::default(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Bearer token for the next request: the user's if signed in, else the anon key.
    async fn bearer_token(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn rest_request(&self, method: Method, resource: &str) -> RequestBuilder {
        let token = self.bearer_token().await;
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, resource))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    /// Send a REST request and decode the row array it returns.
    async fn execute_rows(&self, request: RequestBuilder) -> Result<Vec<Value>, AppError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::from_response(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }

    /// Check that the backend answers within `timeout`.
    pub async fn probe(&self, timeout: Duration) -> Result<(), AppError> {
        let query = Query::from("profiles").select("id").limit(1);
        match tokio::time::timeout(timeout, self.select(&query)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::Network(format!(
                "network probe timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl DataSource for BackendClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, AppError> {
        let request = self
            .rest_request(Method::GET, query.resource())
            .await
            .query(&query.to_params());
        self.execute_rows(request).await
    }

    async fn insert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError> {
        let request = self
            .rest_request(Method::POST, resource)
            .await
            .header("Prefer", "return=representation")
            .json(&rows);
        self.execute_rows(request).await
    }

    async fn update(
        &self,
        resource: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        let request = self
            .rest_request(Method::PATCH, resource)
            .await
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&patch);
        self.execute_rows(request).await
    }

    async fn upsert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError> {
        let request = self
            .rest_request(Method::POST, resource)
            .await
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows);
        self.execute_rows(request).await
    }

    async fn delete(&self, resource: &str, filters: &[Filter]) -> Result<Vec<Value>, AppError> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        let request = self
            .rest_request(Method::DELETE, resource)
            .await
            .query(&params)
            .header("Prefer", "return=representation");
        self.execute_rows(request).await
    }
}

#[async_trait]
impl ChangeFeed for BackendClient {
    async fn subscribe(&self, resource: &str) -> Result<Subscription, AppError> {
        let url = realtime::websocket_url(&self.base_url, &self.anon_key);
        let token = self.bearer_token().await;
        realtime::connect(&url, resource, &token).await
    }
}
