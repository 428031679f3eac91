//! Session handling against the backend's auth endpoints.
//!
//! Sessions are held in memory, mirrored to the key-value store under
//! [`SESSION_KEY`] and announced to listeners as [`AuthChange`] events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::BackendClient;
use crate::errors::AppError;
use crate::models::PLACEHOLDER_NAME;

/// Store key holding the serialized session.
pub const SESSION_KEY: &str = "supabase.auth.token";

const REFRESH_TICK: Duration = Duration::from_secs(30);
/// Refresh once the token has less than this many seconds left.
const REFRESH_MARGIN_SECS: i64 = 90;

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl User {
    /// Name stored in the sign-up metadata, if any.
    pub fn metadata_name(&self) -> Option<&str> {
        ["full_name", "name"]
            .iter()
            .find_map(|key| {
                self.user_metadata
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
            })
    }

    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(email_local_part)
            .filter(|part| !part.is_empty())
    }

    /// Best available name: metadata, then email local-part, then a placeholder.
    pub fn display_name(&self) -> String {
        self.metadata_name()
            .or_else(|| self.email_local_part())
            .unwrap_or(PLACEHOLDER_NAME)
            .to_string()
    }
}

/// Part of an address before the `@`.
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

/// Token pair plus the user it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    fn with_expiry(mut self) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(Utc::now().timestamp() + self.expires_in);
        }
        self
    }

    pub fn expires_within(&self, now: i64, seconds: i64) -> bool {
        self.expires_at
            .map(|at| at - now <= seconds)
            .unwrap_or(false)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_within(now, 0)
    }
}

/// Kind of session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Notification sent to auth listeners.
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// What sign-up returned. Without email confirmation there is no session yet.
#[derive(Debug, Clone, Default)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Auth surface of the backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Current session, restoring and refreshing a persisted one if needed.
    async fn get_session(&self) -> Result<Option<Session>, AppError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AppError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUpOutcome, AppError>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str)
        -> Result<(), AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    async fn refresh_session(&self) -> Result<Session, AppError>;

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange>;
}

impl BackendClient {
    async fn auth_request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.bearer_token().await;
        self.http
            .request(method, format!("{}/auth/v1/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn execute_auth(&self, request: RequestBuilder) -> Result<Value, AppError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::from_response(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn save_session(&self, session: Session) -> Session {
        let session = session.with_expiry();
        *self.session.write().await = Some(session.clone());

        if self.options.persist_session {
            match serde_json::to_string(&session) {
                Ok(json) => {
                    if let Err(e) = self.store.set_item(SESSION_KEY, &json).await {
                        tracing::warn!("Failed to persist session: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize session: {}", e),
            }
        }
        session
    }

    async fn clear_session(&self) {
        *self.session.write().await = None;
        if let Err(e) = self.store.remove_item(SESSION_KEY).await {
            tracing::warn!("Failed to remove persisted session: {}", e);
        }
    }

    fn emit(&self, event: AuthEvent, session: Option<Session>) {
        // No receivers is fine.
        let _ = self.auth_events.send(AuthChange { event, session });
    }

    async fn restore_session(&self) -> Option<Session> {
        if !self.options.persist_session {
            return None;
        }
        let raw = match self.store.get_item(SESSION_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read persisted session: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted session: {}", e);
                self.clear_session().await;
                None
            }
        }
    }

    /// Spawn the background token refresher.
    ///
    /// Holds only a weak reference, so it ends once the client is dropped.
    pub fn start_auto_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.options.auto_refresh_token {
            return None;
        }
        let weak = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_TICK);
            loop {
                ticker.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                client.refresh_if_due().await;
            }
        }))
    }

    async fn refresh_if_due(&self) {
        let now = Utc::now().timestamp();
        let due = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.expires_within(now, REFRESH_MARGIN_SECS))
            .unwrap_or(false);

        if due {
            if let Err(e) = self.refresh_session().await {
                tracing::warn!("Automatic token refresh failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl AuthApi for BackendClient {
    async fn get_session(&self) -> Result<Option<Session>, AppError> {
        let current = self.session.read().await.clone();
        let (session, restored) = match current {
            Some(session) => (session, false),
            None => match self.restore_session().await {
                Some(session) => {
                    *self.session.write().await = Some(session.clone());
                    (session, true)
                }
                None => return Ok(None),
            },
        };

        let session = if session.is_expired(Utc::now().timestamp()) {
            match self.refresh_session().await {
                Ok(fresh) => fresh,
                // Offline start: keep the stale session, the refresher retries later.
                Err(e) if e.is_network_failure() => {
                    tracing::warn!("Could not refresh expired session: {}", e);
                    session
                }
                Err(e) => {
                    tracing::warn!("Expired session rejected: {}", e);
                    self.clear_session().await;
                    self.emit(AuthEvent::SignedOut, None);
                    return Ok(None);
                }
            }
        } else {
            session
        };

        if restored {
            self.emit(AuthEvent::InitialSession, Some(session.clone()));
        }
        Ok(Some(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let request = self
            .auth_request(Method::POST, "token")
            .await
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        let session: Session = serde_json::from_value(self.execute_auth(request).await?)?;
        let session = self.save_session(session).await;
        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUpOutcome, AppError> {
        let request = self
            .auth_request(Method::POST, "signup")
            .await
            .json(&json!({ "email": email, "password": password, "data": metadata }));

        let body = self.execute_auth(request).await?;

        // Auto-confirmed projects answer with a session, others with the bare user.
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            let session = self.save_session(session).await;
            self.emit(AuthEvent::SignedIn, Some(session.clone()));
            return Ok(SignUpOutcome {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user = if user_value.get("id").is_some() {
            Some(serde_json::from_value::<User>(user_value)?)
        } else {
            None
        };
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AppError> {
        let request = self
            .auth_request(Method::POST, "recover")
            .await
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        self.execute_auth(request).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let signed_in = self.session.read().await.is_some();
        if signed_in {
            let request = self.auth_request(Method::POST, "logout").await;
            if let Err(e) = self.execute_auth(request).await {
                // The local session goes regardless.
                tracing::warn!("Remote sign out failed: {}", e);
            }
        }
        self.clear_session().await;
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, AppError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or_else(|| AppError::Unauthorized("No session to refresh".to_string()))?;

        let request = self
            .auth_request(Method::POST, "token")
            .await
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));

        let session: Session = serde_json::from_value(self.execute_auth(request).await?)?;
        let session = self.save_session(session).await;
        self.emit(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_events.subscribe()
    }
}
