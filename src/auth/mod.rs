//! Application-wide authentication state.
//!
//! [`AuthService`] owns the signed-in user and session, publishes every
//! transition on a watch channel and wraps the backend's auth calls so that
//! callers get a plain `Result` with a message fit to show.

use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::client::auth::email_local_part;
use crate::client::{AuthApi, AuthChange, DataSource, Session, User, SESSION_KEY};
use crate::data::resources::PROFILES;
use crate::errors::AppError;
use crate::storage::KeyValueStore;

/// Where the user stands with the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Initial session lookup has not finished
    Loading,
    Authenticated { user: User, session: Session },
    Unauthenticated,
}

impl AuthState {
    fn from_session(session: Option<Session>) -> Self {
        match session {
            Some(session) => AuthState::Authenticated {
                user: session.user.clone(),
                session,
            },
            None => AuthState::Unauthenticated,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }
}

pub struct AuthService {
    api: Arc<dyn AuthApi>,
    profiles: Arc<dyn DataSource>,
    reset_redirect: String,
    state: Arc<watch::Sender<AuthState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthService {
    /// Resolve the initial session and start following auth changes.
    pub async fn start(
        api: Arc<dyn AuthApi>,
        profiles: Arc<dyn DataSource>,
        store: &dyn KeyValueStore,
        reset_redirect: impl Into<String>,
    ) -> Arc<Self> {
        match store.get_item(SESSION_KEY).await {
            Ok(stored) => tracing::info!(
                "Stored session check: {}",
                if stored.is_some() { "found" } else { "not found" }
            ),
            Err(e) => tracing::error!("Error checking stored session: {}", e),
        }

        // Subscribe first so a change during the lookup is not lost.
        let events = api.on_auth_state_change();
        let (state, _) = watch::channel(AuthState::Loading);
        let state = Arc::new(state);

        let initial = match api.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Error getting session: {}", e);
                None
            }
        };
        tracing::info!(
            "Initial session check: {}",
            if initial.is_some() { "authenticated" } else { "not authenticated" }
        );
        state.send_replace(AuthState::from_session(initial));

        let listener = tokio::spawn(follow_auth_changes(events, state.clone()));

        Arc::new(Self {
            api,
            profiles,
            reset_redirect: reset_redirect.into(),
            state,
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().user().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AppError> {
        let email = require_credentials(email, password)?;

        match self.api.sign_in_with_password(email, password).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "Sign in successful");
                self.state.send_replace(AuthState::from_session(Some(session)));
                Ok(())
            }
            Err(e) => {
                tracing::error!("Sign in failed: {}", e);
                Err(e.user_facing())
            }
        }
    }

    /// Register a new account. `name` defaults to the email's local part.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<(), AppError> {
        let email = require_credentials(email, password)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let full_name = name.unwrap_or_else(|| email_local_part(email));

        let outcome = match self
            .api
            .sign_up(email, password, json!({ "full_name": full_name }))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Sign up failed: {}", e);
                return Err(e.user_facing());
            }
        };
        tracing::info!(
            user_id = outcome.user.as_ref().map(|u| u.id.as_str()).unwrap_or("-"),
            "Sign up successful"
        );

        if let (Some(user), Some(name)) = (&outcome.user, name) {
            self.create_profile(user, name).await;
        }
        if let Some(session) = outcome.session {
            self.state.send_replace(AuthState::from_session(Some(session)));
        }
        Ok(())
    }

    /// Best effort: a failure here does not fail the sign-up.
    async fn create_profile(&self, user: &User, name: &str) {
        let row = json!({
            "id": user.id,
            "full_name": name,
            "updated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        match self.profiles.upsert(PROFILES, row).await {
            Ok(_) => tracing::info!(user_id = %user.id, "Profile created"),
            Err(e) => tracing::error!("Error creating profile: {}", e),
        }
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }

        match self
            .api
            .reset_password_for_email(email, &self.reset_redirect)
            .await
        {
            Ok(()) => {
                tracing::info!("Password reset email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Password reset failed: {}", e);
                Err(e.user_facing())
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        match self.api.sign_out().await {
            Ok(()) => {
                self.state.send_replace(AuthState::Unauthenticated);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Sign out failed: {}", e);
                Err(e.user_facing())
            }
        }
    }

    /// Stop following auth changes. The current state stays readable.
    pub fn shutdown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(task) = listener.take() {
                task.abort();
            }
        }
    }
}

impl Drop for AuthService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn follow_auth_changes(
    mut events: broadcast::Receiver<AuthChange>,
    state: Arc<watch::Sender<AuthState>>,
) {
    loop {
        match events.recv().await {
            Ok(change) => {
                tracing::info!(
                    event = ?change.event,
                    "Auth state changed: {}",
                    if change.session.is_some() { "session exists" } else { "no session" }
                );
                state.send_replace(AuthState::from_session(change.session));
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} auth changes", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn require_credentials<'a>(email: &'a str, password: &str) -> Result<&'a str, AppError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::client::{AuthEvent, SignUpOutcome};
    use crate::data::testing::FakeSource;
    use crate::errors::NETWORK_FAILURE_MESSAGE;
    use crate::storage::MemoryStore;

    struct FakeAuth {
        session: Mutex<Option<Session>>,
        failure: Option<AppError>,
        sign_up_session: bool,
        metadata: Mutex<Option<Value>>,
        redirects: Mutex<Vec<String>>,
        events: broadcast::Sender<AuthChange>,
    }

    impl FakeAuth {
        fn new() -> Self {
            Self {
                session: Mutex::new(None),
                failure: None,
                sign_up_session: false,
                metadata: Mutex::new(None),
                redirects: Mutex::new(Vec::new()),
                events: broadcast::channel(8).0,
            }
        }

        fn signed_in() -> Self {
            let fake = Self::new();
            *fake.session.lock().unwrap() = Some(session("existing@example.com"));
            fake
        }

        fn failing(err: AppError) -> Self {
            Self {
                failure: Some(err),
                ..Self::new()
            }
        }

        fn check(&self) -> Result<(), AppError> {
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn session(email: &str) -> Session {
        serde_json::from_value(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "token_type": "bearer",
            "expires_in": 3600,
            "user": {"id": "user-1", "email": email}
        }))
        .unwrap()
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn get_session(&self) -> Result<Option<Session>, AppError> {
            Ok(self.session.lock().unwrap().clone())
        }

        async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session, AppError> {
            self.check()?;
            let session = session(email);
            *self.session.lock().unwrap() = Some(session.clone());
            Ok(session)
        }

        async fn sign_up(&self, email: &str, _password: &str, metadata: Value) -> Result<SignUpOutcome, AppError> {
            self.check()?;
            *self.metadata.lock().unwrap() = Some(metadata);
            let session = session(email);
            Ok(SignUpOutcome {
                user: Some(session.user.clone()),
                session: self.sign_up_session.then_some(session),
            })
        }

        async fn reset_password_for_email(&self, _email: &str, redirect_to: &str) -> Result<(), AppError> {
            self.check()?;
            self.redirects.lock().unwrap().push(redirect_to.to_string());
            Ok(())
        }

        async fn sign_out(&self) -> Result<(), AppError> {
            *self.session.lock().unwrap() = None;
            Ok(())
        }

        async fn refresh_session(&self) -> Result<Session, AppError> {
            Err(AppError::Unauthorized("no refresh in tests".into()))
        }

        fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange> {
            self.events.subscribe()
        }
    }

    async fn start(api: Arc<FakeAuth>, profiles: Arc<FakeSource>) -> Arc<AuthService> {
        AuthService::start(api, profiles, &MemoryStore::new(), "econexus://reset-password").await
    }

    #[tokio::test]
    async fn test_start_without_session_is_unauthenticated() {
        let auth = start(Arc::new(FakeAuth::new()), Arc::new(FakeSource::new())).await;
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(!auth.is_logged_in());
        assert!(!auth.is_loading());
    }

    #[tokio::test]
    async fn test_start_with_session_is_authenticated() {
        let auth = start(Arc::new(FakeAuth::signed_in()), Arc::new(FakeSource::new())).await;
        assert!(auth.is_logged_in());
        assert_eq!(auth.current_user().unwrap().id, "user-1");
        assert_eq!(auth.current_session().unwrap().access_token, "access");
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let auth = start(Arc::new(FakeAuth::new()), Arc::new(FakeSource::new())).await;

        auth.sign_in("jane@example.com", "secret").await.unwrap();
        assert_eq!(
            auth.current_user().unwrap().email.as_deref(),
            Some("jane@example.com")
        );

        auth.sign_out().await.unwrap();
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_blank_credentials_are_rejected_locally() {
        let auth = start(Arc::new(FakeAuth::new()), Arc::new(FakeSource::new())).await;

        for (email, password) in [("", "secret"), ("  ", "secret"), ("jane@example.com", "")] {
            assert!(matches!(
                auth.sign_in(email, password).await,
                Err(AppError::Validation(_))
            ));
        }
        assert!(matches!(auth.reset_password(" ").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_network_failure_message() {
        let api = Arc::new(FakeAuth::failing(AppError::Backend {
            status: 0,
            message: "TypeError: Network request failed".to_string(),
        }));
        let auth = start(api, Arc::new(FakeSource::new())).await;

        let err = auth.sign_in("jane@example.com", "secret").await.unwrap_err();
        assert_eq!(err.message(), NETWORK_FAILURE_MESSAGE);
        let err = auth.sign_up("jane@example.com", "secret", None).await.unwrap_err();
        assert_eq!(err.message(), NETWORK_FAILURE_MESSAGE);
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let api = Arc::new(FakeAuth::failing(AppError::Unauthorized(
            "Invalid login credentials".to_string(),
        )));
        let auth = start(api, Arc::new(FakeSource::new())).await;

        let err = auth.sign_in("jane@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AppError::Unauthorized("Invalid login credentials".to_string()));
    }

    #[tokio::test]
    async fn test_sign_up_with_name_creates_profile() {
        let api = Arc::new(FakeAuth::new());
        let profiles = Arc::new(FakeSource::new().with_table("profiles", vec![]));
        let auth = start(api.clone(), profiles.clone()).await;

        auth.sign_up("greta@example.org", "secret", Some("Greta T"))
            .await
            .unwrap();

        assert_eq!(
            api.metadata.lock().unwrap().clone(),
            Some(json!({"full_name": "Greta T"}))
        );
        let writes = profiles.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].op, "upsert");
        assert_eq!(writes[0].body["id"], "user-1");
        assert_eq!(writes[0].body["full_name"], "Greta T");
        // Confirmation pending: no session yet.
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_sign_up_without_name_uses_email_and_skips_profile() {
        let api = Arc::new(FakeAuth {
            sign_up_session: true,
            ..FakeAuth::new()
        });
        let profiles = Arc::new(FakeSource::new().with_table("profiles", vec![]));
        let auth = start(api.clone(), profiles.clone()).await;

        auth.sign_up("greta@example.org", "secret", Some("  ")).await.unwrap();

        assert_eq!(
            api.metadata.lock().unwrap().clone(),
            Some(json!({"full_name": "greta"}))
        );
        assert!(profiles.writes().is_empty());
        assert!(auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_profile_failure_does_not_fail_sign_up() {
        let auth = start(Arc::new(FakeAuth::new()), Arc::new(FakeSource::new())).await;
        assert!(auth.sign_up("a@b.co", "secret", Some("A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_password_uses_configured_redirect() {
        let api = Arc::new(FakeAuth::new());
        let auth = start(api.clone(), Arc::new(FakeSource::new())).await;

        auth.reset_password("jane@example.com").await.unwrap();
        assert_eq!(
            api.redirects.lock().unwrap().clone(),
            vec!["econexus://reset-password".to_string()]
        );
    }

    #[tokio::test]
    async fn test_listener_applies_backend_changes() {
        let api = Arc::new(FakeAuth::signed_in());
        let auth = start(api.clone(), Arc::new(FakeSource::new())).await;
        let mut rx = auth.subscribe();
        assert!(auth.is_logged_in());

        api.events
            .send(AuthChange {
                event: AuthEvent::SignedOut,
                session: None,
            })
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthState::Unauthenticated);

        api.events
            .send(AuthChange {
                event: AuthEvent::TokenRefreshed,
                session: Some(session("jane@example.com")),
            })
            .unwrap();
        rx.changed().await.unwrap();
        assert!(auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_shutdown_detaches_listener() {
        let api = Arc::new(FakeAuth::signed_in());
        let auth = start(api.clone(), Arc::new(FakeSource::new())).await;

        auth.shutdown();
        tokio::task::yield_now().await;
        let _ = api.events.send(AuthChange {
            event: AuthEvent::SignedOut,
            session: None,
        });
        tokio::task::yield_now().await;
        assert!(auth.is_logged_in());
    }
}
