//! Process-wide context.
//!
//! [`App`] wires the store, the backend client and the auth, theme and data
//! services together once at startup, the way the mobile shell mounts its
//! providers, and tears them down on shutdown.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::auth::AuthService;
use crate::charts::{self, ChartData};
use crate::client::{BackendClient, ChangeFeed, User};
use crate::config::Config;
use crate::data::{
    resources, summarize_energy, watch_resource, DataService, EnergySummary, Fetched, Provenance,
    ResourceWatch,
};
use crate::errors::AppError;
use crate::models::{Alert, DisasterZone, Period, Profile};
use crate::storage::{KeyValueStore, SqliteStore};
use crate::theme::{ThemeMode, ThemeService};

/// Readings shown on the home screen chart.
const DASHBOARD_READINGS: usize = 7;
/// Alerts shown on the home screen.
const DASHBOARD_ALERTS: usize = 5;

pub struct App {
    config: Config,
    client: Arc<BackendClient>,
    refresher: Option<JoinHandle<()>>,
    auth: Arc<AuthService>,
    theme: ThemeService,
    data: DataService,
}

/// Where each part of a [`DashboardSnapshot`] came from.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotProvenance {
    pub profile: Option<Provenance>,
    pub energy: Provenance,
    pub alerts: Provenance,
}

/// Everything the home screen shows, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub energy_chart: ChartData,
    pub energy_summary: EnergySummary,
    pub alerts: Vec<Alert>,
    pub theme: ThemeMode,
    pub is_dark: bool,
    pub provenance: SnapshotProvenance,
}

impl App {
    /// Open the on-disk store and start every service.
    pub async fn start(config: Config) -> Result<Self, AppError> {
        tracing::info!("Store path: {:?}", config.store_path);
        let store = SqliteStore::open(&config.store_path).await?;
        Self::with_store(config, Arc::new(store)).await
    }

    /// Start every service on top of an already open store.
    pub async fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self, AppError> {
        tracing::info!("Backend URL: {}", config.backend_url);
        if config.anon_key.is_empty() {
            tracing::warn!("No anon key configured (ECONEXUS_ANON_KEY). Requests will likely be rejected!");
        }

        let client = Arc::new(BackendClient::from_config(&config, store.clone())?);

        tracing::info!("Testing connectivity to backend...");
        match client.probe(config.probe_timeout).await {
            Ok(()) => tracing::info!("Backend connection test successful"),
            Err(e) => tracing::error!("Backend connection test failed: {}", e),
        }

        let refresher = client.start_auto_refresh();
        let auth = AuthService::start(
            client.clone(),
            client.clone(),
            store.as_ref(),
            config.reset_redirect.clone(),
        )
        .await;
        let theme = ThemeService::load(store, None).await;
        let data = DataService::new(client.clone(), config.fallback);

        Ok(Self {
            config,
            client,
            refresher,
            auth,
            theme,
            data,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub fn theme(&self) -> &ThemeService {
        &self.theme
    }

    pub fn data(&self) -> &DataService {
        &self.data
    }

    /// Fetch what the home screen needs.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        let user = self.auth.current_user();
        let profile = match &user {
            Some(user) => Some(self.data.fetch_profile(user).await),
            None => None,
        };
        let (readings, alerts) = tokio::join!(
            self.data.fetch_recent_energy_readings(DASHBOARD_READINGS),
            self.data.fetch_alerts(DASHBOARD_ALERTS),
        );

        let provenance = SnapshotProvenance {
            profile: profile.as_ref().map(Fetched::provenance),
            energy: readings.provenance(),
            alerts: alerts.provenance(),
        };
        let readings = readings.data_or_default();
        let theme = self.theme.state();

        DashboardSnapshot {
            user,
            profile: profile.and_then(Fetched::into_data),
            energy_chart: charts::energy_chart(&readings, Period::Week),
            energy_summary: summarize_energy(&readings),
            alerts: alerts.data_or_default(),
            theme: theme.mode,
            is_dark: theme.is_dark(),
            provenance,
        }
    }

    /// Keep the disaster map current with backend changes.
    pub fn watch_disaster_zones(&self) -> ResourceWatch<Fetched<Vec<DisasterZone>>> {
        let data = self.data.clone();
        let feed: Arc<dyn ChangeFeed> = self.client.clone();
        watch_resource(feed, resources::DISASTER_ZONES, move || {
            let data = data.clone();
            async move { data.fetch_disaster_zones().await }
        })
    }

    /// Stop background work. Pending theme writes finish on their own.
    pub fn shutdown(mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
        self.auth.shutdown();
        tracing::info!("EcoNexus client stopped");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
    }
}
