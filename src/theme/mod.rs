//! Light/dark theme selection.
//!
//! The user's choice (light, dark or follow the system) is kept in the
//! key-value store; the effective palette depends on that choice and on
//! the colour scheme the OS currently reports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::KeyValueStore;

/// Store key holding the theme choice.
pub const THEME_STORAGE_KEY: &str = "EcoNexus_theme_mode";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            "system" => Some(ThemeMode::System),
            _ => None,
        }
    }
}

/// Colour scheme reported by the OS.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StatusBarStyle {
    DarkContent,
    LightContent,
}

/// Named colours for one theme.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub background: &'static str,
    pub card: &'static str,
    pub text: &'static str,
    pub secondary_text: &'static str,
    pub accent: &'static str,
    pub border: &'static str,
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub input_background: &'static str,
    #[serde(rename = "statusBar")]
    pub status_bar: StatusBarStyle,
    pub elevated: &'static str,
    pub profile_gradient_start: &'static str,
    pub profile_gradient_end: &'static str,
    pub tab_bar_background: &'static str,
    pub avatar_background: &'static str,
    pub settings_icon_background: &'static str,
}

impl Palette {
    pub const LIGHT: Palette = Palette {
        primary: "#22C55E",
        secondary: "#0EA5E9",
        background: "#F9FAFB",
        card: "#FFFFFF",
        text: "#111827",
        secondary_text: "#6B7280",
        accent: "#8B5CF6",
        border: "#E5E7EB",
        success: "#22C55E",
        error: "#EF4444",
        warning: "#F59E0B",
        info: "#3B82F6",
        input_background: "#FFFFFF",
        status_bar: StatusBarStyle::DarkContent,
        elevated: "#FFFFFF",
        profile_gradient_start: "#22C55E",
        profile_gradient_end: "#059669",
        tab_bar_background: "#FFFFFF",
        avatar_background: "#22C55E",
        settings_icon_background: "#F3F4F6",
    };

    pub const DARK: Palette = Palette {
        primary: "#10B981",
        secondary: "#0284C7",
        background: "#111827",
        card: "#1F2937",
        text: "#F9FAFB",
        secondary_text: "#9CA3AF",
        accent: "#A78BFA",
        border: "#374151",
        success: "#10B981",
        error: "#F87171",
        warning: "#FBBF24",
        info: "#60A5FA",
        input_background: "#1F2937",
        status_bar: StatusBarStyle::LightContent,
        elevated: "#2D3748",
        profile_gradient_start: "#065F46",
        profile_gradient_end: "#064E3B",
        tab_bar_background: "#1F2937",
        avatar_background: "#059669",
        settings_icon_background: "#2D3748",
    };
}

/// Chosen mode plus what the OS reports.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ThemeState {
    pub mode: ThemeMode,
    pub os_scheme: Option<ColorScheme>,
}

impl ThemeState {
    pub fn is_dark(&self) -> bool {
        match self.mode {
            ThemeMode::Dark => true,
            ThemeMode::Light => false,
            ThemeMode::System => self.os_scheme == Some(ColorScheme::Dark),
        }
    }

    pub fn palette(&self) -> &'static Palette {
        if self.is_dark() {
            &Palette::DARK
        } else {
            &Palette::LIGHT
        }
    }
}

pub struct ThemeService {
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<ThemeState>,
}

impl ThemeService {
    /// Restore the saved mode. Anything unreadable leaves the default, `system`.
    pub async fn load(store: Arc<dyn KeyValueStore>, os_scheme: Option<ColorScheme>) -> Self {
        let mode = match store.get_item(THEME_STORAGE_KEY).await {
            Ok(Some(saved)) => ThemeMode::from_str(&saved).unwrap_or_else(|| {
                tracing::warn!("Ignoring unknown theme preference '{}'", saved);
                ThemeMode::default()
            }),
            Ok(None) => ThemeMode::default(),
            Err(e) => {
                tracing::error!("Error loading theme preference: {}", e);
                ThemeMode::default()
            }
        };

        let (state, _) = watch::channel(ThemeState { mode, os_scheme });
        Self { store, state }
    }

    pub fn state(&self) -> ThemeState {
        *self.state.borrow()
    }

    pub fn mode(&self) -> ThemeMode {
        self.state.borrow().mode
    }

    pub fn is_dark(&self) -> bool {
        self.state.borrow().is_dark()
    }

    pub fn palette(&self) -> &'static Palette {
        self.state.borrow().palette()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThemeState> {
        self.state.subscribe()
    }

    /// Switch mode now and save it in the background.
    ///
    /// The returned handle resolves once the write is done; awaiting it is optional.
    pub fn set_theme(&self, mode: ThemeMode) -> JoinHandle<()> {
        self.state.send_modify(|state| state.mode = mode);

        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.set_item(THEME_STORAGE_KEY, mode.as_str()).await {
                tracing::error!("Error saving theme preference: {}", e);
            }
        })
    }

    pub fn set_os_scheme(&self, scheme: Option<ColorScheme>) {
        self.state.send_modify(|state| state.os_scheme = scheme);
    }
}
