//! EcoNexus client core.
//!
//! Data access, session and theme state for the EcoNexus environmental
//! tracking app, talking to a hosted Postgres backend over its REST, auth
//! and realtime endpoints. Reads degrade to synthesized data when the
//! backend is unreachable or a table is missing.

pub mod app;
pub mod auth;
pub mod charts;
pub mod client;
pub mod config;
pub mod data;
pub mod errors;
pub mod models;
pub mod storage;
pub mod theme;

pub use app::{App, DashboardSnapshot};
pub use config::Config;
pub use errors::AppError;
