//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! clonable resources of the client runtime: configuration, the
//! persisted settings store, and the REST client.

use crate::{api::ApiClient, config::Config, settings::SettingsStore};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared application state, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<Mutex<SettingsStore>>,
    pub api: ApiClient,
}
