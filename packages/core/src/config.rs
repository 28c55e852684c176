//! Hub configuration
//!
//! Defaults work out of the box for an in-process hub. A JSON file or the
//! `CARDHUB_*` environment variables override them.

use crate::error::{HubError, Result};
use crate::indexing::INDEXING_EVENT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Data source whose index holds the internal cards
    pub card_source_id: String,

    /// Data source bound to content types that do not name one
    pub default_data_source: String,

    /// Broadcast capacity for indexing events
    pub event_channel_capacity: usize,

    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            card_source_id: "local-hub".to_string(),
            default_data_source: "local-hub".to_string(),
            event_channel_capacity: INDEXING_EVENT_CHANNEL_CAPACITY,
            log_filter: "info".to_string(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.card_source_id.trim().is_empty() {
            return Err(HubError::config("card_source_id must not be empty"));
        }
        if self.default_data_source.trim().is_empty() {
            return Err(HubError::config("default_data_source must not be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(HubError::config("event_channel_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Load a JSON config file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: HubConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the `CARDHUB_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(source) = lookup("CARDHUB_CARD_SOURCE") {
            config.card_source_id = source;
        }
        if let Some(source) = lookup("CARDHUB_DEFAULT_DATA_SOURCE") {
            config.default_data_source = source;
        }
        if let Some(capacity) = lookup("CARDHUB_EVENT_CAPACITY") {
            config.event_channel_capacity = capacity.parse().map_err(|_| {
                HubError::config(format!(
                    "CARDHUB_EVENT_CAPACITY must be a positive integer, got \"{}\"",
                    capacity
                ))
            })?;
        }
        if let Some(filter) = lookup("CARDHUB_LOG") {
            config.log_filter = filter;
        }
        config.validate()?;
        Ok(config)
    }
}
