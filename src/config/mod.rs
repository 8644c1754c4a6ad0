//! Configuration management for the distribution engine.
//!
//! Provides hierarchical settings loading with priority:
//! 1. Default values (hardcoded)
//! 2. Config file
//! 3. Environment variables (highest priority, `CONFSYNC__` prefix)
//!
//! All behavior switches (fixed polling, bucket sizing, failover policy) live
//! in these structs and are injected into the worker and hub at construction;
//! there are no process-global toggles.

mod client;
mod server;

pub use client::*;
pub use server::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Client poll-worker parameters
    #[serde(default)]
    pub client: ClientConfig,

    /// Server poll-hub hold policy
    #[serde(default)]
    pub poll: PollPolicy,
}

impl Settings {
    /// Load settings, layering an optional TOML file under `CONFSYNC__`
    /// environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let raw = builder
            .add_source(Environment::with_prefix("CONFSYNC").separator("__"))
            .build()?;

        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.poll.validate()?;
        Ok(())
    }
}
