//! Runtime Configuration
//!
//! Loaded from a TOML file with `ACTORS_` environment overrides, e.g.
//! `ACTORS_WORKERS=8` or `ACTORS_SUPERVISION__MAX_RESTARTS=3`.

use crate::supervision::SupervisorDirective;
use crate::{ActorError, Result};
use anyhow::Context;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for one actor system
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker tasks multiplexing actor cells
    pub workers: usize,
    /// Messages one actor may process per scheduling turn
    pub throughput: usize,
    /// Default mailbox capacity, unbounded when absent
    pub mailbox_capacity: Option<usize>,
    /// Grace period for in-flight processing when an actor stops
    pub stop_timeout_ms: u64,
    /// Default supervision for spawned actors
    pub supervision: SupervisionConfig,
}

/// Default supervision settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisionConfig {
    pub directive: SupervisorDirective,
    pub max_restarts: u32,
    pub restart_window_secs: u64,
    pub preserve_mailbox_on_restart: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            throughput: 32,
            mailbox_capacity: None,
            stop_timeout_ms: 5_000,
            supervision: SupervisionConfig::default(),
        }
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            directive: SupervisorDirective::Restart,
            max_restarts: 5,
            restart_window_secs: 60,
            preserve_mailbox_on_restart: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file with environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ACTORS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build runtime configuration")?
            .try_deserialize()
            .context("Failed to deserialize runtime configuration")?;

        config.validate()?;
        debug!(?config, "Runtime configuration loaded");
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_throughput(mut self, throughput: usize) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ActorError::configuration(
                "Worker pool must have at least one worker",
                Some("workers"),
            ));
        }
        if self.throughput == 0 {
            return Err(ActorError::configuration(
                "Throughput must be at least one message per turn",
                Some("throughput"),
            ));
        }
        if self.mailbox_capacity == Some(0) {
            return Err(ActorError::configuration(
                "Bounded mailbox capacity must be positive",
                Some("mailbox_capacity"),
            ));
        }
        Ok(())
    }
}
