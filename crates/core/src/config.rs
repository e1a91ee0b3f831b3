//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Relational store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite file database. Recommended for tests and single-node setups.
    Sqlite { path: PathBuf },
    /// PostgreSQL. Either a full `url` or `host` + `database` with
    /// individual credential fields.
    Postgres {
        url: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        username: Option<String>,
        password: Option<String>,
        database: Option<String>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    },
}

/// Addresses of the external collaborators.
///
/// An unset address selects the no-op dummy client for that collaborator at
/// startup; the choice is made once by the composition root, never at call
/// time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    pub billing_url: Option<String>,
    pub orchestrator_url: Option<String>,
}

/// Provisioning reconciler configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Whether the background sweep loop is spawned.
    #[serde(default = "default_reconcile_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
    /// Provisioning attempts before a pending volume is compensated away.
    #[serde(default = "default_reconcile_max_attempts")]
    pub max_attempts: i32,
    /// Maximum pending volumes processed per sweep.
    #[serde(default = "default_reconcile_batch_limit")]
    pub batch_limit: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconcile_enabled(),
            interval_secs: default_reconcile_interval_secs(),
            max_attempts: default_reconcile_max_attempts(),
            batch_limit: default_reconcile_batch_limit(),
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    /// Create a test configuration with a throwaway SQLite database path.
    ///
    /// **For testing only.** Tests normally override the database path with
    /// a tempdir before building state.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::Sqlite {
                path: PathBuf::from("cistern-test.db"),
            },
            collaborators: CollaboratorsConfig::default(),
            reconcile: ReconcileConfig {
                enabled: false,
                ..ReconcileConfig::default()
            },
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_reconcile_enabled() -> bool {
    true
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_reconcile_max_attempts() -> i32 {
    5
}

fn default_reconcile_batch_limit() -> i64 {
    50
}
