//! Relational ledger for storage backends and volumes.
//!
//! Two entities live here: storage backends with a running `used` counter,
//! and volume rows allocated against them. Both stores (SQLite and
//! PostgreSQL) implement the same [`VolumeStore`] trait; callers pick one
//! through [`from_config`] and hold it as `Arc<dyn VolumeStore>`.

pub mod error;
pub mod filter;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use filter::VolumeFilter;
pub use models::{StorageRow, VolumeRow};
pub use postgres::PostgresStore;
pub use store::{SqliteStore, VolumeStore};

use cistern_core::config::DatabaseConfig;
use std::sync::Arc;

/// Build a store from configuration.
pub async fn from_config(config: &DatabaseConfig) -> LedgerResult<Arc<dyn VolumeStore>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            tracing::info!(path = %path.display(), "using SQLite ledger");
            Ok(Arc::new(SqliteStore::new(path).await?))
        }
        DatabaseConfig::Postgres {
            url: Some(url),
            max_connections,
            ..
        } => {
            tracing::info!("using PostgreSQL ledger");
            Ok(Arc::new(PostgresStore::from_url(url, *max_connections).await?))
        }
        DatabaseConfig::Postgres {
            url: None,
            host: Some(host),
            port,
            username,
            password,
            database: Some(database),
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!(host = %host, database = %database, "using PostgreSQL ledger");
            let store = PostgresStore::from_params(
                host,
                port.unwrap_or(5432),
                username.as_deref().unwrap_or("postgres"),
                password.as_deref().unwrap_or(""),
                database,
                *max_connections,
                *statement_timeout_ms,
            )
            .await?;
            Ok(Arc::new(store))
        }
        DatabaseConfig::Postgres { .. } => Err(LedgerError::Config(
            "postgres configuration requires either url or host + database".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn sqlite_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::Sqlite {
            path: dir.path().join("ledger.db"),
        };
        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn postgres_config_requires_connection_details() {
        let config = DatabaseConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            max_connections: 10,
            statement_timeout_ms: None,
        };
        let err = from_config(&config).await.unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn sqlite_config_roundtrip() {
        let config = DatabaseConfig::Sqlite {
            path: PathBuf::from("/tmp/x.db"),
        };
        match config {
            DatabaseConfig::Sqlite { path } => assert_eq!(path, PathBuf::from("/tmp/x.db")),
            other => panic!("unexpected config {other:?}"),
        }
    }
}
