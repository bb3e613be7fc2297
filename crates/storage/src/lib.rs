//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod builder;
mod checkout_store;
mod entity;
mod expedition_store;
mod explorer_store;
mod ledger;
mod migration;
mod sponsorship_store;
mod tier_store;

use std::sync::Arc;

use builder::StorageBuilder;
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};
use trailfund_domain::storage::{StorageError, StorageResult};

/// Shared storage handle used by the HTTP API and the background dispatcher.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
