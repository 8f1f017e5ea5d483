use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use super::store::StoreError;
use crate::config::AppConfig;
use crate::types::Access;

/// The two connection handles a store can hand out
#[derive(Clone)]
pub struct AccessHandles {
    /// Caller-privilege pool; statements run under the row-level role
    pub normal: PgPool,
    /// Service-credential pool, only when the credential is configured
    pub elevated: Option<PgPool>,
}

impl AccessHandles {
    /// Pool matching the privilege of `access`
    pub fn pool_for(&self, access: Access) -> Result<&PgPool, StoreError> {
        match access {
            Access::Normal { .. } => Ok(&self.normal),
            Access::Elevated => self.elevated.as_ref().ok_or(StoreError::ElevatedUnavailable),
        }
    }
}

/// Builds the privileged pool from the server-held service credential
pub struct ElevatedAccess;

impl ElevatedAccess {
    /// `None` when no service credential is configured
    pub async fn from_config(config: &AppConfig) -> Result<Option<PgPool>, StoreError> {
        let Some(url) = config.elevated.database_url.as_deref() else {
            warn!("ELEVATED_DATABASE_URL not set; admin operations will run with normal privilege");
            return Ok(None);
        };
        let pool = DatabaseManager::pool_options(config).connect(url).await?;
        info!("Created elevated database pool");
        Ok(Some(pool))
    }
}

/// Connection pool construction for the record store
pub struct DatabaseManager;

impl DatabaseManager {
    fn pool_options(config: &AppConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
    }

    /// Normal-privilege pool from `DATABASE_URL`
    pub async fn normal_pool(config: &AppConfig) -> Result<PgPool, StoreError> {
        let url = config
            .database
            .url
            .as_deref()
            .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
        let pool = Self::pool_options(config).connect(url).await?;
        info!(max_connections = config.database.max_connections, "Created database pool");
        Ok(pool)
    }

    /// Both handles, ready for [`super::postgres::PgRecordStore`]
    pub async fn connect(config: &AppConfig) -> Result<AccessHandles, StoreError> {
        let normal = Self::normal_pool(config).await?;
        let elevated = ElevatedAccess::from_config(config).await?;
        Ok(AccessHandles { normal, elevated })
    }

    /// Pings a pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Apply `migrations/`, preferring the service credential since the
    /// schema grants and row-level policies need an owner
    pub async fn migrate(handles: &AccessHandles) -> Result<(), StoreError> {
        let pool = handles.elevated.as_ref().unwrap_or(&handles.normal);
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| StoreError::QueryError(format!("migration failed: {}", e)))?;
        info!("Applied database migrations");
        Ok(())
    }
}
