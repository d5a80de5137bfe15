#[cfg(feature = "database")]
use anyhow::Result;
#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use chrono::{DateTime, SecondsFormat, Utc};
#[cfg(feature = "database")]
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, SqlitePool};
#[cfg(feature = "database")]
use tracing::info;

#[cfg(feature = "database")]
use crate::config::DatabaseConfig;
#[cfg(feature = "database")]
use crate::store::{AuditStore, SiteRecord, SiteStore, StoreError, TransitionStore};
#[cfg(feature = "database")]
use crate::workflow::{AuditEntry, Role, Stage, StageUpdate};

#[cfg(feature = "database")]
/// SQLite-backed workflow store
pub struct SqliteStore {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteStore {
    /// Open the database, creating it and running migrations when configured
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");
        if !in_memory && !sqlx::Sqlite::database_exists(&config.url).await? {
            info!("Creating database at {}", config.url);
            sqlx::Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { config.max_connections })
            .connect(&config.url)
            .await?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[cfg(feature = "database")]
async fn stage_of<'e, E>(executor: E, site_id: &str) -> Result<Option<Stage>, StoreError>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT stage FROM sites WHERE site_id = ?1")
        .bind(site_id)
        .fetch_optional(executor)
        .await?;
    row.map(|row| parse_stage(&row.get::<String, _>("stage")))
        .transpose()
}

#[cfg(feature = "database")]
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(feature = "database")]
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(feature = "database")]
fn parse_stage(raw: &str) -> Result<Stage, StoreError> {
    raw.parse::<Stage>()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

#[cfg(feature = "database")]
fn parse_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse::<Role>()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

#[cfg(feature = "database")]
#[async_trait]
impl SiteStore for SqliteStore {
    async fn create_site(&self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sites (site_id, stage, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
        )
        .bind(site_id)
        .bind(Stage::SiteCreated.as_str())
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(site_id.to_string()));
        }

        Ok(SiteRecord {
            site_id: site_id.to_string(),
            stage: Stage::SiteCreated,
            created_at,
            updated_at: created_at,
        })
    }

    async fn get_current_stage(&self, site_id: &str) -> Result<Stage, StoreError> {
        stage_of(&self.pool, site_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(site_id.to_string()))
    }

    async fn update_stage(&self, update: &StageUpdate) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        apply_update(&mut tx, update).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn current_stages(&self) -> Result<Vec<Stage>, StoreError> {
        let rows = sqlx::query("SELECT stage FROM sites ORDER BY site_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| parse_stage(&row.get::<String, _>("stage")))
            .collect()
    }
}

#[cfg(feature = "database")]
async fn apply_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    update: &StageUpdate,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE sites SET stage = ?1, updated_at = ?2
        WHERE site_id = ?3 AND stage = ?4
        "#,
    )
    .bind(update.new_stage.as_str())
    .bind(timestamp(update.updated_at))
    .bind(update.site_id.as_str())
    .bind(update.expected_from.as_str())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return match stage_of(&mut **tx, &update.site_id).await? {
            Some(actual) => Err(StoreError::Conflict {
                site_id: update.site_id.clone(),
                expected: update.expected_from,
                actual,
            }),
            None => Err(StoreError::NotFound(update.site_id.clone())),
        };
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn insert_entry<'e, E>(executor: E, entry: &AuditEntry) -> Result<(), StoreError>
where
    E: sqlx::SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workflow_audit_logs
            (id, site_id, from_status, to_status, user_id, user_role, reason, admin_override, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(entry.id.as_str())
    .bind(entry.site_id.as_str())
    .bind(entry.from_stage.as_str())
    .bind(entry.to_stage.as_str())
    .bind(entry.actor_id.as_str())
    .bind(entry.actor_role.as_str())
    .bind(entry.reason.as_deref())
    .bind(entry.admin_override)
    .bind(timestamp(entry.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(feature = "database")]
#[async_trait]
impl AuditStore for SqliteStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        insert_entry(&self.pool, entry).await
    }

    async fn query_by_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, from_status, to_status, user_id, user_role, reason, admin_override, created_at
            FROM workflow_audit_logs
            WHERE site_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AuditEntry, StoreError> {
                Ok(AuditEntry {
                    id: row.get("id"),
                    site_id: row.get("site_id"),
                    from_stage: parse_stage(&row.get::<String, _>("from_status"))?,
                    to_stage: parse_stage(&row.get::<String, _>("to_status"))?,
                    actor_id: row.get("user_id"),
                    actor_role: parse_role(&row.get::<String, _>("user_role"))?,
                    reason: row.get("reason"),
                    admin_override: row.get("admin_override"),
                    created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl TransitionStore for SqliteStore {
    async fn commit_transition(&self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError> {
        // Dropping the transaction on any error rolls back both writes.
        let mut tx = self.pool.begin().await?;
        apply_update(&mut tx, update).await?;
        insert_entry(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }
}
