use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CorrelationId, InstanceQuery, InstanceRecord, InstanceStoreError, Result, Version,
    store::InstanceStore,
};

const SELECT_COLUMNS: &str =
    "correlation_id, saga_type, current_state, data, version, created_at, updated_at";

/// PostgreSQL-backed instance store implementation.
#[derive(Clone)]
pub struct PostgresInstanceStore {
    pool: PgPool,
}

impl PostgresInstanceStore {
    /// Creates a new PostgreSQL instance store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<InstanceRecord> {
        Ok(InstanceRecord {
            correlation_id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            saga_type: row.try_get("saga_type")?,
            current_state: row.try_get("current_state")?,
            data: row.try_get("data")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl InstanceStore for PostgresInstanceStore {
    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, correlation_id: CorrelationId) -> Result<Option<InstanceRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_instances WHERE correlation_id = $1"
        ))
        .bind(correlation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    #[tracing::instrument(skip(self, template), fields(correlation_id = %template.correlation_id))]
    async fn create_or_get(&self, template: InstanceRecord) -> Result<(InstanceRecord, bool)> {
        let now = Utc::now();

        // The primary key makes the insert the single point of creation;
        // losers of a race fall through to the select below.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO saga_instances (correlation_id, saga_type, current_state, data, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (correlation_id) DO NOTHING
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(template.correlation_id.as_uuid())
        .bind(&template.saga_type)
        .bind(&template.current_state)
        .bind(&template.data)
        .bind(Version::first().as_i64())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            metrics::counter!("saga_instances_created_total").increment(1);
            return Ok((Self::row_to_record(row)?, true));
        }

        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_instances WHERE correlation_id = $1"
        ))
        .bind(template.correlation_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok((Self::row_to_record(row)?, false))
    }

    #[tracing::instrument(skip(self, record), fields(correlation_id = %record.correlation_id, version = %record.version))]
    async fn save(&self, record: &InstanceRecord) -> Result<Version> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE saga_instances
            SET saga_type = $2, current_state = $3, data = $4, version = version + 1, updated_at = $5
            WHERE correlation_id = $1 AND version = $6
            RETURNING version
            "#,
        )
        .bind(record.correlation_id.as_uuid())
        .bind(&record.saga_type)
        .bind(&record.current_state)
        .bind(&record.data)
        .bind(Utc::now())
        .bind(record.version.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(Version::new(version));
        }

        // Nothing matched: either the row is gone or someone else won.
        let actual: Option<i64> =
            sqlx::query_scalar("SELECT version FROM saga_instances WHERE correlation_id = $1")
                .bind(record.correlation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match actual {
            Some(actual) => Err(InstanceStoreError::ConcurrencyConflict {
                correlation_id: record.correlation_id,
                expected: record.version,
                actual: Version::new(actual),
            }),
            None => Err(InstanceStoreError::InstanceNotFound(record.correlation_id)),
        }
    }

    async fn query(&self, query: InstanceQuery) -> Result<Vec<InstanceRecord>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM saga_instances WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.saga_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND saga_type = ${param_count}"));
        }
        if query.states.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND current_state = ANY(${param_count})"));
        }

        sql.push_str(" ORDER BY created_at ASC, correlation_id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(saga_type) = query.saga_type {
            sqlx_query = sqlx_query.bind(saga_type);
        }
        if let Some(states) = query.states {
            sqlx_query = sqlx_query.bind(states);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn count(&self, saga_type: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM saga_instances WHERE saga_type = $1")
                .bind(saga_type)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as usize)
    }
}
