//! Postgres-backed record store for completed analyses.
//!
//! Runtime-bound queries on purpose: the tree builds without a live
//! database, and the two inserts are simple enough that compile-time
//! checking buys little.

use async_trait::async_trait;
use oculex_core::ports::{RecordStore, StoreError};
use oculex_model::record::{FrameResultRecord, SessionRecord};
use sqlx::PgPool;
use sqlx::types::Json;

/// Embedded migrations; applied by `oculex-server db migrate`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO analysis_sessions \
             (id, mode, problem, summary, urgency, recommendations, frame_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.mode.as_str())
        .bind(&record.problem)
        .bind(&record.summary)
        .bind(record.urgency.as_str())
        .bind(Json(&record.recommendations))
        .bind(record.frame_count)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError(e.to_string()))?;
        Ok(())
    }

    async fn insert_frame_result(&self, record: &FrameResultRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO frame_analyses \
             (id, session_id, frame_number, frame_timestamp, analysis, confidence, \
              findings, storage_path, storage_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.session_id)
        .bind(record.frame_number)
        .bind(record.timestamp)
        .bind(&record.analysis)
        .bind(record.confidence)
        .bind(Json(&record.findings))
        .bind(&record.storage_path)
        .bind(&record.storage_url)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError(e.to_string()))?;
        Ok(())
    }
}
