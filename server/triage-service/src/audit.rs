//! triage_audit persistence.

use sqlx_core::query::query;
use sqlx_core::types::Json;
use sqlx_postgres::{PgPool, Postgres};
use triage_engine::AuditEntry;

pub const CREATE_AUDIT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS triage_audit (
  id UUID PRIMARY KEY,
  audit_date DATE NOT NULL,
  recorded_at TIMESTAMPTZ NOT NULL,
  pr_number BIGINT NOT NULL,
  author TEXT NOT NULL,
  target_branch TEXT NOT NULL,
  snapshot_digest TEXT NOT NULL,
  action TEXT NOT NULL,
  confidence DOUBLE PRECISION NOT NULL,
  impact_score SMALLINT NOT NULL,
  entry JSONB NOT NULL
)
"#;

/// Insert one entry. Re-sending the same decision id is a no-op.
pub async fn insert_entry(pool: &PgPool, entry: &AuditEntry) -> Result<(), sqlx_core::Error> {
  query::<Postgres>(
    r#"
    INSERT INTO triage_audit
      (id, audit_date, recorded_at, pr_number, author, target_branch,
       snapshot_digest, action, confidence, impact_score, entry)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (id) DO NOTHING
    "#,
  )
  .bind(entry.id)
  .bind(entry.audit_date())
  .bind(entry.recorded_at)
  .bind(entry.pr_number as i64)
  .bind(&entry.author)
  .bind(&entry.target_branch)
  .bind(&entry.snapshot_digest)
  .bind(entry.decision.action.as_str())
  .bind(entry.decision.confidence)
  .bind(i16::from(entry.impact.score))
  .bind(Json(entry))
  .execute(pool)
  .await?;
  Ok(())
}
