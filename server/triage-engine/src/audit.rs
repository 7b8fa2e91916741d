//! Append-only audit trail, partitioned by UTC date.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{Analysis, Decision, Finding, ImpactResult, PullRequestSnapshot};

/// One audited triage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id: Uuid,
  pub recorded_at: DateTime<Utc>,
  pub pr_number: u64,
  pub title: String,
  pub author: String,
  pub target_branch: String,
  /// Stable digest of the snapshot the decision was made on.
  pub snapshot_digest: String,
  pub decision: Decision,
  pub impact: ImpactResult,
  pub findings: Vec<Finding>,
}

impl AuditEntry {
  pub fn new(pr: &PullRequestSnapshot, analysis: &Analysis) -> Result<Self, EngineError> {
    Ok(Self {
      id: analysis.decision.id,
      recorded_at: analysis.decision.created_at,
      pr_number: pr.number,
      title: pr.title.clone(),
      author: pr.author.clone(),
      target_branch: pr.target_branch.clone(),
      snapshot_digest: snapshot_digest(pr)?,
      decision: analysis.decision.clone(),
      impact: analysis.impact.clone(),
      findings: analysis.findings.clone(),
    })
  }

  pub fn audit_date(&self) -> NaiveDate {
    self.recorded_at.date_naive()
  }
}

/// blake3 over the canonical JSON of the snapshot, first 32 hex chars.
pub fn snapshot_digest(pr: &PullRequestSnapshot) -> Result<String, EngineError> {
  let canonical = serde_json::to_vec(pr)?;
  let hex = blake3::hash(&canonical).to_hex();
  Ok(hex[..32].to_string())
}

/// Durable destination for audit entries.
pub trait AuditSink {
  fn record(&self, entry: &AuditEntry) -> Result<(), EngineError>;
}

/// JSON lines under `<dir>/<YYYY-MM-DD>.jsonl`.
pub struct JsonlAuditLog {
  dir: PathBuf,
}

impl JsonlAuditLog {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
    self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
  }

  /// Read back one day's entries, oldest first.
  pub fn read_partition(&self, date: NaiveDate) -> Result<Vec<AuditEntry>, EngineError> {
    let path = self.partition_path(date);
    if !path.exists() {
      return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    raw
      .lines()
      .filter(|l| !l.trim().is_empty())
      .map(|l| serde_json::from_str(l).map_err(EngineError::from))
      .collect()
  }
}

impl AuditSink for JsonlAuditLog {
  fn record(&self, entry: &AuditEntry) -> Result<(), EngineError> {
    fs::create_dir_all(&self.dir)?;
    let path = self.partition_path(entry.audit_date());
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(&line)?;
    tracing::debug!(path = %path.display(), pr = entry.pr_number, "audit entry appended");
    Ok(())
  }
}
