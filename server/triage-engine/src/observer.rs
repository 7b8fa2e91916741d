//! Progress hooks for callers that want to narrate the pipeline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  BlastRadius,
  SecurityScan,
  PolicyEvaluation,
  Decision,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::BlastRadius => "blast_radius",
      Self::SecurityScan => "security_scan",
      Self::PolicyEvaluation => "policy_evaluation",
      Self::Decision => "decision",
    }
  }
}

/// Stage callbacks. Both hooks default to no-ops.
///
/// The blast-radius and security stages may run on different threads, so
/// implementations must be `Send + Sync`.
pub trait Observer: Send + Sync {
  fn stage_started(&self, _pr: u64, _stage: Stage) {}
  fn stage_finished(&self, _pr: u64, _stage: Stage, _summary: &str) {}
}

pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Emits one `tracing` event per hook.
pub struct TracingObserver;

impl Observer for TracingObserver {
  fn stage_started(&self, pr: u64, stage: Stage) {
    tracing::debug!(pr, stage = stage.as_str(), "stage started");
  }

  fn stage_finished(&self, pr: u64, stage: Stage, summary: &str) {
    tracing::info!(pr, stage = stage.as_str(), summary, "stage finished");
  }
}
