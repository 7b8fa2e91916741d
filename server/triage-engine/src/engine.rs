//! Core engine: holds the prepared stages and runs one PR through them.

use std::sync::Arc;

use crate::blast_radius::BlastRadius;
use crate::config::Config;
use crate::decision::DecisionEngine;
use crate::error::EngineError;
use crate::observer::{NoopObserver, Observer, Stage};
use crate::policy::{PolicyEvaluator, PolicyRule};
use crate::scanner::SecurityScanner;
use crate::types::*;

/// The triage pipeline. Immutable after construction; share it behind an `Arc`.
pub struct Engine {
  blast_radius: BlastRadius,
  scanner: SecurityScanner,
  policies: PolicyEvaluator,
  decisions: DecisionEngine,
  observer: Arc<dyn Observer>,
}

impl Engine {
  /// Validate the config and prepare every stage.
  pub fn new(config: Config) -> Result<Self, EngineError> {
    config.validate()?;
    Ok(Self {
      blast_radius: BlastRadius::new(&config.team),
      scanner: SecurityScanner::new(config.security),
      policies: PolicyEvaluator::new(&config.policies, &config.team),
      decisions: DecisionEngine::new(config.team.thresholds, config.decision),
      observer: Arc::new(NoopObserver),
    })
  }

  pub fn with_defaults() -> Self {
    Self {
      blast_radius: BlastRadius::new(&Default::default()),
      scanner: SecurityScanner::new(Default::default()),
      policies: PolicyEvaluator::new(&Default::default(), &Default::default()),
      decisions: DecisionEngine::new(Default::default(), Default::default()),
      observer: Arc::new(NoopObserver),
    }
  }

  pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
    self.observer = observer;
    self
  }

  pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
    self.policies.rules()
  }

  /// Run the full pipeline for one snapshot.
  ///
  /// Blast radius and the security scan are independent and run as a `rayon::join`
  /// pair; policy evaluation and the decision follow in order.
  pub fn analyze(&self, pr: &PullRequestSnapshot, signals: &ReviewSignals) -> Analysis {
    let observer = self.observer.as_ref();

    let (impact, findings) = rayon::join(
      || {
        observer.stage_started(pr.number, Stage::BlastRadius);
        let impact = self.blast_radius.calculate(pr);
        observer.stage_finished(
          pr.number,
          Stage::BlastRadius,
          &format!("score {}, {} risk signal(s)", impact.score, impact.risk_signals.len()),
        );
        impact
      },
      || {
        observer.stage_started(pr.number, Stage::SecurityScan);
        let findings = self.scanner.scan(pr);
        observer.stage_finished(
          pr.number,
          Stage::SecurityScan,
          &format!("{} finding(s)", findings.len()),
        );
        findings
      },
    );

    observer.stage_started(pr.number, Stage::PolicyEvaluation);
    let rules = self.policies.evaluate(pr, &impact, &findings);
    let failed = rules
      .iter()
      .filter(|r| r.status == RuleStatus::Failed)
      .count();
    observer.stage_finished(
      pr.number,
      Stage::PolicyEvaluation,
      &format!("{} rule(s), {} failed", rules.len(), failed),
    );

    observer.stage_started(pr.number, Stage::Decision);
    let decision = self.decisions.decide(&impact, &findings, &rules, signals);
    observer.stage_finished(
      pr.number,
      Stage::Decision,
      &format!("{} ({:.2})", decision.action.as_str(), decision.confidence),
    );

    Analysis {
      impact,
      findings,
      rules,
      decision,
    }
  }

  pub fn analyze_request(&self, request: &AnalyzeRequest) -> Analysis {
    self.analyze(&request.pull_request, &request.signals)
  }
}
