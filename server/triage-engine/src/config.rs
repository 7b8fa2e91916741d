//! Engine configuration with sane defaults, loadable from YAML or JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::path_match::Glob;
use crate::policy::PolicyRule;

/// Complete triage configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub team: TeamConfig,
  pub security: SecurityConfig,
  pub policies: PoliciesConfig,
  pub decision: DecisionConfig,
}

/// Score bands for the final action. Must be strictly increasing and within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
  pub auto_approve: u8,
  pub auto_approve_with_comment: u8,
  pub requires_review: u8,
  pub requires_senior_review: u8,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      auto_approve: 20,
      auto_approve_with_comment: 40,
      requires_review: 60,
      requires_senior_review: 80,
    }
  }
}

/// A glob mapped to an optional base score and multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRule {
  pub pattern: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub base_score: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub multiplier: Option<f64>,
}

impl PathRule {
  pub fn new(pattern: impl Into<String>) -> Self {
    Self {
      pattern: pattern.into(),
      base_score: None,
      multiplier: None,
    }
  }

  pub fn with_base_score(mut self, base_score: f64) -> Self {
    self.base_score = Some(base_score);
    self
  }

  pub fn with_multiplier(mut self, multiplier: f64) -> Self {
    self.multiplier = Some(multiplier);
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
  pub thresholds: Thresholds,
  pub critical_paths: Vec<PathRule>,
  pub safe_paths: Vec<PathRule>,
  pub blocked_paths: Vec<String>,
}

/// Scanner toggles. `enabled = false` turns the whole scanner off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
  pub enabled: bool,
  pub secrets: bool,
  pub injection: bool,
  pub dependencies: bool,
}

impl Default for SecurityConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      secrets: true,
      injection: true,
      dependencies: true,
    }
  }
}

/// Compliance framework flags; each enabled flag registers its rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frameworks {
  pub soc2: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesConfig {
  pub protected_branches: Vec<String>,
  /// File-count ceiling for the branch-protection rule.
  pub max_files: usize,
  /// Blast-radius ceiling for framework rules.
  pub blast_radius_ceiling: u8,
  pub frameworks: Frameworks,
  /// Extra rules, evaluated after the built-in and framework rules.
  pub rules: Vec<PolicyRule>,
}

impl Default for PoliciesConfig {
  fn default() -> Self {
    Self {
      protected_branches: vec!["main".to_string(), "master".to_string()],
      max_files: 50,
      blast_radius_ceiling: 60,
      frameworks: Frameworks::default(),
      rules: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
  /// Below this confidence a non-blocking decision becomes `require_review`.
  pub min_confidence: f64,
}

impl Default for DecisionConfig {
  fn default() -> Self {
    Self {
      min_confidence: 0.5,
    }
  }
}

impl Config {
  pub fn from_yaml_str(raw: &str) -> Result<Self, EngineError> {
    Ok(serde_yaml::from_str(raw)?)
  }

  pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
    Ok(serde_json::from_str(raw)?)
  }

  /// Load and validate a config file; `.json` is parsed as JSON, anything else as YAML.
  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Self::from_json_str(&raw)?,
      Some("yml") | Some("yaml") | None => Self::from_yaml_str(&raw)?,
      Some(other) => {
        return Err(EngineError::config(format!(
          "unsupported config extension .{} ({})",
          other,
          path.display()
        )))
      }
    };
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    let t = &self.team.thresholds;
    let bands = [
      t.auto_approve,
      t.auto_approve_with_comment,
      t.requires_review,
      t.requires_senior_review,
    ];
    if bands.windows(2).any(|w| w[0] >= w[1]) {
      return Err(EngineError::validation(
        "team.thresholds",
        "must be strictly increasing",
      ));
    }
    if t.requires_senior_review > 100 {
      return Err(EngineError::validation(
        "team.thresholds",
        "must be within 0..=100",
      ));
    }

    validate_path_rules("team.critical_paths", &self.team.critical_paths)?;
    validate_path_rules("team.safe_paths", &self.team.safe_paths)?;
    for pattern in &self.team.blocked_paths {
      Glob::new(pattern).map_err(|e| EngineError::validation("team.blocked_paths", e.to_string()))?;
    }

    if self.policies.blast_radius_ceiling > 100 {
      return Err(EngineError::validation(
        "policies.blast_radius_ceiling",
        "must be within 0..=100",
      ));
    }
    for rule in &self.policies.rules {
      if rule.id.trim().is_empty() {
        return Err(EngineError::validation("policies.rules", "rule id is empty"));
      }
    }

    let min = self.decision.min_confidence;
    if !(0.0..=1.0).contains(&min) {
      return Err(EngineError::validation(
        "decision.min_confidence",
        "must be within 0.0..=1.0",
      ));
    }
    Ok(())
  }
}

fn validate_path_rules(field: &str, rules: &[PathRule]) -> Result<(), EngineError> {
  for rule in rules {
    Glob::new(&rule.pattern).map_err(|e| EngineError::validation(field, e.to_string()))?;
    if let Some(m) = rule.multiplier {
      if !(m.is_finite() && m > 0.0) {
        return Err(EngineError::validation(field, "multiplier must be positive"));
      }
    }
    if let Some(b) = rule.base_score {
      if !(b.is_finite() && b >= 0.0) {
        return Err(EngineError::validation(field, "base_score must be non-negative"));
      }
    }
  }
  Ok(())
}
