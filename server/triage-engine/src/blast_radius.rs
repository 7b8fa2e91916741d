//! Blast radius: code/test/dependency impact plus path-based risk multipliers.
//!
//! Score = round((code + test + dependency) × Π signal multipliers), clamped to 0–100.

use crate::config::{PathRule, TeamConfig};
use crate::diff;
use crate::path_match::{self, Glob};
use crate::types::{
  FileChange, ImpactBreakdown, ImpactLevel, ImpactResult, PullRequestSnapshot, RiskSignal,
  RiskSignalKind, SubImpact,
};

const DEFAULT_BASE_SCORE: f64 = 10.0;
const DEFAULT_MULTIPLIER: f64 = 1.0;
const CRITICAL_CAP: f64 = 10.0;
const SAFE_POINTS: f64 = 5.0;
const SAFE_CAP: f64 = 10.0;

const BLOCKED_MULTIPLIER: f64 = 2.0;
const CONFIG_MULTIPLIER: f64 = 1.5;
const AUTH_MULTIPLIER: f64 = 2.5;

const CONFIG_MARKERS: &[&str] = &[".env", "config", "secrets", "keys", "credential"];
const AUTH_MARKERS: &[&str] = &["auth", "jwt", "oauth", "session", "/acl", "permission"];
const TEST_MARKERS: &[&str] = &[
  "/test",
  "/tests/",
  "/spec/",
  "__tests__",
  "_test.",
  ".test.",
  ".spec.",
];

const MANIFESTS: &[&str] = &[
  "package.json",
  "package-lock.json",
  "npm-shrinkwrap.json",
  "yarn.lock",
  "pnpm-lock.yaml",
  "cargo.toml",
  "cargo.lock",
  "go.mod",
  "go.sum",
  "requirements.txt",
  "pipfile",
  "pipfile.lock",
  "pyproject.toml",
  "poetry.lock",
  "gemfile",
  "gemfile.lock",
  "composer.json",
  "composer.lock",
  "pom.xml",
  "build.gradle",
  "build.gradle.kts",
];

/// Lowercased path with a leading `/` so directory markers also match at the root.
fn normalized(path: &str) -> String {
  format!("/{}", path.trim_start_matches("./").to_lowercase())
}

pub fn is_test_file(path: &str) -> bool {
  let p = normalized(path);
  TEST_MARKERS.iter().any(|m| p.contains(m))
}

/// Dependency manifest or lockfile, matched on the file name.
pub fn is_dependency_manifest(path: &str) -> bool {
  let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
  MANIFESTS.contains(&name.as_str())
}

struct CompiledRule {
  glob: Glob,
  base_score: f64,
  multiplier: f64,
}

fn compile_rules(rules: &[PathRule]) -> Vec<CompiledRule> {
  rules
    .iter()
    .filter_map(|rule| {
      let glob = match Glob::new(&rule.pattern) {
        Ok(glob) => glob,
        Err(e) => {
          tracing::warn!(pattern = %rule.pattern, error = %e, "ignoring unusable glob pattern");
          return None;
        }
      };
      Some(CompiledRule {
        glob,
        base_score: rule.base_score.unwrap_or(DEFAULT_BASE_SCORE),
        multiplier: rule.multiplier.unwrap_or(DEFAULT_MULTIPLIER),
      })
    })
    .collect()
}

/// Impact scorer with path rules compiled once.
pub struct BlastRadius {
  critical: Vec<CompiledRule>,
  safe: Vec<CompiledRule>,
  blocked: Vec<Glob>,
}

impl BlastRadius {
  pub fn new(team: &TeamConfig) -> Self {
    Self {
      critical: compile_rules(&team.critical_paths),
      safe: compile_rules(&team.safe_paths),
      blocked: path_match::compile_all(&team.blocked_paths),
    }
  }

  pub fn calculate(&self, pr: &PullRequestSnapshot) -> ImpactResult {
    let code = self.code_impact(&pr.files);
    let test = test_impact(&pr.files);
    let dependency = dependency_impact(&pr.files);
    let risk_signals = self.risk_signals(&pr.files);

    let base = code.score + test.score + dependency.score;
    let product: f64 = risk_signals.iter().map(|s| s.multiplier).product();
    let score = (base * product).round().clamp(0.0, 100.0) as u8;

    tracing::debug!(
      pr = pr.number,
      code = code.score,
      test = test.score,
      dependency = dependency.score,
      signals = risk_signals.len(),
      score,
      "blast radius computed"
    );

    ImpactResult {
      score,
      code,
      test,
      dependency,
      risk_signals,
    }
  }

  fn critical_rule(&self, path: &str) -> Option<&CompiledRule> {
    self.critical.iter().find(|r| r.glob.is_match(path))
  }

  fn safe_rule(&self, path: &str) -> Option<&CompiledRule> {
    self.safe.iter().find(|r| r.glob.is_match(path))
  }

  fn code_impact(&self, files: &[FileChange]) -> SubImpact {
    if files.is_empty() {
      return SubImpact {
        score: 0.0,
        level: ImpactLevel::Low,
        breakdown: ImpactBreakdown::default(),
      };
    }

    let file_points = match files.len() {
      0..=2 => 5.0,
      3..=5 => 10.0,
      6..=10 => 13.0,
      _ => 15.0,
    };
    let lines = files
      .iter()
      .map(FileChange::changed_lines)
      .fold(0u32, u32::saturating_add);
    let line_points = match lines {
      0..=50 => 3.0,
      51..=200 => 7.0,
      201..=500 => 11.0,
      _ => 15.0,
    };

    let mut breakdown = ImpactBreakdown {
      files: files.len(),
      lines,
      ..ImpactBreakdown::default()
    };
    let mut critical_points = 0.0;
    let mut safe_reduction = 0.0;
    for file in files {
      if let Some(rule) = self.critical_rule(&file.path) {
        critical_points += rule.base_score * rule.multiplier;
        breakdown.critical_files += 1;
      }
      if let Some(rule) = self.safe_rule(&file.path) {
        safe_reduction += SAFE_POINTS * rule.multiplier;
        breakdown.safe_files += 1;
      }
    }
    let critical_points = f64::min(critical_points, CRITICAL_CAP);
    let safe_reduction = f64::min(safe_reduction, SAFE_CAP);
    breakdown.critical_points = critical_points;
    breakdown.safe_reduction = safe_reduction;

    let score = (file_points + line_points + critical_points - safe_reduction).max(0.0);
    let level = if score <= 10.0 {
      ImpactLevel::Low
    } else if score <= 20.0 {
      ImpactLevel::Medium
    } else if score <= 30.0 {
      ImpactLevel::High
    } else {
      ImpactLevel::Critical
    };

    SubImpact {
      score,
      level,
      breakdown,
    }
  }

  fn risk_signals(&self, files: &[FileChange]) -> Vec<RiskSignal> {
    let mut signals = Vec::new();
    for file in files {
      let p = normalized(&file.path);
      let mut push = |kind, multiplier| {
        signals.push(RiskSignal {
          kind,
          multiplier,
          file: file.path.clone(),
        })
      };

      if path_match::any_match(&self.blocked, &file.path) {
        push(RiskSignalKind::BlockedPath, BLOCKED_MULTIPLIER);
      }
      if CONFIG_MARKERS.iter().any(|m| p.contains(m)) {
        push(RiskSignalKind::ConfigChange, CONFIG_MULTIPLIER);
      }
      if AUTH_MARKERS.iter().any(|m| p.contains(m)) {
        push(RiskSignalKind::AuthChange, AUTH_MULTIPLIER);
      }
      if let Some(rule) = self.critical_rule(&file.path) {
        if rule.multiplier > 1.0 {
          push(RiskSignalKind::CriticalPath, rule.multiplier);
        }
      }
    }
    signals
  }
}

fn test_impact(files: &[FileChange]) -> SubImpact {
  let tests: Vec<&FileChange> = files.iter().filter(|f| is_test_file(&f.path)).collect();
  let added = tests
    .iter()
    .map(|f| f.additions)
    .fold(0u32, u32::saturating_add);
  let count_points = match tests.len() {
    0 => 0.0,
    1..=3 => 3.0,
    4..=10 => 7.0,
    _ => 15.0,
  };
  let line_points = f64::min(f64::from(added) / 50.0, 10.0);
  let score = f64::min(count_points + line_points, 30.0);
  let level = if score <= 5.0 {
    ImpactLevel::Low
  } else if score <= 10.0 {
    ImpactLevel::Medium
  } else {
    ImpactLevel::High
  };

  SubImpact {
    score,
    level,
    breakdown: ImpactBreakdown {
      files: tests.len(),
      lines: added,
      ..ImpactBreakdown::default()
    },
  }
}

fn dependency_impact(files: &[FileChange]) -> SubImpact {
  let mut manifests = 0;
  let mut added_total = 0u32;
  let mut score = 0.0;
  for file in files.iter().filter(|f| is_dependency_manifest(&f.path)) {
    manifests += 1;
    let added = file.patch.as_deref().map(diff::count_added).unwrap_or(0);
    added_total = added_total.saturating_add(added);
    score += f64::from(added.min(20));
  }
  let score = f64::min(score, 30.0);
  let level = if score <= 5.0 {
    ImpactLevel::Low
  } else if score <= 15.0 {
    ImpactLevel::Medium
  } else {
    ImpactLevel::High
  };

  SubImpact {
    score,
    level,
    breakdown: ImpactBreakdown {
      files: manifests,
      lines: added_total,
      ..ImpactBreakdown::default()
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::FileStatus;

  fn file(path: &str, additions: u32, deletions: u32) -> FileChange {
    FileChange {
      path: path.into(),
      status: FileStatus::Modified,
      additions,
      deletions,
      changes: additions + deletions,
      patch: None,
    }
  }

  fn pr(files: Vec<FileChange>) -> PullRequestSnapshot {
    PullRequestSnapshot {
      number: 1,
      title: "change".into(),
      body: None,
      author: "dev".into(),
      source_branch: "feature".into(),
      target_branch: "main".into(),
      additions: files.iter().map(|f| f.additions).sum(),
      deletions: files.iter().map(|f| f.deletions).sum(),
      files,
    }
  }

  #[test]
  fn empty_pr_scores_zero() {
    let result = BlastRadius::new(&TeamConfig::default()).calculate(&pr(vec![]));
    assert_eq!(result.score, 0);
    assert_eq!(result.code.level, ImpactLevel::Low);
    assert_eq!(result.test.level, ImpactLevel::Low);
    assert_eq!(result.dependency.level, ImpactLevel::Low);
    assert!(result.risk_signals.is_empty());
  }

  #[test]
  fn single_doc_file_uses_smallest_buckets() {
    let result =
      BlastRadius::new(&TeamConfig::default()).calculate(&pr(vec![file("docs/README.md", 5, 2)]));
    assert_eq!(result.code.score, 8.0);
    assert_eq!(result.code.level, ImpactLevel::Low);
    assert_eq!(result.score, 8);
  }

  #[test]
  fn file_and_line_buckets() {
    let scorer = BlastRadius::new(&TeamConfig::default());
    let files: Vec<_> = (0..6).map(|i| file(&format!("src/m{}.rs", i), 40, 0)).collect();
    // 6 files -> 13, 240 lines -> 11.
    assert_eq!(scorer.calculate(&pr(files)).code.score, 24.0);
    let files: Vec<_> = (0..11).map(|i| file(&format!("src/m{}.rs", i), 60, 0)).collect();
    let result = scorer.calculate(&pr(files));
    assert_eq!(result.code.score, 30.0);
    assert_eq!(result.code.level, ImpactLevel::High);
  }

  #[test]
  fn critical_contribution_capped_at_ten() {
    let team = TeamConfig {
      critical_paths: vec![PathRule::new("core/**").with_base_score(60.0)],
      ..TeamConfig::default()
    };
    let result = BlastRadius::new(&team).calculate(&pr(vec![file("core/engine.rs", 1, 0)]));
    assert_eq!(result.code.breakdown.critical_points, 10.0);
    assert_eq!(result.code.score, 18.0);
  }

  #[test]
  fn critical_multiplier_above_one_adds_signal() {
    let team = TeamConfig {
      critical_paths: vec![PathRule::new("core/**").with_multiplier(2.0)],
      ..TeamConfig::default()
    };
    let result = BlastRadius::new(&team).calculate(&pr(vec![file("core/engine.rs", 1, 0)]));
    assert_eq!(result.risk_signals.len(), 1);
    assert_eq!(result.risk_signals[0].kind, RiskSignalKind::CriticalPath);
    assert_eq!(result.score, 36);
  }

  #[test]
  fn safe_reduction_floors_at_zero() {
    let team = TeamConfig {
      safe_paths: vec![PathRule::new("docs/**").with_multiplier(2.0)],
      ..TeamConfig::default()
    };
    let result = BlastRadius::new(&team).calculate(&pr(vec![file("docs/a.md", 1, 0)]));
    // 5 + 3 - min(10, 10) would go negative.
    assert_eq!(result.code.score, 0.0);
    assert_eq!(result.score, 0);
  }

  #[test]
  fn test_impact_counts_test_files_and_lines() {
    let scorer = BlastRadius::new(&TeamConfig::default());
    let result = scorer.calculate(&pr(vec![
      file("src/lib.test.ts", 100, 0),
      file("tests/api.rs", 50, 0),
      file("src/lib.ts", 10, 0),
    ]));
    assert_eq!(result.test.breakdown.files, 2);
    // 3 points for <=3 files + 150/50.
    assert_eq!(result.test.score, 6.0);
    assert_eq!(result.test.level, ImpactLevel::Medium);
  }

  #[test]
  fn dependency_impact_counts_added_manifest_lines() {
    let mut lock = file("package.json", 3, 1);
    lock.patch = Some("@@ -1,3 +1,5 @@\n {\n+  \"a\": \"1\",\n+  \"b\": \"2\",\n+  \"c\": \"3\"\n }".into());
    let result = BlastRadius::new(&TeamConfig::default()).calculate(&pr(vec![lock]));
    assert_eq!(result.dependency.breakdown.files, 1);
    assert_eq!(result.dependency.score, 3.0);
    assert_eq!(result.dependency.level, ImpactLevel::Low);
  }

  #[test]
  fn dependency_contribution_capped_per_file_and_total() {
    let big: String = (0..40).map(|i| format!("+dep{}\n", i)).collect();
    let files: Vec<_> = ["Cargo.lock", "web/yarn.lock"]
      .iter()
      .map(|p| {
        let mut f = file(p, 40, 0);
        f.patch = Some(big.clone());
        f
      })
      .collect();
    let result = BlastRadius::new(&TeamConfig::default()).calculate(&pr(files));
    assert_eq!(result.dependency.score, 30.0);
    assert_eq!(result.dependency.level, ImpactLevel::High);
  }

  #[test]
  fn one_file_can_raise_several_signals() {
    let team = TeamConfig {
      blocked_paths: vec!["config/**".into()],
      ..TeamConfig::default()
    };
    let result = BlastRadius::new(&team).calculate(&pr(vec![file("config/auth.yml", 1, 0)]));
    let kinds: Vec<_> = result.risk_signals.iter().map(|s| s.kind).collect();
    assert_eq!(
      kinds,
      vec![
        RiskSignalKind::BlockedPath,
        RiskSignalKind::ConfigChange,
        RiskSignalKind::AuthChange
      ]
    );
    // 8 × 2.0 × 1.5 × 2.5 = 60
    assert_eq!(result.score, 60);
  }

  #[test]
  fn score_is_clamped_to_100() {
    let files: Vec<_> = (0..20)
      .map(|i| file(&format!("src/auth/session{}.rs", i), 400, 0))
      .collect();
    let result = BlastRadius::new(&TeamConfig::default()).calculate(&pr(files));
    assert_eq!(result.score, 100);
  }

  #[test]
  fn huge_line_counts_saturate() {
    let scorer = BlastRadius::new(&TeamConfig::default());
    let mut a = file("src/a.rs", 0, 0);
    a.changes = 3_000_000_000;
    let mut b = file("src/b.rs", 0, 0);
    b.changes = 3_000_000_000;
    let result = scorer.calculate(&pr(vec![a, b]));
    assert_eq!(result.code.breakdown.lines, u32::MAX);
    // 5 for two files + 15 for the top line bucket.
    assert_eq!(result.code.score, 20.0);

    let test = FileChange {
      path: "tests/big_test.rs".into(),
      status: FileStatus::Modified,
      additions: 3_000_000_000,
      deletions: 3_000_000_000,
      changes: 0,
      patch: None,
    };
    assert_eq!(test.changed_lines(), u32::MAX);
    let other = FileChange {
      additions: u32::MAX,
      ..test.clone()
    };
    let result = scorer.calculate(&PullRequestSnapshot {
      number: 1,
      title: "big".into(),
      body: None,
      author: "dev".into(),
      source_branch: "feature".into(),
      target_branch: "main".into(),
      additions: 0,
      deletions: 0,
      files: vec![test, other],
    });
    assert_eq!(result.test.breakdown.lines, u32::MAX);
    assert_eq!(result.test.score, 13.0);
  }

  #[test]
  fn unusable_path_rule_is_skipped() {
    let team = TeamConfig {
      critical_paths: vec![PathRule::new(""), PathRule::new("core/**").with_base_score(4.0)],
      ..TeamConfig::default()
    };
    let result = BlastRadius::new(&team).calculate(&pr(vec![file("core/a.rs", 1, 0)]));
    assert_eq!(result.code.breakdown.critical_points, 4.0);
  }

  #[test]
  fn manifest_detection_uses_file_name() {
    assert!(is_dependency_manifest("services/api/package.json"));
    assert!(is_dependency_manifest("Cargo.toml"));
    assert!(!is_dependency_manifest("docs/package.json.md"));
  }

  #[test]
  fn test_file_detection() {
    assert!(is_test_file("test/helpers.js"));
    assert!(is_test_file("src/__tests__/a.js"));
    assert!(is_test_file("pkg/handler_test.go"));
    assert!(!is_test_file("src/contest.rs"));
  }
}
