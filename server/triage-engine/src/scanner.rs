//! Security scanner: secret and injection patterns on added lines, plus
//! dependency-manifest changes.

use std::sync::LazyLock;

use regex::Regex;

use crate::blast_radius::is_dependency_manifest;
use crate::config::SecurityConfig;
use crate::diff;
use crate::types::{Confidence, FileChange, Finding, FindingKind, PullRequestSnapshot, Severity};

struct SecretPattern {
  id: &'static str,
  description: &'static str,
  confidence: Confidence,
  regex: Regex,
}

struct InjectionPattern {
  id: &'static str,
  description: &'static str,
  severity: Severity,
  regex: Regex,
}

fn compile(source: &str) -> Regex {
  Regex::new(source).unwrap_or_else(|e| panic!("invalid built-in pattern {source}: {e}"))
}

/// Secret patterns in registration order. A capture group, when present, is the secret value.
static SECRET_PATTERNS: LazyLock<Vec<SecretPattern>> = LazyLock::new(|| {
  vec![
    SecretPattern {
      id: "aws_access_key",
      description: "AWS access key ID",
      confidence: Confidence::High,
      regex: compile(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
    },
    SecretPattern {
      id: "generic_secret_40",
      description: "40-character secret-like token",
      confidence: Confidence::Medium,
      regex: compile(r#"["']([A-Za-z0-9/+=]{40})["']"#),
    },
    SecretPattern {
      id: "github_pat",
      description: "GitHub personal access token",
      confidence: Confidence::High,
      regex: compile(r"\b(?:ghp|gho|ghu|ghs|ghr)_[A-Za-z0-9]{36}\b"),
    },
    SecretPattern {
      id: "slack_token",
      description: "Slack token",
      confidence: Confidence::High,
      regex: compile(r"\bxox[abprs]-[A-Za-z0-9-]{10,}"),
    },
    SecretPattern {
      id: "generic_assignment",
      description: "Hardcoded key/token/secret assignment",
      confidence: Confidence::Medium,
      regex: compile(r#"(?i)(?:key|token|secret)=["']?([A-Za-z0-9_\-/+.]{20,})"#),
    },
    SecretPattern {
      id: "database_url",
      description: "Database connection string with credentials",
      confidence: Confidence::High,
      regex: compile(
        r"(?i)\b(?:postgres(?:ql)?|mysql|mariadb|mongodb(?:\+srv)?|redis|amqp)://[^\s:/@]+:[^\s@/]+@[^\s'\x22]+",
      ),
    },
  ]
});

static INJECTION_PATTERNS: LazyLock<Vec<InjectionPattern>> = LazyLock::new(|| {
  vec![
    InjectionPattern {
      id: "sql_interpolation",
      description: "Query or command built with string interpolation",
      severity: Severity::Critical,
      regex: compile(
        r#"(?i)\b(?:query|execute|exec|raw|run)\s*\(\s*(?:`[^`]*\$\{|f["'][^"']*\{|["'][^"']*#\{|["'][^"']*%s[^"']*["']\s*%)"#,
      ),
    },
    InjectionPattern {
      id: "unsafe_html_sink",
      description: "Unsafe HTML sink assignment",
      severity: Severity::High,
      regex: compile(r"\.(?:innerHTML|outerHTML)\s*=[^=]|dangerouslySetInnerHTML|document\.write\s*\("),
    },
    InjectionPattern {
      id: "command_concatenation",
      description: "Command execution with string concatenation",
      severity: Severity::High,
      regex: compile(
        r#"\b(?:exec|execSync|spawn|spawnSync|system|popen|shell_exec|passthru)\s*\(\s*["'][^"']*["']\s*\+"#,
      ),
    },
  ]
});

const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "py", "rb", "php"];

fn is_script_file(path: &str) -> bool {
  path
    .rsplit_once('.')
    .map(|(_, ext)| SCRIPT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// Keep the first and last 4 characters of values with at least 8 characters.
pub fn mask_secret(value: &str) -> String {
  let chars: Vec<char> = value.chars().collect();
  if chars.len() < 8 {
    return value.to_string();
  }
  let head: String = chars[..4].iter().collect();
  let tail: String = chars[chars.len() - 4..].iter().collect();
  format!("{}****{}", head, tail)
}

fn snippet_of(line: &str) -> String {
  line.trim().chars().take(60).collect()
}

/// Pattern scanner configured by the security toggles.
pub struct SecurityScanner {
  config: SecurityConfig,
}

impl SecurityScanner {
  pub fn new(config: SecurityConfig) -> Self {
    Self { config }
  }

  pub fn scan(&self, pr: &PullRequestSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !self.config.enabled {
      return findings;
    }

    for file in &pr.files {
      if self.config.secrets {
        scan_secrets(file, &mut findings);
      }
      if self.config.injection {
        scan_injection(file, &mut findings);
      }
      if self.config.dependencies && is_dependency_manifest(&file.path) {
        findings.push(Finding {
          kind: FindingKind::Dependency,
          pattern: None,
          severity: Severity::Medium,
          confidence: Confidence::Low,
          location: file.path.clone(),
          snippet: String::new(),
          description: format!("Dependency manifest changed: {}", file.path),
        });
      }
    }

    tracing::debug!(pr = pr.number, findings = findings.len(), "security scan complete");
    findings
  }
}

fn scan_secrets(file: &FileChange, out: &mut Vec<Finding>) {
  let Some(patch) = file.patch.as_deref() else {
    return;
  };
  for pattern in SECRET_PATTERNS.iter() {
    for (line_no, content) in diff::added_lines(patch) {
      let Some(caps) = pattern.regex.captures(content) else {
        continue;
      };
      let value = caps.get(1).or_else(|| caps.get(0)).map_or("", |m| m.as_str());
      let severity = if pattern.confidence == Confidence::High {
        Severity::Critical
      } else {
        Severity::High
      };
      out.push(Finding {
        kind: FindingKind::Secret,
        pattern: Some(pattern.id.to_string()),
        severity,
        confidence: pattern.confidence,
        location: format!("{}:{}", file.path, line_no),
        snippet: mask_secret(value),
        description: format!("{} detected in {}", pattern.description, file.path),
      });
    }
  }
}

fn scan_injection(file: &FileChange, out: &mut Vec<Finding>) {
  if !is_script_file(&file.path) {
    return;
  }
  let Some(patch) = file.patch.as_deref() else {
    return;
  };
  for pattern in INJECTION_PATTERNS.iter() {
    for (line_no, content) in diff::added_lines(patch) {
      if !pattern.regex.is_match(content) {
        continue;
      }
      out.push(Finding {
        kind: FindingKind::Injection,
        pattern: Some(pattern.id.to_string()),
        severity: pattern.severity,
        confidence: Confidence::Medium,
        location: format!("{}:{}", file.path, line_no),
        snippet: snippet_of(content),
        description: format!("{} in {}", pattern.description, file.path),
      });
    }
  }
}
