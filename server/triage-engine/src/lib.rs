//! PR Triage Engine: deterministic, rule-based merge decisions.
//!
//! Scores a pull request's blast radius, scans added lines for secrets and
//! injection patterns, evaluates branch-scoped policy rules, and synthesizes a
//! single decision with a weighted confidence.
//!
//! No AI, no network; pure computation over an in-memory snapshot.

pub mod audit;
pub mod blast_radius;
pub mod config;
pub mod decision;
pub mod diff;
pub mod engine;
pub mod error;
pub mod observer;
pub mod path_match;
pub mod policy;
pub mod scanner;
pub mod types;

pub use audit::{AuditEntry, AuditSink, JsonlAuditLog};
pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use observer::{Observer, TracingObserver};
pub use types::{AnalyzeRequest, Analysis, Decision, DecisionAction, PullRequestSnapshot};
