//! Binary entrypoint: read one JSON request (file or stdin), write one analysis to stdout.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use triage_engine::types::CiStatus;
use triage_engine::{
  AnalyzeRequest, AuditEntry, AuditSink, Config, Engine, JsonlAuditLog, TracingObserver,
};

#[derive(Debug, Parser)]
#[command(name = "triage-engine", about = "Triage a pull request into a merge decision")]
struct Args {
  /// Request JSON ({"pull_request": {...}, "approvals": n, "ci_status": "..."}); stdin when omitted.
  #[arg(long)]
  input: Option<PathBuf>,

  /// YAML or JSON config file.
  #[arg(long, env = "TRIAGE_CONFIG")]
  config: Option<PathBuf>,

  /// Append an audit entry under this directory (one file per UTC day).
  #[arg(long, env = "TRIAGE_AUDIT_DIR")]
  audit_dir: Option<PathBuf>,

  /// Override the approval count from the request.
  #[arg(long)]
  approvals: Option<u32>,

  /// Override the CI status from the request (success, pending, failure, error).
  #[arg(long)]
  ci: Option<String>,

  /// Pretty-print the output JSON.
  #[arg(long)]
  pretty: bool,
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let args = Args::parse();
  if let Err(e) = run_binary(args) {
    let _ = writeln!(io::stderr(), "triage-engine error: {}", e);
    std::process::exit(1);
  }
}

fn run_binary(args: Args) -> Result<(), Box<dyn std::error::Error>> {
  let config = match &args.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  let engine = Engine::new(config)?.with_observer(Arc::new(TracingObserver));

  let raw = match &args.input {
    Some(path) => std::fs::read_to_string(path)?,
    None => {
      let mut raw = String::new();
      io::stdin().lock().read_to_string(&mut raw)?;
      raw
    }
  };
  let mut request: AnalyzeRequest = serde_json::from_str(&raw)?;
  if let Some(approvals) = args.approvals {
    request.signals.approvals = Some(approvals);
  }
  if let Some(ci) = &args.ci {
    request.signals.ci_status = Some(CiStatus::from_str_loose(ci));
  }

  let analysis = engine.analyze_request(&request);
  tracing::info!(
    pr = request.pull_request.number,
    action = analysis.decision.action.as_str(),
    confidence = analysis.decision.confidence,
    "triage complete"
  );

  if let Some(dir) = &args.audit_dir {
    let entry = AuditEntry::new(&request.pull_request, &analysis)?;
    JsonlAuditLog::new(dir).record(&entry)?;
  }

  let json = if args.pretty {
    serde_json::to_vec_pretty(&analysis)?
  } else {
    serde_json::to_vec(&analysis)?
  };
  let mut out = io::stdout().lock();
  out.write_all(&json)?;
  writeln!(out)?;
  Ok(())
}
