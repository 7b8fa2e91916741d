use std::sync::Arc;

use sqlx_postgres::PgPool;
use triage_engine::Engine;

/// Shared per-process state. `pool` is `None` only when auditing is disabled in tests.
pub struct AppState {
  pub pool: Option<PgPool>,
  pub engine: Arc<Engine>,
}
