//! Binary entrypoint for the triage service.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use sqlx_postgres::PgPool;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use triage_engine::{Config, Engine, TracingObserver};

use triage_service::{AppState, CREATE_AUDIT_TABLE};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
  let port: u16 = std::env::var("PORT")
    .unwrap_or_else(|_| "5005".into())
    .parse()
    .map_err(|_| "PORT must be a valid u16")?;

  let config = match std::env::var("TRIAGE_CONFIG") {
    Ok(path) => Config::load(Path::new(&path))?,
    Err(_) => Config::default(),
  };
  let engine = Engine::new(config)?.with_observer(Arc::new(TracingObserver));

  let pool = PgPool::connect(&database_url).await?;
  sqlx_core::query::query::<sqlx_postgres::Postgres>(CREATE_AUDIT_TABLE)
    .execute(&pool)
    .await?;

  let state = Arc::new(AppState {
    pool: Some(pool),
    engine: Arc::new(engine),
  });
  let app = triage_service::router(state).layer(CorsLayer::permissive());

  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  tracing::info!(%addr, "triage-service listening");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;

  Ok(())
}
