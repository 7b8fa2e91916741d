//! PR Triage Service
//!
//! HTTP service that runs pull-request snapshots through the triage engine and keeps an
//! audit row per decision. Bind to 127.0.0.1 by default (internal only).

mod audit;
mod handlers;
mod state;

pub use audit::{insert_entry, CREATE_AUDIT_TABLE};
pub use handlers::{analyze, health, router, ErrorBody};
pub use state::AppState;
