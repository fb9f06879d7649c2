//! Shared per-process state handed to every handler.

use std::path::PathBuf;
use std::sync::Arc;

use oculex_core::Orchestrator;
use sqlx::PgPool;

/// Everything a request handler needs. The orchestrator holds no
/// per-submission state, so one shared instance serves all runs.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Present only when persistence is configured; health reports on it.
    pub db: Option<PgPool>,
    pub staging_dir: PathBuf,
    pub body_limit_bytes: usize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("persistence", &self.db.is_some())
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}
