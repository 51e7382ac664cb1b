use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    services::report_card::{PgReportCardStore, ReportCardStore},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub report_cards: Arc<dyn ReportCardStore>,
}

impl AppState {
    /// Wires the Postgres-backed report card store onto the same pool.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let report_cards = Arc::new(PgReportCardStore::new(pool.clone()));
        Self {
            pool,
            config,
            report_cards,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ReportCardStore> {
    fn from_ref(state: &AppState) -> Self {
        state.report_cards.clone()
    }
}
