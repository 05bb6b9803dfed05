//! Shared application state

use sqlx::PgPool;

use userlab_billing::BillingFacade;

use crate::config::Config;

/// State shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: BillingFacade,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            billing: BillingFacade::new(pool.clone()),
            pool,
            config,
        }
    }
}
