pub mod from_row;
pub mod queries;
pub mod schema;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateways::GatewayRegistry;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared application state handed to every handler.
///
/// Two pools: the main store, and a separate append-only audit database so
/// audit writes never contend with order/payment transactions.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub audit: DbPool,
    pub gateways: Arc<GatewayRegistry>,
    pub base_url: String,
    pub audit_log_enabled: bool,
}

pub fn create_pool(path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = if path == ":memory:" {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(path)
    };
    Pool::builder().max_size(8).build(manager)
}
