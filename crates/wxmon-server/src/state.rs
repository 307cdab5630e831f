use std::sync::Arc;
use wxmon_storage::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
}
