pub mod proxies;
pub mod status;
pub mod sync;
pub mod worker;

use crate::error::Result;
use crate::services::{SqliteStore, Store};
use crate::utils::get_database_path;
use std::sync::Arc;

/// Create the runtime every command runs on, exiting on failure
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    }
}

pub(crate) async fn open_store() -> Result<Arc<dyn Store>> {
    Ok(Arc::new(SqliteStore::open(&get_database_path()).await?))
}
