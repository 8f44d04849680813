//! Command implementations.

pub mod check_config;
pub mod reset_table;
pub mod run;

pub use self::check_config::execute_check_config;
pub use self::reset_table::execute_reset_table;
pub use self::run::execute_run;

use crate::config::AppConfig;
use crate::error::Result;
use lectern_store::SqliteRowStore;
use std::fs;

/// Open the configured SQLite database, creating its directory if needed.
pub(crate) fn open_store(config: &AppConfig) -> Result<SqliteRowStore> {
    if let Some(parent) = config.store.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(SqliteRowStore::new(&config.store.path)?)
}
