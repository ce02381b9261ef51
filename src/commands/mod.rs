/*!
 * CLI command implementations
 *
 * Commands return data; `main` decides how to print it.
 */

pub mod init;
pub mod replay;
pub mod report;
pub mod serve;
pub mod site;

use crate::config::PixelwatchConfig;
use crate::error::Result;
use pulsar::{SqliteOptions, SqliteStore};
use std::time::Duration;

/// Open the SQLite store named by the config
pub async fn open_store(config: &PixelwatchConfig) -> Result<SqliteStore> {
    let options = SqliteOptions {
        max_connections: config.database.max_connections,
        busy_timeout: Duration::from_millis(config.database.busy_timeout_ms),
    };
    Ok(SqliteStore::open_with(&config.database.path, options).await?)
}
