/*!
 * `init-config`: write a default configuration file
 */

use crate::config::{default_config_path, PixelwatchConfig};
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

/// Write the default configuration to `path` (or the default location)
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn write_default_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().ok_or_else(|| {
            AppError::Config("Could not determine home directory; pass a path".to_string())
        })?,
    };

    if path.exists() && !force {
        return Err(AppError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    PixelwatchConfig::default().to_file(&path)?;
    Ok(path)
}
