/*!
 * `serve`: run the HTTP API
 */

use crate::config::PixelwatchConfig;
use crate::error::{AppError, Result};
use std::net::SocketAddr;

/// Run the API server until Ctrl-C
pub async fn serve(config: &PixelwatchConfig, addr: Option<SocketAddr>) -> Result<()> {
    let mut server = config.server_config();
    if let Some(addr) = addr {
        server.host = addr.ip().to_string();
        server.port = addr.port();
    }

    tracing::info!(
        addr = %server.bind_addr(),
        database = %server.database,
        "Starting Pixelwatch server"
    );

    pixelwatch_server::start_server(server)
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}
