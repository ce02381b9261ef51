//! Public heartbeat ingest endpoint

use crate::error::{WebError, WebResult};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use pulsar::HeartbeatId;
use serde::{Deserialize, Serialize};

/// Minimal acknowledgement, kept small for beacon clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub heartbeat_id: HeartbeatId,
}

/// Receive one heartbeat from the browser snippet
///
/// The body is read as raw bytes whatever its content type, since
/// `navigator.sendBeacon` posts a Blob, and stored verbatim.
pub async fn ingest_heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> WebResult<Json<IngestResponse>> {
    let heartbeat_id = state.ingestor.ingest(&body).await.map_err(|e| {
        if e.is_client_error() {
            WebError::from(e)
        } else {
            WebError::IngestFailed(e.to_string())
        }
    })?;

    Ok(Json(IngestResponse {
        success: true,
        heartbeat_id,
    }))
}
