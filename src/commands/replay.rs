/*!
 * `ingest`: replay a stored or captured heartbeat payload
 *
 * Runs the payload through the same coordinator the HTTP endpoint uses, so
 * a raw payload copied out of the ledger can be re-applied for forensics.
 */

use crate::error::Result;
use pulsar::{HeartbeatId, Ingestor};
use std::io::Read;
use std::path::Path;

/// Read a payload from a file, or from stdin when `input` is `-`
pub fn read_payload(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(Path::new(input))?)
    }
}

/// Ingest one raw payload
pub async fn replay(ingestor: &Ingestor, payload: &[u8]) -> Result<HeartbeatId> {
    let id = ingestor.ingest(payload).await?;
    tracing::info!(heartbeat_id = %id, "Heartbeat replayed");
    Ok(id)
}
