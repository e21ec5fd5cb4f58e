//! One-shot submission of a single record over the framed protocol.

use crate::codec::{FrameResponse, FramedRecord};
use crate::config::ClientConfig;
use crate::record::Record;
use crate::transport::{Transport, TransportLimits};
use crate::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

/// Connect, send `record` as one frame, read the reply and close.
///
/// The connection is closed whether or not the exchange succeeds.
pub async fn send_single_record(config: &ClientConfig, record: &Record) -> Result<FrameResponse> {
    let limits = TransportLimits::from_config(config);
    let mut transport = Transport::connect(&config.server.address, limits).await?;

    let result = submit_framed_record(&mut transport, record).await;
    transport.close().await;

    if let Err(e) = &result {
        error!(client_id = %config.client_id(), error = %e, "Single record submission failed");
    }
    result
}

/// Send `record` as one frame over an open transport and parse the reply.
pub async fn submit_framed_record<S>(
    transport: &mut Transport<S>,
    record: &Record,
) -> Result<FrameResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = FramedRecord::from_record(record).to_frame();
    let payload = transport.send_framed(&frame).await?;

    let text = String::from_utf8_lossy(&payload);
    let response = FrameResponse::parse(&text)?;

    if response.is_ok() {
        info!(
            doc = record.doc.as_deref().unwrap_or_default(),
            numero = record.numero.as_deref().unwrap_or_default(),
            "Bet stored"
        );
    } else {
        warn!(
            status = %response.status,
            result = %response.result,
            "Server did not store bet"
        );
    }
    Ok(response)
}
