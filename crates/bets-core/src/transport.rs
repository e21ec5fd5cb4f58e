//! Single-connection request/response transport.
//!
//! The transport owns one stream and performs strictly half-duplex
//! exchanges: write one message, then block until its response has been
//! read. `send` takes `&mut self`, so a second request cannot start before
//! the first one's response (or error) has been consumed.
//!
//! ## Admission check
//!
//! Every payload is checked against `max_packet_size` before anything is
//! written. An oversized payload fails with `TransportError::PacketTooLarge`
//! and leaves the stream untouched.
//!
//! ## Response framing
//!
//! - [`Transport::send`]: the response is read up to and including `\n`.
//!   A reply cut off by EOF before its `\n` is `TransportError::Closed`.
//! - [`Transport::send_framed`]: the response is a length-prefixed frame.
//!
//! Responses larger than `max_response_size` are rejected with
//! `TransportError::ResponseTooLarge` before they are buffered.

use crate::codec::frame::{parse_header, FRAME_HEADER_SIZE};
use crate::config::ClientConfig;
use crate::error::{Result, TransportError};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Limits applied to every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest payload accepted for writing, in bytes
    pub max_packet_size: usize,
    /// Largest response accepted for reading, in bytes
    pub max_response_size: usize,
    /// Deadline for reading a response; `None` waits forever
    pub response_timeout: Option<Duration>,
}

impl TransportLimits {
    /// Limits taken from the server section of a config.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_packet_size: config.server.max_packet_size,
            max_response_size: config.server.max_response_size,
            response_timeout: config.server.response_timeout(),
        }
    }
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            max_packet_size: 8000,
            max_response_size: 64 * 1024,
            response_timeout: None,
        }
    }
}

/// A connection to the server.
pub struct Transport<S = TcpStream> {
    stream: Option<BufReader<S>>,
    limits: TransportLimits,
    peer: String,
}

impl Transport<TcpStream> {
    /// Dial the server over TCP.
    ///
    /// # Errors
    /// `TransportError::Connect` if the dial fails. There is no retry.
    pub async fn connect(address: &str, limits: TransportLimits) -> Result<Self> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            error!(address = %address, error = %e, "Connect failed");
            TransportError::Connect {
                address: address.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(address = %address, "Connected to server");
        Ok(Self::from_stream(stream, limits, address))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already established stream.
    pub fn from_stream(stream: S, limits: TransportLimits, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(BufReader::new(stream)),
            limits,
            peer: peer.into(),
        }
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Send one newline-delimited message and read its newline-terminated
    /// response. The returned bytes include the terminator.
    pub async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.admit(payload.len())?;
        let TransportLimits {
            max_response_size,
            response_timeout,
            ..
        } = self.limits;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        write_message(stream, payload).await?;
        debug!(bytes = payload.len(), "Data sent, waiting for response");

        let response =
            with_deadline(response_timeout, read_line(stream, max_response_size)).await?;
        debug!(bytes = response.len(), "Response received");
        Ok(response)
    }

    /// Send one length-prefixed frame and read a length-prefixed response.
    /// Returns the response payload without its header.
    pub async fn send_framed(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.admit(frame.len())?;
        let TransportLimits {
            max_response_size,
            response_timeout,
            ..
        } = self.limits;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        write_message(stream, frame).await?;
        debug!(bytes = frame.len(), "Frame sent, waiting for response");

        with_deadline(response_timeout, read_frame(stream, max_response_size)).await
    }

    /// Close the connection. Returns `false` if it was already closed.
    pub async fn close(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };

        if let Err(e) = stream.get_mut().shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown on close failed");
        }
        info!(peer = %self.peer, "Connection closed");
        true
    }

    fn admit(&self, size: usize) -> Result<()> {
        let max = self.limits.max_packet_size;
        if size > max {
            error!(size, max, "Packet too large to send");
            return Err(TransportError::PacketTooLarge { size, max }.into());
        }
        Ok(())
    }
}

async fn write_message<S>(stream: &mut BufReader<S>, payload: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let inner = stream.get_mut();
    inner.write_all(payload).await.map_err(|e| io_error("write", e))?;
    inner.flush().await.map_err(|e| io_error("write", e))?;
    Ok(())
}

async fn read_line<S>(stream: &mut BufReader<S>, max: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // One byte past the limit tells an oversized reply from one that fits
    let mut buf = Vec::new();
    let n = (&mut *stream)
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| io_error("read", e))?;

    if n == 0 {
        warn!("Connection closed by peer before response");
        return Err(TransportError::Closed.into());
    }
    if buf.len() > max {
        error!(max, "Response exceeds size limit");
        return Err(TransportError::ResponseTooLarge { size: buf.len(), max }.into());
    }
    if buf.last() != Some(&b'\n') {
        warn!(bytes = buf.len(), "Connection closed by peer mid-response");
        return Err(TransportError::Closed.into());
    }
    Ok(buf)
}

async fn read_frame<S>(stream: &mut BufReader<S>, max: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    read_exact(stream, &mut header).await?;
    let len = parse_header(&header)?;
    if len > max {
        error!(size = len, max, "Response frame exceeds size limit");
        return Err(TransportError::ResponseTooLarge { size: len, max }.into());
    }

    let mut payload = vec![0u8; len];
    read_exact(stream, &mut payload).await?;
    Ok(payload)
}

async fn read_exact<S>(stream: &mut BufReader<S>, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            warn!("Connection closed by peer mid-frame");
            Err(TransportError::Closed.into())
        }
        Err(e) => Err(io_error("read", e)),
    }
}

async fn with_deadline<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = limit.as_millis() as u64;
                error!(timeout_ms, "Timed out waiting for response");
                Err(TransportError::Timeout { timeout_ms }.into())
            }
        },
    }
}

fn io_error(operation: &'static str, source: std::io::Error) -> crate::Error {
    error!(operation, error = %source, "Transport IO failure");
    TransportError::Io { operation, source }.into()
}
