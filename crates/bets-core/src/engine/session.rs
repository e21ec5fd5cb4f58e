//! Client session orchestration.
//!
//! Drives one agency's submission over a single connection:
//! - Stream records from the source into count-bounded batches
//! - Send each full batch and wait for its acknowledgement
//! - Flush the remainder (possibly empty) at end of input
//! - Send `ready`, then `consultar_ganadores`, and interpret the answer
//!
//! Exchanges strictly alternate request and response. Cancellation is only
//! observed between records, after a flush, or during the pause between
//! flushes; never while a request is in flight.

use super::state::SessionState;
use crate::batch::{Batch, BatchAccumulator};
use crate::codec::{
    decode_ack, decode_query_response, encode_batch, encode_control, Acknowledgement,
    ControlRequest, QueryOutcome,
};
use crate::config::ClientConfig;
use crate::error::{Error, TransportError};
use crate::metrics::{MetricsSummary, SessionMetrics};
use crate::record::RecordParser;
use crate::source::RecordSource;
use crate::transport::{Transport, TransportLimits};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Batches acknowledged by the server, including the final flush
    pub batches_sent: u64,
    /// Records inside acknowledged batches
    pub records_sent: u64,
    /// Bytes written to the connection
    pub bytes_sent: u64,
    /// Answer to the results query; `None` if the run was cancelled
    pub outcome: Option<QueryOutcome>,
    /// Whether a termination signal stopped the run early
    pub cancelled: bool,
    /// State the session ended in
    pub final_state: SessionState,
}

/// One client session over one connection.
pub struct ClientSession<S = TcpStream> {
    config: ClientConfig,
    transport: Option<Transport<S>>,
    state: SessionState,
    metrics: Arc<SessionMetrics>,
}

impl ClientSession<TcpStream> {
    /// Create an idle session. Call [`ClientSession::connect`] next.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            state: SessionState::Idle,
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    /// Dial the configured server.
    ///
    /// # Errors
    /// `TransportError::Connect` on dial failure. Callers treat this as fatal.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(invalid(self.state, SessionState::Connected));
        }

        let limits = TransportLimits::from_config(&self.config);
        match Transport::connect(&self.config.server.address, limits).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.transition(SessionState::Connected)
            }
            Err(e) => {
                self.metrics.record_error(&e);
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session over an already connected transport.
    pub fn with_transport(config: ClientConfig, transport: Transport<S>) -> Self {
        Self {
            config,
            transport: Some(transport),
            state: SessionState::Connected,
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session metrics.
    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// Run the full protocol: stream, finalize, query, close.
    ///
    /// The connection is closed exactly once whatever the outcome. A
    /// `NotReady` query answer is a successful run.
    pub async fn run(
        &mut self,
        source: &mut dyn RecordSource,
        cancel: &CancellationToken,
    ) -> Result<SessionReport> {
        info!(
            client_id = %self.config.client_id(),
            agency = %self.config.client.agency,
            source = %source.describe(),
            batch_size = self.config.batch.size,
            "Session started"
        );

        let result = self.drive(source, cancel).await;
        let summary = self.conclude(result.as_ref().err()).await;

        let outcome = result?;
        Ok(SessionReport {
            batches_sent: summary.batches_sent,
            records_sent: summary.records_sent,
            bytes_sent: summary.bytes_sent,
            cancelled: outcome.is_none(),
            outcome,
            final_state: self.state,
        })
    }

    /// Only ask for results on a fresh connection, then close.
    pub async fn run_query(&mut self) -> Result<QueryOutcome> {
        let result = match self.transition(SessionState::Querying) {
            Ok(()) => self.query_results().await,
            Err(e) => Err(e),
        };
        self.conclude(result.as_ref().err()).await;
        result
    }

    /// Send one batch and wait for its acknowledgement.
    pub async fn submit_batch(&mut self, batch: &Batch) -> Result<Acknowledgement> {
        let payload = encode_batch(batch)?;
        info!(
            sequence = batch.sequence,
            records = batch.len(),
            bytes = payload.len(),
            is_final = batch.is_final,
            "Sending batch, waiting for response"
        );

        let start = Instant::now();
        let response = self.transport_mut()?.send(&payload).await?;
        let ack = decode_ack(&response);

        self.metrics
            .record_batch(batch.len(), payload.len(), start.elapsed());
        info!(sequence = batch.sequence, message = %ack, "Batch acknowledged");
        Ok(ack)
    }

    /// Tell the server no more batches follow. The ack content is not checked.
    pub async fn notify_done(&mut self) -> Result<Acknowledgement> {
        let request = ControlRequest::ready(self.config.client.agency.clone());
        let response = self.exchange_control(&request).await?;
        let ack = decode_ack(&response);
        info!(message = %ack, "Ready acknowledged");
        Ok(ack)
    }

    /// Ask for the aggregate outcome.
    pub async fn query_results(&mut self) -> Result<QueryOutcome> {
        let request = ControlRequest::query_results(self.config.client.agency.clone());
        let response = self.exchange_control(&request).await?;

        let outcome = decode_query_response(&response)?;
        match &outcome {
            QueryOutcome::Ready { winners } => {
                info!(
                    agency = %self.config.client.agency,
                    winners = %winners,
                    "Results query succeeded"
                );
            }
            QueryOutcome::NotReady { message } => {
                info!(
                    agency = %self.config.client.agency,
                    message = %message,
                    "Results not yet available"
                );
            }
        }
        Ok(outcome)
    }

    /// Close the connection. Returns `false` if it was already closed.
    pub async fn close(&mut self) -> bool {
        let closed = match self.transport.as_mut() {
            Some(transport) => transport.close().await,
            None => false,
        };
        if self.state.can_transition_to(SessionState::Closed) {
            self.state = SessionState::Closed;
        }
        closed
    }

    async fn drive(
        &mut self,
        source: &mut dyn RecordSource,
        cancel: &CancellationToken,
    ) -> Result<Option<QueryOutcome>> {
        self.transition(SessionState::Streaming)?;

        let parser = RecordParser::new(
            self.config.client.agency.clone(),
            self.config.source.delimiter,
        );
        let mut accumulator = BatchAccumulator::new(self.config.batch.size);

        info!("Scanning records");
        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(&accumulator));
            }

            let Some(line) = source.next_line()? else {
                break;
            };
            self.metrics.record_read();
            accumulator.append(parser.parse(&line));

            if accumulator.should_flush() {
                let batch = accumulator.take_batch();
                self.submit_batch(&batch).await?;

                if self.pause(cancel).await {
                    return Ok(self.cancelled(&accumulator));
                }
            }
        }
        info!(
            records = accumulator.stats().total_records,
            "Scanning complete"
        );

        self.transition(SessionState::Finalizing)?;
        if let Some(batch) = accumulator.finish() {
            self.submit_batch(&batch).await?;
        }
        self.notify_done().await?;

        self.transition(SessionState::Querying)?;
        let outcome = self.query_results().await?;
        Ok(Some(outcome))
    }

    /// Wait out the loop period. Returns `true` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        match self.config.batch.loop_period() {
            None => cancel.is_cancelled(),
            Some(period) => {
                tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(period) => false,
                }
            }
        }
    }

    fn cancelled(&self, accumulator: &BatchAccumulator) -> Option<QueryOutcome> {
        warn!(
            pending = accumulator.len(),
            "Termination requested, stopping before next unit of work"
        );
        None
    }

    /// Record a failure if any, then close exactly once.
    async fn conclude(&mut self, failure: Option<&Error>) -> MetricsSummary {
        if let Some(e) = failure {
            error!(
                client_id = %self.config.client_id(),
                state = %self.state,
                error = %e,
                "Session failed"
            );
            self.metrics.record_error(e);
            if self.state.can_transition_to(SessionState::Failed) {
                self.state = SessionState::Failed;
            }
        }

        self.close().await;

        let summary = self.metrics.summary();
        info!(
            final_state = %self.state,
            batches = summary.batches_sent,
            records = summary.records_sent,
            bytes = summary.bytes_sent,
            errors = summary.errors_total,
            "Session finished"
        );
        summary
    }

    async fn exchange_control(&mut self, request: &ControlRequest) -> Result<Vec<u8>> {
        let payload = encode_control(request)?;
        debug!(kind = request.kind(), "Sending control request");

        let start = Instant::now();
        let response = self.transport_mut()?.send(&payload).await?;
        self.metrics.record_control(payload.len(), start.elapsed());
        Ok(response)
    }

    fn transport_mut(&mut self) -> Result<&mut Transport<S>> {
        self.transport
            .as_mut()
            .ok_or_else(|| TransportError::Closed.into())
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(invalid(self.state, next));
        }
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }
}

fn invalid(from: SessionState, to: SessionState) -> Error {
    Error::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
