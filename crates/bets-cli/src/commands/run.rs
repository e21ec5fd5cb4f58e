//! Run command implementation.

use anyhow::Result;
use bets_core::source::{open_named_entry, LineSource, RecordSource};
use bets_core::{ClientConfig, ClientSession, SessionReport};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run a full batch session for the configured agency.
///
/// `records` replaces the archive with a plain delimited file.
pub async fn run(config: ClientConfig, records: Option<PathBuf>) -> Result<SessionReport> {
    info!(
        client_id = %config.client_id(),
        agency = %config.client.agency,
        server = %config.server.address,
        "Starting bets client"
    );

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));

    let report = run_session(config, records, &cancel).await;
    signal_task.abort();
    let report = report?;

    match &report.outcome {
        Some(outcome) if outcome.is_ready() => info!(
            winners = outcome.winners().unwrap_or_default(),
            batches = report.batches_sent,
            records = report.records_sent,
            "Bets client finished"
        ),
        Some(_) => info!(
            batches = report.batches_sent,
            records = report.records_sent,
            "Bets client finished, results not yet available"
        ),
        None => info!(
            batches = report.batches_sent,
            records = report.records_sent,
            "Bets client stopped by signal"
        ),
    }
    Ok(report)
}

/// Open the record source, connect and stream.
///
/// A signal that lands before streaming starts is seen at the first
/// record boundary, so the session closes without sending anything.
async fn run_session(
    config: ClientConfig,
    records: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<SessionReport> {
    let mut source: Box<dyn RecordSource> = match records {
        Some(path) => Box::new(LineSource::from_file(&path)?),
        None => Box::new(open_named_entry(
            &config.source.archive_path,
            &config.entry_name(),
        )?),
    };

    let mut session = ClientSession::new(config);
    session.connect().await?;

    Ok(session.run(source.as_mut(), cancel).await?)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler, only Ctrl+C will stop the client");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_signal_before_streaming_sends_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let dir = tempfile::TempDir::new().unwrap();
        let records = dir.path().join("bets.csv");
        std::fs::write(&records, "a,b,1,2000-01-01,10\n").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run_session(ClientConfig::new("1", &address), Some(records), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.batches_sent, 0);
        assert!(server.await.unwrap().is_empty());
    }
}
