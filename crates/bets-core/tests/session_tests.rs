//! Integration tests for bets-core.
//!
//! Each test drives the client against a scripted fake server listening on
//! a real loopback `TcpListener`.

use bets_core::codec::QueryOutcome;
use bets_core::source::{open_named_entry, LineSource};
use bets_core::{ClientConfig, ClientSession, Error, SessionState, TransportError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const ACK: &str = "OK\n";
const WINNERS: &str = "{\"type\":\"ganadores\",\"ganadores\":2}\n";

/// Accept one connection, answer each newline-terminated request with the
/// next scripted reply and hang up once the script runs out. Returns every
/// request line received.
async fn spawn_server(replies: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut replies = replies.into_iter();
        let mut received = Vec::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            received.push(line);

            match replies.next() {
                Some(reply) => reader.get_mut().write_all(reply.as_bytes()).await.unwrap(),
                None => break,
            }
        }
        received
    });

    (address, handle)
}

fn config(agency: &str, address: &str, batch_size: usize) -> ClientConfig {
    let mut config = ClientConfig::new(agency, address);
    config.batch.size = batch_size;
    config.server.response_timeout_ms = Some(5_000);
    config
}

async fn connected(config: ClientConfig) -> ClientSession {
    let mut session = ClientSession::new(config);
    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session
}

mod batch_protocol {
    use super::*;

    #[tokio::test]
    async fn test_single_record_full_session() {
        let (address, server) = spawn_server(vec![ACK, ACK, ACK, WINNERS]).await;
        let mut session = connected(config("1", &address, 1)).await;

        let mut source = LineSource::from_lines(["a,b,1,2000-01-01,10"]);
        let report = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.records_sent, 1);
        assert!(!report.cancelled);
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(
            report.outcome,
            Some(QueryOutcome::Ready {
                winners: "2".to_string()
            })
        );

        let received = server.await.unwrap();
        assert_eq!(received.len(), 4);

        let batch: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(
            batch,
            serde_json::json!([{
                "nombre": "a",
                "apellido": "b",
                "doc": "1",
                "nacimiento": "2000-01-01",
                "numero": "10",
                "agencia": "1"
            }])
        );
        assert_eq!(received[1], "[]\n");

        let ready: serde_json::Value = serde_json::from_str(&received[2]).unwrap();
        assert_eq!(ready, serde_json::json!({"type": "ready", "agencia": "1"}));

        let query: serde_json::Value = serde_json::from_str(&received[3]).unwrap();
        assert_eq!(
            query,
            serde_json::json!({"type": "consultar_ganadores", "agencia": "1"})
        );
    }

    #[tokio::test]
    async fn test_remainder_flushed_as_final_batch() {
        let (address, server) = spawn_server(vec![ACK, ACK, ACK, ACK, WINNERS]).await;
        let mut session = connected(config("2", &address, 2)).await;

        let lines: Vec<String> = (0..5)
            .map(|i| format!("n{i},a{i},{i},2000-01-01,{i}"))
            .collect();
        let mut source = LineSource::from_lines(lines);
        let report = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.records_sent, 5);

        let received = server.await.unwrap();
        let sizes: Vec<usize> = received[..3]
            .iter()
            .map(|line| {
                serde_json::from_str::<Vec<serde_json::Value>>(line)
                    .unwrap()
                    .len()
            })
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_exact_multiple_sends_empty_final_batch() {
        let (address, server) = spawn_server(vec![ACK, ACK, ACK, ACK, WINNERS]).await;
        let mut session = connected(config("2", &address, 2)).await;

        let mut source = LineSource::from_lines([
            "a,b,1,2000-01-01,1",
            "c,d,2,2000-01-01,2",
            "",
            "e,f,3,2000-01-01,3",
            "g,h,4,2000-01-01,4",
        ]);
        let report = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.records_sent, 4);
        let received = server.await.unwrap();
        assert_eq!(received[2], "[]\n");
    }

    #[tokio::test]
    async fn test_results_not_ready() {
        let (address, server) =
            spawn_server(vec![ACK, ACK, "{\"type\":\"error\"}\n"]).await;
        let mut session = connected(config("4", &address, 10)).await;

        let mut source = LineSource::from_lines(["a,b,1,2000-01-01,10"]);
        let report = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        let outcome = report.outcome.unwrap();
        assert!(!outcome.is_ready());
        assert!(matches!(outcome, QueryOutcome::NotReady { .. }));
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(server.await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_query_response_fails_session() {
        let (address, _server) = spawn_server(vec![ACK, ACK, "{\"type\":\"ganadores\"}\n"]).await;
        let mut session = connected(config("4", &address, 10)).await;

        let mut source = LineSource::from_lines(["a,b,1,2000-01-01,10"]);
        let err = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Codec(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_server_hangs_up_before_ack() {
        let (address, server) = spawn_server(vec![]).await;
        let mut session = connected(config("1", &address, 1)).await;

        let mut source = LineSource::from_lines(["a,b,1,2000-01-01,10", "c,d,2,2000-01-01,20"]);
        let err = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Closed)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.metrics().errors_total(), 1);
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_before_sending() {
        let (address, server) = spawn_server(vec![ACK]).await;
        let mut cfg = config("1", &address, 100);
        cfg.server.max_packet_size = 8000;
        let mut session = connected(cfg).await;

        let name = "x".repeat(200);
        let lines: Vec<String> = (0..100)
            .map(|i| format!("{name},b,{i},2000-01-01,{i}"))
            .collect();
        let mut source = LineSource::from_lines(lines);
        let err = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::PacketTooLarge { max: 8000, .. })
        ));
        assert_eq!(session.metrics().bytes_sent(), 0);
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_response_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut cfg = config("1", &address, 1);
        cfg.server.response_timeout_ms = Some(100);
        let mut session = connected(cfg).await;

        let mut source = LineSource::from_lines(["a,b,1,2000-01-01,10"]);
        let err = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout { timeout_ms: 100 })
        ));
        server.abort();
    }

    #[tokio::test]
    async fn test_query_only_session() {
        let (address, server) = spawn_server(vec![WINNERS]).await;
        let mut session = connected(config("7", &address, 1)).await;

        let outcome = session.run_query().await.unwrap();
        assert_eq!(outcome.winners(), Some("2"));
        assert_eq!(session.state(), SessionState::Closed);

        let received = server.await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].contains("consultar_ganadores"));
    }
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut session = ClientSession::new(config("1", &address, 1));
        let err = session.connect().await.unwrap_err();

        assert!(err.is_fatal_connect());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (address, _server) = spawn_server(vec![]).await;
        let mut session = connected(config("1", &address, 1)).await;

        assert!(session.close().await);
        assert!(!session.close().await);
        assert_eq!(session.state(), SessionState::Closed);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_cancel_during_loop_period() {
        let (address, server) = spawn_server(vec![ACK, ACK, ACK]).await;
        let mut cfg = config("1", &address, 1);
        cfg.batch.loop_period_ms = 60_000;
        let mut session = connected(cfg).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let mut source = LineSource::from_lines([
            "a,b,1,2000-01-01,10",
            "c,d,2,2000-01-01,20",
            "e,f,3,2000-01-01,30",
        ]);
        let report = session.run(&mut source, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(report.outcome.is_none());
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.final_state, SessionState::Closed);

        // No final flush, ready or query after cancellation
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut received = Vec::new();

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            received.push(line);

            tokio::time::sleep(Duration::from_millis(300)).await;
            reader.get_mut().write_all(ACK.as_bytes()).await.unwrap();

            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push(line);
            }
            received
        });

        let mut session = connected(config("1", &address, 1)).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut source = LineSource::from_lines([
            "a,b,1,2000-01-01,10",
            "c,d,2,2000-01-01,20",
            "e,f,3,2000-01-01,30",
        ]);
        let report = session.run(&mut source, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.records_sent, 1);
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(session.metrics().errors_total(), 0);

        // The in-flight batch went out whole and nothing followed it
        let received = server.await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].ends_with('\n'));
        let batch: Vec<serde_json::Value> = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["numero"], "10");
    }
}

mod framed_protocol {
    use super::*;
    use bets_core::codec::{decode_frame, encode_frame, FRAME_HEADER_SIZE};
    use bets_core::engine::send_single_record;
    use bets_core::RecordParser;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_send_single_record() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut header = [0u8; FRAME_HEADER_SIZE];
            stream.read_exact(&mut header).await.unwrap();
            let mut frame = header.to_vec();
            frame.resize(FRAME_HEADER_SIZE + u32::from_be_bytes(header) as usize, 0);
            stream
                .read_exact(&mut frame[FRAME_HEADER_SIZE..])
                .await
                .unwrap();

            stream
                .write_all(&encode_frame(b"0,OK,None,None,None,None,None,None\n"))
                .await
                .unwrap();

            // The client closes after one exchange
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty());

            decode_frame(&frame).unwrap()
        });

        let cfg = config("5", &address, 1);
        let record = RecordParser::new("5", ',').parse("Santiago Lionel,Lorca,30904465,1999-03-17,7574");
        let response = send_single_record(&cfg, &record).await.unwrap();

        assert!(response.is_ok());
        assert_eq!(
            server.await.unwrap(),
            "0,0,5,Lorca,Santiago Lionel,30904465,1999-03-17,7574"
        );
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut cfg = config("5", &address, 1);
        cfg.server.max_packet_size = 16;
        let record = RecordParser::new("5", ',').parse("Santiago Lionel,Lorca,30904465,1999-03-17,7574");
        let err = send_single_record(&cfg, &record).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::PacketTooLarge { max: 16, .. })
        ));
        assert!(server.await.unwrap().is_empty());
    }
}

mod archive_source {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[tokio::test]
    async fn test_session_reads_agency_entry_from_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dataset.zip");
        let mut writer = ZipWriter::new(std::fs::File::create(&path).unwrap());
        writer
            .start_file("agency-1.csv", FileOptions::default())
            .unwrap();
        writer
            .write_all(b"a,b,1,2000-01-01,10\r\nc,d,2,2001-01-01,20\r\n\r\n")
            .unwrap();
        writer
            .start_file("agency-2.csv", FileOptions::default())
            .unwrap();
        writer.write_all(b"x,y,9,2009-09-09,90\n").unwrap();
        writer.finish().unwrap();

        let (address, server) = spawn_server(vec![ACK, ACK, ACK, WINNERS]).await;
        let mut cfg = config("1", &address, 2);
        cfg.source.archive_path = path;

        let mut source = open_named_entry(&cfg.source.archive_path, &cfg.entry_name()).unwrap();
        let mut session = connected(cfg).await;
        let report = session
            .run(&mut source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.records_sent, 2);
        assert_eq!(report.batches_sent, 2);

        let received = server.await.unwrap();
        let batch: Vec<serde_json::Value> = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["numero"], "20");
        assert_eq!(batch[1]["agencia"], "1");
    }
}
