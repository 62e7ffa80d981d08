//! Per-connection behavior: initialization, socket options, drain, isolation.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use socket2::SockRef;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use tcp_bootstrap::{Connection, ShutdownStatus, TcpServer, TransportOptions};

mod common;

async fn echo_lines(connection: Connection) {
    let (stream, mut shutdown) = connection.into_parts();
    let (reader, mut writer) = stream.into_split();
    let mut lines = tokio::io::BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line,
        };
        let Ok(Some(line)) = line else { break };
        if writer.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            break;
        }
    }
}

fn round_trip(addr: std::net::SocketAddr, message: &str) -> String {
    let mut stream = common::connect(addr).unwrap();
    stream.write_all(format!("{message}\n").as_bytes()).unwrap();
    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).unwrap();
    reply
}

#[test]
fn initializer_runs_once_per_connection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28411, 1, 2), move |conn: Connection| {
            counted.fetch_add(1, Ordering::SeqCst);
            echo_lines(conn)
        })
        .unwrap();

    assert_eq!(round_trip(addr, "ping"), "ping\n");
    assert_eq!(round_trip(addr, "pong"), "pong\n");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(server.stop(Duration::from_secs(5)).is_graceful());
}

#[test]
fn accepted_sockets_carry_configured_options() {
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);

    let options = TransportOptions::builder(28412)
        .host(std::net::Ipv4Addr::LOCALHOST.into())
        .acceptor_threads(1)
        .worker_threads(1)
        .keep_alive(false)
        .no_delay(false)
        .build()
        .unwrap();

    let mut server = TcpServer::new();
    let addr = server
        .start(&options, move |conn: Connection| {
            let keep_alive = SockRef::from(conn.stream()).keepalive().unwrap();
            let no_delay = conn.stream().nodelay().unwrap();
            tx.lock().unwrap().send((keep_alive, no_delay)).unwrap();
            async {}
        })
        .unwrap();

    let _client = common::connect(addr).unwrap();
    let observed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(observed, (false, false));
    server.stop(Duration::from_secs(1));
}

#[test]
fn default_options_enable_keep_alive_and_no_delay() {
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);

    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28413, 1, 1), move |conn: Connection| {
            let keep_alive = SockRef::from(conn.stream()).keepalive().unwrap();
            let no_delay = conn.stream().nodelay().unwrap();
            tx.lock().unwrap().send((keep_alive, no_delay)).unwrap();
            async {}
        })
        .unwrap();

    let _client = common::connect(addr).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (true, true));
    server.stop(Duration::from_secs(1));
}

#[test]
fn connections_alternate_between_workers() {
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);

    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28414, 1, 2), move |conn: Connection| {
            tx.lock().unwrap().send(conn.worker_index()).unwrap();
            async {}
        })
        .unwrap();

    let mut workers = HashSet::new();
    for _ in 0..4 {
        let _client = common::connect(addr).unwrap();
        workers.insert(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(workers, HashSet::from([0, 1]));
    server.stop(Duration::from_secs(1));
}

#[test]
fn pipeline_panic_only_closes_that_connection() {
    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28415, 1, 1), |conn: Connection| async move {
            let mut stream = conn.into_stream();
            let mut line = String::new();
            let mut reader = tokio::io::BufReader::new(&mut stream);
            reader.read_line(&mut line).await.unwrap();
            if line.trim() == "panic" {
                panic!("pipeline failure requested");
            }
            stream.write_all(line.as_bytes()).await.unwrap();
        })
        .unwrap();

    let mut doomed = common::connect(addr).unwrap();
    doomed.write_all(b"panic\n").unwrap();
    let mut buf = [0_u8; 16];
    assert!(matches!(doomed.read(&mut buf), Ok(0) | Err(_)));

    // The same single worker keeps serving.
    assert_eq!(round_trip(addr, "still alive"), "still alive\n");
    assert!(server.stop(Duration::from_secs(5)).is_graceful());
}

#[test]
fn initializer_panic_is_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28416, 1, 1), move |conn: Connection| {
            if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("initializer failure requested");
            }
            echo_lines(conn)
        })
        .unwrap();

    let mut first = common::connect(addr).unwrap();
    let mut buf = [0_u8; 16];
    assert!(matches!(first.read(&mut buf), Ok(0) | Err(_)));

    assert_eq!(round_trip(addr, "second"), "second\n");
    assert!(server.stop(Duration::from_secs(5)).is_graceful());
}

#[test]
fn pipelines_observing_the_drain_signal_stop_gracefully() {
    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28417, 1, 2), echo_lines)
        .unwrap();

    let mut idle = common::connect(addr).unwrap();
    assert!(common::wait_until(Duration::from_secs(2), || server.in_flight() == 1));

    let status = server.stop(Duration::from_secs(5));
    assert_eq!(status, ShutdownStatus::Graceful);

    let mut buf = [0_u8; 16];
    assert!(matches!(idle.read(&mut buf), Ok(0) | Err(_)));
}

#[test]
fn slow_connections_are_forced_closed_at_the_deadline() {
    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28418, 1, 1), |conn: Connection| async move {
            // Ignores the drain signal and holds the socket open.
            let _stream = conn.into_stream();
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .unwrap();

    let mut client = common::connect(addr).unwrap();
    assert!(common::wait_until(Duration::from_secs(2), || server.in_flight() == 1));

    let started = Instant::now();
    let status = server.stop(Duration::from_millis(300));
    let elapsed = started.elapsed();

    assert_eq!(status, ShutdownStatus::Forced { abandoned: 1 });
    assert!(elapsed >= Duration::from_millis(250), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "stopped after {elapsed:?}");

    let mut buf = [0_u8; 16];
    match client.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
    }
}
