//! Lifecycle state machine tests against real sockets.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::Ordering;
use std::time::Duration;

use tcp_bootstrap::{Connection, ServerError, ServerState, ShutdownStatus, TcpServer, TransportOptions};

mod common;

async fn ignore(_conn: Connection) {}

#[test]
fn start_then_stop_visits_every_state_once() {
    let mut observed = common::observed_server();
    let options = common::loopback_options(28401, 1, 2);

    observed.server.start(&options, ignore).unwrap();
    assert_eq!(observed.server.state(), ServerState::Listening);

    let status = observed.server.stop(Duration::from_secs(5));
    assert_eq!(status, ShutdownStatus::Graceful);
    assert_eq!(observed.server.state(), ServerState::Stopped);

    assert_eq!(
        *observed.states.lock().unwrap(),
        vec![
            ServerState::Starting,
            ServerState::Listening,
            ServerState::ShuttingDown,
            ServerState::Stopped,
        ]
    );
    assert_eq!(observed.stopped_loops.load(Ordering::SeqCst), 3);
}

#[test]
fn stop_before_start_is_a_noop() {
    let mut observed = common::observed_server();
    assert_eq!(observed.server.stop(Duration::from_secs(1)), ShutdownStatus::Graceful);
    assert_eq!(observed.server.state(), ServerState::Uninitialized);
    assert!(observed.states.lock().unwrap().is_empty());
}

#[test]
fn second_stop_has_no_effect() {
    let mut observed = common::observed_server();
    observed
        .server
        .start(&common::loopback_options(28402, 1, 1), ignore)
        .unwrap();

    assert!(observed.server.stop(Duration::from_secs(1)).is_graceful());
    let transitions = observed.states.lock().unwrap().len();
    let stopped = observed.stopped_loops.load(Ordering::SeqCst);

    assert_eq!(observed.server.stop(Duration::from_secs(1)), ShutdownStatus::Graceful);
    assert_eq!(observed.server.state(), ServerState::Stopped);
    assert_eq!(observed.states.lock().unwrap().len(), transitions);
    assert_eq!(observed.stopped_loops.load(Ordering::SeqCst), stopped);
}

#[test]
fn bind_conflict_releases_both_pools() {
    // Wildcard listener so the server's bind collides on every interface.
    let occupied = TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut observed = common::observed_server();
    let options = TransportOptions::builder(port)
        .acceptor_threads(2)
        .worker_threads(3)
        .build()
        .unwrap();

    let err = observed.server.start(&options, ignore).unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }), "unexpected error: {err}");

    assert_eq!(observed.server.state(), ServerState::Starting);
    assert_eq!(observed.stopped_loops.load(Ordering::SeqCst), 5);
    assert!(observed.server.acceptor_threads().is_none());
    assert!(observed.server.worker_threads().is_none());
    assert!(observed.server.local_addr().is_none());

    // A failed start can still be stopped, ending in the terminal state.
    assert!(observed.server.stop(Duration::from_secs(1)).is_graceful());
    assert_eq!(observed.server.state(), ServerState::Stopped);
    assert_eq!(
        *observed.states.lock().unwrap(),
        vec![ServerState::Starting, ServerState::ShuttingDown, ServerState::Stopped]
    );
}

#[test]
fn double_start_is_rejected() {
    let mut server = TcpServer::new();
    let options = common::loopback_options(28403, 1, 1);
    server.start(&options, ignore).unwrap();

    let err = server.start(&options, ignore).unwrap_err();
    assert!(matches!(
        err,
        ServerError::InvalidState {
            state: ServerState::Listening,
            ..
        }
    ));
    assert_eq!(server.state(), ServerState::Listening);
    server.stop(Duration::from_secs(1));
}

#[test]
fn listening_socket_is_closed_after_stop() {
    let mut server = TcpServer::new();
    let addr = server
        .start(&common::loopback_options(28404, 1, 1), ignore)
        .unwrap();
    assert!(common::connect(addr).is_ok());

    server.stop(Duration::from_secs(1));
    assert!(server.local_addr().is_none());
    assert!(std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_err());
}

#[test]
fn example_scenario_on_port_18080() {
    let options = TransportOptions::builder(18080)
        .backlog_size(128)
        .acceptor_threads(1)
        .worker_threads(2)
        .keep_alive(true)
        .no_delay(true)
        .build()
        .unwrap();

    let mut server = TcpServer::new();
    server.start(&options, ignore).unwrap();
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(server.acceptor_threads(), Some(1));
    assert_eq!(server.worker_threads(), Some(2));

    let addr: SocketAddr = "127.0.0.1:18080".parse().unwrap();
    assert!(common::connect(addr).is_ok());

    assert!(server.stop(Duration::from_secs(5)).is_graceful());
    assert_eq!(server.state(), ServerState::Stopped);
}

#[test]
fn default_pool_sizes_are_used_for_zero() {
    let mut server = TcpServer::new();
    server
        .start(&common::loopback_options(28405, 0, 0), ignore)
        .unwrap();

    let acceptors = server.acceptor_threads().unwrap();
    let workers = server.worker_threads().unwrap();
    assert!(acceptors >= 1);
    assert_eq!(workers, acceptors * 2);
    server.stop(Duration::from_secs(1));
}
