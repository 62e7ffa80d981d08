//! Shared utilities for integration tests.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tcp_bootstrap::{ServerState, TcpServer, TransportOptions};

/// Loopback options with small, explicit pools.
pub fn loopback_options(port: u16, acceptors: u32, workers: u32) -> TransportOptions {
    TransportOptions::builder(port)
        .host(Ipv4Addr::LOCALHOST.into())
        .backlog_size(128)
        .acceptor_threads(acceptors)
        .worker_threads(workers)
        .build()
        .unwrap()
}

/// A server that records its state transitions and stopped loops.
#[allow(dead_code)]
pub struct Observed {
    pub server: TcpServer,
    pub states: Arc<Mutex<Vec<ServerState>>>,
    pub stopped_loops: Arc<AtomicUsize>,
}

#[allow(dead_code)]
pub fn observed_server() -> Observed {
    let states = Arc::new(Mutex::new(Vec::new()));
    let stopped_loops = Arc::new(AtomicUsize::new(0));

    let recorded = Arc::clone(&states);
    let counted = Arc::clone(&stopped_loops);
    let server = TcpServer::new()
        .on_state_change(move |state| recorded.lock().unwrap().push(state))
        .on_loop_stopped(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

    Observed {
        server,
        states,
        stopped_loops,
    }
}

/// Connect, retrying briefly while the acceptors come up.
#[allow(dead_code)]
pub fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(500)) {
            Ok(stream) => {
                stream.set_read_timeout(Some(Duration::from_secs(5)))?;
                return Ok(stream);
            }
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => thread::sleep(Duration::from_millis(20)),
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
