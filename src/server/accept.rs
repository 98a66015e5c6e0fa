//! Listening socket, acceptor thread and the worker pool
//!
//! One thread accepts connections and hands each one off round-robin
//! to a fixed pool of workers over per-worker channels; every worker
//! owns its reactor and drives its connections to completion there.
//! A connection never migrates between workers.
use std::cmp;
use std::io;
use std::net::{self, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use futures::future::{self, Either};
use futures::sync::{mpsc, oneshot};
use futures::{Future, Stream};
use net2::TcpBuilder;
use tokio_core::net::TcpStream;
use tokio_core::reactor::{Core, Timeout};

use server::proto::Proto;
use server::router::Router;
use server::Config;

/// Connections a single worker keeps in flight at most
const MAX_CONNECTIONS: usize = 65536;
/// Listen backlog
const BACKLOG: i32 = 1024;

/// The server façade: a bound listener plus its configuration
pub struct Server {
    listener: net::TcpListener,
    addr: SocketAddr,
    cfg: Arc<Config>,
    router: Arc<Router>,
    stop: Arc<AtomicBool>,
}

/// Cloneable handle that asks a running server to shut down
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Outcome of a clean server shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that hit the shutdown deadline and had to force-close
    /// connections still in flight
    pub forced_workers: usize,
}

/// A server running on a background thread
pub struct BackgroundServer {
    handle: StopHandle,
    thread: thread::JoinHandle<io::Result<ShutdownReport>>,
}

impl BackgroundServer {
    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }
    /// Signal shutdown and wait for the server to finish
    pub fn stop(self) -> io::Result<ShutdownReport> {
        self.handle.stop();
        self.thread.join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other,
                "server thread panicked"))?
    }
}

impl Server {
    /// Bind the listening socket
    ///
    /// Fails when no port is configured or the address is taken.
    pub fn bind(cfg: &Arc<Config>, router: Router) -> io::Result<Server> {
        let port = cfg.port.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput,
                "server port is not configured")
        })?;
        let addr = SocketAddr::new(cfg.host, port);
        let builder = match addr {
            SocketAddr::V4(_) => TcpBuilder::new_v4(),
            SocketAddr::V6(_) => TcpBuilder::new_v6(),
        }?;
        builder.reuse_address(true)?;
        builder.bind(&addr)?;
        let listener = builder.listen(BACKLOG)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        info!("listening on {}", addr);
        Ok(Server {
            listener: listener,
            addr: addr,
            cfg: cfg.clone(),
            router: Arc::new(router),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound address, useful with port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { stop: self.stop.clone() }
    }

    /// Accept connections until stopped, blocking this thread
    ///
    /// On shutdown the workers keep draining in-flight connections
    /// until the configured deadline, then force-close the rest; the
    /// report says how many workers had to resort to that.
    pub fn run(self) -> io::Result<ShutdownReport> {
        let Server { listener, cfg, router, stop, .. } = self;
        let worker_count = cfg.effective_workers();
        let mut senders = Vec::with_capacity(worker_count);
        let mut stoppers = Vec::with_capacity(worker_count);
        let mut threads = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::unbounded();
            let (stop_tx, stop_rx) = oneshot::channel();
            senders.push(tx);
            stoppers.push(stop_tx);
            let cfg = cfg.clone();
            let router = router.clone();
            threads.push(thread::Builder::new()
                .name(format!("tk-serve-worker-{}", index))
                .spawn(move || worker(rx, stop_rx, cfg, router))?);
        }
        let mut next = 0usize;
        let mut backoff = Duration::from_millis(1);
        while !stop.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((socket, addr)) => {
                    backoff = Duration::from_millis(1);
                    if let Err(e) = socket.set_nonblocking(true)
                        .and_then(|()| socket.set_nodelay(true))
                    {
                        debug!("{}: setup failed, dropping: {}", addr, e);
                        continue;
                    }
                    trace!("accepted connection from {}", addr);
                    let target = next % senders.len();
                    next = next.wrapping_add(1);
                    if senders[target].unbounded_send((socket, addr))
                        .is_err()
                    {
                        error!("worker {} is gone, dropping connection",
                            target);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // the nonblocking accept doubles as the stop-flag
                    // poll interval
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    // most commonly out of file descriptors; back off
                    // exponentially, capped, and keep accepting
                    warn!("accept error: {}", e);
                    thread::sleep(backoff);
                    backoff = cmp::min(backoff * 2,
                        Duration::from_millis(100));
                }
            }
        }
        debug!("acceptor stopping");
        drop(senders);
        for stopper in stoppers {
            let _ = stopper.send(());
        }
        let forced_workers = threads.into_iter()
            .filter_map(|thread| thread.join().ok())
            .filter(|&forced| forced)
            .count();
        Ok(ShutdownReport { forced_workers: forced_workers })
    }

    /// Like [`run`](#method.run) but on a background thread
    pub fn run_background(self) -> io::Result<BackgroundServer> {
        let handle = self.stop_handle();
        let thread = thread::Builder::new()
            .name("tk-serve-acceptor".to_string())
            .spawn(move || self.run())?;
        Ok(BackgroundServer {
            handle: handle,
            thread: thread,
        })
    }
}

// Returns true when the shutdown deadline forced connections closed
fn worker(rx: mpsc::UnboundedReceiver<(net::TcpStream, SocketAddr)>,
    stop_rx: oneshot::Receiver<()>,
    cfg: Arc<Config>, router: Arc<Router>)
    -> bool
{
    let mut core = match Core::new() {
        Ok(core) => core,
        Err(e) => {
            error!("worker reactor failed to start: {}", e);
            return false;
        }
    };
    let handle = core.handle();
    let connections = {
        let handle = handle.clone();
        let cfg = cfg.clone();
        rx.map(move |(socket, addr)| {
            match TcpStream::from_stream(socket, &handle) {
                Ok(stream) => {
                    Either::A(Proto::new(stream, Some(addr), &cfg,
                            &router, &handle)
                        .map_err(move |e| {
                            debug!("{}: connection error: {}", addr, e);
                        }))
                }
                Err(e) => {
                    info!("{}: cannot register connection: {}", addr, e);
                    Either::B(future::ok(()))
                }
            }
        })
        .buffer_unordered(MAX_CONNECTIONS)
        .for_each(|()| Ok(()))
    };
    // once the acceptor is done, in-flight connections get a drain
    // deadline before the reactor is torn down
    let deadline = cfg.shutdown_deadline;
    let shutdown = {
        let handle = handle.clone();
        stop_rx.then(move |_| {
            future::result(Timeout::new(deadline, &handle)).flatten()
        })
    };
    match core.run(connections.select2(shutdown)) {
        Ok(Either::A(_)) => {
            debug!("worker drained cleanly");
            false
        }
        Ok(Either::B(_)) => {
            warn!("shutdown deadline reached, force-closing connections");
            true
        }
        Err(_) => {
            debug!("worker stopped on error");
            false
        }
    }
}
