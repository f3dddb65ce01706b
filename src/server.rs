// SPDX-License-Identifier: MIT

use crate::config::Config;
use crate::error::AppError;
use crate::handlers::register_routes;
use crate::http::handle_client;
use crate::router::Router;
use crate::store::{ContactBook, FileSnapshot, MemorySnapshot, SnapshotStore};
use log::{debug, error, info, trace, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// Request counters shared by all worker threads. Reported when the server
/// shuts down and exposed through the health endpoint.
#[derive(Debug)]
pub struct ServerStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    error_requests: AtomicU64,
    bytes_served: AtomicU64,
    start_time: Instant,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            error_requests: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self, success: bool, bytes: u64) {
        trace!("Recording request: success={success}, bytes={bytes}");

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    /// (total, successful, errors, bytes served, uptime)
    pub fn get_stats(&self) -> (u64, u64, u64, u64, Duration) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.error_requests.load(Ordering::Relaxed),
            self.bytes_served.load(Ordering::Relaxed),
            self.start_time.elapsed(),
        )
    }
}

/// Simple native thread pool implementation
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl ThreadPool {
    /// Create a pool of `size` workers. `size` is raised to 1 if zero.
    pub fn new(size: usize) -> ThreadPool {
        let size = size.max(1);

        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();

        ThreadPool {
            workers,
            sender: Some(sender),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);

        if let Some(ref sender) = self.sender
            && sender.send(job).is_err()
        {
            warn!("Failed to send job to thread pool");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take()
                && thread.join().is_err()
            {
                warn!("Worker thread {} panicked", worker.id);
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Worker {
        let thread = thread::spawn(move || {
            loop {
                // The guard is dropped before the job runs
                let message = match receiver.lock() {
                    Ok(rx) => rx.recv(),
                    Err(_) => break,
                };

                match message {
                    Ok(job) => job(),
                    Err(_) => break,
                }
            }
            trace!("Worker {id} exiting");
        });

        Worker {
            id,
            thread: Some(thread),
        }
    }
}

/// Open the snapshot backend selected by the configuration
pub fn open_backend(config: &Config) -> Box<dyn SnapshotStore> {
    if config.ephemeral {
        Box::new(MemorySnapshot::new())
    } else {
        Box::new(FileSnapshot::new(&config.data_file))
    }
}

/// Run the server until the process is terminated
pub fn run_server_with_config(config: Config) -> Result<(), AppError> {
    run_server(config, None, None)
}

/// Bind, load the contact book and serve until `shutdown_rx` fires.
///
/// `addr_tx` receives the bound address once the listener is ready, which
/// lets callers bind to port 0.
pub fn run_server(
    config: Config,
    shutdown_rx: Option<mpsc::Receiver<()>>,
    addr_tx: Option<mpsc::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    debug!(
        "Starting server with configuration: verbose={}, detailed_logging={}",
        config.verbose, config.detailed_logging
    );

    let book = ContactBook::load(open_backend(&config));
    let contact_count = book.len();
    let storage = book.describe();
    let book = book.into_shared();

    let bind_address = format!("{}:{}", config.listen, config.port);
    debug!("Binding server to address: {bind_address}");
    let listener = TcpListener::bind(&bind_address)?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    debug!("Server bound successfully to: {local_addr}");

    let stats = Arc::new(ServerStats::new());

    if let Some(tx) = addr_tx
        && tx.send(local_addr).is_err()
    {
        return Err(AppError::InternalServerError(
            "Failed to send server address to caller".to_string(),
        ));
    }

    info!("Server listening on {local_addr} with {contact_count} contacts from {storage}");

    debug!("Creating thread pool with {} threads", config.threads);
    let pool = ThreadPool::new(config.threads);

    debug!("Registering routes");
    let mut router = Router::new();
    register_routes(&mut router, book, Some(stats.clone()));
    trace!("{} routes registered", router.len());
    let router = Arc::new(router);
    let max_body_size = config.max_body_size;

    debug!("Entering main server loop");
    loop {
        if let Some(ref rx) = shutdown_rx
            && rx.try_recv().is_ok()
        {
            info!("Shutdown signal received. Shutting down gracefully.");
            break;
        }

        match listener.accept() {
            Ok((stream, peer_addr)) => {
                trace!("Accepted connection from: {peer_addr}");

                // Ensure the accepted stream is in blocking mode
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("Failed to set stream to blocking mode: {e}");
                    continue;
                }

                let router = router.clone();
                let stats = stats.clone();
                pool.execute(move || {
                    handle_client_with_stats(stream, peer_addr, &router, max_body_size, &stats);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No connections available, sleep briefly
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                error!("Error accepting connection: {e}");
            }
        }
    }

    // Let in-flight requests finish before reporting
    drop(pool);

    let (total, successful, errors, bytes, uptime) = stats.get_stats();
    info!(
        "Final Request Stats: {} total ({} successful, {} errors), {:.2} MB served, uptime: {}s",
        total,
        successful,
        errors,
        bytes as f64 / 1024.0 / 1024.0,
        uptime.as_secs()
    );
    info!("Server shut down gracefully.");
    Ok(())
}

/// Client handler with panic isolation and timing
fn handle_client_with_stats(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: &Router,
    max_body_size: u64,
    stats: &ServerStats,
) {
    let start = Instant::now();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        handle_client(stream, router, max_body_size, Some(stats));
    }));

    // Normal success/failure and bytes are recorded in handle_client
    if result.is_err() {
        error!("Client {peer_addr} handler panicked, recording failure");
        stats.record_request(false, 0);
    }

    let processing_time = start.elapsed();
    if processing_time > Duration::from_millis(1000) {
        warn!(
            "Slow request from {}: {}ms",
            peer_addr,
            processing_time.as_millis()
        );
    } else {
        trace!(
            "Request from {} took {}ms",
            peer_addr,
            processing_time.as_millis()
        );
    }
}
