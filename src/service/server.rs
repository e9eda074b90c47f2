//! Unix-socket command service.
//!
//! The accept loop hands each connection to its own task; codec jobs are
//! pushed onto a fixed-size worker pool (a semaphore over `spawn_blocking`)
//! so one slow compression cannot starve frame handling. A job runs to
//! completion or fails; failures are logged and never take the pool down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::cache::DumpCache;
use crate::codec::{compress_dump, decompress_dump};
use crate::dump::MemoryDump;
use crate::error::{DedupError, DedupResult};
use crate::service::protocol::{Request, ACK_FAIL, ACK_OK};

/// Connections idle longer than this are dropped.
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Command service listening on a Unix stream socket.
pub struct CommandServer {
    socket_path: PathBuf,
    workers: usize,
    cache: Arc<DumpCache>,
}

impl CommandServer {
    pub fn new(socket_path: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            socket_path: socket_path.into(),
            workers: workers.max(1),
            cache: Arc::new(DumpCache::new()),
        }
    }

    /// Shared reference-dump cache, mainly for tests.
    pub fn cache(&self) -> Arc<DumpCache> {
        Arc::clone(&self.cache)
    }

    /// Binds the socket and serves requests until ctrl-c.
    pub async fn run(self) -> DedupResult<()> {
        // stale socket files from a previous run would make bind fail
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| DedupError::io("bind", &self.socket_path, e))?;

        info!(
            socket = %self.socket_path.display(),
            workers = self.workers,
            "command service listening"
        );

        let pool = Arc::new(Semaphore::new(self.workers));
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let cache = Arc::clone(&self.cache);
                            let pool = Arc::clone(&pool);
                            tokio::spawn(async move {
                                handle_client(stream, cache, pool).await;
                            });
                        }
                        Err(e) => warn!("failed to accept client connection: {e}"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

/// Reads frames off one client connection until it closes or goes idle.
async fn handle_client(mut stream: UnixStream, cache: Arc<DumpCache>, pool: Arc<Semaphore>) {
    loop {
        let mut len_buf = [0u8; 1];
        match timeout(CLIENT_IDLE_TIMEOUT, stream.read_exact(&mut len_buf)).await {
            Err(_) => {
                info!("client exceeded idle timeout");
                return;
            }
            Ok(Err(_)) => return, // peer closed
            Ok(Ok(_)) => {}
        }

        let frame_len = usize::from(len_buf[0]) * 8;
        if frame_len == 0 {
            warn!("received frame with zero length");
            return;
        }

        let mut frame = vec![0u8; frame_len];
        match timeout(CLIENT_IDLE_TIMEOUT, stream.read_exact(&mut frame)).await {
            Err(_) | Ok(Err(_)) => {
                warn!("received broken or incomplete message, closing connection");
                return;
            }
            Ok(Ok(_)) => {}
        }

        let msg_id = frame[0];
        let parsed = Request::parse(&frame[1..]);
        let ack = if parsed.is_ok() { ACK_OK } else { ACK_FAIL };

        // the ACK confirms acceptance only; job results surface in the logs
        // and the output files
        if let Err(e) = stream.write_all(&[msg_id, ack]).await {
            warn!("failed to send ACK: {e}");
            return;
        }

        match parsed {
            Ok(request) => {
                debug!(?request, msg_id, "accepted request");
                dispatch(request, Arc::clone(&cache), Arc::clone(&pool)).await;
            }
            Err(e) => warn!(msg_id, "rejecting request: {e}"),
        }
    }
}

/// Queues a request on the worker pool.
async fn dispatch(request: Request, cache: Arc<DumpCache>, pool: Arc<Semaphore>) {
    let Ok(permit) = pool.acquire_owned().await else {
        // the semaphore is never closed while the server runs
        return;
    };

    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        if let Err(e) = run_request(&request, &cache) {
            error!("request failed: {e}");
        }
    });
}

/// Executes one request synchronously on a worker.
pub fn run_request(request: &Request, cache: &DumpCache) -> DedupResult<()> {
    match request {
        Request::AddReference { path, page_size } => {
            info!(path = %path.display(), "add reference");
            cache.add(path, *page_size)
        }
        Request::Compress {
            reference,
            source,
            out,
            page_size,
            method,
        } => {
            info!(source = %source.display(), "compress");
            let refdump = cache.get(reference, *page_size)?;
            let src = MemoryDump::load(source, *page_size)?;
            compress_dump(&refdump, &src, out, *method)
        }
        Request::Decompress { input, out } => {
            info!(input = %input.display(), "decompress");
            decompress_dump(input, out, cache)
        }
        Request::DeleteReference { path } => {
            info!(path = %path.display(), "delete reference");
            cache.remove(path);
            Ok(())
        }
    }
}

/// Convenience wrapper used by the CLI service subcommand.
pub async fn serve(socket_path: &Path, workers: usize) -> DedupResult<()> {
    CommandServer::new(socket_path, workers).run().await
}
