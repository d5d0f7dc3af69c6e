//! Connection pool: admission control and request-to-connection dispatch.
//!
//! The pool owns a bounded [`RendezvousQueue`] of packaged requests and one
//! worker task per connection. Each worker loops: take the head request,
//! prove the pool is still alive against the lifetime barrier, dispatch on
//! its own transport, deliver the result, and immediately go back to taking
//! — so a handler that submits from its continuation is simply next in the
//! queue and can be served by the very same connection.
//!
//! Initial name resolution happens once, asynchronously, before any
//! connection exists. If it fails the pool enters a terminal failing state
//! in which a single drainer completes every queued and future request with
//! the resolution error, until the pool is destroyed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::barrier::{BarrierRef, LifetimeBarrier};
use crate::connection::{FramedConnection, Transport, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{Error, Result};
use crate::queue::RendezvousQueue;
use crate::resolve::resolve;

/// A request packaged for dispatch.
pub struct PackagedRequest {
    /// Opaque, already-encoded request frame payload.
    pub payload: Vec<u8>,
    /// Total response budget measured from write completion; `None` waits
    /// indefinitely.
    pub deadline: Option<Duration>,
    /// Single-shot delivery channel; dropped without sending when the pool
    /// shuts down first.
    pub completion: oneshot::Sender<Result<Vec<u8>>>,
}

/// Pool sizing and connect behavior.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Queue capacity; offers beyond it wait (producer back-pressure).
    pub high_watermark: usize,
    /// Number of sockets kept to the endpoint.
    pub max_connections: usize,
    /// Per-endpoint connect budget.
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            high_watermark: 4096,
            max_connections: 8,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// A pool of framed connections to one logical endpoint.
pub struct ConnectionPool {
    queue: Arc<RendezvousQueue<PackagedRequest>>,
    cancel: CancellationToken,
    barrier: LifetimeBarrier,
    supervisor: Option<JoinHandle<()>>,
    closed: bool,
}

impl ConnectionPool {
    /// Creates a pool and starts resolving `host`. Returns immediately; the
    /// first requests queue up behind the resolution.
    pub fn connect(host: impl Into<String>, port: u16, options: PoolOptions) -> Self {
        let host = host.into();
        let queue = Arc::new(RendezvousQueue::new(
            options.high_watermark,
            options.max_connections,
        ));
        let cancel = CancellationToken::new();
        let barrier = LifetimeBarrier::new();
        let supervisor = tokio::spawn(Self::run(
            host,
            port,
            options,
            Arc::clone(&queue),
            cancel.clone(),
            barrier.issue(),
        ));
        Self { queue, cancel, barrier, supervisor: Some(supervisor), closed: false }
    }

    /// Builds a pool over pre-established transports, one worker each,
    /// skipping resolution. Intended for tests with scripted transports.
    pub fn with_transports(transports: Vec<Box<dyn Transport>>, high_watermark: usize) -> Self {
        assert!(!transports.is_empty(), "a pool needs at least one transport");
        let queue = Arc::new(RendezvousQueue::new(high_watermark, transports.len()));
        let cancel = CancellationToken::new();
        let barrier = LifetimeBarrier::new();
        let supervisor = tokio::spawn(Self::run_workers(
            transports,
            Arc::clone(&queue),
            cancel.clone(),
            barrier.issue(),
        ));
        Self { queue, cancel, barrier, supervisor: Some(supervisor), closed: false }
    }

    async fn run(
        host: String,
        port: u16,
        options: PoolOptions,
        queue: Arc<RendezvousQueue<PackagedRequest>>,
        cancel: CancellationToken,
        barrier: BarrierRef,
    ) {
        let resolved = tokio::select! {
            _ = cancel.cancelled() => return,
            resolved = resolve(&host, port) => resolved,
        };
        match resolved {
            Ok(endpoints) => {
                debug!(host = %host, endpoints = endpoints.len(), "resolved, starting workers");
                let endpoints = Arc::new(endpoints);
                let transports = (0..options.max_connections)
                    .map(|_| {
                        Box::new(FramedConnection::new(
                            Arc::clone(&endpoints),
                            options.connect_timeout,
                        )) as Box<dyn Transport>
                    })
                    .collect();
                Self::run_workers(transports, queue, cancel, barrier).await;
            }
            Err(err) => {
                warn!(host = %host, error = %err, "resolution failed, draining requests");
                Self::drain(host, queue, cancel, barrier).await;
            }
        }
    }

    async fn run_workers(
        transports: Vec<Box<dyn Transport>>,
        queue: Arc<RendezvousQueue<PackagedRequest>>,
        cancel: CancellationToken,
        barrier: BarrierRef,
    ) {
        let mut workers = JoinSet::new();
        for transport in transports {
            workers.spawn(Self::worker(
                transport,
                Arc::clone(&queue),
                cancel.clone(),
                barrier.clone(),
            ));
        }
        while workers.join_next().await.is_some() {}
    }

    async fn worker(
        mut transport: Box<dyn Transport>,
        queue: Arc<RendezvousQueue<PackagedRequest>>,
        cancel: CancellationToken,
        barrier: BarrierRef,
    ) {
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                taken = queue.take() => match taken {
                    Some(request) => request,
                    None => break,
                },
            };
            let PackagedRequest { payload, deadline, completion } = request;
            let Some(_guard) = barrier.try_use() else { break };
            let result = tokio::select! {
                // Dropping the exchange mid-flight also drops the completion
                // sender; the caller observes an abort.
                _ = cancel.cancelled() => break,
                result = transport.send_request(payload, deadline) => result,
            };
            // Delivery re-arms this worker implicitly: the next loop
            // iteration is already taking before the caller runs.
            let _ = completion.send(result);
        }
    }

    async fn drain(
        host: String,
        queue: Arc<RendezvousQueue<PackagedRequest>>,
        cancel: CancellationToken,
        barrier: BarrierRef,
    ) {
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                taken = queue.take() => match taken {
                    Some(request) => request,
                    None => break,
                },
            };
            let Some(_guard) = barrier.try_use() else { break };
            let _ = request
                .completion
                .send(Err(Error::ResolutionFailed { host: host.clone() }));
        }
    }

    /// Queues a packaged request, waiting while the pool is at its high
    /// watermark. After close the request is dropped; the caller observes a
    /// closed completion channel.
    pub async fn submit(&self, request: PackagedRequest) {
        self.queue.offer(request).await;
    }

    /// Packages `payload` with a fresh completion channel, submits it, and
    /// awaits the response.
    pub async fn send(&self, payload: Vec<u8>, deadline: Option<Duration>) -> Result<Vec<u8>> {
        let (completion, response) = oneshot::channel();
        self.submit(PackagedRequest { payload, deadline, completion }).await;
        match response.await {
            Ok(result) => result,
            Err(_) => Err(Error::Aborted),
        }
    }

    /// Number of requests waiting in the queue (excluding in-flight ones).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Graceful shutdown: stop accepting work, interrupt in-flight
    /// dispatches at their next await point, and wait for every worker to
    /// finish. No completion fires after this returns.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.queue.close();
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.await;
        }
        self.barrier.close();
    }
}

impl Drop for ConnectionPool {
    /// Blocking close in the order close-queue, close-barrier, drop
    /// connections. Safe on a multi-thread runtime (other workers keep
    /// polling the dispatch tasks while this thread waits); prefer
    /// [`ConnectionPool::shutdown`] where an async context is available.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.queue.close();
        self.barrier.close();
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
    }
}
