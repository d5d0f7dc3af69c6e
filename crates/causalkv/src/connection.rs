//! Single-socket, length-framed protocol connection.
//!
//! A [`FramedConnection`] owns at most one TCP socket and carries one
//! request at a time: connect if needed (walking the endpoint list with a
//! per-attempt budget), write the framed payload, then read the framed
//! response under the request deadline. Any failure closes the socket so the
//! next request reconnects from scratch; retry policy lives above this
//! layer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};

/// Default per-endpoint connect budget.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// One request/response exchange at a time over some medium.
///
/// The pool dispatches through this trait so it can be exercised with
/// scripted transports in tests.
#[async_trait]
pub trait Transport: Send {
    /// Sends one request and waits for its response.
    ///
    /// `deadline` bounds the wait for the response once the request has been
    /// written; `None` waits indefinitely. At most one exchange may be in
    /// flight per transport.
    async fn send_request(
        &mut self,
        payload: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>>;
}

/// A lazily-connected socket to one logical endpoint (several addresses,
/// tried in order).
pub struct FramedConnection {
    endpoints: Arc<Vec<SocketAddr>>,
    socket: Option<TcpStream>,
    payload_buf: Vec<u8>,
    connect_timeout: Duration,
    accepts_requests: AtomicBool,
}

impl FramedConnection {
    /// Creates a disconnected connection over the given endpoint list.
    pub fn new(endpoints: Arc<Vec<SocketAddr>>, connect_timeout: Duration) -> Self {
        Self {
            endpoints,
            socket: None,
            payload_buf: Vec::new(),
            connect_timeout,
            accepts_requests: AtomicBool::new(true),
        }
    }

    /// True whenever no request is in flight.
    pub fn accepts_requests(&self) -> bool {
        self.accepts_requests.load(Ordering::Acquire)
    }

    async fn connect_any(&self) -> Result<TcpStream> {
        for addr in self.endpoints.iter() {
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected");
                    return Ok(stream);
                }
                Ok(Err(err)) => {
                    debug!(%addr, error = %err, "connect failed, trying next endpoint");
                }
                Err(_) => {
                    debug!(%addr, budget = ?self.connect_timeout, "connect timed out, trying next endpoint");
                }
            }
        }
        Err(Error::ConnectionRefused)
    }

    async fn exchange(&mut self, payload: &[u8], deadline: Option<Duration>) -> Result<Vec<u8>> {
        if self.socket.is_none() {
            self.socket = Some(self.connect_any().await?);
        }
        let socket = self.socket.as_mut().expect("socket established above");

        write_frame(socket, payload).await?;
        trace!(bytes = payload.len(), "request written");

        // The deadline is a total read budget measured from write completion.
        let read = read_frame(socket, &mut self.payload_buf);
        match deadline {
            Some(budget) => match timeout(budget, read).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::TimedOut),
            },
            None => read.await?,
        }
        trace!(bytes = self.payload_buf.len(), "response read");
        Ok(std::mem::take(&mut self.payload_buf))
    }
}

#[async_trait]
impl Transport for FramedConnection {
    async fn send_request(
        &mut self,
        payload: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>> {
        assert!(
            self.accepts_requests.swap(false, Ordering::AcqRel),
            "a second request was submitted while one was in flight"
        );
        let result = self.exchange(&payload, deadline).await.map_err(map_transport_error);
        if result.is_err() {
            // The socket state is unknown after a failure; reconnect on the
            // next request.
            self.socket = None;
            self.payload_buf.clear();
        }
        self.accepts_requests.store(true, Ordering::Release);
        result
    }
}

fn map_transport_error(err: Error) -> Error {
    match err {
        Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => Error::NotConnected,
        other => other,
    }
}
