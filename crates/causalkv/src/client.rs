//! The key-value client: request encoding, response decoding, and the
//! sibling-resolution write-back loop.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::object::Object;
use crate::pool::{ConnectionPool, PoolOptions};
use crate::proto::{self, MessageCode};

/// What to do with a conflicted object once the resolver has had its say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingResolution {
    /// Deliver the conflicted object as-is; the caller deals with it.
    Skip,
    /// Write the resolved content back before delivering.
    Store,
}

/// User-supplied conflict policy. The resolver receives the conflicted
/// object, may resolve it in place (it must, before answering
/// [`SiblingResolution::Store`]), and says whether the result should be
/// written back.
pub type SiblingResolver = Arc<dyn Fn(&mut Object) -> SiblingResolution + Send + Sync>;

/// The default resolver: hand conflicts to the caller untouched.
pub fn pass_through_resolver(_conflicted: &mut Object) -> SiblingResolution {
    SiblingResolution::Skip
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Queue capacity before submissions start waiting.
    pub high_watermark: usize,
    /// Sockets kept to the endpoint.
    pub max_connections: usize,
    /// Per-request total deadline, milliseconds; also forwarded to the
    /// server in the protocol's timeout field.
    pub deadline_ms: u64,
    /// Per-endpoint connect budget, milliseconds.
    pub connection_timeout_ms: u64,
    /// Thread count for [`BlockingClient`](crate::blocking::BlockingClient)'s
    /// owned runtime; `None` uses the hardware concurrency. Ignored (and
    /// meaningless) when the async client runs on a caller-provided
    /// runtime.
    pub worker_threads: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            high_watermark: 4096,
            max_connections: 8,
            deadline_ms: 3000,
            connection_timeout_ms: 1500,
            worker_threads: None,
        }
    }
}

/// Asynchronous client for one logical endpoint.
pub struct Client {
    pool: ConnectionPool,
    resolver: SiblingResolver,
    deadline: Duration,
}

impl Client {
    /// Connects to `host:port` with default options and the pass-through
    /// resolver. Returns immediately; resolution and connections are lazy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_options(host, port, Arc::new(pass_through_resolver), ClientOptions::default())
    }

    /// Connects with an explicit resolver and options.
    pub fn with_options(
        host: impl Into<String>,
        port: u16,
        resolver: SiblingResolver,
        options: ClientOptions,
    ) -> Self {
        let pool = ConnectionPool::connect(
            host,
            port,
            PoolOptions {
                high_watermark: options.high_watermark,
                max_connections: options.max_connections,
                connect_timeout: Duration::from_millis(options.connection_timeout_ms),
            },
        );
        Self::with_pool(pool, resolver, Duration::from_millis(options.deadline_ms))
    }

    /// Wraps an existing pool; used by tests to drive the client over
    /// scripted transports.
    pub(crate) fn with_pool(
        pool: ConnectionPool,
        resolver: SiblingResolver,
        deadline: Duration,
    ) -> Self {
        Self { pool, resolver, deadline }
    }

    /// Graceful shutdown of the underlying pool. Outstanding operations
    /// complete with [`Error::Aborted`].
    pub async fn shutdown(&mut self) {
        self.pool.shutdown().await;
    }

    /// Fetches `bucket`/`key`. An object that never existed comes back
    /// valid with `exists() == false`. A conflicted result is first offered
    /// to the resolver; if it answers [`SiblingResolution::Store`] the
    /// resolved content is written back (preserving the causal clock)
    /// before the object is returned with its fresh clock.
    pub async fn fetch(&self, bucket: impl Into<String>, key: impl Into<String>) -> Result<Object> {
        let bucket = bucket.into();
        let key = key.into();
        let request = proto::GetRequest {
            bucket: bucket.clone().into_bytes(),
            key: key.clone().into_bytes(),
            deletedvclock: Some(true),
            timeout: self.timeout_field(),
        };
        let raw = self.exchange(MessageCode::GetReq, &request).await?;
        let response: proto::GetResponse = decode(MessageCode::GetResp, &raw)?;

        let vclock = response.vclock.unwrap_or_default();
        if vclock.is_empty() {
            return Ok(Object::new(bucket, key));
        }
        let mut fetched = Object::from_response(bucket, key, vclock, response.content);
        if fetched.in_conflict() {
            debug!(
                bucket = fetched.bucket(),
                key = fetched.key(),
                siblings = fetched.siblings().len(),
                "fetched a conflicted object"
            );
            if (self.resolver)(&mut fetched) == SiblingResolution::Store {
                return self.store_resolution(fetched).await;
            }
        }
        Ok(fetched)
    }

    /// Stores `value` under `bucket`/`key` without a causal clock (a blind
    /// create or overwrite).
    pub async fn store(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Result<()> {
        let request = proto::PutRequest {
            bucket: bucket.into().into_bytes(),
            key: key.into().into_bytes(),
            vclock: None,
            content: Some(proto::Content { value: value.into(), ..Default::default() }),
            return_head: None,
            timeout: self.timeout_field(),
        };
        let raw = self.exchange(MessageCode::PutReq, &request).await?;
        decode::<proto::PutResponse>(MessageCode::PutResp, &raw)?;
        Ok(())
    }

    /// Stores an object previously fetched (or built), forwarding its
    /// causal clock. Server-maintained fields are cleared before
    /// serialization so the write cannot overwrite them.
    pub async fn store_object(&self, object: Object) -> Result<()> {
        let mut content = object.content().clone();
        content.deleted = None;
        content.last_mod = None;
        content.last_mod_usecs = None;
        let vclock = object.vclock();
        let request = proto::PutRequest {
            bucket: object.bucket().as_bytes().to_vec(),
            key: object.key().as_bytes().to_vec(),
            vclock: if vclock.is_empty() { None } else { Some(vclock.to_vec()) },
            content: Some(content),
            return_head: None,
            timeout: self.timeout_field(),
        };
        let raw = self.exchange(MessageCode::PutReq, &request).await?;
        decode::<proto::PutResponse>(MessageCode::PutResp, &raw)?;
        Ok(())
    }

    /// Removes `bucket`/`key` without a causal clock.
    pub async fn remove(&self, bucket: impl Into<String>, key: impl Into<String>) -> Result<()> {
        let request = proto::DelRequest {
            bucket: bucket.into().into_bytes(),
            key: key.into().into_bytes(),
            vclock: None,
            timeout: None,
        };
        let raw = self.exchange(MessageCode::DelReq, &request).await?;
        decode::<proto::DelResponse>(MessageCode::DelResp, &raw)?;
        Ok(())
    }

    /// Removes an object, forwarding the causal clock from its fetch.
    pub async fn remove_object(&self, object: Object) -> Result<()> {
        let vclock = object.vclock();
        let request = proto::DelRequest {
            bucket: object.bucket().as_bytes().to_vec(),
            key: object.key().as_bytes().to_vec(),
            vclock: if vclock.is_empty() { None } else { Some(vclock.to_vec()) },
            timeout: None,
        };
        let raw = self.exchange(MessageCode::DelReq, &request).await?;
        decode::<proto::DelResponse>(MessageCode::DelResp, &raw)?;
        Ok(())
    }

    /// Writes a resolved conflict back and installs the returned clock.
    async fn store_resolution(&self, mut resolved: Object) -> Result<Object> {
        let mut content = resolved.content().clone();
        if !resolved.exists() {
            // The resolver picked a tombstone; store it as such.
            content.deleted = Some(true);
        }
        let request = proto::PutRequest {
            bucket: resolved.bucket().as_bytes().to_vec(),
            key: resolved.key().as_bytes().to_vec(),
            vclock: Some(resolved.vclock().to_vec()),
            content: Some(content),
            return_head: Some(true),
            timeout: self.timeout_field(),
        };
        let raw = self.exchange(MessageCode::PutReq, &request).await?;
        let response: proto::PutResponse = decode(MessageCode::PutResp, &raw)?;

        let vclock = response.vclock.unwrap_or_default();
        if vclock.is_empty() || response.content.len() > 1 {
            debug!(
                bucket = resolved.bucket(),
                key = resolved.key(),
                contents = response.content.len(),
                "write-back did not converge"
            );
            return Err(Error::ConflictNotResolved);
        }
        resolved.set_vclock(vclock);
        Ok(resolved)
    }

    async fn exchange(&self, code: MessageCode, message: &impl Message) -> Result<Vec<u8>> {
        let body = message.encode_to_vec();
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(code as u8);
        payload.extend_from_slice(&body);
        self.pool.send(payload, Some(self.deadline)).await
    }

    fn timeout_field(&self) -> Option<u32> {
        Some(self.deadline.as_millis().min(u32::MAX as u128) as u32)
    }
}

/// Splits a tagged response and decodes its payload, mapping the server's
/// error message type and any malformed frame to the right error class.
fn decode<M: Message + Default>(code: MessageCode, response: &[u8]) -> Result<M> {
    let Some((&tag, body)) = response.split_first() else {
        return Err(Error::InvalidResponse { reason: "empty response frame".into() });
    };
    if tag == MessageCode::ErrorResp as u8 {
        let parsed = proto::ErrorResponse::decode(body).map_err(|err| Error::InvalidResponse {
            reason: format!("unparseable error response: {err}"),
        })?;
        let message = String::from_utf8_lossy(&parsed.errmsg).into_owned();
        warn!(code = parsed.errcode, message = %message, "server reported an error");
        return Err(Error::ServerError { message });
    }
    if tag != code as u8 {
        return Err(Error::InvalidResponse {
            reason: format!("unexpected message code {tag}, wanted {}", code as u8),
        });
    }
    M::decode(body)
        .map_err(|err| Error::InvalidResponse { reason: format!("unparseable payload: {err}") })
}
