//! Blocking facade over the async client, owning its runtime.
//!
//! This is the "managed executor" mode: the client builds a multi-thread
//! runtime (sized by [`ClientOptions::worker_threads`]) and drives every
//! operation to completion on the calling thread. Use the async
//! [`Client`](crate::client::Client) directly when the application already
//! runs a runtime.

use tokio::runtime::{Builder, Runtime};

use crate::client::{pass_through_resolver, Client, ClientOptions, SiblingResolver};
use crate::error::Result;
use crate::object::Object;

/// Synchronous client with an owned runtime.
pub struct BlockingClient {
    runtime: Option<Runtime>,
    client: Option<Client>,
}

impl BlockingClient {
    /// Connects with default options and the pass-through resolver.
    pub fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_options(host, port, std::sync::Arc::new(pass_through_resolver), ClientOptions::default())
    }

    /// Connects with an explicit resolver and options. Fails only if the
    /// runtime cannot be built.
    pub fn with_options(
        host: impl Into<String>,
        port: u16,
        resolver: SiblingResolver,
        options: ClientOptions,
    ) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all();
        if let Some(threads) = options.worker_threads {
            builder.worker_threads(threads);
        }
        let runtime = builder.build()?;
        let client = {
            let _guard = runtime.enter();
            Client::with_options(host, port, resolver, options)
        };
        Ok(Self { runtime: Some(runtime), client: Some(client) })
    }

    /// Blocking fetch; see [`Client::fetch`].
    pub fn fetch(&self, bucket: impl Into<String>, key: impl Into<String>) -> Result<Object> {
        self.runtime().block_on(self.client().fetch(bucket, key))
    }

    /// Blocking store of a raw value; see [`Client::store`].
    pub fn store(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.runtime().block_on(self.client().store(bucket, key, value))
    }

    /// Blocking store of an object; see [`Client::store_object`].
    pub fn store_object(&self, object: Object) -> Result<()> {
        self.runtime().block_on(self.client().store_object(object))
    }

    /// Blocking remove; see [`Client::remove`].
    pub fn remove(&self, bucket: impl Into<String>, key: impl Into<String>) -> Result<()> {
        self.runtime().block_on(self.client().remove(bucket, key))
    }

    /// Blocking remove of an object; see [`Client::remove_object`].
    pub fn remove_object(&self, object: Object) -> Result<()> {
        self.runtime().block_on(self.client().remove_object(object))
    }

    /// Shuts the pool down gracefully and stops the owned runtime. Also
    /// happens on drop.
    pub fn close(mut self) {
        self.close_inner();
    }

    fn close_inner(&mut self) {
        if let (Some(runtime), Some(mut client)) = (self.runtime.take(), self.client.take()) {
            runtime.block_on(client.shutdown());
            drop(client);
            drop(runtime);
        }
    }

    fn runtime(&self) -> &Runtime {
        self.runtime.as_ref().expect("runtime lives until close")
    }

    fn client(&self) -> &Client {
        self.client.as_ref().expect("client lives until close")
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        self.close_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn resolution_failure_surfaces_synchronously() {
        let client = BlockingClient::connect("no such host", 8087).unwrap();
        let err = client.fetch("b", "k").unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed { .. }));
        client.close();
    }

    #[test]
    fn close_is_reentrant_with_drop() {
        let client = BlockingClient::connect("no such host", 8087).unwrap();
        client.close();
    }
}
