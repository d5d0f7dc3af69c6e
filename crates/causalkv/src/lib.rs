#![warn(missing_docs)]

//! Asynchronous client for a distributed key-value store.
//!
//! The store speaks a length-framed, tagged protobuf protocol over
//! persistent TCP connections. This crate provides:
//! - fetch/store/remove against bucket/key pairs, multiplexed over a pool
//!   of sockets to a single logical endpoint;
//! - per-request deadlines, lazy connection, and ordered endpoint failover;
//! - application-policy resolution of divergent replicas (siblings), with
//!   an automatic write-back of the resolved content;
//! - a blocking facade that owns its runtime, for applications without one.
//!
//! The async [`Client`] is the main entry point; [`BlockingClient`] wraps
//! it for synchronous callers. Lower layers ([`pool`], [`connection`],
//! [`queue`], [`barrier`]) are public for reuse and testing but most
//! applications never touch them.

pub mod barrier;
pub mod blocking;
pub mod client;
pub mod completion;
pub mod connection;
pub mod error;
pub mod frame;
pub mod object;
pub mod pool;
pub mod proto;
pub mod queue;
pub mod resolve;

pub use blocking::BlockingClient;
pub use client::{pass_through_resolver, Client, ClientOptions, SiblingResolution, SiblingResolver};
pub use completion::{BlockingGroup, CompletionGroup, CompletionToken};
pub use error::{Error, Result};
pub use object::Object;
pub use pool::{ConnectionPool, PackagedRequest, PoolOptions};
