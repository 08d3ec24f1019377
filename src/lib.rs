//! # ratline
//!
//! Durable request/response messaging over unreliable, closable
//! connections.
//!
//! A ratline is a rung of rope rigging: a small line you can trust to hold.
//! This crate turns a channel that can drop at any moment into client and
//! server abstractions that survive the drops: requests are retried across
//! reconnects until they complete or their deadline fires, and the caller
//! only ever sees a clean terminal outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Application Code                   │
//! ├─────────────────────────────────────────────────┤
//! │  SerialClient / PipelinedClient                 │
//! │  • FIFO or pipelined request/response           │
//! │  • Per-request deadlines, retry across loss     │
//! ├─────────────────────────────────────────────────┤
//! │  Supervisor (connection management)             │
//! │  • Exactly one live channel at a time           │
//! │  • Automatic reconnection with backoff          │
//! ├─────────────────────────────────────────────────┤
//! │  Channel (transport abstraction)                │
//! │  • MemoryChannel: in-process duplex pairs       │
//! │  • TcpChannel: framed, checksummed TCP          │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Supervisor`] | Keeps one live [`Channel`], reconnecting on loss |
//! | [`SerialClient`] | One request at a time, strict FIFO delivery |
//! | [`PipelinedClient`] | Many in-flight requests, FIFO on the wire |
//! | [`serve_serial`] / [`serve_pipelined`] | Server-side handler loops |
//! | [`ReplyPromise`] / [`ReplyFuture`] | Write-once reply handles |
//!
//! ## Quick start
//!
//! ```ignore
//! use ratline::{ConnectFn, SerialClient, SupervisorConfig};
//!
//! let client = SerialClient::new(
//!     ConnectFn(|| async { dial_my_service().await }),
//!     SupervisorConfig::named("my-service"),
//! );
//!
//! let reply = client.request("ping".to_string(), None).await?;
//! ```
//!
//! The runtime model is single-threaded: background loops are spawned with
//! `spawn_local`, so clients, servers, and supervisors must be created
//! inside a `LocalSet` or a current-thread local runtime.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod channel;
pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod reply;
pub mod server;
pub mod slot;
pub mod supervisor;
pub mod wire;

pub use channel::{Channel, MemoryChannel, SendError, TcpChannel, TcpConnector};
pub use client::{PipelinedClient, SerialClient};
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use error::RequestError;
pub use message::Message;
pub use reply::{ReplyFuture, ReplyPromise, reply_pair};
pub use server::{ServerHandle, serve_pipelined, serve_serial};
pub use slot::Slot;
pub use supervisor::{Conn, Connect, ConnectFn, Supervisor, SupervisorConfig};
pub use wire::{HEADER_SIZE, MAX_PAYLOAD_SIZE, WireError, encode_frame, try_decode_frame};
