//! The channel primitive the messaging core is built on.
//!
//! A [`Channel`] is an ordered, async, closable queue of messages with a
//! non-destructive [`fork`](Channel::fork) for independent readers. The
//! core consumes this trait; it never cares what sits underneath. Two
//! implementations ship with the crate:
//!
//! - [`MemoryChannel`]: an in-process duplex pair, the reference
//!   implementation and the workhorse for tests;
//! - [`TcpChannel`]: codec-encoded messages over length-prefixed,
//!   checksummed frames on a TCP stream.
//!
//! Closure is monotonic: once closed, a channel never reopens, readers
//! drain whatever is already buffered, and then observe the end of the
//! stream as `None`.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

mod mem;
mod tcp;

pub use mem::MemoryChannel;
pub use tcp::{TcpChannel, TcpConnector};

pub(crate) use mem::{Subscription, Topic};

/// Error returned by [`Channel::send`] when the channel has been closed.
/// Carries the undelivered message back to the caller.
#[derive(Debug, Error)]
#[error("channel closed")]
pub struct SendError<M>(
    /// The message that could not be delivered.
    pub M,
);

/// An ordered, async, closable bidirectional message queue.
///
/// `Clone` produces another handle to the *same* endpoint — clones share
/// one reader cursor. [`fork`](Channel::fork) instead subscribes a fresh,
/// independent reader that observes every message from the fork onward;
/// the connection supervisor uses this to watch for channel loss without
/// stealing messages from the owning client.
#[async_trait(?Send)]
pub trait Channel: Clone + 'static {
    /// Message type carried in both directions.
    type Msg: Message;

    /// Enqueue a message for the remote side.
    ///
    /// Messages are never lost until [`close`](Channel::close); sending on
    /// a closed channel returns the message inside [`SendError`].
    async fn send(&self, msg: Self::Msg) -> Result<(), SendError<Self::Msg>>;

    /// Read the next message. Returns `None` iff the channel is drained
    /// (closed and empty).
    async fn recv(&self) -> Option<Self::Msg>;

    /// Close the channel. Monotonic and idempotent.
    fn close(&self);

    /// True iff the channel is closed and this reader has consumed
    /// everything.
    fn is_drained(&self) -> bool;

    /// Subscribe an independent reader of the same inbound stream.
    fn fork(&self) -> Self;
}
