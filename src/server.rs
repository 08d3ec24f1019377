//! Request-handling server loops.
//!
//! A server reads requests off a channel, hands each one to the user's
//! handler together with a [`ReplyPromise`], and writes the settled reply
//! back on the same channel. Two shapes:
//!
//! - [`serve_serial`]: one request at a time; the next request is not read
//!   until the current reply has been written.
//! - [`serve_pipelined`]: requests are read as fast as they arrive and
//!   handled concurrently, but replies are written in request-arrival
//!   order regardless of handler completion order.
//!
//! The handler must settle its promise exactly once — with a reply value,
//! or with [`RequestError::Transport`] carrying an error-carrier value
//! that is written back verbatim. A handler that drops its promise
//! unsettled stalls that reply slot permanently; the server makes no
//! attempt to detect this.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::error::RequestError;
use crate::reply::{ReplyFuture, ReplyPromise, reply_pair};

/// Running server; close it to stop serving.
pub struct ServerHandle<C: Channel> {
    channel: C,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: Channel> ServerHandle<C> {
    /// Close the channel and wait for the serving loops to finish.
    pub async fn close(self) {
        self.channel.close();
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Wait for the serving loops to finish without closing the channel,
    /// e.g. after the remote side has disconnected.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Serve requests one at a time: read, handle, await the reply, write it
/// back, repeat until the channel drains.
pub fn serve_serial<C, H>(ch: C, mut handler: H) -> ServerHandle<C>
where
    C: Channel,
    H: FnMut(ReplyPromise<C::Msg>, C::Msg) + 'static,
{
    let reader = ch.clone();
    let task = tokio::task::spawn_local(async move {
        while let Some(request) = reader.recv().await {
            let (promise, reply) = reply_pair();
            handler(promise, request);
            if write_reply(&reader, reply).await.is_err() {
                break;
            }
        }
    });

    ServerHandle {
        channel: ch,
        tasks: vec![task],
    }
}

/// Serve requests concurrently while emitting replies in request-arrival
/// order.
///
/// The request loop reads and dispatches to the handler immediately,
/// queueing each pending reply; the response loop awaits the queue head
/// and writes replies back, so a slow early handler holds back faster
/// later ones.
pub fn serve_pipelined<C, H>(ch: C, mut handler: H) -> ServerHandle<C>
where
    C: Channel,
    H: FnMut(ReplyPromise<C::Msg>, C::Msg) + 'static,
{
    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<ReplyFuture<C::Msg>>();

    let reader = ch.clone();
    let request_task = tokio::task::spawn_local(async move {
        while let Some(request) = reader.recv().await {
            let (promise, reply) = reply_pair();
            handler(promise, request);
            if replies_tx.send(reply).is_err() {
                break;
            }
        }
    });

    let writer = ch.clone();
    let response_task = tokio::task::spawn_local(async move {
        while let Some(reply) = replies_rx.recv().await {
            if write_reply(&writer, reply).await.is_err() {
                break;
            }
        }
    });

    ServerHandle {
        channel: ch,
        tasks: vec![request_task, response_task],
    }
}

/// Await a settled reply and write it back. Error carriers go out
/// verbatim; a reply that cannot be written ends the serving loop.
async fn write_reply<C: Channel>(ch: &C, reply: ReplyFuture<C::Msg>) -> Result<(), ()> {
    let msg = match reply.await {
        Ok(msg) | Err(RequestError::Transport(msg)) => msg,
        Err(error) => {
            tracing::warn!(%error, "handler settled without a reply value");
            return Ok(());
        }
    };
    if ch.send(msg).await.is_err() {
        tracing::warn!("connection closed before reply could be written");
        return Err(());
    }
    Ok(())
}
