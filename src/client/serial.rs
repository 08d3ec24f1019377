//! One-at-a-time request/response client.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Op, Pending, arm_deadline};
use crate::channel::Channel;
use crate::error::RequestError;
use crate::message::Message;
use crate::reply::{ReplyFuture, reply_pair};
use crate::supervisor::{Conn, Connect, Supervisor, SupervisorConfig};

/// Serial client: strict FIFO request/response over a supervised
/// connection.
///
/// Requests are processed one at a time; request N+1 is not sent until
/// N's handle is terminal. A request caught by a connection loss is
/// retried on the next connection until it completes or its deadline
/// fires, so responses are delivered to callers in exact submission
/// order.
pub struct SerialClient<C: Channel> {
    ops: mpsc::UnboundedSender<Op<C::Msg>>,
    active: Rc<Cell<bool>>,
}

impl<C: Channel> SerialClient<C> {
    /// Create a client supervising connections from `connector`.
    pub fn new<G>(connector: G, config: SupervisorConfig) -> Self
    where
        G: Connect<Channel = C>,
    {
        Self::with_supervisor(Supervisor::new(connector, config))
    }

    /// Create a client over an existing supervisor, e.g. one built with
    /// [`Supervisor::with_on_connect`]. The client takes ownership and
    /// shuts the supervisor down when closed.
    pub fn with_supervisor(supervisor: Supervisor<C>) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(run(supervisor, ops_rx));
        Self {
            ops: ops_tx,
            active: Rc::new(Cell::new(true)),
        }
    }

    /// Submit a request. Returns immediately; the reply (or terminal
    /// error) arrives on the returned handle. `deadline: None` disables
    /// the timeout.
    pub fn request(&self, req: C::Msg, deadline: Option<Duration>) -> ReplyFuture<C::Msg> {
        let (promise, future) = reply_pair();
        if !self.active.get() {
            promise.fail(RequestError::Deactivated);
            return future;
        }
        if let Some(deadline) = deadline {
            arm_deadline(deadline, promise.clone());
        }
        let pending = Pending {
            req,
            promise: promise.clone(),
        };
        if self.ops.send(Op::Request(pending)).is_err() {
            promise.fail(RequestError::Deactivated);
        }
        future
    }

    /// Close the client. Requests already accepted still run to
    /// completion; once the sentinel's turn comes up the supervisor shuts
    /// down. Idempotent, and later submissions fail with `Deactivated`.
    pub fn close(&self) {
        if self.active.replace(false) {
            let _ = self.ops.send(Op::Close);
        }
    }
}

impl<C: Channel> Drop for SerialClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run<C: Channel>(supervisor: Supervisor<C>, mut ops: mpsc::UnboundedReceiver<Op<C::Msg>>) {
    while let Some(op) = ops.recv().await {
        match op {
            Op::Close => break,
            Op::Request(pending) => dispatch(&supervisor, pending).await,
        }
    }

    supervisor.shutdown();
    ops.close();
    while let Ok(op) = ops.try_recv() {
        if let Op::Request(pending) = op {
            pending.promise.fail(RequestError::Deactivated);
        }
    }
    supervisor.join().await;
}

/// Drive one request to a terminal state, retrying across reconnects
/// while its handle is still pending.
async fn dispatch<C: Channel>(supervisor: &Supervisor<C>, pending: Pending<C::Msg>) {
    let Pending { req, promise } = pending;

    loop {
        if promise.is_settled() {
            return;
        }

        // The deadline may fire while the connection is down; racing it
        // here keeps a timed-out head request from stalling the queue.
        let conn = tokio::select! {
            conn = supervisor.get() => conn,
            _ = promise.settled() => return,
        };
        let ch = match conn {
            Conn::Closed => {
                promise.fail(RequestError::Deactivated);
                return;
            }
            Conn::Open(ch) => ch,
        };
        if promise.is_settled() {
            return;
        }

        if ch.send(req.clone()).await.is_err() {
            // Lost before the request hit the wire. Observe the drain so
            // the next get() blocks for a fresh channel.
            let drained = async {
                while ch.recv().await.is_some() {}
            };
            tokio::select! {
                _ = drained => {}
                _ = promise.settled() => return,
            }
            continue;
        }

        // Once sent, the read is awaited to completion or loss even if the
        // deadline fires first: the response occupies a wire position, and
        // abandoning it would misalign every following request. A late
        // response against a settled handle is dropped by first-wins.
        match ch.recv().await {
            Some(reply) if reply.is_error() => {
                promise.fail(RequestError::Transport(reply));
                return;
            }
            Some(reply) => {
                promise.complete(reply);
                return;
            }
            None => continue,
        }
    }
}
