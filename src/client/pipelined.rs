//! Pipelined request/response client.

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

/// Pause before retrying a failed transmission.
const SEND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pipelined client: many in-flight requests over one supervised
/// connection.
///
/// A transmit loop drains the submission queue onto the current
/// connection; a receive loop consumes responses in transmission order.
/// Requests lost to a connection drop are handed back to the transmit
/// loop and resent on the next connection, keeping their original
/// deadline. A retried request can therefore complete after later
/// requests that succeeded on a newer connection.
pub struct PipelinedClient<C: Channel> {
    ops: mpsc::UnboundedSender<Op<C::Msg>>,
    active: Rc<Cell<bool>>,
}

/// A transmitted request awaiting its response on the channel it was sent
/// over.
struct InFlight<C: Channel> {
    pending: Pending<C::Msg>,
    ch: Rc<C>,
}

impl<C: Channel> PipelinedClient<C> {
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
        let (inflight_tx, inflight_rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(transmit(supervisor, ops_rx, inflight_tx));
        tokio::task::spawn_local(receive::<C>(inflight_rx, ops_tx.clone()));
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

    /// Close the client. Idempotent; later submissions fail with
    /// `Deactivated`.
    pub fn close(&self) {
        if self.active.replace(false) {
            let _ = self.ops.send(Op::Close);
        }
    }
}

impl<C: Channel> Drop for PipelinedClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drain the submission queue onto the current connection.
async fn transmit<C: Channel>(
    supervisor: Supervisor<C>,
    mut ops: mpsc::UnboundedReceiver<Op<C::Msg>>,
    inflight: mpsc::UnboundedSender<InFlight<C>>,
) {
    while let Some(op) = ops.recv().await {
        match op {
            Op::Close => break,
            Op::Request(pending) => send_one(&supervisor, pending, &inflight).await,
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

/// Transmit one request, retrying until it is on the wire, its handle
/// settles, or the supervisor closes.
async fn send_one<C: Channel>(
    supervisor: &Supervisor<C>,
    pending: Pending<C::Msg>,
    inflight: &mpsc::UnboundedSender<InFlight<C>>,
) {
    loop {
        // A retry whose deadline already fired is dropped at its turn.
        if pending.promise.is_settled() {
            return;
        }
        let conn = tokio::select! {
            conn = supervisor.get() => conn,
            _ = pending.promise.settled() => return,
        };
        let ch = match conn {
            Conn::Closed => {
                pending.promise.fail(RequestError::Deactivated);
                return;
            }
            Conn::Open(ch) => ch,
        };
        if pending.promise.is_settled() {
            return;
        }
        match ch.send(pending.req.clone()).await {
            Ok(()) => {
                let _ = inflight.send(InFlight { pending, ch });
                return;
            }
            Err(_) => {
                tracing::debug!("transmit failed before enqueue, retrying");
                tokio::time::sleep(SEND_RETRY_DELAY).await;
            }
        }
    }
}

/// Consume responses in transmission order; lost requests go back to the
/// transmit loop.
async fn receive<C: Channel>(
    mut inflight: mpsc::UnboundedReceiver<InFlight<C>>,
    retry: mpsc::UnboundedSender<Op<C::Msg>>,
) {
    while let Some(InFlight { pending, ch }) = inflight.recv().await {
        // One read per in-flight entry, settled or not: each transmitted
        // request occupies a wire position that must be consumed to keep
        // later responses aligned.
        match ch.recv().await {
            Some(reply) if reply.is_error() => {
                pending.promise.fail(RequestError::Transport(reply));
            }
            Some(reply) => {
                pending.promise.complete(reply);
            }
            None => {
                // Connection lost before the reply: retransmit. The
                // original deadline, if any, is already armed and keeps
                // running.
                if retry.send(Op::Request(pending.clone())).is_err() {
                    pending.promise.fail(RequestError::Deactivated);
                }
            }
        }
    }
}
