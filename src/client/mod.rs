//! Durable request/response clients.
//!
//! Both clients own a [`Supervisor`](crate::Supervisor) and submit
//! requests through a FIFO queue; submission never blocks and returns a
//! [`ReplyFuture`](crate::ReplyFuture) immediately.
//!
//! - [`SerialClient`]: one request in flight at a time, strict FIFO from
//!   submission to delivery. The next request is not sent until the
//!   previous handle is terminal.
//! - [`PipelinedClient`]: many requests in flight over one connection,
//!   responses correlated by FIFO position on the wire. Requests lost to a
//!   connection drop are retransmitted, so a retried request can complete
//!   after later ones; callers needing strict global order should use the
//!   serial client.
//!
//! Closing a client enqueues a close sentinel behind the already-accepted
//! requests; when its turn comes the supervisor shuts down. Submissions
//! after `close` fail immediately with
//! [`RequestError::Deactivated`](crate::RequestError::Deactivated).

use std::time::Duration;

use crate::error::RequestError;
use crate::message::Message;
use crate::reply::ReplyPromise;

mod pipelined;
mod serial;

pub use pipelined::PipelinedClient;
pub use serial::SerialClient;

/// A submitted request awaiting processing.
pub(crate) struct Pending<M: Message> {
    pub(crate) req: M,
    pub(crate) promise: ReplyPromise<M>,
}

impl<M: Message> Clone for Pending<M> {
    fn clone(&self) -> Self {
        Self {
            req: self.req.clone(),
            promise: self.promise.clone(),
        }
    }
}

/// Submission queue entries: user requests, or the close sentinel.
pub(crate) enum Op<M: Message> {
    Request(Pending<M>),
    Close,
}

/// Arm the per-request deadline. The timer races the response; whichever
/// settles the handle first wins, and the loser's settlement is a no-op.
pub(crate) fn arm_deadline<M: Message>(deadline: Duration, promise: ReplyPromise<M>) {
    tokio::task::spawn_local(async move {
        tokio::time::sleep(deadline).await;
        promise.fail(RequestError::Timeout);
    });
}
