//! Reply handles: the write-once future pairing a request with its outcome.
//!
//! Submitting a request yields a [`ReplyFuture`] for the caller while the
//! client machinery keeps the matching [`ReplyPromise`]. The promise is
//! completed exactly once — by the response, by the deadline timer, or by
//! client shutdown — and the first completion wins. Later completions are
//! ignored, which is what makes the timer race and the retry-after-loss
//! path safe: a late response against a settled handle is silently dropped.
//!
//! On the server side the same promise type is handed to request handlers,
//! which must complete it with either a reply value or an error carrier.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::RequestError;
use crate::message::Message;

/// Outcome stored in the shared cell.
type Outcome<M> = Result<M, RequestError<M>>;

struct ReplyState<M> {
    outcome: Option<Outcome<M>>,
    wakers: Vec<Waker>,
}

impl<M> ReplyState<M> {
    fn settle(&mut self, outcome: Outcome<M>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
        true
    }
}

/// Create a connected promise/future pair.
pub fn reply_pair<M: Message>() -> (ReplyPromise<M>, ReplyFuture<M>) {
    let state = Rc::new(RefCell::new(ReplyState {
        outcome: None,
        wakers: Vec::new(),
    }));
    (
        ReplyPromise {
            state: Rc::clone(&state),
        },
        ReplyFuture { state },
    )
}

/// Completer side of a reply handle.
///
/// Cloneable so the deadline timer, the transmit path, and the receive path
/// can all race to settle it; exactly one of them wins.
pub struct ReplyPromise<M: Message> {
    state: Rc<RefCell<ReplyState<M>>>,
}

impl<M: Message> Clone for ReplyPromise<M> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<M: Message> ReplyPromise<M> {
    /// Settle with a successful reply. Returns `false` if the handle was
    /// already settled.
    pub fn complete(&self, value: M) -> bool {
        self.state.borrow_mut().settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if the handle was already
    /// settled.
    pub fn fail(&self, error: RequestError<M>) -> bool {
        self.state.borrow_mut().settle(Err(error))
    }

    /// Whether the handle has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.state.borrow().outcome.is_some()
    }

    /// Resolves once the handle is settled, by whomever. Lets processing
    /// loops race connection waits against a deadline that may fire first.
    pub fn settled(&self) -> Settled<M> {
        Settled {
            state: Rc::clone(&self.state),
        }
    }
}

/// Caller side of a reply handle. Resolves to the reply value or the
/// terminal [`RequestError`].
pub struct ReplyFuture<M: Message> {
    state: Rc<RefCell<ReplyState<M>>>,
}

impl<M: Message> Future for ReplyFuture<M> {
    type Output = Result<M, RequestError<M>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        state.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`ReplyPromise::settled`].
pub struct Settled<M> {
    state: Rc<RefCell<ReplyState<M>>>,
}

impl<M> Future for Settled<M> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if state.outcome.is_some() {
            return Poll::Ready(());
        }
        state.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
