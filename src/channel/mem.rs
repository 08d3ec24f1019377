//! In-process duplex channel with fan-out readers.
//!
//! Each direction is a [`Topic`]: a closable message stream that every
//! [`Subscription`] observes independently. Forking a channel subscribes a
//! new reader; cloning shares the existing one. Waker-based and
//! single-threaded throughout.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use async_trait::async_trait;

use super::{Channel, SendError};
use crate::message::Message;

/// A closable broadcast stream. Publishing clones the message into every
/// subscriber's queue.
pub(crate) struct Topic<M> {
    state: RefCell<TopicState<M>>,
}

struct TopicState<M> {
    subscribers: Vec<Rc<SubscriberState<M>>>,
    closed: bool,
}

struct SubscriberState<M> {
    queue: RefCell<VecDeque<M>>,
    wakers: RefCell<Vec<Waker>>,
}

impl<M> SubscriberState<M> {
    fn wake_all(&self) {
        for waker in self.wakers.borrow_mut().drain(..) {
            waker.wake();
        }
    }
}

impl<M: Clone> Topic<M> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(TopicState {
                subscribers: Vec::new(),
                closed: false,
            }),
        })
    }

    /// Register a new reader. It observes messages published from now on.
    pub(crate) fn subscribe(self: &Rc<Self>) -> Subscription<M> {
        let subscriber = Rc::new(SubscriberState {
            queue: RefCell::new(VecDeque::new()),
            wakers: RefCell::new(Vec::new()),
        });
        self.state
            .borrow_mut()
            .subscribers
            .push(Rc::clone(&subscriber));
        Subscription {
            topic: Rc::clone(self),
            subscriber,
        }
    }

    /// Publish to all subscribers. Returns the message back if the topic
    /// is closed.
    pub(crate) fn publish(&self, msg: M) -> Result<(), M> {
        let state = self.state.borrow();
        if state.closed {
            return Err(msg);
        }
        for subscriber in &state.subscribers {
            subscriber.queue.borrow_mut().push_back(msg.clone());
            subscriber.wake_all();
        }
        Ok(())
    }

    /// Close the topic and wake every reader so it can observe the end of
    /// the stream. Idempotent.
    pub(crate) fn close(&self) {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return;
        }
        state.closed = true;
        let subscribers = state.subscribers.clone();
        drop(state);
        for subscriber in &subscribers {
            subscriber.wake_all();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

/// One reader of a [`Topic`]. Cloning shares the cursor; use
/// [`Topic::subscribe`] for an independent one.
pub(crate) struct Subscription<M> {
    topic: Rc<Topic<M>>,
    subscriber: Rc<SubscriberState<M>>,
}

impl<M> Clone for Subscription<M> {
    fn clone(&self) -> Self {
        Self {
            topic: Rc::clone(&self.topic),
            subscriber: Rc::clone(&self.subscriber),
        }
    }
}

impl<M: Clone> Subscription<M> {
    /// Wait for the next message; `None` once the topic is closed and this
    /// reader's queue is empty.
    pub(crate) fn recv(&self) -> Recv<M> {
        Recv {
            subscription: self.clone(),
        }
    }

    /// Subscribe a fresh reader on the same topic.
    pub(crate) fn fork(&self) -> Subscription<M> {
        self.topic.subscribe()
    }

    pub(crate) fn topic(&self) -> &Rc<Topic<M>> {
        &self.topic
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.topic.is_closed() && self.subscriber.queue.borrow().is_empty()
    }
}

/// Future returned by [`Subscription::recv`].
pub(crate) struct Recv<M> {
    subscription: Subscription<M>,
}

impl<M: Clone> Future for Recv<M> {
    type Output = Option<M>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let sub = &self.subscription;
        if let Some(msg) = sub.subscriber.queue.borrow_mut().pop_front() {
            return Poll::Ready(Some(msg));
        }
        if sub.topic.is_closed() {
            return Poll::Ready(None);
        }
        sub.subscriber.wakers.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}

/// One endpoint of an in-process duplex channel.
///
/// Created in connected pairs by [`MemoryChannel::pair`]; what one side
/// sends, the other receives, in order. Closing either endpoint closes the
/// connection in both directions.
pub struct MemoryChannel<M: Message> {
    incoming: Subscription<M>,
    outgoing: Rc<Topic<M>>,
}

impl<M: Message> Clone for MemoryChannel<M> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
            outgoing: Rc::clone(&self.outgoing),
        }
    }
}

impl<M: Message> MemoryChannel<M> {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (MemoryChannel<M>, MemoryChannel<M>) {
        let a_to_b = Topic::new();
        let b_to_a = Topic::new();
        let a = MemoryChannel {
            incoming: b_to_a.subscribe(),
            outgoing: Rc::clone(&a_to_b),
        };
        let b = MemoryChannel {
            incoming: a_to_b.subscribe(),
            outgoing: b_to_a,
        };
        (a, b)
    }
}

#[async_trait(?Send)]
impl<M: Message> Channel for MemoryChannel<M> {
    type Msg = M;

    async fn send(&self, msg: M) -> Result<(), SendError<M>> {
        self.outgoing.publish(msg).map_err(SendError)
    }

    async fn recv(&self) -> Option<M> {
        self.incoming.recv().await
    }

    fn close(&self) {
        self.outgoing.close();
        self.incoming.topic().close();
    }

    fn is_drained(&self) -> bool {
        self.incoming.is_drained()
    }

    fn fork(&self) -> Self {
        Self {
            incoming: self.incoming.fork(),
            outgoing: Rc::clone(&self.outgoing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_in_order() {
        let (a, b) = MemoryChannel::<u32>::pair();
        a.send(1).await.expect("send");
        a.send(2).await.expect("send");
        a.send(3).await.expect("send");
        assert_eq!(b.recv().await, Some(1));
        assert_eq!(b.recv().await, Some(2));
        assert_eq!(b.recv().await, Some(3));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let (a, b) = MemoryChannel::<String>::pair();
        a.send("last".to_string()).await.expect("send");
        a.close();
        assert!(!b.is_drained(), "buffered message still readable");
        assert_eq!(b.recv().await, Some("last".to_string()));
        assert_eq!(b.recv().await, None);
        assert!(b.is_drained());
    }

    #[tokio::test]
    async fn send_after_close_returns_the_message() {
        let (a, _b) = MemoryChannel::<u32>::pair();
        a.close();
        let err = a.send(9).await.expect_err("closed");
        assert_eq!(err.0, 9);
    }

    #[tokio::test]
    async fn fork_reads_independently() {
        let (a, b) = MemoryChannel::<u32>::pair();
        let watch = b.fork();
        a.send(1).await.expect("send");
        // Both the endpoint and its fork see the same message.
        assert_eq!(b.recv().await, Some(1));
        assert_eq!(watch.recv().await, Some(1));
        a.close();
        assert_eq!(watch.recv().await, None);
        assert!(watch.is_drained());
    }

    #[tokio::test]
    async fn clone_shares_the_reader() {
        let (a, b) = MemoryChannel::<u32>::pair();
        let b2 = b.clone();
        a.send(1).await.expect("send");
        a.send(2).await.expect("send");
        assert_eq!(b.recv().await, Some(1));
        // The clone consumed from the same cursor.
        assert_eq!(b2.recv().await, Some(2));
    }

    #[tokio::test]
    async fn recv_wakes_on_send() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (a, b) = MemoryChannel::<u32>::pair();
                let reader = tokio::task::spawn_local(async move { b.recv().await });
                tokio::task::yield_now().await;
                a.send(42).await.expect("send");
                assert_eq!(reader.await.expect("reader"), Some(42));
            })
            .await;
    }
}
