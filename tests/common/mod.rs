//! Shared fixtures for the integration suites.
//!
//! Everything in the crate runs single-threaded on `spawn_local`, so tests
//! drive a current-thread runtime through a `LocalSet`. Timing-sensitive
//! tests use tokio's paused clock, which auto-advances to the next timer
//! whenever the runtime is idle and makes backoff/deadline assertions
//! exact.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use ratline::{Channel, Connect, MemoryChannel, Message};

/// Route logs to the test writer, honoring `RUST_LOG`. Call from a test
/// that needs eyeballing; safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run a future on a current-thread runtime with the clock paused.
pub fn run_paused<F: Future<Output = ()>>(f: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("build runtime");
    tokio::task::LocalSet::new().block_on(&rt, f);
}

/// Run a future on a current-thread runtime with real time and I/O.
pub fn run_local<F: Future<Output = ()>>(f: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime");
    tokio::task::LocalSet::new().block_on(&rt, f);
}

/// Connector that fails its first `fail_first` attempts, then yields
/// in-memory channels served by an echo loop. Records the instant of every
/// attempt so tests can assert the backoff sequence.
pub struct EchoConnector {
    fail_first: u32,
    pub attempts: Rc<RefCell<Vec<Instant>>>,
}

impl EchoConnector {
    pub fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            attempts: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

#[async_trait(?Send)]
impl Connect for EchoConnector {
    type Channel = MemoryChannel<String>;

    async fn connect(&mut self) -> io::Result<MemoryChannel<String>> {
        self.attempts.borrow_mut().push(Instant::now());
        if self.attempts.borrow().len() <= self.fail_first as usize {
            return Err(io::Error::other("connection refused"));
        }
        let (client, server) = MemoryChannel::pair();
        tokio::task::spawn_local(async move {
            while let Some(msg) = server.recv().await {
                if server.send(msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(client)
    }
}

/// Connector yielding channels served by an `i -> i + 1` handler.
pub struct IncrementConnector;

#[async_trait(?Send)]
impl Connect for IncrementConnector {
    type Channel = MemoryChannel<i64>;

    async fn connect(&mut self) -> io::Result<MemoryChannel<i64>> {
        let (client, server) = MemoryChannel::pair();
        tokio::task::spawn_local(async move {
            while let Some(i) = server.recv().await {
                if server.send(i + 1).await.is_err() {
                    break;
                }
            }
        });
        Ok(client)
    }
}

/// Connector that never succeeds.
pub struct FailingConnector;

#[async_trait(?Send)]
impl Connect for FailingConnector {
    type Channel = MemoryChannel<String>;

    async fn connect(&mut self) -> io::Result<MemoryChannel<String>> {
        Err(io::Error::other("host unreachable"))
    }
}

/// Hand-fed queue of pre-built channels. `connect` pops the next one and
/// waits (indefinitely) while the queue is empty, so tests control exactly
/// which channel each reconnect attempt yields, and when.
pub struct ChannelQueue<M: Message> {
    queue: Rc<RefCell<VecDeque<MemoryChannel<M>>>>,
    notify: Rc<Notify>,
}

impl<M: Message> Clone for ChannelQueue<M> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            notify: Rc::clone(&self.notify),
        }
    }
}

impl<M: Message> ChannelQueue<M> {
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            notify: Rc::new(Notify::new()),
        }
    }

    pub fn push(&self, ch: MemoryChannel<M>) {
        self.queue.borrow_mut().push_back(ch);
        self.notify.notify_one();
    }

    /// Build a channel pair, queue the client end, and hand the server end
    /// to `serve`.
    pub fn push_pair<F, Fut>(&self, serve: F)
    where
        F: FnOnce(MemoryChannel<M>) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let (client, server) = MemoryChannel::pair();
        tokio::task::spawn_local(serve(server));
        self.push(client);
    }
}

/// Connector feeding from a [`ChannelQueue`].
pub struct QueueConnector<M: Message>(pub ChannelQueue<M>);

#[async_trait(?Send)]
impl<M: Message> Connect for QueueConnector<M> {
    type Channel = MemoryChannel<M>;

    async fn connect(&mut self) -> io::Result<MemoryChannel<M>> {
        loop {
            if let Some(ch) = self.0.queue.borrow_mut().pop_front() {
                return Ok(ch);
            }
            self.0.notify.notified().await;
        }
    }
}
