//! Persistent-connection supervision.
//!
//! A [`Supervisor`] owns one underlying [`Channel`] at a time. A single
//! background task runs the reconnect loop: connect through the
//! user-supplied [`Connect`]or (backing off exponentially on failure),
//! publish the live channel to [`get`](Supervisor::get) callers, watch a
//! fork of it until it drains, then start over. Connector failures and
//! mid-connection drops are indistinguishable to the loop; both are logged
//! at WARN and retried forever. Only [`shutdown`](Supervisor::shutdown)
//! terminates it, after which `get` yields [`Conn::Closed`].
//!
//! All supervisor state is mutated by the loop task alone; `shutdown` only
//! flips the liveness flag and fires the halt latch.

use std::cell::RefCell;
use std::future::Future;
use std::io;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::slot::Slot;

mod backoff;
mod config;

use backoff::Backoff;
pub use config::SupervisorConfig;

/// Source of fresh connections. Called once per attempt; must yield a
/// freshly open channel on success.
#[async_trait(?Send)]
pub trait Connect: 'static {
    /// The channel type this connector produces.
    type Channel: Channel;

    /// Establish a new connection, possibly after a network handshake.
    async fn connect(&mut self) -> io::Result<Self::Channel>;
}

/// Adapter implementing [`Connect`] for a closure returning a connect
/// future.
pub struct ConnectFn<F>(
    /// The closure invoked once per connection attempt.
    pub F,
);

#[async_trait(?Send)]
impl<C, F, Fut> Connect for ConnectFn<F>
where
    C: Channel,
    F: FnMut() -> Fut + 'static,
    Fut: Future<Output = io::Result<C>> + 'static,
{
    type Channel = C;

    async fn connect(&mut self) -> io::Result<C> {
        (self.0)().await
    }
}

/// What [`Supervisor::get`] yields: the live channel, or the terminal
/// closed sentinel once the supervisor has shut down.
pub enum Conn<C> {
    /// The current live channel.
    Open(Rc<C>),
    /// The supervisor has shut down; no connection will ever follow.
    Closed,
}

impl<C> Clone for Conn<C> {
    fn clone(&self) -> Self {
        match self {
            Conn::Open(ch) => Conn::Open(Rc::clone(ch)),
            Conn::Closed => Conn::Closed,
        }
    }
}

struct Shared<C: Channel> {
    /// Publication cell for the current connection; replaced with a fresh
    /// pending slot on every loss.
    current: Slot<Conn<C>>,
    /// Cleared on shutdown; the loop never reconnects once false.
    alive: bool,
}

/// Keeps exactly one live channel available, reconnecting with exponential
/// backoff on failure.
pub struct Supervisor<C: Channel> {
    shared: Rc<RefCell<Shared<C>>>,
    changed: Rc<Notify>,
    halt: Slot<()>,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl<C: Channel> Supervisor<C> {
    /// Start supervising. The background task makes its first connect
    /// attempt immediately.
    pub fn new<G>(connector: G, config: SupervisorConfig) -> Self
    where
        G: Connect<Channel = C>,
    {
        Self::start(connector, config, None)
    }

    /// Like [`new`](Supervisor::new), with a hook that runs after every
    /// successful connect, before the channel is published to waiters.
    pub fn with_on_connect<G>(
        connector: G,
        config: SupervisorConfig,
        on_connect: impl Fn(&C) + 'static,
    ) -> Self
    where
        G: Connect<Channel = C>,
    {
        Self::start(connector, config, Some(Rc::new(on_connect)))
    }

    fn start<G>(connector: G, config: SupervisorConfig, on_connect: OnConnect<C>) -> Self
    where
        G: Connect<Channel = C>,
    {
        let shared = Rc::new(RefCell::new(Shared {
            current: Slot::new(),
            alive: true,
        }));
        let changed = Rc::new(Notify::new());
        let halt = Slot::new();

        let task = tokio::task::spawn_local(run(
            connector,
            config,
            Rc::clone(&shared),
            Rc::clone(&changed),
            halt.clone(),
            on_connect,
        ));

        Self {
            shared,
            changed,
            halt,
            task: RefCell::new(Some(task)),
        }
    }

    /// Current connection handle.
    ///
    /// Resolves with the live channel once one exists, or with
    /// [`Conn::Closed`] after shutdown. A published channel that has
    /// already drained is skipped in favour of the next publication, so
    /// callers retrying after a loss block here until the supervisor
    /// reconnects.
    pub async fn get(&self) -> Conn<C> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let slot = self.shared.borrow().current.clone();
            match slot.wait().await {
                Conn::Open(ch) if ch.is_drained() => notified.await,
                conn => return conn,
            }
        }
    }

    /// Request permanent shutdown. Idempotent; any live channel is closed
    /// and `get` yields [`Conn::Closed`] from then on.
    pub fn shutdown(&self) {
        self.shared.borrow_mut().alive = false;
        self.halt.set(());
    }

    /// Wait for the supervision task to finish after a shutdown request.
    pub async fn join(&self) {
        let task = self.task.borrow_mut().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl<C: Channel> Drop for Supervisor<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type OnConnect<C> = Option<Rc<dyn Fn(&C)>>;

async fn run<C, G>(
    mut connector: G,
    config: SupervisorConfig,
    shared: Rc<RefCell<Shared<C>>>,
    changed: Rc<Notify>,
    halt: Slot<()>,
    on_connect: OnConnect<C>,
) where
    C: Channel,
    G: Connect<Channel = C>,
{
    let mut backoff = Backoff::new(config.initial_delay, config.max_delay);

    'reconnect: while shared.borrow().alive {
        let delay = backoff.delay();
        if !delay.is_zero() {
            tracing::warn!(
                connection = %config.description,
                delay_ms = delay.as_millis() as u64,
                "waiting before reconnect attempt"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = halt.wait() => break 'reconnect,
            }
        }

        let ch = tokio::select! {
            result = connector.connect() => match result {
                Ok(ch) => ch,
                Err(error) => {
                    tracing::warn!(
                        connection = %config.description,
                        %error,
                        "connect failed"
                    );
                    backoff.advance();
                    continue 'reconnect;
                }
            },
            _ = halt.wait() => break 'reconnect,
        };

        backoff.reset();
        let ch = Rc::new(ch);
        if let Some(hook) = &on_connect {
            hook(&ch);
        }
        tracing::debug!(connection = %config.description, "connected");
        shared.borrow().current.set(Conn::Open(Rc::clone(&ch)));
        changed.notify_waiters();

        // Watch an independent reader; when it drains, the connection is
        // gone.
        let watch = ch.fork();
        let drained = async move { while watch.recv().await.is_some() {} };
        tokio::select! {
            _ = drained => {}
            _ = halt.wait() => {
                ch.close();
                break 'reconnect;
            }
        }

        tracing::warn!(connection = %config.description, "connection lost");
        if shared.borrow().alive {
            shared.borrow_mut().current = Slot::new();
            changed.notify_waiters();
        }
    }

    {
        let mut shared = shared.borrow_mut();
        shared.alive = false;
        if shared.current.is_set() {
            shared.current = Slot::new();
        }
        shared.current.set(Conn::Closed);
    }
    changed.notify_waiters();
}
