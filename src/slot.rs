//! Write-once broadcast cell.
//!
//! A [`Slot`] fires at most one value to all current and future observers.
//! The supervisor publishes each connection through one, and the shutdown
//! latch is one carrying `()`. Waiters are woken through registered wakers,
//! single-threaded.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Single-shot broadcast cell: `set` once, every `wait` observer (past or
/// future) receives a clone of the value.
///
/// Cloning a `Slot` clones the handle, not the cell; all clones observe the
/// same value.
pub struct Slot<T> {
    inner: Rc<RefCell<SlotInner<T>>>,
}

struct SlotInner<T> {
    value: Option<T>,
    wakers: Vec<Waker>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SlotInner {
                value: None,
                wakers: Vec::new(),
            })),
        }
    }

    /// Fire the value. Returns `false` if the slot was already set; the
    /// first value wins and later calls are ignored.
    pub fn set(&self, value: T) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.value.is_some() {
            return false;
        }
        inner.value = Some(value);
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
        true
    }

    /// Whether the slot has fired.
    pub fn is_set(&self) -> bool {
        self.inner.borrow().value.is_some()
    }
}

impl<T: Clone> Slot<T> {
    /// The fired value, if any.
    pub fn get(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Wait for the slot to fire. Resolves immediately if it already has.
    pub fn wait(&self) -> Wait<T> {
        Wait { slot: self.clone() }
    }
}

/// Future returned by [`Slot::wait`].
pub struct Wait<T> {
    slot: Slot<T>,
}

impl<T: Clone> Future for Wait<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.slot.inner.borrow_mut();
        if let Some(value) = &inner.value {
            return Poll::Ready(value.clone());
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
