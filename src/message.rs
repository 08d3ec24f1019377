//! Payload classification for values carried over a [`Channel`](crate::Channel).
//!
//! The messaging core is payload-agnostic: it moves opaque values and never
//! inspects them, with one exception. A reply value may be an **error
//! carrier** — a payload that encodes a remote failure rather than a normal
//! response. Clients route such replies to the error side of the reply
//! handle instead of the success side, so callers see them as
//! [`RequestError::Transport`](crate::RequestError::Transport) with the
//! value propagated verbatim.

/// Marker trait for values carried over a channel.
///
/// `is_error` classifies reply values that encode a remote failure. The
/// default is `false`: plain payload types never carry errors. Types that
/// can, such as `Result`, override it.
pub trait Message: Clone + 'static {
    /// True when this value is an error carrier rather than a normal reply.
    fn is_error(&self) -> bool {
        false
    }
}

macro_rules! plain_message {
    ($($ty:ty),* $(,)?) => {
        $(impl Message for $ty {})*
    };
}

plain_message!(
    (),
    bool,
    i32,
    i64,
    u32,
    u64,
    usize,
    String,
    &'static str,
    Vec<u8>,
);

/// `Result` is the natural error-carrier payload: `Err` values are routed
/// to the error side of the reply handle.
impl<T, E> Message for Result<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn is_error(&self) -> bool {
        self.is_err()
    }
}
