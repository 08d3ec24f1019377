//! Codec-encoded messages over a framed TCP stream.
//!
//! A [`TcpChannel`] runs two background tasks: a reader that accumulates
//! bytes, parses [`wire`](crate::wire) frames, decodes messages, and
//! publishes them to the channel's fan-out topic; and a writer that owns
//! the write half and drains a queue of pre-encoded frames. Either side
//! tearing down (EOF, I/O error, protocol violation) closes the channel,
//! which readers observe as a drained stream.
//!
//! Tasks are spawned with `spawn_local`; construct these channels inside a
//! `LocalSet` (or a current-thread local runtime).

use std::io;
use std::marker::PhantomData;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use super::{Channel, SendError, Subscription, Topic};
use crate::codec::MessageCodec;
use crate::message::Message;
use crate::supervisor::Connect;
use crate::wire::{encode_frame, try_decode_frame};

enum WriterCmd {
    Frame(Vec<u8>),
    Shutdown,
}

/// A [`Channel`] over a TCP stream, carrying codec-encoded messages in
/// checksummed frames.
pub struct TcpChannel<M: Message, C: MessageCodec> {
    incoming: Subscription<M>,
    writer: mpsc::UnboundedSender<WriterCmd>,
    codec: C,
}

impl<M: Message, C: MessageCodec> Clone for TcpChannel<M, C> {
    fn clone(&self) -> Self {
        Self {
            incoming: self.incoming.clone(),
            writer: self.writer.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<M, C> TcpChannel<M, C>
where
    M: Message + Serialize + DeserializeOwned,
    C: MessageCodec,
{
    /// Wrap an established stream. Used both by connectors (outbound) and
    /// by listeners wrapping accepted sockets (inbound).
    pub fn from_stream(stream: TcpStream, codec: C) -> Self {
        let (read_half, write_half) = stream.into_split();
        let topic = Topic::new();
        let incoming = topic.subscribe();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        tokio::task::spawn_local(read_loop(read_half, Rc::clone(&topic), codec.clone()));
        tokio::task::spawn_local(write_loop(write_half, writer_rx, Rc::clone(&topic)));

        Self {
            incoming,
            writer: writer_tx,
            codec,
        }
    }
}

#[async_trait(?Send)]
impl<M, C> Channel for TcpChannel<M, C>
where
    M: Message + Serialize + DeserializeOwned,
    C: MessageCodec,
{
    type Msg = M;

    async fn send(&self, msg: M) -> Result<(), SendError<M>> {
        if self.incoming.topic().is_closed() {
            return Err(SendError(msg));
        }
        let payload = match self.codec.encode(&msg) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "failed to encode outbound message");
                return Err(SendError(msg));
            }
        };
        let frame = match encode_frame(&payload) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "failed to frame outbound message");
                return Err(SendError(msg));
            }
        };
        self.writer
            .send(WriterCmd::Frame(frame))
            .map_err(|_| SendError(msg))
    }

    async fn recv(&self) -> Option<M> {
        self.incoming.recv().await
    }

    fn close(&self) {
        self.incoming.topic().close();
        let _ = self.writer.send(WriterCmd::Shutdown);
    }

    fn is_drained(&self) -> bool {
        self.incoming.is_drained()
    }

    fn fork(&self) -> Self {
        Self {
            incoming: self.incoming.fork(),
            writer: self.writer.clone(),
            codec: self.codec.clone(),
        }
    }
}

/// Read frames off the socket and publish decoded messages until EOF,
/// I/O failure, or a protocol violation.
async fn read_loop<M, C>(mut read_half: OwnedReadHalf, topic: Rc<Topic<M>>, codec: C)
where
    M: Message + DeserializeOwned,
    C: MessageCodec,
{
    let mut frame_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut read_buf = vec![0u8; 4096];

    'stream: loop {
        match read_half.read(&mut read_buf).await {
            Ok(0) | Err(_) => break 'stream,
            Ok(n) => frame_buf.extend_from_slice(&read_buf[..n]),
        }

        loop {
            match try_decode_frame(&frame_buf) {
                Ok(Some((payload, consumed))) => {
                    frame_buf.drain(..consumed);
                    match codec.decode::<M>(&payload) {
                        Ok(msg) => {
                            if topic.publish(msg).is_err() {
                                break 'stream;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "dropping undecodable message");
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    // Frame boundaries can no longer be trusted.
                    tracing::warn!(%error, "wire format error, tearing down connection");
                    break 'stream;
                }
            }
        }
    }

    topic.close();
}

/// Drain queued frames onto the socket until shutdown or write failure.
async fn write_loop<M: Message>(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriterCmd>,
    topic: Rc<Topic<M>>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Frame(frame) => {
                if write_half.write_all(&frame).await.is_err() {
                    break;
                }
            }
            WriterCmd::Shutdown => break,
        }
    }
    let _ = write_half.shutdown().await;
    topic.close();
}

/// Connector dialing a fixed address, for use with the connection
/// supervisor.
pub struct TcpConnector<M, C> {
    addr: String,
    codec: C,
    _payload: PhantomData<M>,
}

impl<M, C: MessageCodec> TcpConnector<M, C> {
    /// Dial `addr` with the given codec.
    pub fn new(addr: impl Into<String>, codec: C) -> Self {
        Self {
            addr: addr.into(),
            codec,
            _payload: PhantomData,
        }
    }
}

#[async_trait(?Send)]
impl<M, C> Connect for TcpConnector<M, C>
where
    M: Message + Serialize + DeserializeOwned,
    C: MessageCodec,
{
    type Channel = TcpChannel<M, C>;

    async fn connect(&mut self) -> io::Result<Self::Channel> {
        let stream = TcpStream::connect(&self.addr).await?;
        Ok(TcpChannel::from_stream(stream, self.codec.clone()))
    }
}
