//! Connection lifecycle
//!
//! Each accepted socket runs the same pipeline: handshake inline on the
//! socket, then a split into a read loop (decode, dispatch) and a writer
//! task that owns the chunk encoder. Everything that wants to write to the
//! peer goes through a [`ConnectionHandle`], so fan-out from other
//! sessions and replies from this one are serialized by the same queue.
//!
//! Close ordering matters: a [`Outbound::Close`] travels the queue behind
//! any messages sent before it, so an end-of-stream signal reaches the
//! peer before the socket shuts down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{Error, HandshakeError, Result, SessionError};
use crate::ports::{AuthorizationPort, TranscodePort};
use crate::protocol::decoder::ChunkDecoder;
use crate::protocol::encoder::ChunkEncoder;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::ProtocolMessage;
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::session::handler::SessionHandler;

/// Item on a connection's write queue
#[derive(Debug)]
pub enum Outbound {
    /// Encode and write a message
    Message(ProtocolMessage),
    /// Flush and shut the socket down
    Close,
}

/// Cheap handle for writing to a connection from anywhere
///
/// Sends are fire-and-forget: a send to a connection that is going away
/// simply reports failure, and the caller drops the handle.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Wrap a connection's write queue
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// Session id of the connection behind this handle
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the connection can still be written to
    pub fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a message; returns false if the connection is gone
    pub fn send(&self, message: ProtocolMessage) -> bool {
        self.tx.send(Outbound::Message(message)).is_ok()
    }

    /// Queue an orderly close behind everything already sent
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// One accepted client connection
pub struct Connection<A, T> {
    session_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    authorization: Arc<A>,
    transcode: Arc<T>,
}

impl<A: AuthorizationPort, T: TranscodePort> Connection<A, T> {
    /// Wrap an accepted socket
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<StreamRegistry>,
        authorization: Arc<A>,
        transcode: Arc<T>,
    ) -> Self {
        Self {
            session_id,
            socket,
            peer_addr,
            config,
            registry,
            authorization,
            transcode,
        }
    }

    /// Drive the connection to completion
    pub async fn run(mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);

        tokio::time::timeout(
            self.config.connection_timeout,
            perform_handshake(&mut self.socket, &mut buf),
        )
        .await
        .map_err(|_| Error::Session(SessionError::Closed("handshake timeout")))??;

        let (mut reader, writer) = self.socket.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(self.session_id, tx);
        let writer_task = tokio::spawn(write_loop(writer, rx, self.session_id));

        let mut handler = SessionHandler::new(
            self.session_id,
            self.peer_addr,
            handle.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.authorization),
            Arc::clone(&self.transcode),
            self.config.clone(),
        );

        let result = read_loop(
            &mut reader,
            &mut buf,
            &mut handler,
            self.config.idle_timeout,
        )
        .await;

        handler.on_disconnect().await;
        handle.close();
        drop(handler);
        drop(handle);
        let _ = writer_task.await;

        result
    }
}

/// Run the handshake to completion on the unsplit socket
///
/// Bytes the client sends past C2 stay in `buf` for the chunk decoder.
async fn perform_handshake(socket: &mut TcpStream, buf: &mut BytesMut) -> Result<()> {
    let mut handshake = Handshake::new();
    loop {
        while let Some(reply) = handshake.advance(buf) {
            socket.write_all(&reply).await?;
        }
        if handshake.is_done() {
            return Ok(());
        }
        if socket.read_buf(buf).await? == 0 {
            return Err(HandshakeError::TruncatedGreeting.into());
        }
    }
}

async fn read_loop<A: AuthorizationPort, T: TranscodePort>(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    handler: &mut SessionHandler<A, T>,
    idle_timeout: Duration,
) -> Result<()> {
    let mut decoder = ChunkDecoder::new();
    let mut messages = Vec::new();

    loop {
        decoder.decode(buf, &mut messages)?;
        for ack in decoder.drain_outgoing() {
            handler.send(ack);
        }
        for message in messages.drain(..) {
            handler.handle_message(message).await?;
        }

        match tokio::time::timeout(idle_timeout, reader.read_buf(buf)).await {
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::info!(session_id = handler.session_id(), "Idle timeout");
                return Ok(());
            }
        }
    }
}

/// Writer task: owns the chunk encoder, drains the write queue
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    session_id: u64,
) {
    let mut encoder = ChunkEncoder::new();
    let mut wire = BytesMut::with_capacity(8 * 1024);

    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Message(message) => {
                wire.clear();
                encoder.encode(&message, &mut wire);
                if let Err(e) = writer.write_all(&wire).await {
                    tracing::debug!(session_id = session_id, error = %e, "Write failed");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    let _ = writer.shutdown().await;
}
