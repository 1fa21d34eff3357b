//! Peer connection layer.
//!
//! One [`Connection`] per TCP stream, with a dedicated writer task draining a
//! send queue and a dedicated reader task parsing length-prefixed frames.
//! `send` enqueues and returns promptly; the single writer preserves
//! per-connection message order. Decoded messages are forwarded into the
//! node's one event channel together with a handle to the connection they
//! arrived on, so handlers can reply without a routing table.
//!
//! Any I/O error or malformed frame closes the connection; there is no
//! reconnection within a round.

use bytes::BytesMut;
use ringmine_metrics::network::{
    NET_BYTES_RECEIVED, NET_BYTES_SENT, NET_CONNECTIONS_OPEN, NET_CONNECTION_ERRORS,
    NET_DECODE_ERRORS, NET_MESSAGES_RECEIVED, NET_MESSAGES_SENT,
};
use ringmine_wire::{encode_frame, try_parse_frame, Message};
use std::io;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// A decoded message together with the connection it arrived on.
#[derive(Debug)]
pub struct NodeEvent {
    pub conn: Connection,
    pub message: Message,
}

/// Handle to one duplex peer connection.
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    peer: String,
}

impl Connection {
    /// Take ownership of a stream and spawn its reader and writer tasks.
    pub fn spawn(stream: TcpStream, events: mpsc::Sender<NodeEvent>) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let conn = Self {
            outbound: outbound_tx,
            peer: peer.clone(),
        };

        NET_CONNECTIONS_OPEN.inc();
        tokio::spawn(write_loop(writer, outbound_rx, peer.clone()));
        tokio::spawn(read_loop(reader, events, conn.clone()));

        conn
    }

    /// Connect to a peer and spawn the connection tasks.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        events: mpsc::Sender<NodeEvent>,
    ) -> io::Result<Self> {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                NET_CONNECTION_ERRORS.inc();
                return Err(e);
            }
        };
        Ok(Self::spawn(stream, events))
    }

    /// Queue a message for sending. Returns promptly; the writer task drains
    /// the queue in order. Returns false when the connection is gone and the
    /// message was dropped; there is no reconnection, so callers that must
    /// not lose state (task migration) roll back instead of retrying.
    pub fn send(&self, message: Message) -> bool {
        NET_MESSAGES_SENT
            .with_label_values(&[message.type_name()])
            .inc();
        if self.outbound.send(message).is_err() {
            warn!(peer = %self.peer, "send on closed connection dropped");
            return false;
        }
        true
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Accept inbound connections forever, spawning a [`Connection`] per stream.
pub fn spawn_listener(listener: TcpListener, events: mpsc::Sender<NodeEvent>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "accepted connection");
                    Connection::spawn(stream, events.clone());
                }
                Err(e) => {
                    error!("accept error: {}", e);
                    NET_CONNECTION_ERRORS.inc();
                }
            }
        }
    });
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    peer: String,
) {
    while let Some(message) = outbound.recv().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(peer = %peer, error = %e, "failed to encode frame");
                continue;
            }
        };
        NET_BYTES_SENT.inc_by(frame.len() as f64);
        if let Err(e) = writer.write_all(&frame).await {
            error!(peer = %peer, error = %e, "write failed, closing connection");
            NET_CONNECTION_ERRORS.inc();
            break;
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, events: mpsc::Sender<NodeEvent>, conn: Connection) {
    let mut buf = BytesMut::with_capacity(4096);

    'outer: loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!(peer = %conn.peer, "connection closed by peer");
                break;
            }
            Ok(n) => {
                NET_BYTES_RECEIVED.inc_by(n as f64);
                loop {
                    match try_parse_frame(&mut buf) {
                        Ok(Some(message)) => {
                            trace!(peer = %conn.peer, kind = message.type_name(), "frame received");
                            NET_MESSAGES_RECEIVED
                                .with_label_values(&[message.type_name()])
                                .inc();
                            let event = NodeEvent {
                                conn: conn.clone(),
                                message,
                            };
                            if events.send(event).await.is_err() {
                                // node is gone, nothing left to deliver to
                                break 'outer;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!(peer = %conn.peer, error = %e, "malformed frame, closing connection");
                            NET_DECODE_ERRORS.inc();
                            break 'outer;
                        }
                    }
                }
            }
            Err(e) => {
                error!(peer = %conn.peer, error = %e, "read failed, closing connection");
                NET_CONNECTION_ERRORS.inc();
                break;
            }
        }
    }

    NET_CONNECTIONS_OPEN.dec();
}
