//! WebSocket transport
//!
//! The socket lives on its own thread; the tick only touches channels, so a
//! slow or dead backend never stalls the simulation.

use bevy::prelude::*;
use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::messages::{InboundMessage, OutboundMessage};
use crate::error::TransportError;

/// How long the socket thread blocks on a read before servicing outbound
const READ_POLL: Duration = Duration::from_millis(15);

/// Bidirectional message channel to the backend
pub trait Transport: Send + Sync {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError>;
    /// Drain everything received since the last call
    fn poll(&mut self) -> Vec<InboundMessage>;
    fn is_connected(&self) -> bool;
}

enum SocketEvent {
    Text(String),
    Closed(String),
}

/// Tungstenite client running on a background thread
pub struct SocketTransport {
    url: String,
    outbound: Sender<String>,
    inbound: Mutex<Receiver<SocketEvent>>,
    connected: bool,
}

impl SocketTransport {
    /// Connect synchronously, then hand the socket to a worker thread
    pub fn connect(url: &str) -> Result<Self, TransportError> {
        let (mut socket, _response) = tungstenite::connect(url)?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(READ_POLL))?;
        }
        info!("Connected to {}", url);

        let (out_tx, out_rx) = mpsc::channel::<String>();
        let (in_tx, in_rx) = mpsc::channel::<SocketEvent>();
        thread::Builder::new()
            .name("navsim-socket".to_string())
            .spawn(move || socket_loop(socket, out_rx, in_tx))?;

        Ok(Self {
            url: url.to_string(),
            outbound: out_tx,
            inbound: Mutex::new(in_rx),
            connected: true,
        })
    }
}

impl Transport for SocketTransport {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let text = message.to_json()?;
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Disconnected)
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        let mut received = Vec::new();
        let Ok(inbound) = self.inbound.lock() else {
            return received;
        };
        loop {
            match inbound.try_recv() {
                Ok(SocketEvent::Text(text)) => match InboundMessage::parse(&text) {
                    Ok(msg) => received.push(msg),
                    Err(e) => warn!("Dropping unreadable socket message: {}", e),
                },
                Ok(SocketEvent::Closed(reason)) => {
                    warn!("Socket {} closed: {}", self.url, reason);
                    self.connected = false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.connected = false;
                    break;
                }
            }
        }
        received
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn socket_loop(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    outbound: Receiver<String>,
    inbound: Sender<SocketEvent>,
) {
    loop {
        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::text(text)) {
                        let _ = inbound.send(SocketEvent::Closed(e.to_string()));
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Owner dropped the transport
                    let _ = socket.close(None);
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if inbound.send(SocketEvent::Text(text.as_str().to_string())).is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .unwrap_or_else(|| "closed by peer".to_string());
                let _ = inbound.send(SocketEvent::Closed(reason));
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                let _ = inbound.send(SocketEvent::Closed(e.to_string()));
                return;
            }
        }
    }
}

/// In-process transport: records what was sent, replays what was injected.
/// Used offline and in tests.
#[derive(Default)]
pub struct LoopbackTransport {
    pub sent: Vec<OutboundMessage>,
    pub pending: VecDeque<InboundMessage>,
    pub disconnected: bool,
}

impl LoopbackTransport {
    pub fn inject(&mut self, message: InboundMessage) {
        self.pending.push_back(message);
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        self.sent.push(message.clone());
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        self.pending.drain(..).collect()
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }
}
