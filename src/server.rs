//! TCP front end: turns client connections into session and buffer events,
//! and carries worker results back out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::buffer::{Frame, FrameBuffer};
use crate::protocol::{message_stream, recv_message, send_message, ClientMessage, ServerMessage};
use crate::session::{FrameResult, Outbox, RoutingId, SessionRegistry};

/// Outbound messages queued per connection before results are dropped.
pub const OUTBOUND_DEPTH: usize = 4;

/// How often the accept loop re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Outbound channels of the open connections, keyed by routing id.
#[derive(Default)]
pub struct ConnectionTable {
    senders: Mutex<HashMap<RoutingId, mpsc::Sender<ServerMessage>>>,
}

impl ConnectionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<RoutingId, mpsc::Sender<ServerMessage>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, id: RoutingId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_DEPTH);
        self.lock().insert(id, tx);
        rx
    }

    pub fn remove(&self, id: RoutingId) {
        self.lock().remove(&id);
    }

    /// Queues `msg` without waiting. False if the connection is gone or its
    /// queue is full.
    pub fn send(&self, id: RoutingId, msg: ServerMessage) -> bool {
        let Some(tx) = self.lock().get(&id).cloned() else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("{} outbound queue full, dropping message", id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Outbox for ConnectionTable {
    fn emit(&self, routing_id: RoutingId, result: FrameResult) {
        self.send(routing_id, ServerMessage::from(result));
    }
}

pub struct PoseServer {
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionTable>,
    next_id: AtomicU64,
}

impl PoseServer {
    pub fn new(buffer: Arc<FrameBuffer>) -> Self {
        let connections = Arc::new(ConnectionTable::default());
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&buffer), connections.clone()));
        Self {
            sessions,
            connections,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registry shared with the worker.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Accepts clients until `shutdown` is set.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        tracing::info!("listening on {}", listener.local_addr()?);
        while !shutdown.load(Ordering::Relaxed) {
            let (socket, addr) = match tokio::time::timeout(SHUTDOWN_POLL, listener.accept()).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
                Ok(Ok(accepted)) => accepted,
            };
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_connection(socket, addr).await;
            });
        }
        tracing::info!("accept loop stopped");
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream, addr: SocketAddr) {
        let id = RoutingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!("set_nodelay failed for {}: {}", addr, e);
        }
        tracing::info!("{} connected from {}", id, addr);

        let (mut sink, mut stream) = message_stream(socket).split();
        let mut outbound = self.connections.register(id);
        self.sessions.attach(id);
        self.connections.send(
            id,
            ServerMessage::Status {
                message: "connected".to_string(),
            },
        );

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if let Err(e) = send_message(&mut sink, &msg).await {
                    tracing::debug!("{} write failed: {}", id, e);
                    break;
                }
            }
        });

        loop {
            match recv_message::<_, ClientMessage>(&mut stream).await {
                Ok(Some(msg)) => self.handle_message(id, msg),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("{} read failed: {}", id, e);
                    break;
                }
            }
        }

        self.connections.remove(id);
        self.sessions.detach(id);
        writer.abort();
        tracing::info!("{} disconnected", id);
    }

    fn handle_message(&self, id: RoutingId, msg: ClientMessage) {
        match msg {
            ClientMessage::Frame {
                timestamp_us,
                jpeg_data,
            } => {
                if !self.sessions.submit(id, Frame::new(jpeg_data, timestamp_us)) {
                    tracing::trace!("dropping frame from detached {}", id);
                }
            }
            ClientMessage::AdjustPose { action } => {
                // only the attached client steers the overlay
                if !self.sessions.is_attached(id) {
                    tracing::debug!("ignoring {:?} from detached {}", action, id);
                    return;
                }
                if let Some(transform) = self.sessions.adjust(action) {
                    self.connections.send(id, ServerMessage::from(transform));
                }
            }
            ClientMessage::Ping => {
                self.connections.send(id, ServerMessage::Pong);
            }
        }
    }
}
