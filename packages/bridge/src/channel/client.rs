// packages/bridge/src/channel/client.rs
//! Reconnecting WebSocket client for a peer server
//!
//! A background task owns the socket. While connected, outbound frames flow
//! through an unbounded sender that is swapped out on every disconnect, so a
//! send can never end up on a stale connection: it either reaches the live
//! socket or fails with `NotConnected`.

use crate::channel::{ChannelRole, InboundHandler, MessageSink, PeerChannel};
use crate::observability::{CHANNEL_CONNECTS, FRAMES_SENT};
use crate::utils::errors::{BridgeError, Result};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State shared between the channel handle and its connection task
struct Shared {
    role: ChannelRole,
    url: String,

    /// Sender into the live connection; `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,

    connected: watch::Sender<bool>,

    shutdown: CancellationToken,
}

impl Shared {
    fn attach(&self, tx: mpsc::UnboundedSender<String>) {
        *self.outbound.lock() = Some(tx);
        self.connected.send_replace(true);
    }

    fn detach(&self) {
        *self.outbound.lock() = None;
        self.connected.send_replace(false);
    }
}

impl MessageSink for Shared {
    fn role(&self) -> ChannelRole {
        self.role
    }

    fn send(&self, text: String) -> Result<()> {
        let outbound = self.outbound.lock();
        let tx = outbound
            .as_ref()
            .ok_or(BridgeError::NotConnected { role: self.role })?;

        tx.send(text)
            .map_err(|_| BridgeError::NotConnected { role: self.role })?;

        counter!(FRAMES_SENT, "role" => self.role.as_str()).increment(1);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

/// Duplex message channel to one peer's embedded server
pub struct MessageChannel {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageChannel {
    /// Start maintaining a connection to `url`.
    ///
    /// Returns immediately; use [`wait_connected`](Self::wait_connected) to
    /// wait for the first connection. Every inbound text frame is handed to
    /// `handler` on the channel's own task.
    pub fn connect(
        url: impl Into<String>,
        role: ChannelRole,
        handler: Arc<dyn InboundHandler>,
        retry_interval: Duration,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            role,
            url: url.into(),
            outbound: Mutex::new(None),
            connected,
            shutdown: CancellationToken::new(),
        });

        let task = tokio::spawn(Self::maintain(Arc::clone(&shared), handler, retry_interval));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Resolves once the channel is connected.
    ///
    /// Fails with `NotConnected` if the channel is stopped first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.shared.connected.subscribe();
        tokio::select! {
            res = rx.wait_for(|connected| *connected) => {
                res.map(|_| ()).map_err(|_| BridgeError::NotConnected { role: self.shared.role })
            }
            _ = self.shared.shutdown.cancelled() => {
                Err(BridgeError::NotConnected { role: self.shared.role })
            }
        }
    }

    /// Tear down the connection loop. Every later `send` fails.
    pub async fn stop(&self) {
        self.shared.shutdown.cancel();
        self.shared.detach();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!(role = %self.shared.role, "Channel task did not stop in time");
            }
            info!(role = %self.shared.role, url = %self.shared.url, "Channel stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Connection loop: connect, serve until the socket drops, retry
    async fn maintain(shared: Arc<Shared>, handler: Arc<dyn InboundHandler>, retry_interval: Duration) {
        loop {
            let attempt = tokio::select! {
                res = connect_async(shared.url.as_str()) => res,
                _ = shared.shutdown.cancelled() => break,
            };

            match attempt {
                Ok((socket, _)) => {
                    info!(role = %shared.role, url = %shared.url, "Channel connected");
                    counter!(CHANNEL_CONNECTS, "role" => shared.role.as_str()).increment(1);
                    Self::serve(&shared, handler.as_ref(), socket).await;
                    info!(role = %shared.role, "Channel disconnected");
                }
                Err(e) => {
                    debug!(role = %shared.role, url = %shared.url, "Connection attempt failed: {}", e);
                }
            }

            // Fixed retry delay, no backoff
            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = shared.shutdown.cancelled() => break,
            }
        }

        shared.detach();
        debug!(role = %shared.role, "Connection loop exited");
    }

    async fn serve(shared: &Shared, handler: &dyn InboundHandler, socket: Socket) {
        let (mut write, mut read) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        shared.attach(tx);

        loop {
            tokio::select! {
                inbound = read.next() => match inbound {
                    Some(Ok(Frame::Text(text))) => handler.on_message(shared.role, &text, shared),
                    Some(Ok(Frame::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(role = %shared.role, "Channel read error: {}", e);
                        break;
                    }
                },
                outbound = rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = write.send(Frame::Text(text)).await {
                            warn!(role = %shared.role, "Failed to deliver frame: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = shared.shutdown.cancelled() => {
                    let _ = write.send(Frame::Close(None)).await;
                    break;
                }
            }
        }

        shared.detach();
    }
}

impl MessageSink for MessageChannel {
    fn role(&self) -> ChannelRole {
        self.shared.role
    }

    fn send(&self, text: String) -> Result<()> {
        self.shared.send(text)
    }

    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }
}

impl PeerChannel for MessageChannel {
    fn ready(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.wait_connected())
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.stop())
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
