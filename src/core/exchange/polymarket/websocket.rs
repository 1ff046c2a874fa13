//! Duplex WebSocket client for the market event channel.
//!
//! The read and write paths are decoupled: a reader task pushes raw text
//! frames into a bounded channel consumed by the evaluator, while writes
//! (subscriptions, keep-alive pings) go through a single mutex-guarded
//! sink. The client never blocks the feed on a slow consumer; frames are
//! dropped with a warning when the channel is full.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{IncrementalOp, MarketSubscription};
use crate::error::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Event client tuning knobs.
#[derive(Debug, Clone)]
pub struct EventClientConfig {
    /// WebSocket URL of the market channel.
    pub url: String,
    /// Keep-alive interval for the text `PING` (default 10 s).
    pub ping_interval: Duration,
    /// Capacity of the in-bound frame channel (default 1024).
    pub frame_buffer: usize,
    /// Capacity of the error channel (default 64).
    pub error_buffer: usize,
}

impl Default for EventClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_secs(10),
            frame_buffer: 1024,
            error_buffer: 64,
        }
    }
}

/// Receiving ends handed to the consumer at construction.
pub struct EventChannels {
    /// Raw text frames from the exchange, in arrival order.
    pub frames: mpsc::Receiver<String>,
    /// Connection-level error descriptions.
    pub errors: mpsc::Receiver<String>,
}

/// Duplex client for the exchange's market event channel.
pub struct EventClient {
    config: EventClientConfig,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    frames_tx: mpsc::Sender<String>,
    errors_tx: mpsc::Sender<String>,
    connected: AtomicBool,
    /// Bumped on every (re)connect so stale reader/pinger tasks stand down.
    generation: AtomicU64,
    last_message_at: parking_lot::Mutex<Option<Instant>>,
    ever_received: AtomicBool,
}

impl EventClient {
    /// Create a client and the channels its reader will feed.
    #[must_use]
    pub fn new(config: EventClientConfig) -> (Arc<Self>, EventChannels) {
        let (frames_tx, frames_rx) = mpsc::channel(config.frame_buffer.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(config.error_buffer.max(1));
        let client = Arc::new(Self {
            config,
            writer: tokio::sync::Mutex::new(None),
            frames_tx,
            errors_tx,
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            last_message_at: parking_lot::Mutex::new(None),
            ever_received: AtomicBool::new(false),
        });
        (
            client,
            EventChannels {
                frames: frames_rx,
                errors: errors_rx,
            },
        )
    }

    /// Whether a connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Time since the last frame arrived, if any frame ever has.
    pub fn last_message_age(&self) -> Option<Duration> {
        self.last_message_at.lock().map(|at| at.elapsed())
    }

    /// Whether any message has ever been received on any connection.
    pub fn ever_received(&self) -> bool {
        self.ever_received.load(Ordering::SeqCst)
    }

    /// Dial the exchange and start this connection's reader and pinger.
    pub async fn connect(self: Arc<Self>) -> Result<()> {
        url::Url::parse(&self.config.url)?;
        info!(url = %self.config.url, "Connecting to event channel");

        let (ws, response) = connect_async(&self.config.url).await?;
        info!(status = %response.status(), "Event channel connected");

        let (sink, source) = ws.split();
        *self.writer.lock().await = Some(sink);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.connected.store(true, Ordering::SeqCst);

        let reader = Arc::clone(&self);
        tokio::spawn(async move { reader.read_loop(source, generation).await });

        let pinger = Arc::clone(&self);
        tokio::spawn(async move { pinger.ping_loop(generation).await });

        Ok(())
    }

    /// Send the initial market-channel subscription for `asset_ids`.
    pub async fn subscribe(&self, asset_ids: Vec<String>) -> Result<()> {
        info!(assets = asset_ids.len(), "Subscribing to assets");
        self.write_json(&MarketSubscription::new(asset_ids)).await
    }

    /// Subscribe additional assets on the open connection.
    pub async fn subscribe_assets(&self, asset_ids: Vec<String>) -> Result<()> {
        if asset_ids.is_empty() {
            return Ok(());
        }
        debug!(assets = asset_ids.len(), "Incremental subscribe");
        self.write_json(&IncrementalOp::subscribe(asset_ids)).await
    }

    /// Unsubscribe assets on the open connection.
    pub async fn unsubscribe_assets(&self, asset_ids: Vec<String>) -> Result<()> {
        if asset_ids.is_empty() {
            return Ok(());
        }
        debug!(assets = asset_ids.len(), "Incremental unsubscribe");
        self.write_json(&IncrementalOp::unsubscribe(asset_ids)).await
    }

    /// Close the current connection, if any.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Invalidate the current reader/pinger generation before tearing
        // down the sink so they stand down instead of reporting an error.
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            info!("Event channel closed");
        }
    }

    /// Close, wait `redial_delay`, reconnect, and resubscribe `asset_ids`.
    pub async fn reconnect(
        self: Arc<Self>,
        asset_ids: Vec<String>,
        redial_delay: Duration,
    ) -> Result<()> {
        warn!("Reconnecting event channel");
        self.close().await;
        tokio::time::sleep(redial_delay).await;
        Arc::clone(&self).connect().await?;
        self.subscribe(asset_ids).await
    }

    async fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.write_text(json).await
    }

    async fn write_text(&self, text: String) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| Error::Connection("Not connected".into()))?;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    fn mark_received(&self) {
        *self.last_message_at.lock() = Some(Instant::now());
        self.ever_received.store(true, Ordering::SeqCst);
    }

    fn report_error(&self, description: String) {
        if self.errors_tx.try_send(description).is_err() {
            warn!("Error channel full, dropping connection error");
        }
    }

    /// Whether `generation` is still the live connection.
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, generation: u64) {
        while let Some(message) = source.next().await {
            if !self.is_current(generation) {
                return;
            }
            match message {
                Ok(Message::Text(text)) => {
                    self.mark_received();
                    let trimmed = text.trim();
                    // Keep-alive echoes are not events.
                    if trimmed.eq_ignore_ascii_case("PONG") || trimmed.eq_ignore_ascii_case("PING")
                    {
                        continue;
                    }
                    if self.frames_tx.try_send(text).is_err() {
                        warn!("Frame channel full, dropping frame");
                    }
                }
                Ok(Message::Ping(data)) => {
                    self.mark_received();
                    let mut guard = self.writer.lock().await;
                    if let Some(sink) = guard.as_mut() {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send pong");
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!(frame = ?frame, "Event channel closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Event channel error");
                    self.report_error(e.to_string());
                    break;
                }
            }
        }

        if self.is_current(generation) {
            self.connected.store(false, Ordering::SeqCst);
            self.report_error("event channel reader stopped".into());
        }
    }

    async fn ping_loop(self: Arc<Self>, generation: u64) {
        loop {
            tokio::time::sleep(self.config.ping_interval).await;
            if !self.is_current(generation) || !self.is_connected() {
                return;
            }
            if let Err(e) = self.write_text("PING".into()).await {
                debug!(error = %e, "Keep-alive ping failed");
                return;
            }
        }
    }
}
