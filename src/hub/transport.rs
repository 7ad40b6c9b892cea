//! Duplex request/response session with the hub
//!
//! `Transport` is the raw WebSocket plumbing (open, send, wait for the reply
//! carrying a given id). `HubSession` sits on top of it and owns everything that
//! is per-hub: the hub id for the envelope, the request id counter, and the
//! exchange lock that keeps at most one exchange in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::HubError;
use crate::models::{HubRequest, HubResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection if it is not open yet
    async fn open(&self) -> Result<(), HubError>;

    /// Serialize and transmit one request
    async fn send_packed(&self, request: &HubRequest) -> Result<(), HubError>;

    /// Wait for the reply correlated with `request_id`
    async fn next_message(&self, request_id: &str) -> Result<HubResponse, HubError>;
}

/// WebSocket transport to the hub
pub struct WsTransport {
    url: String,
    stream: Mutex<Option<WsStream>>,
}

impl WsTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            stream: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self) -> Result<(), HubError> {
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Ok(());
        }

        let (ws, _response) = connect_async(self.url.as_str()).await?;
        tracing::debug!("[Hub] WebSocket connected: {}", self.url);
        *stream = Some(ws);
        Ok(())
    }

    async fn send_packed(&self, request: &HubRequest) -> Result<(), HubError> {
        let text = serde_json::to_string(request)?;

        let mut guard = self.stream.lock().await;
        let ws = guard
            .as_mut()
            .ok_or_else(|| HubError::Transport("connection not open".to_string()))?;

        if let Err(e) = ws.send(Message::Text(text)).await {
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn next_message(&self, request_id: &str) -> Result<HubResponse, HubError> {
        let mut guard = self.stream.lock().await;
        let ws = guard
            .as_mut()
            .ok_or_else(|| HubError::Transport("connection not open".to_string()))?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let response: HubResponse = match serde_json::from_str(&text) {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::debug!("[Hub] Ignoring unparseable frame: {}", e);
                            continue;
                        }
                    };
                    if response.answers(request_id) {
                        return Ok(response);
                    }
                    tracing::debug!(
                        "[Hub] Ignoring frame not addressed to request {}: {}",
                        request_id,
                        text
                    );
                }
                Some(Ok(Message::Close(_))) | None => {
                    *guard = None;
                    return Err(HubError::Transport("connection closed by hub".to_string()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    *guard = None;
                    return Err(e.into());
                }
            }
        }
    }
}

/// One hub connection and its exchange discipline
pub struct HubSession {
    hub_id: String,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    exchange_lock: Mutex<()>,
}

impl HubSession {
    pub fn new(hub_id: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            transport,
            next_id: AtomicU64::new(1),
            exchange_lock: Mutex::new(()),
        }
    }

    /// Run one logical exchange: open, send, await the single correlated reply.
    ///
    /// The exchange lock is held until the reply arrives, so a new exchange never
    /// starts while another one is still waiting for its answer. No client-side
    /// timeout is applied; the envelope only carries the server-side hint.
    pub async fn exchange(&self, cmd: &str, params: Value) -> Result<HubResponse, HubError> {
        let _in_flight = self.exchange_lock.lock().await;

        self.transport.open().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let request = HubRequest::new(&self.hub_id, cmd, &id, params);

        tracing::debug!("[Hub] -> {} (id {})", cmd, id);
        self.transport.send_packed(&request).await?;

        let response = self.transport.next_message(request.id()).await?;
        tracing::debug!(
            "[Hub] <- {} (id {}): code {:?} msg {:?}",
            cmd,
            id,
            response.code(),
            response.msg
        );
        Ok(response)
    }
}
