//! Event stream transport
//!
//! A subscription is opened in two steps: a `POST` to the reservation
//! endpoint returns a token, then a websocket is opened at the stream URL
//! with that token appended. The socket is pumped by its own task, which
//! forwards everything it sees as [`SocketEvent`]s over a channel.

use crate::config::MonitorConfig;
use crate::error::{Result, SyncError};
use crate::events::SubscriptionMessage;
use crate::http::{build_client, check_status, with_service_headers};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

/// Websocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the peer vanished without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Buffered socket events per connection
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Socket is open; the subscription is not confirmed yet
    Opened,
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Peer asked to close
    Closing { code: u16, reason: String },
    /// Socket closed
    Closed { code: u16, reason: String },
    /// Transport or protocol failure; the socket is gone
    Failure(String),
}

/// Request to close a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    /// Close code sent to the peer
    pub code: u16,
    /// Close reason sent to the peer
    pub reason: String,
}

/// Handle used to close a socket from outside its pump task
#[derive(Debug)]
pub struct SocketCloser {
    tx: oneshot::Sender<CloseRequest>,
}

impl SocketCloser {
    /// Wrap the sending half of a close channel
    pub fn new(tx: oneshot::Sender<CloseRequest>) -> Self {
        Self { tx }
    }

    /// Ask the socket to close; a socket already gone is not an error
    pub fn close(self, code: u16, reason: impl Into<String>) {
        let _ = self.tx.send(CloseRequest {
            code,
            reason: reason.into(),
        });
    }
}

/// An open socket: its event feed and its closer
#[derive(Debug)]
pub struct SocketConnection {
    events: mpsc::Receiver<SocketEvent>,
    closer: SocketCloser,
}

impl SocketConnection {
    /// Assemble a connection from its parts
    pub fn new(events: mpsc::Receiver<SocketEvent>, closer: SocketCloser) -> Self {
        Self { events, closer }
    }

    /// Split into event feed and closer
    pub fn into_parts(self) -> (mpsc::Receiver<SocketEvent>, SocketCloser) {
        (self.events, self.closer)
    }
}

/// How the monitor reaches the event stream
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Reserve a subscription and return its token
    async fn reserve(&self) -> Result<String>;

    /// Open the stream for a reservation token
    async fn open(&self, token: &str) -> Result<SocketConnection>;
}

/// Transport over HTTP reservation + websocket stream
pub struct WebSocketTransport {
    client: Client,
    config: MonitorConfig,
}

impl WebSocketTransport {
    /// Create a transport from configuration
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EventTransport for WebSocketTransport {
    async fn reserve(&self) -> Result<String> {
        let url = &self.config.reservations_url;
        let request = with_service_headers(self.client.post(url), &self.config).body("");
        let response = check_status(request.send().await?)?;
        let body = response.text().await?;

        let message = SubscriptionMessage::decode(&body)?;
        if message.data.is_empty() {
            return Err(SyncError::connection(url, "reservation returned no token"));
        }
        Ok(message.data)
    }

    async fn open(&self, token: &str) -> Result<SocketConnection> {
        let url = self.config.stream_url_for(token);
        let mut request = url.as_str().into_client_request()?;

        for (name, value) in self.config.request_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SyncError::config(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| SyncError::config(format!("invalid header value: {}", e)))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _response) = tokio::time::timeout(
            self.config.request_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| SyncError::connection(&url, "websocket handshake timed out"))??;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(pump_socket(ws, event_tx, close_rx));

        Ok(SocketConnection::new(event_rx, SocketCloser::new(close_tx)))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Forward socket traffic to `events` until the socket ends or a close is requested
async fn pump_socket(
    ws: WsStream,
    events: mpsc::Sender<SocketEvent>,
    mut close_rx: oneshot::Receiver<CloseRequest>,
) {
    let (mut sink, mut stream) = ws.split();

    if events.send(SocketEvent::Opened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            request = &mut close_rx => {
                // A dropped closer means nobody owns the socket any more
                let request = request.unwrap_or(CloseRequest {
                    code: NORMAL_CLOSURE,
                    reason: "socket released".to_string(),
                });
                let frame = CloseFrame {
                    code: CloseCode::from(request.code),
                    reason: request.reason.clone().into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!("Close frame not delivered: {}", e);
                }
                let _ = events
                    .send(SocketEvent::Closed { code: request.code, reason: request.reason })
                    .await;
                return;
            }
            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => SocketEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => SocketEvent::Binary(data.to_vec()),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (u16::from(f.code), f.reason.as_str().to_owned()),
                            None => (NORMAL_CLOSURE, String::new()),
                        };
                        let _ = events
                            .send(SocketEvent::Closing { code, reason: reason.clone() })
                            .await;
                        // Flushes the close reply queued by the protocol layer
                        let _ = sink.close().await;
                        let _ = events.send(SocketEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = events.send(SocketEvent::Failure(e.to_string())).await;
                        return;
                    }
                    None => {
                        let _ = events
                            .send(SocketEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: "stream ended".to_string(),
                            })
                            .await;
                        return;
                    }
                };

                if events.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}
