use crate::types::Result;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open text transport.
///
/// `inbound` yields every received text message and ends when the socket
/// closes or errors; dropping every `outbound` sender closes the socket.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens transports for the connection manager.
///
/// The production implementation is [`WebSocketFactory`]; tests plug in an
/// in-memory connector.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<TransportLink>>;
}

/// WebSocket factory for creating WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl WebSocketFactory {
    /// Create a new WebSocket connection
    pub async fn create(url: &str) -> Result<WsStream> {
        tracing::debug!("Creating WebSocket connection to: {}", url);
        let (stream, response) = connect_async(url).await?;
        tracing::debug!("WebSocket upgrade completed with status {}", response.status());
        Ok(stream)
    }

    /// Splits the socket into a reader task and a writer task bridged by
    /// channels. The two share their fate: once the reader stops the writer
    /// closes `outbound`, so later sends fail instead of vanishing, and a
    /// failed write stops the reader, which ends `inbound`.
    fn bridge(stream: WsStream) -> TransportLink {
        let (mut write_half, mut read_half) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        // dropped by the reader when it finishes
        let (reader_done_tx, mut reader_done) = oneshot::channel::<()>();

        let reader = tokio::spawn(async move {
            let _reader_done_tx = reader_done_tx;
            while let Some(msg_result) = read_half.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if inbound_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Err(_) => {
                            tracing::warn!(
                                "Received non-UTF-8 binary message ({} bytes)",
                                data.len()
                            );
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        if let Some(close_frame) = frame {
                            tracing::warn!(
                                "Server closed connection: code={:?}, reason='{}'",
                                close_frame.code,
                                close_frame.reason.as_str()
                            );
                        } else {
                            tracing::warn!("Server closed connection without close frame");
                        }
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        tracing::trace!("Received ping ({} bytes)", data.len());
                    }
                    Ok(Message::Pong(data)) => {
                        tracing::trace!("Received pong ({} bytes)", data.len());
                    }
                    Ok(Message::Frame(_)) => {
                        tracing::trace!("Received raw frame (internal)");
                    }
                    Err(e) => {
                        tracing::error!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Read task finished");
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = outbound_rx.recv() => {
                        let Some(text) = next else {
                            break;
                        };
                        if let Err(e) = write_half.send(Message::Text(text.into())).await {
                            tracing::error!("WebSocket write error: {}", e);
                            reader.abort();
                            break;
                        }
                    }
                    _ = &mut reader_done => {
                        tracing::debug!("Reader stopped, closing writer");
                        break;
                    }
                }
            }
            outbound_rx.close();
            let dropped = std::iter::from_fn(|| outbound_rx.try_recv().ok()).count();
            if dropped > 0 {
                tracing::warn!("{} frame(s) not written before the socket closed", dropped);
            }
            let _ = write_half.close().await;
            tracing::debug!("Write task finished");
        });

        TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }
}

impl Connector for WebSocketFactory {
    fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<TransportLink>> {
        let url = endpoint.to_string();
        Box::pin(async move {
            let stream = Self::create(&url).await?;
            Ok(Self::bridge(stream))
        })
    }
}
