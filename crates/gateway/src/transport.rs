//! Socket transport abstraction.
//!
//! The `ConnectionManager` drives its state machine against these traits
//! so the reconnect logic stays independent of tokio-tungstenite;
//! `WsDialer` is the production implementation. A dial yields split
//! sink/stream halves so the manager can wait on inbound frames while
//! transmitting from the command side of its event loop.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};

/// Outbound half of an established connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Transmits one complete text frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Closes the connection. Close errors are not actionable and are
    /// swallowed by implementations.
    async fn close(&mut self);
}

/// Inbound half of an established connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next text frame. `Ok(None)` means the peer closed
    /// the connection; `Err` means the connection failed.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

/// Establishes connections on behalf of the manager.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Opens a connection to `url` and returns its two halves.
    async fn dial(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production dialer over tokio-tungstenite.
pub struct WsDialer;

struct WsSink {
    sink: SplitSink<WsStream, WsMessage>,
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let (stream, _) = connect_async(url).await?;
        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.sink.send(WsMessage::Text(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

#[async_trait]
impl FrameStream for WsSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        // Ping/pong frames are answered inside tungstenite and never
        // surface as messages; binary frames are not part of the wire
        // contract and are skipped.
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(error)) => return Err(error.into()),
            }
        }
    }
}
