//! Plain TCP transport.
//!
//! Twitch chat accepts unencrypted IRC on port 6667.

use async_trait::async_trait;
use buzz_protocol::{codec, IrcMessage, ProtocolError};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::traits::{Connection, Connector, TransportError};

/// TCP connector configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Chat server host.
    pub host: String,
    /// Chat server port.
    pub port: u16,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "irc.chat.twitch.tv".to_string(),
            port: 6667,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connects to the chat server over TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpConfig,
}

impl TcpConnector {
    /// Create a new TCP connector.
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("Connecting to {}", addr);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout)??;
        stream.set_nodelay(true)?;

        let remote_addr = stream.peer_addr().ok();
        info!("Connected to chat server {}", addr);
        Ok(Box::new(TcpConnection::new(stream, remote_addr)))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// A TCP connection to the chat server.
pub struct TcpConnection {
    stream: TcpStream,
    remote_addr: Option<SocketAddr>,
    is_open: bool,
    read_buffer: BytesMut,
}

impl TcpConnection {
    /// Wrap a connected stream.
    #[must_use]
    pub fn new(stream: TcpStream, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            stream,
            remote_addr,
            is_open: true,
            read_buffer: BytesMut::with_capacity(8192),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn recv(&mut self) -> Result<Option<IrcMessage>, TransportError> {
        loop {
            match codec::decode_from(&mut self.read_buffer) {
                Ok(Some(message)) => {
                    trace!(command = %message.command, "Received line");
                    return Ok(Some(message));
                }
                Ok(None) => {}
                Err(e @ ProtocolError::LineTooLong(_)) => {
                    self.is_open = false;
                    return Err(e.into());
                }
                Err(e) => {
                    // A single malformed line is not worth a reconnect.
                    warn!(error = %e, "Skipping malformed line");
                    continue;
                }
            }

            let read = self.stream.read_buf(&mut self.read_buffer).await?;
            if read == 0 {
                debug!("Chat server closed the connection");
                self.is_open = false;
                return Ok(None);
            }
        }
    }

    async fn send(&mut self, message: &IrcMessage) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        let data = codec::encode(message)?;
        self.stream.write_all(&data).await?;
        trace!(command = %message.command, "Sent line");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.stream.shutdown().await?;
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|a| a.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
