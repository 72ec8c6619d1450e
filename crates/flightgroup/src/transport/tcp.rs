//! Newline-delimited JSON frames over TCP.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use super::{Transport, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Fresh,
    Open,
    Closed,
}

/// A single TCP connection to the relay.
#[derive(Debug)]
pub struct TcpTransport {
    address: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    link: Link,
}

impl TcpTransport {
    /// Connect to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the connection cannot be established.
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| Error::Connect {
                address: address.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!(address, "TCP connection established");
        Ok(Self::from_stream(address, stream))
    }

    fn from_stream(address: &str, stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            address: address.to_string(),
            lines: BufReader::new(reader).lines(),
            writer,
            link: Link::Fresh,
        }
    }

    /// Address this transport connected to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.link == Link::Closed {
            return Err(Error::Disconnected);
        }
        let mut line = frame.encode()?;
        trace!(event = frame.message.name(), "Sending frame");
        line.push('\n');
        let written = match self.writer.write_all(line.as_bytes()).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(address = %self.address, error = %e, "Write failed, connection lost");
            self.link = Link::Closed;
            return Err(Error::Disconnected);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        match self.link {
            Link::Fresh => {
                self.link = Link::Open;
                return Some(TransportEvent::Connected);
            }
            Link::Closed => return None,
            Link::Open => {}
        }

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Frame::decode(&line) {
                        Ok(frame) => return Some(TransportEvent::Frame(frame)),
                        Err(e) => warn!(error = %e, "Skipping undecodable frame"),
                    }
                }
                Ok(None) => {
                    debug!(address = %self.address, "Relay closed the connection");
                    self.link = Link::Closed;
                    return Some(TransportEvent::Disconnected);
                }
                Err(e) => {
                    warn!(address = %self.address, error = %e, "Connection lost");
                    self.link = Link::Closed;
                    return Some(TransportEvent::Disconnected);
                }
            }
        }
    }
}
