//! Connections to the relay.
//!
//! A [`Transport`] moves [`Frame`]s. It reports the connection coming up and
//! going away as [`TransportEvent`]s in the same stream as inbound frames,
//! so the client sees them in order. Reconnecting is the transport's
//! business; the client only rebuilds its session when told.

mod channel;
mod tcp;

use async_trait::async_trait;

pub use channel::{ChannelPeer, ChannelTransport};
pub use tcp::TcpTransport;

use crate::error::Result;
use crate::protocol::Frame;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is up.
    Connected,
    /// The connection is gone.
    Disconnected,
    /// A decoded inbound frame.
    Frame(Frame),
}

/// A bidirectional frame channel.
///
/// `recv` must be cancel safe: the runtime polls it inside `select!`.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone or the frame cannot be
    /// written.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Wait for the next event. `None` once the transport is finished.
    async fn recv(&mut self) -> Option<TransportEvent>;
}
