//! In-process transport over tokio channels.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::{Frame, Message};

/// Client end of an in-process connection.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Server end of an in-process connection.
#[derive(Debug)]
pub struct ChannelPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl ChannelTransport {
    /// A connected pair. Nothing is delivered until the peer calls
    /// [`ChannelPeer::connect`].
    #[must_use]
    pub fn pair() -> (Self, ChannelPeer) {
        let (outbound, frames) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        (Self { outbound, inbound }, ChannelPeer { events, frames })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.outbound.send(frame).map_err(|_| Error::Disconnected)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

impl ChannelPeer {
    /// Announce the connection to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the client end is gone.
    pub fn connect(&self) -> Result<()> {
        self.push(TransportEvent::Connected)
    }

    /// Announce the loss of the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the client end is gone.
    pub fn disconnect(&self) -> Result<()> {
        self.push(TransportEvent::Disconnected)
    }

    /// Deliver a frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the client end is gone.
    pub fn deliver(&self, frame: Frame) -> Result<()> {
        self.push(TransportEvent::Frame(frame))
    }

    /// Answer a request, echoing its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the client end is gone.
    pub fn reply(&self, request: &Frame, message: Message) -> Result<()> {
        self.deliver(Frame {
            id: request.id,
            message,
        })
    }

    /// Wait for the next frame sent by the client.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    fn push(&self, event: TransportEvent) -> Result<()> {
        self.events.send(event).map_err(|_| Error::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LeaveGroupRequest, RequestId};

    #[tokio::test]
    async fn test_pair_carries_both_directions() {
        let (mut transport, mut peer) = ChannelTransport::pair();

        peer.connect().unwrap();
        assert_eq!(transport.recv().await, Some(TransportEvent::Connected));

        let request = Frame::request(
            RequestId(1),
            Message::LeaveGroupRequest(LeaveGroupRequest {
                split_requested: false,
            }),
        );
        transport.send(request.clone()).await.unwrap();
        let received = peer.next_frame().await.unwrap();
        assert_eq!(received, request);

        peer.reply(&received, Message::LeaveGroupResponse(Default::default()))
            .unwrap();
        match transport.recv().await {
            Some(TransportEvent::Frame(frame)) => assert_eq!(frame.id, Some(RequestId(1))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_peer() {
        let (mut transport, peer) = ChannelTransport::pair();
        drop(peer);
        assert!(transport.recv().await.is_none());
        let err = transport
            .send(Frame::event(Message::PilotWaypointSelections(Default::default())))
            .await
            .unwrap_err();
        assert!(err.is_disconnected());
    }
}
