//! Point-to-point transport between round participants.

use parking_lot::RwLock;
use std::sync::Arc;
use tally_types::ServerIndex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// An encoded message in flight.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: ServerIndex,
    /// Topic the codec dispatches on.
    pub topic: &'static str,
    /// Compressed message body.
    pub payload: Vec<u8>,
}

/// Errors delivering an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no route to {0}")]
    UnknownPeer(ServerIndex),

    #[error("{0} is disconnected")]
    Disconnected(ServerIndex),

    #[error("inbox of {0} is full")]
    InboxFull(ServerIndex),
}

/// Sends envelopes to peers.
///
/// Sends never block; a failed send is reported to the caller, which feeds it
/// back into the round as a transport failure.
pub trait Transport: Send + Sync {
    fn send(&self, to: ServerIndex, envelope: Envelope) -> Result<(), TransportError>;
}

/// In-process transport over bounded tokio channels, one inbox per server.
#[derive(Debug)]
pub struct LocalTransport {
    inboxes: RwLock<Vec<Option<mpsc::Sender<Envelope>>>>,
}

impl LocalTransport {
    /// Create a fully connected mesh of `num_servers` inboxes.
    ///
    /// Returns the shared transport and each server's receiving end, in
    /// roster order.
    pub fn mesh(num_servers: usize, capacity: usize) -> (Arc<Self>, Vec<mpsc::Receiver<Envelope>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..num_servers)
            .map(|_| {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (Some(tx), rx)
            })
            .unzip();
        let transport = Arc::new(Self {
            inboxes: RwLock::new(senders),
        });
        (transport, receivers)
    }

    /// Cut a server off: every later send to it fails.
    pub fn disconnect(&self, peer: ServerIndex) {
        if let Some(slot) = self.inboxes.write().get_mut(peer.as_usize()) {
            *slot = None;
        }
    }
}

impl Transport for LocalTransport {
    fn send(&self, to: ServerIndex, envelope: Envelope) -> Result<(), TransportError> {
        let inboxes = self.inboxes.read();
        let inbox = inboxes
            .get(to.as_usize())
            .ok_or(TransportError::UnknownPeer(to))?
            .as_ref()
            .ok_or(TransportError::Disconnected(to))?;

        trace!(from = %envelope.from, to = %to, topic = envelope.topic, bytes = envelope.payload.len(), "Sending");
        inbox.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::InboxFull(to),
            mpsc::error::TrySendError::Closed(_) => TransportError::Disconnected(to),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(from: u32) -> Envelope {
        Envelope {
            from: ServerIndex(from),
            topic: "round.test",
            payload: vec![from as u8],
        }
    }

    #[test]
    fn test_mesh_delivers_in_order() {
        let (transport, mut inboxes) = LocalTransport::mesh(2, 8);
        transport.send(ServerIndex(1), envelope(0)).unwrap();
        transport.send(ServerIndex(1), envelope(1)).unwrap();

        assert_eq!(inboxes[1].try_recv().unwrap().payload, vec![0]);
        assert_eq!(inboxes[1].try_recv().unwrap().payload, vec![1]);
        assert!(inboxes[0].try_recv().is_err());
    }

    #[test]
    fn test_send_failures() {
        let (transport, inboxes) = LocalTransport::mesh(3, 1);

        assert_eq!(
            transport.send(ServerIndex(5), envelope(0)),
            Err(TransportError::UnknownPeer(ServerIndex(5)))
        );

        transport.send(ServerIndex(0), envelope(1)).unwrap();
        assert_eq!(
            transport.send(ServerIndex(0), envelope(1)),
            Err(TransportError::InboxFull(ServerIndex(0)))
        );

        transport.disconnect(ServerIndex(1));
        assert_eq!(
            transport.send(ServerIndex(1), envelope(0)),
            Err(TransportError::Disconnected(ServerIndex(1)))
        );

        drop(inboxes);
        assert_eq!(
            transport.send(ServerIndex(2), envelope(0)),
            Err(TransportError::Disconnected(ServerIndex(2)))
        );
    }
}
