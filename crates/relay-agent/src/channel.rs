//! Outbound channel to the client

use tokio::sync::{broadcast, mpsc};

use crate::events::ClientEvent;

/// Somewhere client notifications go.
///
/// Sending never blocks and never fails the query: a client that has gone
/// away simply stops receiving.
pub trait ClientChannel: Send + Sync {
    fn send(&self, event: ClientEvent);
}

impl ClientChannel for mpsc::UnboundedSender<ClientEvent> {
    fn send(&self, event: ClientEvent) {
        if mpsc::UnboundedSender::send(self, event).is_err() {
            tracing::debug!("client channel closed, dropping event");
        }
    }
}

impl ClientChannel for broadcast::Sender<ClientEvent> {
    fn send(&self, event: ClientEvent) {
        let _ = broadcast::Sender::send(self, event);
    }
}
