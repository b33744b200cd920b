//! Transport seam between the state engine and the vendor wire protocol
//!
//! Session handling and encryption of the Tuya local protocol live behind the
//! [`Transport`] trait. Implementations push unsolicited [`TransportEvent`]s
//! through an unbounded channel created with [`event_channel`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::Result,
    protocol::{DpsMessage, SetRequest, TransportEvent},
};

/// Sending half of a transport's event channel
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of a transport's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the channel a transport pushes its events into
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Black-box channel to one device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Locate the device on the local network
    ///
    /// Only called when no fixed address is configured.
    async fn find(&self) -> Result<()>;

    /// Open a session
    async fn connect(&self) -> Result<()>;

    /// Close the session
    async fn disconnect(&self) -> Result<()>;

    /// Whether a session is currently open
    async fn is_connected(&self) -> bool;

    /// Request every data point of the device
    async fn get_schema(&self) -> Result<DpsMessage>;

    /// Write a single data point
    async fn set(&self, request: SetRequest) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::{mock::MockTransport, *};
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_transport_counts_calls() {
        let transport = MockTransport::new(DpsMessage::new([(104, json!(42))]));
        assert!(!transport.is_connected().await);

        transport.connect().await.unwrap();
        assert!(transport.is_connected().await);

        let message = transport.get_schema().await.unwrap();
        assert_eq!(message.dps.get("104"), Some(&json!(42)));
        assert_eq!(transport.get_calls(), 1);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_event_channel() {
        let (sender, mut receiver) = event_channel();
        sender.send(TransportEvent::Connected).unwrap();
        drop(sender);

        assert_eq!(receiver.recv().await, Some(TransportEvent::Connected));
        assert_eq!(receiver.recv().await, None);
    }
}
