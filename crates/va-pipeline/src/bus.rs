use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use va_core::bus::BusEvent;
use va_core::session::SessionId;

const CHANNEL_CAPACITY: usize = 256;

/// Owns one `broadcast::Sender<BusEvent>` per session, created lazily on
/// first subscribe or publish. A session with no connected client still
/// gets a channel — transcription and LLM workers publish regardless of
/// whether anyone is listening (SPEC_FULL §4.6).
#[derive(Default)]
pub struct SessionBus {
    channels: RwLock<HashMap<SessionId, broadcast::Sender<BusEvent>>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sender for `session_id`, creating its channel if this
    /// is the first use.
    pub async fn sender(&self, session_id: &SessionId) -> broadcast::Sender<BusEvent> {
        if let Some(tx) = self.channels.read().await.get(session_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribes to `session_id`'s event stream, creating the channel if
    /// needed.
    pub async fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<BusEvent> {
        self.sender(session_id).await.subscribe()
    }

    /// Publishes an event to `session_id`'s channel. A send with no
    /// subscribers is not an error — it is simply dropped.
    pub async fn publish(&self, session_id: &SessionId, event: BusEvent) {
        let tx = self.sender(session_id).await;
        let _ = tx.send(event);
    }

    /// Drops the channel for a session that has gone idle. Any existing
    /// subscribers keep their handle; a later `subscribe` recreates a
    /// fresh channel.
    pub async fn remove_session(&self, session_id: &SessionId) {
        self.channels.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = SessionBus::new();
        let session = "s1".to_string();
        let mut rx = bus.subscribe(&session).await;
        bus.publish(
            &session,
            BusEvent::ProcessingStatus {
                session_id: session.clone(),
                kind: va_core::bus::OperationKind::Summary,
                busy: true,
            },
        )
        .await;
        let event = rx.recv().await.unwrap();
        match event {
            BusEvent::ProcessingStatus { busy, .. } => assert!(busy),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sessions_have_independent_channels() {
        let bus = SessionBus::new();
        let a = "a".to_string();
        let b = "b".to_string();
        let mut rx_a = bus.subscribe(&a).await;
        let _rx_b = bus.subscribe(&b).await;
        bus.publish(
            &b,
            BusEvent::Error {
                session_id: Some(b.clone()),
                kind: None,
                message: "boom".into(),
                recoverable: false,
            },
        )
        .await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = SessionBus::new();
        let session = "s1".to_string();
        bus.publish(
            &session,
            BusEvent::Error {
                session_id: Some(session.clone()),
                kind: None,
                message: "boom".into(),
                recoverable: true,
            },
        )
        .await;
    }

    #[tokio::test]
    async fn remove_session_drops_channel() {
        let bus = SessionBus::new();
        let session = "s1".to_string();
        let _rx = bus.subscribe(&session).await;
        bus.remove_session(&session).await;
        assert!(bus.channels.read().await.get(&session).is_none());
    }
}
