//! Publish driver
//!
//! Owns a stream for the lifetime of one publisher: registers it, pumps every
//! packet from the source into the registry and unregisters it on the way out,
//! whether the source ended cleanly or failed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::PacketSource;
use crate::error::Result;
use crate::registry::{RegistryError, StreamKey, StreamRegistry};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Totals for a finished publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Packets dispatched
    pub packets: u64,
    /// Payload bytes dispatched
    pub bytes: u64,
}

/// One publisher bound to one stream
pub struct PublishSession {
    registry: Arc<StreamRegistry>,
    key: StreamKey,
    session_id: u64,
}

impl PublishSession {
    /// Create a session with a fresh session ID
    pub fn new(registry: Arc<StreamRegistry>, key: StreamKey) -> Self {
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        Self::with_session_id(registry, key, session_id)
    }

    /// Create a session for an existing connection
    pub fn with_session_id(registry: Arc<StreamRegistry>, key: StreamKey, session_id: u64) -> Self {
        Self {
            registry,
            key,
            session_id,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Publish the stream and dispatch everything `source` yields
    ///
    /// The stream is unpublished before this returns, on success or error.
    /// If another session took the stream over in the meantime, the pump stops
    /// with [`RegistryError::PublisherMismatch`] and the new holder is left
    /// alone.
    pub async fn run<P: PacketSource>(&self, mut source: P) -> Result<PublishSummary> {
        self.registry.publish(&self.key, self.session_id).await?;

        let result = self.pump(&mut source).await;

        match self.registry.unpublish(&self.key, self.session_id).await {
            Ok(()) => {}
            Err(e @ RegistryError::PublisherMismatch { .. }) => {
                tracing::debug!(
                    stream = %self.key,
                    session_id = self.session_id,
                    error = %e,
                    "Stream already taken over"
                );
            }
            Err(e) => {
                tracing::debug!(
                    stream = %self.key,
                    session_id = self.session_id,
                    error = %e,
                    "Unpublish skipped"
                );
            }
        }

        match &result {
            Ok(summary) => tracing::info!(
                stream = %self.key,
                session_id = self.session_id,
                packets = summary.packets,
                bytes = summary.bytes,
                "Publish session finished"
            ),
            Err(e) => tracing::warn!(
                stream = %self.key,
                session_id = self.session_id,
                error = %e,
                "Publish session failed"
            ),
        }

        result
    }

    async fn pump<P: PacketSource>(&self, source: &mut P) -> Result<PublishSummary> {
        let pool = self
            .registry
            .buffer_pool(&self.key)
            .await
            .ok_or_else(|| RegistryError::NoActivePublisher(self.key.clone()))?;

        let mut summary = PublishSummary::default();
        while let Some(packet) = source.next_packet(pool.as_ref()).await? {
            summary.packets += 1;
            summary.bytes += packet.size() as u64;
            self.registry
                .dispatch_from(&self.key, self.session_id, packet)
                .await?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::Error;
    use crate::media::Packet;
    use crate::pool::BufferPool;
    use crate::session::SourceError;
    use crate::sink::ChannelSink;

    struct FailingSource;

    impl PacketSource for FailingSource {
        async fn next_packet(
            &mut self,
            _pool: &dyn BufferPool,
        ) -> std::result::Result<Option<Packet>, SourceError> {
            Err(SourceError::Truncated)
        }
    }

    #[tokio::test]
    async fn test_run_dispatches_and_unpublishes() {
        let registry = Arc::new(StreamRegistry::new());
        let key = StreamKey::new("live", "session");
        let session = PublishSession::new(Arc::clone(&registry), key.clone());

        let (tx, rx) = mpsc::channel(8);
        let run = tokio::spawn(async move { session.run(rx).await });

        // Wait for the publisher to appear
        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.has_active_stream(&key).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let (sink, mut sink_rx) = ChannelSink::new(8);
        registry.attach(&key, sink).await.unwrap();

        tx.send(Packet::video(0, Bytes::from_static(&[0x17, 0x01, 0xAA]), true))
            .await
            .unwrap();
        let received = sink_rx.recv().await.unwrap();
        assert!(received.is_keyframe);

        drop(tx);
        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary, PublishSummary { packets: 1, bytes: 3 });

        assert!(!registry.has_active_stream(&key).await);
        assert!(sink_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_unpublishes_on_source_error() {
        let registry = Arc::new(StreamRegistry::new());
        let key = StreamKey::new("live", "broken");
        let session = PublishSession::new(Arc::clone(&registry), key.clone());

        let result = session.run(FailingSource).await;

        assert!(matches!(result, Err(Error::Source(SourceError::Truncated))));
        assert_eq!(registry.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_rejected_when_stream_taken() {
        let registry = Arc::new(StreamRegistry::new());
        let key = StreamKey::new("live", "busy");
        registry.publish(&key, 999).await.unwrap();

        let session = PublishSession::new(Arc::clone(&registry), key.clone());
        let (_tx, rx) = mpsc::channel::<Packet>(1);
        let result = session.run(rx).await;

        assert!(matches!(
            result,
            Err(Error::Registry(RegistryError::AlreadyPublishing(_)))
        ));
        // The holder keeps its stream
        let stats = registry.get_stream_stats(&key).await.unwrap();
        assert_eq!(stats.publisher_id, 999);
    }

    #[tokio::test]
    async fn test_take_over_stops_old_session() {
        let registry = Arc::new(StreamRegistry::new());
        let key = StreamKey::new("live", "handoff");
        let session = PublishSession::with_session_id(Arc::clone(&registry), key.clone(), 1);

        let (tx, rx) = mpsc::channel(8);
        let run = tokio::spawn(async move { session.run(rx).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.has_active_stream(&key).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(registry.take_over(&key, 2).await.unwrap(), Some(1));
        tx.send(Packet::audio(0, Bytes::from_static(&[0xAF, 0x01])))
            .await
            .unwrap();

        let result = run.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::Registry(RegistryError::PublisherMismatch { holder: 2, .. }))
        ));
        // New holder untouched by the old session's cleanup
        let stats = registry.get_stream_stats(&key).await.unwrap();
        assert_eq!(stats.publisher_id, 2);
    }
}
