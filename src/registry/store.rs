//! Stream registry implementation
//!
//! The central registry that manages all active streams and routes media
//! from publishers to subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::config::{ConfigError, RegistryConfig};
use super::entry::{StreamEntry, StreamStats};
use super::error::RegistryError;
use super::key::StreamKey;
use crate::media::Packet;
use crate::pool::BufferPool;
use crate::sink::{PacketSink, SinkError, SinkHandle, SinkId, WorkerParams};

/// Result of dispatching one packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Sinks the packet was queued on
    pub delivered: usize,
    /// Sinks dropped during this dispatch (queue full or worker gone)
    pub detached: Vec<SinkId>,
}

/// Central registry for all active streams
///
/// The outer `RwLock` is only held to look up, insert or remove an entry.
/// Each entry has its own mutex, so traffic on one stream never contends
/// with another.
pub struct StreamRegistry {
    /// Map of stream key to stream entry
    streams: RwLock<HashMap<StreamKey, Arc<Mutex<StreamEntry>>>>,

    /// Configuration
    config: RegistryConfig,

    /// Source of sink IDs
    next_sink_id: AtomicU64,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    ///
    /// The configuration is taken as is; zero limits are raised to one.
    /// Use [`try_with_config`](Self::try_with_config) for configuration read
    /// from outside the program.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
            next_sink_id: AtomicU64::new(1),
        }
    }

    /// Create a registry after validating `config`
    pub fn try_with_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a publisher for a stream
    ///
    /// Returns an error if the stream already has a publisher; the existing
    /// publisher is left untouched. Use [`take_over`](Self::take_over) to
    /// evict it instead.
    pub async fn publish(&self, key: &StreamKey, session_id: u64) -> Result<(), RegistryError> {
        if !self.config.is_live(&key.app) {
            return Err(RegistryError::ApplicationDisabled(key.app.clone()));
        }

        let mut streams = self.streams.write().await;

        if let Some(entry_arc) = streams.get(key) {
            let entry = entry_arc.lock().await;
            tracing::warn!(
                stream = %key,
                session_id = session_id,
                holder = entry.publisher_id,
                "Publish rejected, stream already has a publisher"
            );
            return Err(RegistryError::AlreadyPublishing(key.clone()));
        }

        let entry = StreamEntry::new(key.clone(), session_id, &self.config);
        streams.insert(key.clone(), Arc::new(Mutex::new(entry)));

        tracing::info!(
            stream = %key,
            session_id = session_id,
            "Publisher registered"
        );

        Ok(())
    }

    /// Evict the current publisher (if any) and register a new one
    ///
    /// Sinks attached to the evicted publisher are closed and the caches are
    /// discarded. Returns the evicted session ID.
    pub async fn take_over(
        &self,
        key: &StreamKey,
        session_id: u64,
    ) -> Result<Option<u64>, RegistryError> {
        if !self.config.is_live(&key.app) {
            return Err(RegistryError::ApplicationDisabled(key.app.clone()));
        }

        let (evicted, tasks) = {
            let mut streams = self.streams.write().await;

            let (evicted, tasks) = match streams.remove(key) {
                Some(old) => {
                    let mut old = old.lock().await;
                    (Some(old.publisher_id), old.teardown())
                }
                None => (None, Vec::new()),
            };

            let entry = StreamEntry::new(key.clone(), session_id, &self.config);
            streams.insert(key.clone(), Arc::new(Mutex::new(entry)));

            tracing::info!(
                stream = %key,
                session_id = session_id,
                evicted = ?evicted,
                closed_sinks = tasks.len(),
                "Publisher took over stream"
            );

            (evicted, tasks)
        };

        join_workers(key, tasks).await;
        Ok(evicted)
    }

    /// Unregister the publisher of a stream
    ///
    /// Closes every attached sink, clears the caches and removes the stream.
    /// Returns once every sink has been closed.
    pub async fn unpublish(&self, key: &StreamKey, session_id: u64) -> Result<(), RegistryError> {
        let tasks = {
            let mut streams = self.streams.write().await;

            let entry_arc = streams
                .get(key)
                .cloned()
                .ok_or_else(|| RegistryError::NoActivePublisher(key.clone()))?;
            let mut entry = entry_arc.lock().await;

            // Verify this is the actual publisher
            if entry.publisher_id != session_id {
                tracing::warn!(
                    stream = %key,
                    expected = entry.publisher_id,
                    actual = session_id,
                    "Publisher unregister mismatch"
                );
                return Err(RegistryError::PublisherMismatch {
                    key: key.clone(),
                    holder: entry.publisher_id,
                    session_id,
                });
            }

            streams.remove(key);
            let tasks = entry.teardown();

            tracing::info!(
                stream = %key,
                session_id = session_id,
                closed_sinks = tasks.len(),
                "Publisher unregistered"
            );

            tasks
        };

        join_workers(key, tasks).await;
        Ok(())
    }

    /// Attach a sink to a stream
    ///
    /// The sink first receives the cached metadata, sequence headers and GOPs,
    /// then every packet dispatched after the snapshot was taken. Returns once
    /// the cache replay has completed. A sink that fails during replay is not
    /// kept.
    pub async fn attach<S>(&self, key: &StreamKey, sink: S) -> Result<SinkId, RegistryError>
    where
        S: PacketSink + 'static,
    {
        let kind = sink.kind();
        let permitted = self
            .config
            .find_application(&key.app)
            .is_some_and(|app| app.permits(kind));
        if !permitted {
            return Err(RegistryError::ApplicationDisabled(key.app.clone()));
        }

        let entry_arc = self
            .lookup(key)
            .await
            .ok_or_else(|| RegistryError::NoActivePublisher(key.clone()))?;
        let id = SinkId(self.next_sink_id.fetch_add(1, Ordering::Relaxed));

        let ready = {
            let mut entry = entry_arc.lock().await;
            if !entry.is_publishing() {
                return Err(RegistryError::NoActivePublisher(key.clone()));
            }

            let params = WorkerParams {
                id,
                stream: Arc::clone(&entry.key),
                snapshot: entry.cache.clone(),
                queue_capacity: self.config.sink_queue_capacity,
                write_timeout: self.config.sink_write_timeout,
                entry: Arc::downgrade(&entry_arc),
            };
            let (handle, ready) = SinkHandle::spawn(sink, params);
            entry.insert_sink(id, handle);

            tracing::info!(
                stream = %key,
                sink_id = %id,
                kind = ?kind,
                subscribers = entry.subscriber_count(),
                "Sink attached"
            );

            ready
        };

        match ready.await {
            Ok(Ok(())) => Ok(id),
            Ok(Err(source)) => {
                entry_arc.lock().await.remove_sink(id);
                Err(RegistryError::SinkWriteFailed { sink: id, source })
            }
            // Worker stopped during replay. A torn-down stream is no longer
            // publishing; otherwise dispatch dropped the sink for falling behind.
            Err(_) => {
                if entry_arc.lock().await.is_publishing() {
                    Err(RegistryError::SinkWriteFailed {
                        sink: id,
                        source: SinkError::Overflow,
                    })
                } else {
                    Err(RegistryError::NoActivePublisher(key.clone()))
                }
            }
        }
    }

    /// Detach a sink from a stream
    ///
    /// Returns `false` if the sink was not attached. The sink is closed by its
    /// delivery task.
    pub async fn detach(&self, key: &StreamKey, id: SinkId) -> bool {
        let Some(entry_arc) = self.lookup(key).await else {
            return false;
        };

        let Some(handle) = entry_arc.lock().await.remove_sink(id) else {
            return false;
        };

        tracing::debug!(
            stream = %key,
            sink_id = %id,
            kind = ?handle.kind(),
            "Sink detached"
        );
        drop(handle.shutdown());
        true
    }

    /// Cache a packet and forward it to every attached sink
    pub async fn dispatch(
        &self,
        key: &StreamKey,
        packet: Packet,
    ) -> Result<DispatchOutcome, RegistryError> {
        self.dispatch_inner(key, None, packet).await
    }

    /// Like [`dispatch`](Self::dispatch), but only if `session_id` still
    /// holds the stream
    pub async fn dispatch_from(
        &self,
        key: &StreamKey,
        session_id: u64,
        packet: Packet,
    ) -> Result<DispatchOutcome, RegistryError> {
        self.dispatch_inner(key, Some(session_id), packet).await
    }

    async fn dispatch_inner(
        &self,
        key: &StreamKey,
        session_id: Option<u64>,
        packet: Packet,
    ) -> Result<DispatchOutcome, RegistryError> {
        let entry_arc = self
            .lookup(key)
            .await
            .ok_or_else(|| RegistryError::NoActivePublisher(key.clone()))?;

        let (delivered, dropped) = {
            let mut entry = entry_arc.lock().await;
            if !entry.is_publishing() {
                return Err(RegistryError::NoActivePublisher(key.clone()));
            }
            if let Some(session_id) = session_id {
                if entry.publisher_id != session_id {
                    return Err(RegistryError::PublisherMismatch {
                        key: key.clone(),
                        holder: entry.publisher_id,
                        session_id,
                    });
                }
            }
            entry.fan_out(packet)
        };

        let detached = dropped
            .into_iter()
            .map(|(id, handle, reason)| {
                tracing::warn!(
                    stream = %key,
                    sink_id = %id,
                    error = %reason,
                    "Sink dropped during dispatch"
                );
                drop(handle.shutdown());
                id
            })
            .collect();

        Ok(DispatchOutcome {
            delivered,
            detached,
        })
    }

    /// Get the packets a newly attached sink would be replayed
    pub async fn catchup(&self, key: &StreamKey) -> Result<Vec<Packet>, RegistryError> {
        let entry_arc = self
            .lookup(key)
            .await
            .ok_or_else(|| RegistryError::NoActivePublisher(key.clone()))?;
        let entry = entry_arc.lock().await;
        Ok(entry.cache.catchup().await)
    }

    /// Get the payload buffer pool of a published stream
    pub async fn buffer_pool(&self, key: &StreamKey) -> Option<Arc<dyn BufferPool>> {
        let entry_arc = self.lookup(key).await?;
        let entry = entry_arc.lock().await;
        Some(Arc::clone(&entry.pool))
    }

    /// Check if a stream has an active publisher
    pub async fn has_active_stream(&self, key: &StreamKey) -> bool {
        match self.lookup(key).await {
            Some(entry_arc) => entry_arc.lock().await.is_publishing(),
            None => false,
        }
    }

    /// Get the number of sinks attached to a stream
    pub async fn subscriber_count(&self, key: &StreamKey) -> usize {
        match self.lookup(key).await {
            Some(entry_arc) => entry_arc.lock().await.subscriber_count(),
            None => 0,
        }
    }

    /// Get stream statistics
    pub async fn get_stream_stats(&self, key: &StreamKey) -> Option<StreamStats> {
        let entry_arc = self.lookup(key).await?;
        let entry = entry_arc.lock().await;
        Some(entry.stats())
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Keys of every published stream
    pub async fn stream_keys(&self) -> Vec<StreamKey> {
        self.streams.read().await.keys().cloned().collect()
    }

    async fn lookup(&self, key: &StreamKey) -> Option<Arc<Mutex<StreamEntry>>> {
        self.streams.read().await.get(key).cloned()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for stopped sink workers to close their sinks
async fn join_workers(key: &StreamKey, tasks: Vec<(SinkId, JoinHandle<()>)>) {
    for (id, task) in tasks {
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(stream = %key, sink_id = %id, "Sink worker panicked");
            }
        }
    }
}
