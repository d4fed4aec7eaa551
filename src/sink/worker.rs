//! Per-sink delivery task
//!
//! ```text
//!   dispatch() ──try_send──► [bounded queue] ──► worker ──write──► sink
//!                                                  ▲
//!   detach()/unpublish() ──────── shutdown ────────┘
//! ```
//!
//! The worker first replays the cache snapshot taken at attach time, reports
//! the outcome back to `attach`, then drains the live queue. A failed or
//! timed-out write detaches the sink from its stream. Shutdown is observed
//! between and during writes, and the sink is always closed on exit.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::{PacketSink, SinkError, SinkId, SinkKind};
use crate::media::{Packet, PacketCache};
use crate::registry::entry::StreamEntry;
use crate::registry::StreamKey;

/// Everything a worker needs besides the sink itself
pub(crate) struct WorkerParams {
    pub(crate) id: SinkId,
    pub(crate) stream: Arc<StreamKey>,
    pub(crate) snapshot: PacketCache,
    pub(crate) queue_capacity: usize,
    pub(crate) write_timeout: Duration,
    pub(crate) entry: Weak<Mutex<StreamEntry>>,
}

/// Registry-side handle to a running sink worker
pub(crate) struct SinkHandle {
    kind: SinkKind,
    tx: mpsc::Sender<Packet>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the delivery task for `sink`
    ///
    /// The returned receiver resolves once the cache snapshot has been
    /// replayed. It is dropped without a value if the worker is shut down
    /// during replay.
    pub(crate) fn spawn<S>(
        sink: S,
        params: WorkerParams,
    ) -> (Self, oneshot::Receiver<Result<(), SinkError>>)
    where
        S: PacketSink + 'static,
    {
        let (tx, rx) = mpsc::channel(params.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let kind = sink.kind();

        let worker = Worker {
            sink,
            id: params.id,
            stream: params.stream,
            write_timeout: params.write_timeout,
            entry: params.entry,
        };
        let task = tokio::spawn(worker.run(params.snapshot, rx, shutdown_rx, ready_tx));

        let handle = Self {
            kind,
            tx,
            shutdown: Some(shutdown_tx),
            task,
        };
        (handle, ready_rx)
    }

    pub(crate) fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Queue a packet without waiting
    pub(crate) fn try_send(&self, packet: Packet) -> Result<(), SinkError> {
        self.tx.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Overflow,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    /// Stop the worker; it closes the sink before exiting
    pub(crate) fn shutdown(mut self) -> JoinHandle<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task
    }
}

/// Sink wrapper bounding every write by a timeout
struct Deadline<'a, S> {
    sink: &'a mut S,
    timeout: Duration,
}

impl<S: PacketSink> PacketSink for Deadline<'_, S> {
    async fn write(&mut self, packet: Packet) -> Result<(), SinkError> {
        tokio::time::timeout(self.timeout, self.sink.write(packet))
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))?
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        tokio::time::timeout(self.timeout, self.sink.close())
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))?
    }

    fn kind(&self) -> SinkKind {
        self.sink.kind()
    }
}

struct Worker<S> {
    sink: S,
    id: SinkId,
    stream: Arc<StreamKey>,
    write_timeout: Duration,
    entry: Weak<Mutex<StreamEntry>>,
}

impl<S: PacketSink> Worker<S> {
    fn deadline(&mut self) -> Deadline<'_, S> {
        Deadline {
            sink: &mut self.sink,
            timeout: self.write_timeout,
        }
    }

    async fn run(
        mut self,
        snapshot: PacketCache,
        mut rx: mpsc::Receiver<Packet>,
        mut shutdown: oneshot::Receiver<()>,
        ready: oneshot::Sender<Result<(), SinkError>>,
    ) {
        let replay = {
            let mut sink = self.deadline();
            tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = snapshot.send(&mut sink) => Some(result),
            }
        };

        match replay {
            Some(Ok(())) => {
                let _ = ready.send(Ok(()));
                self.forward(&mut rx, &mut shutdown).await;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    stream = %self.stream,
                    sink_id = %self.id,
                    error = %e,
                    "Sink failed during cache replay"
                );
                let _ = ready.send(Err(e));
            }
            None => {}
        }

        drop(snapshot);
        self.close().await;
    }

    async fn forward(
        &mut self,
        rx: &mut mpsc::Receiver<Packet>,
        shutdown: &mut oneshot::Receiver<()>,
    ) {
        loop {
            let packet = tokio::select! {
                biased;
                _ = &mut *shutdown => return,
                packet = rx.recv() => match packet {
                    Some(packet) => packet,
                    None => return,
                },
            };

            let mut sink = self.deadline();
            let result = tokio::select! {
                biased;
                _ = &mut *shutdown => return,
                result = sink.write(packet) => result,
            };

            if let Err(e) = result {
                tracing::warn!(
                    stream = %self.stream,
                    sink_id = %self.id,
                    error = %e,
                    "Sink write failed, detaching"
                );
                self.detach_self().await;
                return;
            }
        }
    }

    /// Remove this sink from its stream's live set
    async fn detach_self(&mut self) {
        let Some(entry) = self.entry.upgrade() else {
            return;
        };
        let mut entry = entry.lock().await;
        if entry.remove_sink(self.id).is_some() {
            entry.record_sink_dropped();
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.deadline().close().await {
            tracing::debug!(
                stream = %self.stream,
                sink_id = %self.id,
                error = %e,
                "Sink close failed"
            );
        } else {
            tracing::debug!(stream = %self.stream, sink_id = %self.id, "Sink closed");
        }
    }
}
