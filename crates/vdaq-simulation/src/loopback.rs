//! In-process labeled-stream transport
//!
//! Each registered stream is a tokio broadcast channel carrying chunks of
//! timestamped samples. A consumer is attached for as long as its
//! [`Subscription`] lives.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{info, warn};
use uuid::Uuid;
use vdaq_core::{
    DaqError, DaqResult, PublisherHandle, StreamDescriptor, TimestampedSample, Transport,
};

type Chunk = Arc<Vec<TimestampedSample>>;

/// Upper bound on retained chunks per stream
pub const MAX_BUFFERED_CHUNKS: usize = 1 << 20;

struct StreamEntry {
    descriptor: StreamDescriptor,
    session_id: Uuid,
    sender: broadcast::Sender<Chunk>,
}

/// Registry of streams living in this process
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    streams: Arc<Mutex<HashMap<String, StreamEntry>>>,
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.streams().into_iter().map(|d| d.name).collect();
        f.debug_struct("LoopbackTransport").field("streams", &names).finish()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a consumer to the stream registered under `name`
    pub fn subscribe(&self, name: &str) -> DaqResult<Subscription> {
        let streams = self
            .streams
            .lock()
            .map_err(|_| DaqError::transport(name, "stream registry poisoned"))?;
        let entry = streams
            .get(name)
            .ok_or_else(|| DaqError::transport(name, "no stream registered under this name"))?;

        Ok(Subscription {
            descriptor: entry.descriptor.clone(),
            session_id: entry.session_id,
            receiver: entry.sender.subscribe(),
        })
    }

    /// Descriptors of all registered streams
    pub fn streams(&self) -> Vec<StreamDescriptor> {
        match self.streams.lock() {
            Ok(streams) => streams.values().map(|e| e.descriptor.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn unregister(&self, name: &str) {
        if let Ok(mut streams) = self.streams.lock() {
            streams.remove(name);
        }
    }
}

/// Broadcast capacity in chunks for the requested buffer length
fn chunk_capacity(sample_rate: f64, chunk_size: usize, buffer_duration_s: f64) -> usize {
    let samples = (buffer_duration_s * sample_rate).ceil();
    let chunks = (samples / chunk_size as f64).ceil();
    if chunks.is_finite() && chunks >= 1.0 {
        (chunks as usize).min(MAX_BUFFERED_CHUNKS)
    } else {
        1
    }
}

impl Transport for LoopbackTransport {
    type Handle = LoopbackOutlet;

    fn register(
        &self,
        descriptor: StreamDescriptor,
        chunk_size: usize,
        buffer_duration_s: f64,
    ) -> DaqResult<LoopbackOutlet> {
        if chunk_size == 0 {
            return Err(DaqError::transport(&descriptor.name, "chunk size must be positive"));
        }

        let mut streams = self
            .streams
            .lock()
            .map_err(|_| DaqError::transport(&descriptor.name, "stream registry poisoned"))?;
        if streams.contains_key(&descriptor.name) {
            return Err(DaqError::transport(&descriptor.name, "stream name already registered"));
        }

        let capacity = chunk_capacity(descriptor.sample_rate, chunk_size, buffer_duration_s);
        let (sender, _) = broadcast::channel(capacity);
        let session_id = Uuid::new_v4();

        info!(
            stream = %descriptor.name,
            source_id = %descriptor.unique_id,
            %session_id,
            channels = descriptor.channel_count,
            capacity,
            "registered loopback stream"
        );

        streams.insert(
            descriptor.name.clone(),
            StreamEntry {
                descriptor: descriptor.clone(),
                session_id,
                sender: sender.clone(),
            },
        );

        Ok(LoopbackOutlet {
            descriptor,
            session_id,
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            sender: Some(sender),
            registry: self.clone(),
        })
    }
}

/// Publisher side of a loopback stream
pub struct LoopbackOutlet {
    descriptor: StreamDescriptor,
    session_id: Uuid,
    chunk_size: usize,
    pending: Vec<TimestampedSample>,
    /// `None` once closed; dropping it ends every subscription
    sender: Option<broadcast::Sender<Chunk>>,
    registry: LoopbackTransport,
}

impl fmt::Debug for LoopbackOutlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackOutlet")
            .field("stream", &self.descriptor.name)
            .field("session_id", &self.session_id)
            .field("chunk_size", &self.chunk_size)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LoopbackOutlet {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn consumer_count(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.receiver_count())
    }

    /// Broadcast any partially filled chunk now
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        if let Some(sender) = &self.sender {
            // No receivers means nobody listens; the chunk is dropped
            let _ = sender.send(Arc::new(chunk));
        }
    }

    /// Flush, remove the stream from the registry and end all subscriptions
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.flush();
        self.registry.unregister(&self.descriptor.name);
        self.sender = None;
        info!(stream = %self.descriptor.name, "closed loopback stream");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

impl PublisherHandle for LoopbackOutlet {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn has_consumers(&self) -> bool {
        self.consumer_count() > 0
    }

    fn push(&mut self, sample: &[f32], timestamp: f64) -> DaqResult<()> {
        if self.is_closed() {
            return Err(DaqError::transport(&self.descriptor.name, "push on closed outlet"));
        }
        if sample.len() != self.descriptor.channel_count {
            return Err(DaqError::transport(
                &self.descriptor.name,
                format!(
                    "sample has {} values, stream declares {} channels",
                    sample.len(),
                    self.descriptor.channel_count
                ),
            ));
        }

        self.pending.push(TimestampedSample {
            timestamp,
            values: sample.to_vec(),
        });
        if self.pending.len() >= self.chunk_size {
            self.flush();
        }
        Ok(())
    }
}

impl Drop for LoopbackOutlet {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consumer side of a loopback stream
#[derive(Debug)]
pub struct Subscription {
    descriptor: StreamDescriptor,
    session_id: Uuid,
    receiver: broadcast::Receiver<Chunk>,
}

impl Subscription {
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Next buffered chunk without waiting; `None` when nothing is queued
    /// or the outlet is gone.
    pub fn try_pull_chunk(&mut self) -> Option<Vec<TimestampedSample>> {
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => return Some(chunk.as_ref().clone()),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(stream = %self.descriptor.name, skipped, "consumer lagged, chunks dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next chunk; `None` once the outlet has closed
    pub async fn recv_chunk(&mut self) -> Option<Vec<TimestampedSample>> {
        loop {
            match self.receiver.recv().await {
                Ok(chunk) => return Some(chunk.as_ref().clone()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(stream = %self.descriptor.name, skipped, "consumer lagged, chunks dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Capture `count` samples as parallel timestamp and value sequences
    pub async fn collect(&mut self, count: usize) -> DaqResult<(Vec<f64>, Vec<Vec<f32>>)> {
        let mut timestamps = Vec::with_capacity(count);
        let mut samples = Vec::with_capacity(count);

        while timestamps.len() < count {
            let chunk = self.recv_chunk().await.ok_or_else(|| {
                DaqError::transport(
                    &self.descriptor.name,
                    format!("stream closed after {} of {} samples", timestamps.len(), count),
                )
            })?;
            for sample in chunk {
                if timestamps.len() == count {
                    break;
                }
                timestamps.push(sample.timestamp);
                samples.push(sample.values);
            }
        }

        Ok((timestamps, samples))
    }
}
