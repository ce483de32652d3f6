//! In-flight stream registry.
//!
//! Entries are created by `start_stream` and driven by inbound frames.
//! Completed entries linger for the completion grace window so late
//! queries still see the final content; failed and stopped entries are
//! removed as soon as the failure is reported.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use coder1_core::{GenerationOptions, StreamId};

use crate::errors::{ClientError, Result};

/// Lifecycle of one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// Requested, no `stream-start` yet.
    Pending,
    /// Receiving chunks.
    Streaming,
    /// Finished successfully.
    Complete,
    /// Failed.
    Error,
    /// Stopped on request.
    Stopped,
}

impl StreamStatus {
    /// Whether the stream can still receive chunks.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Streaming)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Stopped => "stopped",
        })
    }
}

/// One chunk as seen by `on_chunk`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamChunk {
    /// Stream id.
    pub stream_id: StreamId,
    /// Chunk text.
    pub chunk: String,
    /// Server-accumulated text after this chunk.
    pub accumulated: String,
}

/// Final result of a completed stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedStream {
    /// Stream id.
    pub stream_id: StreamId,
    /// Final content.
    pub content: String,
    /// Server duration, or locally measured when the server omits it.
    pub duration_ms: u64,
}

/// Why a stream ended without completing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFailure {
    /// Stream id.
    pub stream_id: StreamId,
    /// Error text.
    pub reason: String,
    /// `Error` or `Stopped`.
    pub status: StreamStatus,
}

/// Called for every chunk.
pub type ChunkCallback = Box<dyn FnMut(&StreamChunk) + Send>;
/// Called once when the stream completes.
pub type CompleteCallback = Box<dyn FnOnce(&CompletedStream) + Send>;
/// Called once when the stream fails or is stopped.
pub type ErrorCallback = Box<dyn FnOnce(&StreamFailure) + Send>;

/// Per-stream callbacks. Each one is optional.
#[derive(Default)]
pub struct StreamCallbacks {
    /// Chunk callback.
    pub on_chunk: Option<ChunkCallback>,
    /// Completion callback.
    pub on_complete: Option<CompleteCallback>,
    /// Failure callback.
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_chunk", &self.on_chunk.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Read-only view of a registry entry.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSnapshot {
    /// Stream id.
    pub stream_id: StreamId,
    /// Prompt the stream was started with.
    pub prompt: String,
    /// Generation parameters.
    pub options: GenerationOptions,
    /// Current status.
    pub status: StreamStatus,
    /// Accumulated (or final) content.
    pub content: String,
    /// Raw chunks in arrival order.
    pub chunks: Vec<String>,
    /// Duration once complete.
    pub duration_ms: Option<u64>,
    /// Error text once failed.
    pub error: Option<String>,
}

struct StreamEntry {
    prompt: String,
    options: GenerationOptions,
    status: StreamStatus,
    content: String,
    chunks: Vec<String>,
    started_at: Instant,
    duration_ms: Option<u64>,
    error: Option<String>,
    callbacks: StreamCallbacks,
}

/// Streams keyed by id.
#[derive(Default)]
pub struct StreamRegistry {
    entries: HashMap<StreamId, StreamEntry>,
}

impl StreamRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending entry.
    pub fn register(
        &mut self,
        stream_id: StreamId,
        prompt: String,
        options: GenerationOptions,
        callbacks: StreamCallbacks,
    ) -> Result<()> {
        if self.entries.contains_key(&stream_id) {
            return Err(ClientError::DuplicateStream(stream_id));
        }
        let _ = self.entries.insert(
            stream_id,
            StreamEntry {
                prompt,
                options,
                status: StreamStatus::Pending,
                content: String::new(),
                chunks: Vec::new(),
                started_at: Instant::now(),
                duration_ms: None,
                error: None,
                callbacks,
            },
        );
        Ok(())
    }

    /// `stream-start`: move to `Streaming`. Returns `false` for unknown ids.
    pub fn mark_started(&mut self, stream_id: &StreamId) -> bool {
        match self.entries.get_mut(stream_id) {
            Some(entry) if entry.status.is_active() => {
                entry.status = StreamStatus::Streaming;
                true
            }
            _ => false,
        }
    }

    /// `stream-chunk`: record the chunk and adopt the server's accumulated
    /// text. Without `accumulated` the previous content stays.
    pub fn apply_chunk(
        &mut self,
        stream_id: &StreamId,
        chunk: &str,
        accumulated: Option<String>,
    ) -> Option<StreamChunk> {
        let entry = self.entries.get_mut(stream_id)?;
        if !entry.status.is_active() {
            return None;
        }
        entry.status = StreamStatus::Streaming;
        entry.chunks.push(chunk.to_owned());
        if let Some(accumulated) = accumulated {
            entry.content = accumulated;
        }
        let update = StreamChunk {
            stream_id: stream_id.clone(),
            chunk: chunk.to_owned(),
            accumulated: entry.content.clone(),
        };
        if let Some(on_chunk) = entry.callbacks.on_chunk.as_mut() {
            on_chunk(&update);
        }
        Some(update)
    }

    /// `stream-complete`: finalize and fire `on_complete`. The entry stays
    /// until [`expire`](Self::expire). Returns `None` for unknown or
    /// already finished streams.
    pub fn complete(
        &mut self,
        stream_id: &StreamId,
        content: Option<String>,
        duration_ms: Option<u64>,
    ) -> Option<CompletedStream> {
        let entry = self.entries.get_mut(stream_id)?;
        if !entry.status.is_active() {
            return None;
        }
        if let Some(content) = content {
            entry.content = content;
        }
        let duration_ms = duration_ms.unwrap_or_else(|| {
            u64::try_from(entry.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
        });
        entry.status = StreamStatus::Complete;
        entry.duration_ms = Some(duration_ms);
        entry.callbacks.on_chunk = None;
        let _ = entry.callbacks.on_error.take();
        let completed = CompletedStream {
            stream_id: stream_id.clone(),
            content: entry.content.clone(),
            duration_ms,
        };
        if let Some(on_complete) = entry.callbacks.on_complete.take() {
            on_complete(&completed);
        }
        Some(completed)
    }

    /// `stream-error`: fire `on_error` and remove the entry.
    pub fn fail(&mut self, stream_id: &StreamId, reason: &str) -> Option<StreamFailure> {
        self.finish(stream_id, StreamStatus::Error, reason)
    }

    /// `stream-stopped`: fire `on_error` and remove the entry.
    pub fn stopped(&mut self, stream_id: &StreamId) -> Option<StreamFailure> {
        self.finish(stream_id, StreamStatus::Stopped, "stream stopped")
    }

    /// Fail every active stream, e.g. when the socket goes away.
    pub fn fail_all(&mut self, reason: &str) -> Vec<StreamFailure> {
        let mut active: Vec<StreamId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.status.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        active.sort();
        active
            .iter()
            .filter_map(|id| self.finish(id, StreamStatus::Error, reason))
            .collect()
    }

    /// Grace timer fired: drop the entry if it is still a completed one.
    pub fn expire(&mut self, stream_id: &StreamId) -> bool {
        match self.entries.get(stream_id) {
            Some(entry) if entry.status == StreamStatus::Complete => {
                let _ = self.entries.remove(stream_id);
                true
            }
            _ => false,
        }
    }

    /// Copy out one entry.
    pub fn snapshot(&self, stream_id: &StreamId) -> Option<StreamSnapshot> {
        self.entries.get(stream_id).map(|e| StreamSnapshot {
            stream_id: stream_id.clone(),
            prompt: e.prompt.clone(),
            options: e.options.clone(),
            status: e.status,
            content: e.content.clone(),
            chunks: e.chunks.clone(),
            duration_ms: e.duration_ms,
            error: e.error.clone(),
        })
    }

    /// Whether `stream_id` is registered.
    pub fn contains(&self, stream_id: &StreamId) -> bool {
        self.entries.contains_key(stream_id)
    }

    /// Number of entries, including completed ones in their grace window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn finish(
        &mut self,
        stream_id: &StreamId,
        status: StreamStatus,
        reason: &str,
    ) -> Option<StreamFailure> {
        if !self.entries.get(stream_id)?.status.is_active() {
            return None;
        }
        let mut entry = self.entries.remove(stream_id)?;
        entry.status = status;
        entry.error = Some(reason.to_owned());
        let failure = StreamFailure {
            stream_id: stream_id.clone(),
            reason: reason.to_owned(),
            status,
        };
        if let Some(on_error) = entry.callbacks.on_error.take() {
            on_error(&failure);
        }
        Some(failure)
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.entries.len())
            .finish()
    }
}
