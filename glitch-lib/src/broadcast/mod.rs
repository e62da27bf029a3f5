//! Compressed-stream chunking and the listener ring buffer.

mod chunker;

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

pub use chunker::FrameChunker;

/// A sealed, independently decodable run of compressed audio.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferChunk {
    pub index: u64,
    pub bytes: Bytes,
}

/// Result of looking up a chunk by index.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRead {
    Ready(Bytes),
    /// Not sealed yet.
    Pending,
    /// Already dropped from the ring.
    Evicted,
    /// Not sealed yet, and the stream has ended so it never will be.
    Closed,
}

/// Bounded, append-only sequence of chunks with a monotonically increasing index.
///
/// The producer holds the write lock only to push a chunk; readers clone a
/// reference-counted view of the bytes and never see a chunk being built.
#[derive(Debug)]
pub struct ChunkRing {
    chunks: RwLock<VecDeque<BufferChunk>>,
    capacity: usize,
    base_index: AtomicU64,
    frontier: AtomicU64,
    closed: AtomicBool,
}

impl ChunkRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            base_index: AtomicU64::new(0),
            frontier: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Seal `bytes` as the next chunk. Returns its index.
    pub fn append(&self, bytes: Bytes) -> u64 {
        let mut chunks = self.chunks.write().unwrap();
        let index = self.frontier.load(Ordering::SeqCst);
        log::debug!("Adding chunk {} ({} bytes)", index, bytes.len());
        chunks.push_back(BufferChunk { index, bytes });
        while chunks.len() > self.capacity {
            chunks.pop_front();
            self.base_index.fetch_add(1, Ordering::SeqCst);
        }
        self.frontier.store(index + 1, Ordering::SeqCst);
        index
    }

    /// Index of the oldest retained chunk.
    pub fn base_index(&self) -> u64 {
        self.base_index.load(Ordering::SeqCst)
    }

    /// Index the next sealed chunk will receive.
    pub fn frontier(&self) -> u64 {
        self.frontier.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the stream as finished. No more chunks will be appended.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn get(&self, index: u64) -> ChunkRead {
        let chunks = self.chunks.read().unwrap();
        let base = self.base_index();
        if index < base {
            return ChunkRead::Evicted;
        }
        match chunks.get((index - base) as usize) {
            Some(chunk) => ChunkRead::Ready(chunk.bytes.clone()),
            None if self.is_closed() => ChunkRead::Closed,
            None => ChunkRead::Pending,
        }
    }

    /// All retained chunks, oldest first.
    pub fn snapshot(&self) -> Vec<BufferChunk> {
        self.chunks.read().unwrap().iter().cloned().collect()
    }

    /// Cursor for a new listener, `lead` chunks behind the frontier.
    pub fn listener(&self, lead: u64) -> ListenerCursor {
        let position = self.frontier().saturating_sub(lead).max(self.base_index());
        ListenerCursor { position }
    }
}

/// What a listener should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Chunk(Bytes),
    /// Caught up with the frontier; poll again later.
    Wait,
    /// Fell behind the ring; disconnect.
    Evicted,
    /// Stream ended; disconnect.
    Closed,
}

/// Per-connection read position in a [`ChunkRing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerCursor {
    position: u64,
}

impl ListenerCursor {
    pub fn at(position: u64) -> Self {
        Self { position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn poll(&mut self, ring: &ChunkRing) -> Delivery {
        match ring.get(self.position) {
            ChunkRead::Ready(bytes) => {
                self.position += 1;
                Delivery::Chunk(bytes)
            }
            ChunkRead::Pending => Delivery::Wait,
            ChunkRead::Evicted => Delivery::Evicted,
            ChunkRead::Closed => Delivery::Closed,
        }
    }
}
