//! Transport stream chunks circulating between the I/O producer and the decoder.
//!
//! A fixed pool of chunks moves through two bounded channels: `full` carries
//! filled chunks to the decoder, `empty` returns drained ones to the producer.
//! A chunk of length zero on `full` marks the end of a stream.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{error, trace};

use crate::error::{Error, Result};

pub struct Chunk {
    data: Box<[u8]>,
    len: usize,
}

impl Chunk {
    pub fn with_capacity(capacity: usize) -> Result<Chunk> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { bytes: capacity })?;
        data.resize(capacity, 0);
        Ok(Chunk {
            data: data.into_boxed_slice(),
            len: 0,
        })
    }

    /// A zero capacity chunk, only useful as an end-of-stream marker.
    pub fn end_of_stream() -> Chunk {
        Chunk {
            data: Box::new([]),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole backing buffer, for filling before `set_len`.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    /// Copies as much of `bytes` as fits and returns the number copied.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.len = n;
        n
    }
}

/// Where a demuxer gets its chunks from and returns them to.
pub trait ChunkFeed {
    /// Blocks for the next filled chunk; an empty chunk marks end of stream.
    fn pop_full(&mut self) -> Chunk;

    fn push_empty(&mut self, chunk: Chunk);
}

#[derive(Clone)]
pub struct BufferQueue {
    full_tx: Sender<Chunk>,
    full_rx: Receiver<Chunk>,
    // `None` tells a waiting producer that the decoder has paused
    empty_tx: Sender<Option<Chunk>>,
    empty_rx: Receiver<Option<Chunk>>,
    chunk_size: usize,
}

impl BufferQueue {
    /// Creates the queues and seeds the empty side with `pool_size` chunks.
    pub fn new(pool_size: usize, chunk_size: usize) -> Result<Self> {
        let (full_tx, full_rx) = bounded(pool_size + 1);
        let (empty_tx, empty_rx) = bounded(pool_size + 1);
        let queue = BufferQueue {
            full_tx,
            full_rx,
            empty_tx,
            empty_rx,
            chunk_size,
        };
        for _ in 0..pool_size {
            queue.push_empty(Some(Chunk::with_capacity(chunk_size)?));
        }
        Ok(queue)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn push_full(&self, chunk: Chunk) {
        if self.full_tx.send(chunk).is_err() {
            error!("full queue disconnected");
        }
    }

    /// Queues an end-of-stream marker unless the full side is at capacity, in
    /// which case the consumer is not blocked anyway.
    pub fn wake_consumer(&self) {
        if self.full_tx.try_send(Chunk::end_of_stream()).is_err() {
            trace!("full queue busy, consumer already has work");
        }
    }

    /// Blocks until a chunk is available. A disconnected queue reads as end of stream.
    pub fn pop_full(&self) -> Chunk {
        self.full_rx.recv().unwrap_or_else(|_| Chunk::end_of_stream())
    }

    pub fn push_empty(&self, chunk: Option<Chunk>) {
        if let Some(chunk) = &chunk {
            if chunk.capacity() == 0 {
                // end-of-stream markers are not part of the pool
                return;
            }
        }
        if self.empty_tx.try_send(chunk).is_err() {
            trace!("empty queue full, dropping chunk");
        }
    }

    /// Blocks for an empty chunk. `None` means the decoder paused and the
    /// producer should stop.
    pub fn pop_empty(&self) -> Option<Chunk> {
        self.empty_rx.recv().ok().flatten()
    }

    /// Wakes a producer blocked in [`pop_empty`](Self::pop_empty) when no
    /// chunk is on its way.
    pub fn unstick_producer(&self) {
        if self.empty_rx.is_empty() {
            self.push_empty(None);
        }
    }

    /// Returns every queued full chunk to the empty side and drops pending
    /// pause markers.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        loop {
            match self.full_rx.try_recv() {
                Ok(mut chunk) => {
                    chunk.set_len(0);
                    self.push_empty(Some(chunk));
                    drained += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        let pending: Vec<Chunk> = self.empty_rx.try_iter().flatten().collect();
        for chunk in pending {
            self.push_empty(Some(chunk));
        }
        drained
    }

    pub fn full_len(&self) -> usize {
        self.full_rx.len()
    }

    pub fn empty_len(&self) -> usize {
        self.empty_rx.len()
    }
}

impl ChunkFeed for BufferQueue {
    fn pop_full(&mut self) -> Chunk {
        BufferQueue::pop_full(self)
    }

    fn push_empty(&mut self, chunk: Chunk) {
        BufferQueue::push_empty(self, Some(chunk))
    }
}

/// Serves an in-memory transport stream as chunks of `chunk_size` bytes.
pub struct MemoryFeed {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

impl MemoryFeed {
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        MemoryFeed {
            data,
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl ChunkFeed for MemoryFeed {
    fn pop_full(&mut self) -> Chunk {
        let end = (self.position + self.chunk_size).min(self.data.len());
        let bytes = &self.data[self.position..end];
        self.position = end;
        let mut chunk = Chunk {
            data: bytes.to_vec().into_boxed_slice(),
            len: 0,
        };
        chunk.len = bytes.len();
        chunk
    }

    fn push_empty(&mut self, _chunk: Chunk) {}
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pool_circulates() {
        let queue = BufferQueue::new(4, 8 * 188).unwrap();
        assert_eq!(queue.empty_len(), 4);

        let mut chunk = queue.pop_empty().unwrap();
        assert_eq!(chunk.capacity(), 8 * 188);
        chunk.fill_from(&[0x47; 188]);
        queue.push_full(chunk);
        assert_eq!(queue.full_len(), 1);

        let chunk = queue.pop_full();
        assert_eq!(chunk.len(), 188);
        queue.push_empty(Some(chunk));
        assert_eq!(queue.empty_len(), 4);
    }

    #[test]
    fn drain_returns_full_chunks() {
        let queue = BufferQueue::new(4, 188).unwrap();
        for _ in 0..3 {
            let mut chunk = queue.pop_empty().unwrap();
            chunk.set_len(188);
            queue.push_full(chunk);
        }
        queue.unstick_producer();
        assert_eq!(queue.drain(), 3);
        assert_eq!(queue.full_len(), 0);
        assert_eq!(queue.empty_len(), 4);
        while queue.empty_len() > 0 {
            assert!(queue.pop_empty().is_some());
        }
    }

    #[test]
    fn unstick_wakes_blocked_producer() {
        let queue = BufferQueue::new(1, 188).unwrap();
        let held = queue.pop_empty().unwrap();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_empty().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        queue.unstick_producer();
        assert!(producer.join().unwrap());
        queue.push_empty(Some(held));
        assert_eq!(queue.empty_len(), 1);
    }

    #[test]
    fn end_of_stream_chunks_are_not_pooled() {
        let queue = BufferQueue::new(2, 188).unwrap();
        queue.push_full(Chunk::end_of_stream());
        let chunk = queue.pop_full();
        assert!(chunk.is_empty());
        queue.push_empty(Some(chunk));
        assert_eq!(queue.empty_len(), 2);
    }

    #[test]
    fn memory_feed_ends_with_empty_chunk() {
        let mut feed = MemoryFeed::new(vec![1; 500], 188);
        assert_eq!(feed.pop_full().len(), 188);
        assert_eq!(feed.pop_full().len(), 188);
        assert_eq!(feed.pop_full().len(), 124);
        assert!(feed.pop_full().is_empty());
    }
}
