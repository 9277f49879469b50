//! The producer side of the buffer queue: reading transport stream bytes from
//! a file or memory into pooled chunks.

use std::fs::File;
use std::io::{self, BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, error, warn};

use crate::error::Result;
use crate::queue::{BufferQueue, Chunk};
use crate::ts::PACKET_SIZE;

/// Opens a transport stream file positioned at byte `offset`.
pub fn open_file(path: &Path, offset: u64) -> Result<BufReader<File>> {
    let mut file = File::open(path)?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))?;
    }
    debug!("opened {} at {}", path.display(), offset);
    Ok(BufReader::new(file))
}

/// An in-memory transport stream positioned at byte `offset`.
pub fn open_memory(data: Vec<u8>, offset: u64) -> Cursor<Vec<u8>> {
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset);
    cursor
}

#[derive(Debug)]
pub enum FeedOutcome {
    /// A chunk of this many bytes went to the decoder.
    Fed(usize),
    /// The reader is exhausted and an end-of-stream chunk was queued.
    Ended,
    /// The decoder paused; nothing was read.
    Paused,
    /// Reading failed. An end-of-stream chunk was queued so the decoder stops cleanly.
    Failed(io::Error),
}

fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Fills one empty chunk from `reader` and queues it for decoding. Blocks
/// while the pool is exhausted. Chunks always hold whole transport packets;
/// a trailing partial packet at the end of the input is dropped.
pub fn feed_chunk<R: Read>(queue: &BufferQueue, reader: &mut R) -> FeedOutcome {
    let mut chunk = match queue.pop_empty() {
        Some(chunk) => chunk,
        None => {
            debug!("decoder paused, producer stopping");
            return FeedOutcome::Paused;
        }
    };

    match read_full(reader, chunk.buffer_mut()) {
        Ok(n) => {
            let aligned = n - n % PACKET_SIZE;
            if aligned != n {
                warn!("dropping {} trailing bytes", n - aligned);
            }
            chunk.set_len(aligned);
            queue.push_full(chunk);
            if aligned == 0 {
                debug!("source ended");
                FeedOutcome::Ended
            } else {
                FeedOutcome::Fed(aligned)
            }
        }
        Err(err) => {
            error!("source read failed: {}", err);
            queue.push_empty(Some(chunk));
            queue.push_full(Chunk::end_of_stream());
            FeedOutcome::Failed(err)
        }
    }
}

/// Feeds chunks until the reader ends, fails or the decoder pauses, and
/// returns the final outcome.
pub fn feed_all<R: Read>(queue: &BufferQueue, reader: &mut R) -> FeedOutcome {
    loop {
        match feed_chunk(queue, reader) {
            FeedOutcome::Fed(_) => continue,
            outcome => return outcome,
        }
    }
}
