use log::trace;

use crate::error::{Error, Result};
use crate::mpeg1::vlc::{
    RunLevel, VlcTable, DCT_0000001, DCT_0001, DCT_00001, DCT_001, DCT_00100, DCT_LONG, INVALID,
};

/// Substituted for the elementary stream once a source runs dry, so the decoder
/// always finds a sequence end code instead of reading past its input.
pub const END_OF_STREAM: [u8; 8] = [0x00, 0x00, 0x01, 0xB7, 0x00, 0x00, 0x01, 0xB7];

/// Supplies elementary stream bytes to a [`BitReader`].
pub trait ByteSource {
    /// Appends the next run of elementary stream bytes to `dst`. Returns `false`
    /// when the stream has ended.
    fn next_chunk(&mut self, dst: &mut Vec<u8>) -> bool;

    /// Presentation time of the most recent video PES header seen.
    fn pts(&self) -> Option<i64> {
        None
    }

    /// Drops any partially consumed input.
    fn reset(&mut self) {}
}

/// A plain elementary stream held in memory, handed out in fixed size pieces.
pub struct MemorySource {
    data: Vec<u8>,
    position: usize,
    piece: usize,
    pts: Option<i64>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        MemorySource {
            data,
            position: 0,
            piece: 184,
            pts: None,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_piece_size(mut self, piece: usize) -> Self {
        self.piece = piece.max(1);
        self
    }
}

impl ByteSource for MemorySource {
    fn next_chunk(&mut self, dst: &mut Vec<u8>) -> bool {
        if self.position >= self.data.len() {
            return false;
        }
        let end = (self.position + self.piece).min(self.data.len());
        dst.extend_from_slice(&self.data[self.position..end]);
        self.position = end;
        true
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

/// MSB-first reader over an elementary stream, backed by a 32 bit shift register
/// that is topped up to at least 24 valid bits before every read.
pub struct BitReader<S> {
    source: S,
    data: Vec<u8>,
    position: usize,
    bits: u32,
    count: u32,
}

#[inline]
fn mask(n: u32) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1 << n) - 1
    }
}

impl<S: ByteSource> BitReader<S> {
    pub fn new(source: S) -> Self {
        BitReader {
            source,
            data: Vec::with_capacity(188),
            position: 0,
            bits: 0,
            count: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Forgets all buffered bits, both here and in the source.
    pub fn reset(&mut self) {
        self.data.clear();
        self.position = 0;
        self.bits = 0;
        self.count = 0;
        self.source.reset();
    }

    fn more(&mut self) -> u8 {
        loop {
            self.data.clear();
            self.position = 0;
            if !self.source.next_chunk(&mut self.data) {
                trace!("elementary stream exhausted");
                self.data.extend_from_slice(&END_OF_STREAM);
            }
            if let Some(&byte) = self.data.first() {
                self.position = 1;
                return byte;
            }
        }
    }

    #[inline]
    fn fill(&mut self) {
        while self.count < 24 {
            let byte = match self.data.get(self.position) {
                Some(&byte) => {
                    self.position += 1;
                    byte
                }
                None => self.more(),
            };
            self.bits = (self.bits << 8) | byte as u32;
            self.count += 8;
        }
    }

    #[inline]
    pub fn peek_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 24);
        self.fill();
        (self.bits >> (self.count - n)) & mask(n)
    }

    #[inline]
    pub fn get_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 24);
        self.fill();
        self.count -= n;
        (self.bits >> self.count) & mask(n)
    }

    #[inline]
    pub fn get_bit(&mut self) -> bool {
        self.get_bits(1) != 0
    }

    #[inline]
    pub fn skip_bits(&mut self, n: u32) {
        self.get_bits(n);
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.count % 8 == 0
    }

    pub fn byte_align(&mut self) {
        self.count -= self.count % 8;
    }

    /// Advances to the next byte aligned `00 00 01` prefix and consumes it.
    pub fn next_start_code(&mut self) {
        self.byte_align();
        while self.peek_bits(24) != 0x00_00_01 {
            self.skip_bits(8);
        }
        self.skip_bits(24);
    }

    /// Walks `table` one bit at a time until a leaf is reached.
    pub fn get_vlc(&mut self, table: &VlcTable) -> Result<i16> {
        self.fill();
        let mut state = 0usize;
        loop {
            let node = table.nodes[state];
            if node.is_leaf() {
                return Ok(node.value);
            }
            if self.count == 0 {
                self.fill();
            }
            self.count -= 1;
            let next = if (self.bits >> self.count) & 1 == 0 {
                node.zero
            } else {
                node.one
            };
            if next == INVALID || next as usize >= table.nodes.len() {
                return Err(Error::InvalidVlc { table: table.name });
            }
            state = next as usize;
        }
    }

    /// Decodes one DCT coefficient code (ISO 13818-2 table B-14, which MPEG-1
    /// shares) from a 16 bit peek.
    ///
    /// A leading `1` returns run 0, level 1 after consuming only that bit; the
    /// caller decides whether it is the one bit "first coefficient" code or the
    /// first half of end-of-block / `11s`. The escape code returns its 6 bit run
    /// with a level of zero. The sign bit is never consumed here.
    pub fn get_vlc_dct(&mut self) -> Result<RunLevel> {
        let mut pb = self.peek_bits(16);
        if pb & 0x8000 != 0 {
            self.count -= 1;
            return Ok(RunLevel::new(0, 1));
        }

        if pb >> 10 > 1 {
            if pb & 0x4000 != 0 {
                if pb & 0x2000 != 0 {
                    self.count -= 3;
                    return Ok(RunLevel::new(1, 1));
                }
                self.count -= 4;
                return Ok(if pb & 0x1000 != 0 {
                    RunLevel::new(2, 1)
                } else {
                    RunLevel::new(0, 2)
                });
            }
            if pb & 0x2000 != 0 {
                let index = ((pb >> 11) & 3) as usize;
                if index != 0 {
                    self.count -= 5;
                    return Ok(DCT_001[index]);
                }
                self.count -= 8;
                return Ok(DCT_00100[((pb >> 8) & 7) as usize]);
            }
            if pb & 0x1000 != 0 {
                self.count -= 6;
                return Ok(DCT_0001[((pb >> 10) & 3) as usize]);
            }
            self.count -= 7;
            return Ok(DCT_00001[((pb >> 9) & 3) as usize]);
        }

        if pb >> 10 == 1 {
            self.count -= 12;
            return Ok(RunLevel::new(((pb >> 4) & 0x3F) as u8, 0));
        }

        if pb & 0x0200 != 0 {
            self.count -= 10;
            return Ok(DCT_0000001[((pb >> 6) & 7) as usize]);
        }

        if pb < 0x0010 {
            return Err(Error::InvalidVlc {
                table: "dct_coefficient",
            });
        }
        let mut zeros = 0;
        while pb < 0x0100 {
            pb <<= 1;
            zeros += 1;
        }
        self.count -= 12 + zeros;
        Ok(DCT_LONG[((zeros << 4) + ((pb >> 4) & 0xF)) as usize])
    }
}
