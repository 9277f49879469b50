//! Time translation between the main stream and its trick streams, and from
//! a presentation time to a seek position through the index tables.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{Direction, IndexHeader, IndexRecord, ENTRY_SIZE, HEADER_SIZE};
use crate::error::Result;
use crate::ts::PACKET_SIZE;

/// Works from the index header alone; table entries are fetched on demand
/// so a remote index costs one small range read per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMapper {
    header: IndexHeader,
}

fn scale(value: i64, numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    (value as i128 * numerator as i128 / denominator as i128) as i64
}

impl TimeMapper {
    pub fn new(header: IndexHeader) -> Self {
        TimeMapper { header }
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Main stream time elapsed at `pts` of the trick stream `record`.
    fn elapsed_main(&self, pts: i64, record: &IndexRecord) -> i64 {
        scale(pts - record.first_pts, self.header.video.span(), record.span())
    }

    /// Maps a trick stream time to the main stream time it shows. Rewind
    /// streams run backwards from the end of the main stream.
    pub fn trick_to_main(&self, pts: i64, direction: Direction) -> i64 {
        let video = &self.header.video;
        match direction {
            Direction::Normal => pts,
            Direction::FastForward => video.first_pts + self.elapsed_main(pts, &self.header.forward),
            Direction::Rewind => video.last_pts - self.elapsed_main(pts, &self.header.rewind),
        }
    }

    /// Maps a main stream time to the matching time of the trick stream for
    /// `direction`, by proportion of the two time ranges.
    pub fn main_to_trick(&self, pts: i64, direction: Direction) -> i64 {
        let video = &self.header.video;
        match direction {
            Direction::Normal => pts,
            Direction::FastForward => {
                let forward = &self.header.forward;
                forward.first_pts + scale(pts - video.first_pts, forward.span(), video.span())
            }
            Direction::Rewind => {
                let rewind = &self.header.rewind;
                rewind.first_pts + scale(video.last_pts - pts, rewind.span(), video.span())
            }
        }
    }

    /// Byte offset in the index file of the table entry for main stream time
    /// `pts`, which is clamped to the main stream's range.
    pub fn pts_to_offset(&self, pts: i64, direction: Direction) -> u64 {
        let video = &self.header.video;
        let pts = pts.max(video.first_pts).min(video.last_pts);
        let record = self.header.record(direction);
        let ticks = match direction {
            Direction::Rewind => video.last_pts - pts,
            Direction::Normal | Direction::FastForward => pts - video.first_pts,
        } as u64;
        let per_bin = match direction {
            Direction::Normal => record.bin_size as u64,
            _ => record.trick_speed as u64 * record.bin_size as u64,
        }
        .max(1);
        let bin = (ticks / per_bin).min((record.sample_count as u64).saturating_sub(1));
        HEADER_SIZE + (self.header.table_start(direction) + bin) * ENTRY_SIZE
    }

    /// Reads the table entry for `pts` from an index file and returns the byte
    /// position in the media file for `direction`.
    pub fn media_position<R: Read + Seek>(
        &self,
        index: &mut R,
        pts: i64,
        direction: Direction,
    ) -> Result<u64> {
        index.seek(SeekFrom::Start(self.pts_to_offset(pts, direction)))?;
        let packet = index.read_u32::<LittleEndian>()?;
        Ok(packet as u64 * PACKET_SIZE as u64)
    }
}
