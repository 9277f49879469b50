//! Seek index files for trick play.
//!
//! An index covers three transport streams of one title: normal speed,
//! fast-forward and rewind. For each it stores a time range and a dense table
//! mapping time bins to the packet index of the nearest sequence header.
//!
//! Layout, all little-endian:
//!
//! ```text
//! 0     u32   signature "IDX\0"
//! 4     u32   record count (3)
//! 8     32    video record
//! 40    32    fast-forward record
//! 72    32    rewind record
//! 104   4*N   video table, then fast-forward, then rewind
//! ```
//!
//! A record is `first_pts: i64, last_pts: i64, bin_size: u32, trick_speed: u32,
//! sample_count: u32` followed by 4 bytes of padding.

pub mod builder;
pub mod mapper;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use strum_macros::{Display, EnumIter};

use crate::error::{Error, Result};

pub const SIGNATURE: u32 = u32::from_le_bytes(*b"IDX\0");
pub const RECORD_COUNT: u32 = 3;
pub const RECORD_SIZE: u64 = 32;
pub const HEADER_SIZE: u64 = 8 + RECORD_SIZE * RECORD_COUNT as u64;
/// Size of one table entry.
pub const ENTRY_SIZE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Direction {
    Rewind,
    Normal,
    FastForward,
}

impl Direction {
    /// Maps a signed play speed to a direction: negative rewinds, zero is
    /// normal playback.
    pub fn from_speed(speed: i32) -> Direction {
        match speed {
            s if s < 0 => Direction::Rewind,
            0 => Direction::Normal,
            _ => Direction::FastForward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexRecord {
    pub first_pts: i64,
    pub last_pts: i64,
    /// 90kHz ticks per table entry, in the stream's own time.
    pub bin_size: u32,
    pub trick_speed: u32,
    pub sample_count: u32,
}

impl IndexRecord {
    pub fn span(&self) -> i64 {
        self.last_pts - self.first_pts
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<IndexRecord> {
        let record = IndexRecord {
            first_pts: reader.read_i64::<LittleEndian>()?,
            last_pts: reader.read_i64::<LittleEndian>()?,
            bin_size: reader.read_u32::<LittleEndian>()?,
            trick_speed: reader.read_u32::<LittleEndian>()?,
            sample_count: reader.read_u32::<LittleEndian>()?,
        };
        reader.read_u32::<LittleEndian>()?;
        Ok(record)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<LittleEndian>(self.first_pts)?;
        writer.write_i64::<LittleEndian>(self.last_pts)?;
        writer.write_u32::<LittleEndian>(self.bin_size)?;
        writer.write_u32::<LittleEndian>(self.trick_speed)?;
        writer.write_u32::<LittleEndian>(self.sample_count)?;
        writer.write_u32::<LittleEndian>(0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexHeader {
    pub video: IndexRecord,
    pub forward: IndexRecord,
    pub rewind: IndexRecord,
}

impl IndexHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<IndexHeader> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != SIGNATURE {
            return Err(Error::InvalidIndex(format!("bad signature 0x{:08x}", signature)));
        }
        let count = reader.read_u32::<LittleEndian>()?;
        if count != RECORD_COUNT {
            return Err(Error::InvalidIndex(format!("{} records, expected 3", count)));
        }
        Ok(IndexHeader {
            video: IndexRecord::read_from(reader)?,
            forward: IndexRecord::read_from(reader)?,
            rewind: IndexRecord::read_from(reader)?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(SIGNATURE)?;
        writer.write_u32::<LittleEndian>(RECORD_COUNT)?;
        self.video.write_to(writer)?;
        self.forward.write_to(writer)?;
        self.rewind.write_to(writer)?;
        Ok(())
    }

    pub fn record(&self, direction: Direction) -> &IndexRecord {
        match direction {
            Direction::Normal => &self.video,
            Direction::FastForward => &self.forward,
            Direction::Rewind => &self.rewind,
        }
    }

    /// Entry number at which the table for `direction` starts.
    pub fn table_start(&self, direction: Direction) -> u64 {
        let video = self.video.sample_count as u64;
        match direction {
            Direction::Normal => 0,
            Direction::FastForward => video,
            Direction::Rewind => video + self.forward.sample_count as u64,
        }
    }

    /// Size of the whole index file this header describes.
    pub fn file_size(&self) -> u64 {
        let entries = self.video.sample_count as u64
            + self.forward.sample_count as u64
            + self.rewind.sample_count as u64;
        HEADER_SIZE + entries * ENTRY_SIZE
    }
}

/// A complete index held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeekIndex {
    pub header: IndexHeader,
    pub video: Vec<u32>,
    pub forward: Vec<u32>,
    pub rewind: Vec<u32>,
}

fn read_table<R: Read>(reader: &mut R, count: u32) -> Result<Vec<u32>> {
    let mut table = vec![0; count as usize];
    reader.read_u32_into::<LittleEndian>(&mut table)?;
    Ok(table)
}

impl SeekIndex {
    pub fn table(&self, direction: Direction) -> &[u32] {
        match direction {
            Direction::Normal => &self.video,
            Direction::FastForward => &self.forward,
            Direction::Rewind => &self.rewind,
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<SeekIndex> {
        let header = IndexHeader::read_from(reader)?;
        Ok(SeekIndex {
            video: read_table(reader, header.video.sample_count)?,
            forward: read_table(reader, header.forward.sample_count)?,
            rewind: read_table(reader, header.rewind.sample_count)?,
            header,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write_to(writer)?;
        for direction in [Direction::Normal, Direction::FastForward, Direction::Rewind].iter() {
            let table = self.table(*direction);
            if table.len() != self.header.record(*direction).sample_count as usize {
                return Err(Error::InvalidIndex(format!(
                    "{} table has {} entries, header says {}",
                    direction,
                    table.len(),
                    self.header.record(*direction).sample_count
                )));
            }
            for &entry in table {
                writer.write_u32::<LittleEndian>(entry)?;
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<SeekIndex> {
        SeekIndex::read_from(&mut BufReader::new(File::open(path)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use strum::IntoEnumIterator;

    use super::*;

    fn sample() -> SeekIndex {
        let record = |first, last, speed, count| IndexRecord {
            first_pts: first,
            last_pts: last,
            bin_size: 7500,
            trick_speed: speed,
            sample_count: count,
        };
        SeekIndex {
            header: IndexHeader {
                video: record(126_000, 1_026_000, 1, 3),
                forward: record(90_000, 150_000, 15, 2),
                rewind: record(90_000, 150_000, 15, 1),
            },
            video: vec![0, 40, 97],
            forward: vec![0, 7],
            rewind: vec![3],
        }
    }

    #[test]
    fn header_layout() {
        assert_eq!(HEADER_SIZE, 104);
        let mut bytes = Vec::new();
        sample().header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        assert_eq!(&bytes[..8], b"IDX\0\x03\0\0\0");
        assert_eq!(&bytes[8..16], &126_000i64.to_le_bytes());
        assert_eq!(&bytes[24..28], &7500u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &3u32.to_le_bytes());
        assert_eq!(&bytes[40..48], &90_000i64.to_le_bytes());
    }

    #[test]
    fn file_round_trip() {
        let index = sample();
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, index.header.file_size());
        assert_eq!(&bytes[104..108], &0u32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 4..], &3u32.to_le_bytes());

        let read = SeekIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(read, index);
        for direction in Direction::iter() {
            assert_eq!(read.table(direction).len() as u32, read.header.record(direction).sample_count);
        }
        assert_eq!(read.header.table_start(Direction::Rewind), 5);
    }

    #[test]
    fn rejects_foreign_files() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            SeekIndex::read_from(&mut Cursor::new(bytes)),
            Err(Error::InvalidIndex(_))
        ));

        let mut inconsistent = sample();
        inconsistent.forward.push(9);
        assert!(inconsistent.write_to(&mut Vec::new()).is_err());

        let mut truncated = Vec::new();
        sample().write_to(&mut truncated).unwrap();
        truncated.truncate(110);
        assert!(matches!(
            SeekIndex::read_from(&mut Cursor::new(truncated)),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn speed_directions() {
        assert_eq!(Direction::from_speed(-15), Direction::Rewind);
        assert_eq!(Direction::from_speed(0), Direction::Normal);
        assert_eq!(Direction::from_speed(15), Direction::FastForward);
        assert_eq!(Direction::FastForward.to_string(), "FastForward");
    }
}
