use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("transport packet lost sync (found 0x{byte:02x}, expected 0x47)")]
    SyncLoss { byte: u8 },

    #[error("transport packet too short: {len} bytes")]
    ShortPacket { len: usize },

    #[error("malformed PES header: {0}")]
    MalformedPes(&'static str),

    #[error("invalid code in {table} table")]
    InvalidVlc { table: &'static str },

    #[error("unknown start code 0x{0:02x}")]
    InvalidStartCode(u8),

    #[error("macroblock address {address} outside frame of {limit} macroblocks")]
    MacroblockOverrun { address: i32, limit: i32 },

    #[error("more than 64 coefficients in block")]
    CoefficientOverrun,

    #[error("invalid picture header: {0}")]
    InvalidPictureHeader(&'static str),

    #[error("frame size {width}x{height} is not a whole number of macroblocks")]
    InvalidFrameSize { width: usize, height: usize },

    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("invalid seek index: {0}")]
    InvalidIndex(String),

    #[error("no sequence headers with timestamps in {}", .0.display())]
    NoRandomAccessPoints(PathBuf),
}
