//! Tunables for the decode pipeline and the offline index builder.

use crate::ts::PACKET_SIZE;

pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PIDS: [u16; 2] = [0x101, 0x102];

/// 90kHz ticks per index bin (1/12 second).
pub const DEFAULT_BIN_SIZE: u32 = 90_000 / 12;
pub const DEFAULT_TRICK_SPEED: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub video_pid: u16,
    pub audio_pids: Vec<u16>,
    /// Number of chunks circulating between producer and decoder.
    pub pool_size: usize,
    /// Transport packets per chunk.
    pub chunk_packets: usize,
    pub frame_width: usize,
    pub frame_height: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            video_pid: VIDEO_PID,
            audio_pids: AUDIO_PIDS.to_vec(),
            pool_size: 4,
            chunk_packets: 8,
            frame_width: 352,
            frame_height: 192,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video_pid(mut self, pid: u16) -> Self {
        self.video_pid = pid;
        self
    }

    pub fn with_audio_pids(mut self, pids: &[u16]) -> Self {
        self.audio_pids = pids.to_vec();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_chunk_packets(mut self, packets: usize) -> Self {
        self.chunk_packets = packets.max(1);
        self
    }

    /// Frame dimensions are rounded up to whole macroblocks.
    pub fn with_frame_size(mut self, width: usize, height: usize) -> Self {
        self.frame_width = (width.max(16) + 15) & !15;
        self.frame_height = (height.max(16) + 15) & !15;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_packets * PACKET_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub bin_size: u32,
    pub trick_speed: u32,
    pub video_pid: u16,
    /// Only used for the audio/video offset statistics.
    pub audio_pid: u16,
    pub video_file: String,
    pub forward_file: String,
    pub rewind_file: String,
    pub index_file: String,
    pub manifest_file: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            bin_size: DEFAULT_BIN_SIZE,
            trick_speed: DEFAULT_TRICK_SPEED,
            video_pid: VIDEO_PID,
            audio_pid: AUDIO_PIDS[1],
            video_file: "video.ts".to_owned(),
            forward_file: "video_fwd.ts".to_owned(),
            rewind_file: "video_rwd.ts".to_owned(),
            index_file: "video.idx".to_owned(),
            manifest_file: "manifest.txt".to_owned(),
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_size(mut self, bin_size: u32) -> Self {
        self.bin_size = bin_size.max(1);
        self
    }

    pub fn with_trick_speed(mut self, speed: u32) -> Self {
        self.trick_speed = speed.max(1);
        self
    }

    pub fn with_video_pid(mut self, pid: u16) -> Self {
        self.video_pid = pid;
        self
    }

    pub fn with_audio_pid(mut self, pid: u16) -> Self {
        self.audio_pid = pid;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.chunk_size(), 8 * 188);
        assert_eq!(config.audio_pids, vec![0x101, 0x102]);

        let index = IndexConfig::default();
        assert_eq!(index.bin_size, 7500);
        assert_eq!(index.trick_speed, 15);
    }

    #[test]
    fn frame_size_rounds_to_macroblocks() {
        let config = DecoderConfig::new().with_frame_size(100, 20);
        assert_eq!((config.frame_width, config.frame_height), (112, 32));
    }
}
