//! Offline index generation from transport stream files.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{IndexHeader, IndexRecord, SeekIndex};
use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::ts::{PacketHeader, PesHeader, PACKET_SIZE};

const SEQUENCE_HEADER_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xB3];

/// A random access point: a video PES that opens with a sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    pub pts: i64,
    /// Index of the transport packet carrying the PES start.
    pub packet: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStats {
    pub packets: u64,
    pub sequence_points: usize,
    /// Largest number of video packets between two video PES starts.
    pub max_frame_packets: u32,
    /// Peak bit rate over one sequence-header-to-sequence-header span.
    pub max_gop_kbits: u32,
    /// How far audio timestamps ran ahead of (positive) or behind (negative)
    /// the latest video timestamp.
    pub audio_delta_max_ms: Option<i64>,
    pub audio_delta_min_ms: Option<i64>,
}

/// Everything the index needs from one transport stream, gathered packet by packet.
#[derive(Debug, Clone)]
pub struct StreamScan {
    video_pid: u16,
    audio_pid: u16,
    points: Vec<SequencePoint>,
    last_pts: Option<i64>,
    stats: ScanStats,

    frame_packets: u32,
    gop_packets: u32,
    gop_pts: Option<i64>,
}

impl StreamScan {
    pub fn new(config: &IndexConfig) -> Self {
        StreamScan {
            video_pid: config.video_pid,
            audio_pid: config.audio_pid,
            points: Vec::new(),
            last_pts: None,
            stats: ScanStats::default(),
            frame_packets: 0,
            gop_packets: 0,
            gop_pts: None,
        }
    }

    pub fn scan_reader<R: Read>(reader: &mut R, config: &IndexConfig) -> Result<StreamScan> {
        let mut scan = StreamScan::new(config);
        let mut packet = [0u8; PACKET_SIZE];
        loop {
            match reader.read_exact(&mut packet) {
                Ok(()) => scan.feed(&packet),
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(scan)
    }

    pub fn scan_file(path: &Path, config: &IndexConfig) -> Result<StreamScan> {
        info!("scanning {}", path.display());
        let mut reader = BufReader::with_capacity(1024 * PACKET_SIZE, File::open(path)?);
        let scan = StreamScan::scan_reader(&mut reader, config)?;
        scan.log_stats(path);
        Ok(scan)
    }

    pub fn points(&self) -> &[SequencePoint] {
        &self.points
    }

    /// Presentation time of the first sequence point.
    pub fn first_pts(&self) -> Option<i64> {
        self.points.first().map(|point| point.pts)
    }

    /// Presentation time of the last video PES.
    pub fn last_pts(&self) -> Option<i64> {
        self.last_pts
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            sequence_points: self.points.len(),
            max_frame_packets: self.stats.max_frame_packets.max(self.frame_packets),
            ..self.stats
        }
    }

    pub fn feed(&mut self, packet: &[u8]) {
        let index = self.stats.packets;
        self.stats.packets += 1;

        let header = match PacketHeader::parse(packet) {
            Ok(header) => header,
            Err(err) => {
                warn!("packet {}: {}", index, err);
                return;
            }
        };
        let payload = match header.payload(packet) {
            Some(payload) => payload,
            None => return,
        };
        let is_video = header.pid == self.video_pid;

        if header.payload_unit_start && (is_video || header.pid == self.audio_pid) {
            match PesHeader::parse(payload) {
                Ok(pes) => {
                    let es = payload.get(pes.payload_offset()..).unwrap_or(&[]);
                    if is_video {
                        self.video_pes(index as u32, &pes, es);
                    } else if let Some(pts) = pes.pts {
                        self.audio_pes(pts);
                    }
                }
                Err(err) => warn!("packet {}: {}", index, err),
            }
        }
        if is_video {
            self.frame_packets += 1;
        }
    }

    fn video_pes(&mut self, packet: u32, pes: &PesHeader, es: &[u8]) {
        if let Some(pts) = pes.pts {
            if es.starts_with(&SEQUENCE_HEADER_CODE) {
                self.sequence_point(pts, packet);
            }
            self.last_pts = Some(pts);
        }
        self.stats.max_frame_packets = self.stats.max_frame_packets.max(self.frame_packets);
        self.gop_packets += self.frame_packets;
        self.frame_packets = 0;
    }

    fn sequence_point(&mut self, pts: i64, packet: u32) {
        self.points.push(SequencePoint { pts, packet });
        if let Some(gop_pts) = self.gop_pts {
            let millis = (pts - gop_pts) / 90;
            if millis > 0 {
                let kbits = self.gop_packets as i64 * PACKET_SIZE as i64 * 8 / millis;
                self.stats.max_gop_kbits = self.stats.max_gop_kbits.max(kbits as u32);
            }
        }
        self.gop_pts = Some(pts);
        self.gop_packets = 0;
    }

    fn audio_pes(&mut self, pts: i64) {
        let video = match self.last_pts {
            Some(video) => video,
            None => return,
        };
        let delta = (pts - video) / 90;
        let stats = &mut self.stats;
        stats.audio_delta_max_ms = Some(stats.audio_delta_max_ms.map_or(delta, |max| max.max(delta)));
        stats.audio_delta_min_ms = Some(stats.audio_delta_min_ms.map_or(delta, |min| min.min(delta)));
    }

    fn log_stats(&self, path: &Path) {
        let stats = self.stats();
        info!(
            "{}: {} packets, {} sequence points, pts {:?}..{:?}",
            path.display(),
            stats.packets,
            stats.sequence_points,
            self.first_pts(),
            self.last_pts
        );
        if let (Some(early), Some(late)) = (stats.audio_delta_max_ms, stats.audio_delta_min_ms) {
            info!("audio between {}ms early and {}ms late", early, late);
        }
        info!(
            "max video frame {} packets ({}k), max gop bitrate {}kbit/s",
            stats.max_frame_packets,
            stats.max_frame_packets as usize * PACKET_SIZE / 1024,
            stats.max_gop_kbits
        );
    }

    /// Builds the record and dense table for this stream. Bin `i` covers time
    /// `first + i * bin_size` and holds the packet of the nearest sequence point.
    pub fn samples(&self, bin_size: u32, trick_speed: u32) -> Option<(IndexRecord, Vec<u32>)> {
        let first = self.first_pts()?;
        let last = self.last_pts?.max(first);
        let bin = bin_size.max(1) as i64;
        let bins = (last - first + bin - 1) / bin;
        let table: Vec<u32> = (0..=bins)
            .map(|i| nearest_packet(&self.points, first + i * bin))
            .collect();
        debug!("{}..{} produced {} from {}", first, last, table.len(), self.points.len());

        let record = IndexRecord {
            first_pts: first,
            last_pts: last,
            bin_size,
            trick_speed,
            sample_count: table.len() as u32,
        };
        Some((record, table))
    }
}

/// Packet of the sequence point closest in time to `pts`; the earliest one wins ties.
pub fn nearest_packet(points: &[SequencePoint], pts: i64) -> u32 {
    let mut best: Option<(i64, u32)> = None;
    for point in points {
        let distance = (point.pts - pts).abs();
        if best.map_or(true, |(closest, _)| distance < closest) {
            best = Some((distance, point.packet));
        }
    }
    best.map_or(0, |(_, packet)| packet)
}

pub struct SeekIndexBuilder {
    config: IndexConfig,
}

impl SeekIndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        SeekIndexBuilder { config }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn samples(&self, scan: &StreamScan, trick_speed: u32, path: &Path) -> Result<(IndexRecord, Vec<u32>)> {
        scan.samples(self.config.bin_size, trick_speed)
            .ok_or_else(|| Error::NoRandomAccessPoints(path.to_path_buf()))
    }

    /// Combines the scans of the normal, fast-forward and rewind streams. The
    /// paths only label errors.
    pub fn build(&self, streams: [(&StreamScan, &Path); 3]) -> Result<SeekIndex> {
        let [(video, video_path), (forward, forward_path), (rewind, rewind_path)] = streams;
        let speed = self.config.trick_speed;
        let (video_record, video_table) = self.samples(video, 1, video_path)?;
        let (forward_record, forward_table) = self.samples(forward, speed, forward_path)?;
        let (rewind_record, rewind_table) = self.samples(rewind, speed, rewind_path)?;
        Ok(SeekIndex {
            header: IndexHeader {
                video: video_record,
                forward: forward_record,
                rewind: rewind_record,
            },
            video: video_table,
            forward: forward_table,
            rewind: rewind_table,
        })
    }

    /// Indexes the title in `dir` and writes its index file there. Returns
    /// `None` when the index already exists and `force` is off.
    pub fn build_title(&self, dir: &Path, force: bool) -> Result<Option<SeekIndex>> {
        let target = dir.join(&self.config.index_file);
        if target.exists() && !force {
            info!("{} exists, skipping", target.display());
            return Ok(None);
        }

        let paths: Vec<PathBuf> = [
            &self.config.video_file,
            &self.config.forward_file,
            &self.config.rewind_file,
        ]
        .iter()
        .map(|name| dir.join(name))
        .collect();
        let scans = paths
            .iter()
            .map(|path| StreamScan::scan_file(path, &self.config))
            .collect::<Result<Vec<_>>>()?;

        let index = self.build([
            (&scans[0], paths[0].as_path()),
            (&scans[1], paths[1].as_path()),
            (&scans[2], paths[2].as_path()),
        ])?;
        index.save(&target)?;
        info!("wrote {} ({} bytes)", target.display(), index.header.file_size());
        Ok(Some(index))
    }

    /// Indexes every title listed in the manifest under `root`. Titles live in
    /// `root/media/<title>`. A failing title is logged and skipped. Returns the
    /// number of index files written.
    pub fn build_manifest(&self, root: &Path, force: bool) -> Result<usize> {
        let manifest = fs::read_to_string(root.join(&self.config.manifest_file))?;
        let mut written = 0;
        for title in manifest.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let dir = root.join("media").join(title);
            match self.build_title(&dir, force) {
                Ok(Some(_)) => written += 1,
                Ok(None) => {}
                Err(err) => warn!("{}: {}", title, err),
            }
        }
        Ok(written)
    }
}
