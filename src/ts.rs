//! MPEG transport stream demultiplexing: packet headers, PES headers and
//! timestamps, and routing of payload bytes to the video decoder and an audio sink.

use bitvec::prelude::*;
use log::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::mpeg1::bits::ByteSource;
use crate::queue::{Chunk, ChunkFeed};

pub const PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

/// Marker nibble of the PTS field when no DTS follows.
pub const PTS_MARKER: u8 = 0b0010;
/// Marker nibble of the PTS field when a DTS follows.
pub const PTS_DTS_MARKER: u8 = 0b0011;
pub const DTS_MARKER: u8 = 0b0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: u8,
}

impl PacketHeader {
    /// Parses the 4 byte header of a 188 byte packet.
    pub fn parse(packet: &[u8]) -> Result<PacketHeader> {
        if packet.len() < PACKET_SIZE {
            return Err(Error::ShortPacket { len: packet.len() });
        }
        if packet[0] != SYNC_BYTE {
            return Err(Error::SyncLoss { byte: packet[0] });
        }

        let bits = packet[..4].view_bits::<Msb0>();
        Ok(PacketHeader {
            payload_unit_start: bits[9],
            pid: bits[11..24].load_be::<u16>(),
            has_adaptation_field: bits[26],
            has_payload: bits[27],
            continuity_counter: bits[28..32].load_be::<u8>(),
        })
    }

    /// The payload bytes of `packet`, past any adaptation field.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> Option<&'a [u8]> {
        if !self.has_payload {
            return None;
        }
        let start = if self.has_adaptation_field {
            5 + packet[4] as usize
        } else {
            4
        };
        packet.get(start..PACKET_SIZE)
    }
}

/// Reads a 33 bit timestamp from its 5 byte field. Returns `None` unless the
/// leading nibble equals `marker`.
pub fn parse_timestamp(field: &[u8], marker: u8) -> Option<i64> {
    let bits = field.get(..5)?.view_bits::<Msb0>();
    if bits[..4].load_be::<u8>() != marker {
        return None;
    }
    let high = bits[4..7].load_be::<u64>();
    let middle = bits[8..23].load_be::<u64>();
    let low = bits[24..39].load_be::<u64>();
    Some(((high << 30) | (middle << 15) | low) as i64)
}

pub fn encode_timestamp(marker: u8, timestamp: i64) -> [u8; 5] {
    let ts = timestamp as u64 & ((1 << 33) - 1);
    let mut field = [0u8; 5];
    let bits = field.view_bits_mut::<Msb0>();
    bits[..4].store_be(marker);
    bits[4..7].store_be((ts >> 30) as u8);
    bits.set(7, true);
    bits[8..23].store_be(((ts >> 15) & 0x7FFF) as u16);
    bits.set(23, true);
    bits[24..39].store_be((ts & 0x7FFF) as u16);
    bits.set(39, true);
    field
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// Declared PES_packet_length; zero means unbounded.
    pub packet_length: u16,
    pub header_data_length: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

impl PesHeader {
    pub fn parse(data: &[u8]) -> Result<PesHeader> {
        if data.len() < 9 {
            return Err(Error::MalformedPes("truncated header"));
        }
        if data[..3] != [0x00, 0x00, 0x01] {
            return Err(Error::MalformedPes("missing start code prefix"));
        }
        let header_data_length = data[8];
        let header_end = 9 + header_data_length as usize;
        if header_end > data.len() {
            return Err(Error::MalformedPes("header runs past packet"));
        }

        let flags = data[6..9].view_bits::<Msb0>();
        let has_pts = flags[8];
        let has_dts = flags[9];
        let optional = &data[9..header_end];

        let mut pts = None;
        let mut dts = None;
        if has_pts {
            let marker = if has_dts { PTS_DTS_MARKER } else { PTS_MARKER };
            pts = parse_timestamp(optional, marker);
            if has_dts {
                dts = optional.get(5..).and_then(|field| parse_timestamp(field, DTS_MARKER));
            }
        }

        Ok(PesHeader {
            stream_id: data[3],
            packet_length: u16::from_be_bytes([data[4], data[5]]),
            header_data_length,
            pts,
            dts,
        })
    }

    /// Offset of the elementary stream bytes from the start of the PES header.
    pub fn payload_offset(&self) -> usize {
        9 + self.header_data_length as usize
    }

    /// Number of elementary stream bytes this PES carries, if bounded.
    pub fn payload_length(&self) -> Option<usize> {
        match self.packet_length {
            0 => None,
            length => Some((length as usize).saturating_sub(3 + self.header_data_length as usize)),
        }
    }
}

/// Receives audio elementary stream bytes. Decoding and output happen elsewhere.
pub trait AudioSink {
    /// `pes_complete` is set on the chunk that brings the received byte count
    /// up to the length declared by its PES header.
    fn push_audio(&mut self, data: &[u8], pts: Option<i64>, pes_complete: bool);
}

impl<F> AudioSink for F
where
    F: FnMut(&[u8], Option<i64>, bool),
{
    fn push_audio(&mut self, data: &[u8], pts: Option<i64>, pes_complete: bool) {
        self(data, pts, pes_complete)
    }
}

pub struct DiscardAudio;

impl AudioSink for DiscardAudio {
    fn push_audio(&mut self, _data: &[u8], _pts: Option<i64>, _pes_complete: bool) {}
}

#[derive(Debug, Default, Clone, Copy)]
struct AudioState {
    pts: Option<i64>,
    expected: Option<usize>,
    received: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Demuxed<'a> {
    /// Video elementary stream bytes; `pes` is set when this packet opened a new PES.
    Video {
        payload: &'a [u8],
        pes: Option<PesHeader>,
    },
    Audio {
        pid: u16,
        payload: &'a [u8],
        pts: Option<i64>,
        complete: bool,
    },
    Skipped,
}

pub struct TransportDemuxer {
    video_pid: u16,
    audio: Vec<(u16, AudioState)>,
    video_pts: Option<i64>,
}

impl TransportDemuxer {
    pub fn new(config: &DecoderConfig) -> Self {
        TransportDemuxer {
            video_pid: config.video_pid,
            audio: config
                .audio_pids
                .iter()
                .map(|&pid| (pid, AudioState::default()))
                .collect(),
            video_pts: None,
        }
    }

    /// Presentation time of the latest video PES header with a valid PTS.
    pub fn video_pts(&self) -> Option<i64> {
        self.video_pts
    }

    pub fn reset(&mut self) {
        self.video_pts = None;
        for (_, state) in self.audio.iter_mut() {
            *state = AudioState::default();
        }
    }

    /// Demultiplexes one transport packet.
    pub fn feed<'a>(&mut self, packet: &'a [u8]) -> Result<Demuxed<'a>> {
        let header = PacketHeader::parse(packet)?;
        let is_video = header.pid == self.video_pid;
        let audio = self.audio.iter().position(|(pid, _)| *pid == header.pid);
        if !is_video && audio.is_none() {
            return Ok(Demuxed::Skipped);
        }

        let mut payload = match header.payload(packet) {
            Some(payload) => payload,
            None => return Ok(Demuxed::Skipped),
        };
        let mut pes = None;
        if header.payload_unit_start {
            let parsed = PesHeader::parse(payload)?;
            payload = &payload[parsed.payload_offset()..];
            pes = Some(parsed);
        }

        if is_video {
            if let Some(pts) = pes.and_then(|pes| pes.pts) {
                trace!("video pes pts {}", pts);
                self.video_pts = Some(pts);
            }
            return Ok(Demuxed::Video { payload, pes });
        }

        let (pid, state) = match audio.and_then(|index| self.audio.get_mut(index)) {
            Some((pid, state)) => (*pid, state),
            None => return Ok(Demuxed::Skipped),
        };
        if let Some(pes) = pes {
            state.pts = pes.pts;
            state.expected = pes.payload_length();
            state.received = 0;
        }
        // audio is dropped until a PES with a usable timestamp arrives
        if state.pts.is_none() {
            return Ok(Demuxed::Skipped);
        }
        state.received += payload.len();
        Ok(Demuxed::Audio {
            pid,
            payload,
            pts: state.pts,
            complete: state.expected == Some(state.received),
        })
    }
}

/// Pulls transport stream chunks from a [`ChunkFeed`], demultiplexes them, and
/// hands the video elementary stream to a bit reader. Audio goes to `A`.
pub struct DemuxSource<F, A> {
    feed: F,
    audio: A,
    demuxer: TransportDemuxer,
    chunk: Option<Chunk>,
    mark: usize,
    video_pes_count: u64,
}

impl<F: ChunkFeed, A: AudioSink> DemuxSource<F, A> {
    pub fn new(feed: F, audio: A, config: &DecoderConfig) -> Self {
        DemuxSource {
            feed,
            audio,
            demuxer: TransportDemuxer::new(config),
            chunk: None,
            mark: 0,
            video_pes_count: 0,
        }
    }

    /// Number of video PES headers seen since the last reset.
    pub fn video_pes_count(&self) -> u64 {
        self.video_pes_count
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    fn release_chunk(&mut self) {
        if let Some(chunk) = self.chunk.take() {
            self.feed.push_empty(chunk);
        }
        self.mark = 0;
    }
}

impl<F: ChunkFeed, A: AudioSink> ByteSource for DemuxSource<F, A> {
    fn next_chunk(&mut self, dst: &mut Vec<u8>) -> bool {
        loop {
            let chunk = match &self.chunk {
                Some(chunk) if self.mark + PACKET_SIZE <= chunk.len() => chunk,
                Some(chunk) => {
                    if self.mark < chunk.len() {
                        warn!("dropping {} bytes of partial packet", chunk.len() - self.mark);
                    }
                    self.release_chunk();
                    continue;
                }
                None => {
                    let chunk = self.feed.pop_full();
                    if chunk.is_empty() {
                        debug!("transport stream ended");
                        self.feed.push_empty(chunk);
                        return false;
                    }
                    self.chunk = Some(chunk);
                    self.mark = 0;
                    continue;
                }
            };

            let packet = &chunk.data()[self.mark..self.mark + PACKET_SIZE];
            self.mark += PACKET_SIZE;
            match self.demuxer.feed(packet) {
                Ok(Demuxed::Video { payload, pes }) => {
                    if pes.is_some() {
                        self.video_pes_count += 1;
                    }
                    if !payload.is_empty() {
                        dst.extend_from_slice(payload);
                        return true;
                    }
                }
                Ok(Demuxed::Audio {
                    payload,
                    pts,
                    complete,
                    ..
                }) => self.audio.push_audio(payload, pts, complete),
                Ok(Demuxed::Skipped) => {}
                Err(Error::SyncLoss { byte }) => {
                    warn!("ts lost sync (0x{:02x}), dropping rest of chunk", byte);
                    self.mark = chunk.len();
                }
                Err(err) => warn!("dropping packet: {}", err),
            }
        }
    }

    fn pts(&self) -> Option<i64> {
        self.demuxer.video_pts()
    }

    fn reset(&mut self) {
        self.release_chunk();
        self.demuxer.reset();
        self.video_pes_count = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::queue::MemoryFeed;
    use crate::synth::{packetize, PesOptions};

    #[test]
    fn timestamp_round_trip() {
        let samples = [0i64, 1, 0x7FFF, 0x8000, 90_000, 0x1_2345_6789, (1 << 33) - 1];
        for &ts in samples.iter() {
            for &marker in [PTS_MARKER, PTS_DTS_MARKER, DTS_MARKER].iter() {
                let field = encode_timestamp(marker, ts);
                assert_eq!(field[0] >> 4, marker);
                assert_eq!(field[4] & 1, 1);
                assert_eq!(parse_timestamp(&field, marker), Some(ts));
            }
        }
        let mut ts = 3i64;
        while ts < 1 << 33 {
            assert_eq!(parse_timestamp(&encode_timestamp(PTS_MARKER, ts), PTS_MARKER), Some(ts));
            ts = ts * 7 + 1;
        }
    }

    #[test]
    fn timestamp_marker_mismatch_is_invalid() {
        let field = encode_timestamp(PTS_MARKER, 1234);
        assert_eq!(parse_timestamp(&field, PTS_DTS_MARKER), None);
        assert_eq!(parse_timestamp(&field[..4], PTS_MARKER), None);
    }

    #[test]
    fn sync_loss_stays_inside_packet() {
        let mut demuxer = TransportDemuxer::new(&DecoderConfig::default());
        for first in (0..=255u8).filter(|&b| b != SYNC_BYTE) {
            let mut data = vec![0u8; PACKET_SIZE * 2];
            data[0] = first;
            data[PACKET_SIZE] = SYNC_BYTE;
            match demuxer.feed(&data[..PACKET_SIZE]) {
                Err(Error::SyncLoss { byte }) => assert_eq!(byte, first),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            demuxer.feed(&[SYNC_BYTE; 100]),
            Err(Error::ShortPacket { len: 100 })
        ));
    }

    #[test]
    fn packet_header_fields() {
        let mut packet = [0xFFu8; PACKET_SIZE];
        packet[..6].copy_from_slice(&[0x47, 0x41, 0x00, 0x37, 0x01, 0x00]);
        let header = PacketHeader::parse(&packet).unwrap();
        assert_eq!(header.pid, 0x100);
        assert!(header.payload_unit_start);
        assert!(header.has_adaptation_field && header.has_payload);
        assert_eq!(header.continuity_counter, 7);
        assert_eq!(header.payload(&packet).unwrap().len(), PACKET_SIZE - 6);
    }

    #[test]
    fn pes_header_with_pts_and_dts() {
        let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 10];
        pes.extend_from_slice(&encode_timestamp(PTS_DTS_MARKER, 126_000));
        pes.extend_from_slice(&encode_timestamp(DTS_MARKER, 122_250));
        pes.extend_from_slice(&[0x00, 0x00, 0x01, 0xB3]);
        let header = PesHeader::parse(&pes).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(header.pts, Some(126_000));
        assert_eq!(header.dts, Some(122_250));
        assert_eq!(header.payload_length(), None);
        assert_eq!(&pes[header.payload_offset()..], &[0x00, 0x00, 0x01, 0xB3]);

        pes[9] = (pes[9] & 0x0F) | 0x20;
        assert_eq!(PesHeader::parse(&pes).unwrap().pts, None);
        assert!(PesHeader::parse(&pes[..8]).is_err());
    }

    #[test]
    fn routes_video_and_audio() {
        let config = DecoderConfig::default();
        let mut stream = packetize(0x100, &[7u8; 400], PesOptions::video(9000));
        let audio_payload: Vec<u8> = (0..300).map(|i| i as u8).collect();
        stream.extend(packetize(0x102, &audio_payload, PesOptions::audio(4500)));
        stream.extend(packetize(0x1FFF, &[0u8; 10], PesOptions::video(0)));

        let mut demuxer = TransportDemuxer::new(&config);
        let mut video = Vec::new();
        let mut audio = Vec::new();
        let mut completions = 0;
        for packet in stream.chunks(PACKET_SIZE) {
            match demuxer.feed(packet).unwrap() {
                Demuxed::Video { payload, .. } => video.extend_from_slice(payload),
                Demuxed::Audio {
                    pid,
                    payload,
                    pts,
                    complete,
                } => {
                    assert_eq!(pid, 0x102);
                    assert_eq!(pts, Some(4500));
                    audio.extend_from_slice(payload);
                    completions += complete as usize;
                }
                Demuxed::Skipped => {}
            }
        }
        assert_eq!(video, vec![7u8; 400]);
        assert_eq!(audio, audio_payload);
        assert_eq!(completions, 1);
        assert_eq!(demuxer.video_pts(), Some(9000));
    }

    #[test]
    fn audio_without_timestamp_is_held_back() {
        let mut demuxer = TransportDemuxer::new(&DecoderConfig::default());
        let stream = packetize(0x101, &[1u8; 50], PesOptions::audio(0).without_pts());
        for packet in stream.chunks(PACKET_SIZE) {
            assert_eq!(demuxer.feed(packet).unwrap(), Demuxed::Skipped);
        }
    }

    #[test]
    fn source_skips_rest_of_chunk_after_sync_loss() {
        let config = DecoderConfig::default();
        let mut first = packetize(0x100, &[1u8; 184 * 3], PesOptions::continuation());
        first[PACKET_SIZE] = 0x00;
        let second = packetize(0x100, &[2u8; 184], PesOptions::continuation());

        let mut data = first;
        data.extend(second);
        let feed = MemoryFeed::new(data, PACKET_SIZE * 3);
        let mut source = DemuxSource::new(feed, DiscardAudio, &config);

        let mut es = Vec::new();
        while source.next_chunk(&mut es) {}
        assert_eq!(es.len(), 184 * 2);
        assert!(es[..184].iter().all(|&b| b == 1));
        assert!(es[184..].iter().all(|&b| b == 2));
    }
}
