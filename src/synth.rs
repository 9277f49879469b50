//! Bit-exact builders for synthetic MPEG-1 elementary streams and the transport
//! packets that carry them. Used by the tests and the decode bench.

use std::collections::HashMap;

use bitvec::prelude::*;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::mpeg1::vlc::{
    VlcTable, CODE_BLOCK_PATTERN, DCT_COEFF, DCT_DC_SIZE_CHROMINANCE, DCT_DC_SIZE_LUMINANCE,
    MACROBLOCK_ADDRESS_INCREMENT, MACROBLOCK_TYPE_INTRA, MACROBLOCK_TYPE_PREDICTIVE, MOTION,
    ZIG_ZAG,
};
use crate::mpeg1::{
    PictureType, Timecode, MB_INTRA, MB_MOTION_FORWARD, MB_PATTERN, MB_QUANT,
};
use crate::ts::{encode_timestamp, PACKET_SIZE, PTS_MARKER, SYNC_BYTE};

type Codebook = HashMap<i16, (u32, u32)>;

// Encoding codebooks, derived from the decode trees.
static CODEBOOKS: Lazy<HashMap<&'static str, Codebook>> = Lazy::new(|| {
    [
        &MACROBLOCK_ADDRESS_INCREMENT,
        &MACROBLOCK_TYPE_INTRA,
        &MACROBLOCK_TYPE_PREDICTIVE,
        &CODE_BLOCK_PATTERN,
        &DCT_DC_SIZE_LUMINANCE,
        &DCT_DC_SIZE_CHROMINANCE,
        &MOTION,
        &DCT_COEFF,
    ]
    .iter()
    .map(|table| {
        let codes = table
            .codes()
            .into_iter()
            .map(|(value, code, length)| (value, (code, length)))
            .collect();
        (table.name, codes)
    })
    .collect()
});

/// MSB-first bit accumulator.
#[derive(Default)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter { bits: BitVec::new() }
    }

    /// Appends the low `n` bits of `value`, most significant first.
    pub fn put_bits(&mut self, value: u32, n: u32) {
        if n == 0 {
            return;
        }
        let start = self.bits.len();
        self.bits.resize(start + n as usize, false);
        self.bits[start..].store_be(value & (u32::MAX >> (32 - n)));
    }

    pub fn put_bit(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// Appends the code for `value` in `table`.
    pub fn put_vlc(&mut self, table: &VlcTable, value: i16) -> Result<()> {
        let (code, length) = CODEBOOKS
            .get(table.name)
            .and_then(|codebook| codebook.get(&value))
            .copied()
            .ok_or(Error::InvalidVlc { table: table.name })?;
        self.put_bits(code, length);
        Ok(())
    }

    pub fn byte_align(&mut self) {
        let padding = (8 - self.bits.len() % 8) % 8;
        self.put_bits(0, padding as u32);
    }

    /// Zero pads to a byte boundary and appends `00 00 01 <code>`.
    pub fn start_code(&mut self, code: u8) {
        self.byte_align();
        self.put_bits(0x00_00_01, 24);
        self.put_bits(code as u32, 8);
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.byte_align();
        self.bits.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroblockKind {
    /// Intra coded with flat blocks. `ac` lists extra (run, level) pairs for
    /// the first luma block.
    Intra {
        luma: u8,
        blue: u8,
        red: u8,
        ac: Vec<(u8, i16)>,
    },
    /// Forward predicted, no residual. Vectors are deltas from the running predictor.
    Forward { h: i32, v: i32 },
    /// Forward predicted with a DC-only residual of `level` in each luma block.
    ForwardResidual { h: i32, v: i32, level: i16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Macroblock {
    /// Macroblocks skipped between the previous coded macroblock and this one.
    pub skipped_before: u32,
    pub quantizer_scale: Option<u8>,
    pub kind: MacroblockKind,
}

impl Macroblock {
    pub fn intra(luma: u8, blue: u8, red: u8) -> Self {
        Macroblock::new(MacroblockKind::Intra {
            luma,
            blue,
            red,
            ac: Vec::new(),
        })
    }

    pub fn intra_with_ac(luma: u8, blue: u8, red: u8, ac: &[(u8, i16)]) -> Self {
        Macroblock::new(MacroblockKind::Intra {
            luma,
            blue,
            red,
            ac: ac.to_vec(),
        })
    }

    pub fn forward(h: i32, v: i32) -> Self {
        Macroblock::new(MacroblockKind::Forward { h, v })
    }

    pub fn forward_with_residual(h: i32, v: i32, level: i16) -> Self {
        Macroblock::new(MacroblockKind::ForwardResidual { h, v, level })
    }

    pub fn after_skipping(mut self, count: u32) -> Self {
        self.skipped_before = count;
        self
    }

    pub fn with_quantizer(mut self, quantizer_scale: u8) -> Self {
        self.quantizer_scale = Some(quantizer_scale);
        self
    }

    fn new(kind: MacroblockKind) -> Self {
        Macroblock {
            skipped_before: 0,
            quantizer_scale: None,
            kind,
        }
    }
}

/// Writes an MPEG-1 video elementary stream header by header.
pub struct StreamBuilder {
    writer: BitWriter,
    picture_type: PictureType,
    r_size: u32,
    picture_rate: u8,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        StreamBuilder::new()
    }
}

impl StreamBuilder {
    pub fn new() -> Self {
        StreamBuilder {
            writer: BitWriter::new(),
            picture_type: PictureType::Intra,
            r_size: 0,
            picture_rate: 3,
        }
    }

    /// Picture rate code for following sequence headers (3 is 25 pictures/s).
    pub fn picture_rate(&mut self, code: u8) -> &mut Self {
        self.picture_rate = code;
        self
    }

    pub fn sequence_header(&mut self, width: u16, height: u16) -> &mut Self {
        self.sequence_header_with_matrices(width, height, None, None)
    }

    /// Matrices are given in raster order and written zig-zag scanned.
    pub fn sequence_header_with_matrices(
        &mut self,
        width: u16,
        height: u16,
        intra: Option<&[u8; 64]>,
        non_intra: Option<&[u8; 64]>,
    ) -> &mut Self {
        let w = &mut self.writer;
        w.start_code(0xB3);
        w.put_bits(width as u32, 12);
        w.put_bits(height as u32, 12);
        w.put_bits(1, 4); // square pels
        w.put_bits(self.picture_rate as u32, 4);
        w.put_bits(3750, 18); // 1.5 Mbit/s in 400 bit/s units
        w.put_bit(true);
        w.put_bits(20, 10);
        w.put_bit(false);
        for matrix in [intra, non_intra].iter() {
            match matrix {
                Some(matrix) => {
                    w.put_bit(true);
                    for &position in ZIG_ZAG.iter() {
                        w.put_bits(matrix[position] as u32, 8);
                    }
                }
                None => w.put_bit(false),
            }
        }
        self
    }

    pub fn gop(&mut self, timecode: &Timecode, closed: bool, broken_link: bool) -> &mut Self {
        let w = &mut self.writer;
        w.start_code(0xB8);
        w.put_bit(timecode.drop_frame);
        w.put_bits(timecode.hours as u32, 5);
        w.put_bits(timecode.minutes as u32, 6);
        w.put_bit(true);
        w.put_bits(timecode.seconds as u32, 6);
        w.put_bits(timecode.pictures as u32, 6);
        w.put_bit(closed);
        w.put_bit(broken_link);
        self
    }

    /// Picture header with full-pel off and an f_code of 1 for any motion fields.
    pub fn picture(&mut self, temporal_reference: u16, picture_type: PictureType) -> &mut Self {
        self.picture_with_motion(temporal_reference, picture_type, false, 1)
    }

    pub fn picture_with_motion(
        &mut self,
        temporal_reference: u16,
        picture_type: PictureType,
        full_pel: bool,
        f_code: u8,
    ) -> &mut Self {
        self.picture_type = picture_type;
        self.r_size = (f_code.max(1) - 1) as u32;

        let w = &mut self.writer;
        w.start_code(0x00);
        w.put_bits(temporal_reference as u32, 10);
        w.put_bits(picture_type as u32, 3);
        w.put_bits(0xFFFF, 16);
        if picture_type == PictureType::Predictive || picture_type == PictureType::Bidirectional {
            w.put_bit(full_pel);
            w.put_bits(f_code as u32, 3);
        }
        if picture_type == PictureType::Bidirectional {
            w.put_bit(false);
            w.put_bits(1, 3);
        }
        w.put_bit(false); // no extra information
        self
    }

    /// Writes one slice starting at macroblock row `row - 1`.
    pub fn slice(
        &mut self,
        row: u8,
        quantizer_scale: u8,
        macroblocks: &[Macroblock],
    ) -> Result<&mut Self> {
        self.writer.start_code(row);
        self.writer.put_bits(quantizer_scale as u32, 5);
        self.writer.put_bit(false);

        let type_table = match self.picture_type {
            PictureType::Intra => &MACROBLOCK_TYPE_INTRA,
            _ => &MACROBLOCK_TYPE_PREDICTIVE,
        };
        let mut predictors = [128i32; 3];

        for (i, macroblock) in macroblocks.iter().enumerate() {
            let mut increment = macroblock.skipped_before + 1;
            if i > 0 && increment > 1 {
                predictors = [128; 3];
            }
            while increment > 33 {
                self.writer.put_vlc(&MACROBLOCK_ADDRESS_INCREMENT, 35)?;
                increment -= 33;
            }
            self.writer.put_vlc(&MACROBLOCK_ADDRESS_INCREMENT, increment as i16)?;

            let quant = if macroblock.quantizer_scale.is_some() {
                MB_QUANT
            } else {
                0
            };
            let put_quantizer = |writer: &mut BitWriter| {
                if let Some(scale) = macroblock.quantizer_scale {
                    writer.put_bits(scale as u32, 5);
                }
            };

            match &macroblock.kind {
                MacroblockKind::Intra {
                    luma,
                    blue,
                    red,
                    ac,
                } => {
                    self.writer.put_vlc(type_table, MB_INTRA | quant)?;
                    put_quantizer(&mut self.writer);
                    for block in 0..6 {
                        let (target, slot, table) = match block {
                            0..=3 => (*luma, 0, &DCT_DC_SIZE_LUMINANCE),
                            4 => (*blue, 1, &DCT_DC_SIZE_CHROMINANCE),
                            _ => (*red, 2, &DCT_DC_SIZE_CHROMINANCE),
                        };
                        let differential = target as i32 - predictors[slot];
                        predictors[slot] = target as i32;
                        self.put_dc(table, differential)?;
                        if block == 0 {
                            for &(run, level) in ac.iter() {
                                self.put_coefficient(run, level, false)?;
                            }
                        }
                        self.writer.put_bits(0b10, 2);
                    }
                }
                MacroblockKind::Forward { h, v } => {
                    predictors = [128; 3];
                    self.writer.put_vlc(type_table, MB_MOTION_FORWARD | quant)?;
                    put_quantizer(&mut self.writer);
                    self.put_motion(*h)?;
                    self.put_motion(*v)?;
                }
                MacroblockKind::ForwardResidual { h, v, level } => {
                    predictors = [128; 3];
                    self.writer
                        .put_vlc(type_table, MB_MOTION_FORWARD | MB_PATTERN | quant)?;
                    put_quantizer(&mut self.writer);
                    self.put_motion(*h)?;
                    self.put_motion(*v)?;
                    self.writer.put_vlc(&CODE_BLOCK_PATTERN, 0b111100)?;
                    for _ in 0..4 {
                        self.put_coefficient(0, *level, true)?;
                        self.writer.put_bits(0b10, 2);
                    }
                }
            }
        }
        Ok(self)
    }

    pub fn user_data(&mut self, data: &[u8]) -> &mut Self {
        self.writer.start_code(0xB2);
        for &byte in data {
            self.writer.put_bits(byte as u32, 8);
        }
        self
    }

    pub fn sequence_end(&mut self) -> &mut Self {
        self.writer.start_code(0xB7);
        self
    }

    /// Appends an arbitrary start code, for streams that should not parse.
    pub fn start_code(&mut self, code: u8) -> &mut Self {
        self.writer.start_code(code);
        self
    }

    pub fn bits(&mut self, value: u32, n: u32) -> &mut Self {
        self.writer.put_bits(value, n);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.writer).into_bytes()
    }

    fn put_dc(&mut self, table: &VlcTable, differential: i32) -> Result<()> {
        let magnitude = differential.unsigned_abs();
        let size = 32 - magnitude.leading_zeros();
        if size > 8 {
            return Err(Error::InvalidVlc { table: table.name });
        }
        self.writer.put_vlc(table, size as i16)?;
        if size > 0 {
            let bits = if differential > 0 {
                differential
            } else {
                differential + (1 << size) - 1
            };
            self.writer.put_bits(bits as u32, size);
        }
        Ok(())
    }

    fn put_coefficient(&mut self, run: u8, level: i16, first: bool) -> Result<()> {
        let magnitude = level.unsigned_abs();
        if level == 0 || magnitude > 255 || run > 63 {
            return Err(Error::InvalidVlc {
                table: DCT_COEFF.name,
            });
        }
        let negative = level < 0;

        if run == 0 && magnitude == 1 {
            if first {
                self.writer.put_bits(0b1, 1);
            } else {
                self.writer.put_bits(0b11, 2);
            }
            self.writer.put_bit(negative);
            return Ok(());
        }

        let symbol = ((run as i16) << 8) | magnitude as i16;
        if self.writer.put_vlc(&DCT_COEFF, symbol).is_ok() {
            self.writer.put_bit(negative);
            return Ok(());
        }

        self.writer.put_bits(0b000001, 6);
        self.writer.put_bits(run as u32, 6);
        match level {
            -127..=127 => self.writer.put_bits(level as u8 as u32, 8),
            128..=255 => {
                self.writer.put_bits(0x00, 8);
                self.writer.put_bits(level as u32, 8);
            }
            _ => {
                self.writer.put_bits(0x80, 8);
                self.writer.put_bits((level + 256) as u32, 8);
            }
        }
        Ok(())
    }

    fn put_motion(&mut self, delta: i32) -> Result<()> {
        let invalid = Error::InvalidVlc { table: MOTION.name };
        if self.r_size == 0 || delta == 0 {
            if !(-16..=16).contains(&delta) {
                return Err(invalid);
            }
            return self.writer.put_vlc(&MOTION, delta as i16);
        }

        let magnitude = delta.abs();
        let code = ((magnitude - 1) >> self.r_size) + 1;
        if code > 16 {
            return Err(invalid);
        }
        let residual = (magnitude - 1) & ((1 << self.r_size) - 1);
        let signed = if delta < 0 { -code } else { code };
        self.writer.put_vlc(&MOTION, signed as i16)?;
        self.writer.put_bits(residual as u32, self.r_size);
        Ok(())
    }
}

/// How [`packetize`] frames an elementary stream into a PES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesOptions {
    pub stream_id: u8,
    pub pts: Option<i64>,
    /// Declare the PES length instead of leaving it unbounded.
    pub bounded: bool,
    /// Open a new PES. When unset the bytes continue the previous one.
    pub unit_start: bool,
}

impl PesOptions {
    pub fn video(pts: i64) -> Self {
        PesOptions {
            stream_id: 0xE0,
            pts: Some(pts),
            bounded: false,
            unit_start: true,
        }
    }

    pub fn audio(pts: i64) -> Self {
        PesOptions {
            stream_id: 0xC0,
            pts: Some(pts),
            bounded: true,
            unit_start: true,
        }
    }

    pub fn continuation() -> Self {
        PesOptions {
            stream_id: 0xE0,
            pts: None,
            bounded: false,
            unit_start: false,
        }
    }

    pub fn without_pts(mut self) -> Self {
        self.pts = None;
        self
    }
}

/// Wraps `es` in a PES (unless continuing one) and splits it into 188 byte
/// transport packets on `pid`. A short final packet is padded with adaptation
/// field stuffing.
pub fn packetize(pid: u16, es: &[u8], options: PesOptions) -> Vec<u8> {
    let mut payload = Vec::with_capacity(es.len() + 14);
    if options.unit_start {
        let header_data_length = if options.pts.is_some() { 5 } else { 0 };
        let length = if options.bounded {
            (3 + header_data_length + es.len()).min(u16::MAX as usize) as u16
        } else {
            0
        };
        payload.extend_from_slice(&[0x00, 0x00, 0x01, options.stream_id]);
        payload.extend_from_slice(&length.to_be_bytes());
        payload.push(0x80);
        payload.push(if options.pts.is_some() { 0x80 } else { 0x00 });
        payload.push(header_data_length as u8);
        if let Some(pts) = options.pts {
            payload.extend_from_slice(&encode_timestamp(PTS_MARKER, pts));
        }
    }
    payload.extend_from_slice(es);

    let mut stream = Vec::with_capacity((payload.len() / 184 + 1) * PACKET_SIZE);
    for (i, piece) in payload.chunks(PACKET_SIZE - 4).enumerate() {
        let mut header = [0u8; 4];
        {
            let bits = header.view_bits_mut::<Msb0>();
            bits[..8].store_be(SYNC_BYTE);
            bits.set(9, i == 0 && options.unit_start);
            bits[11..24].store_be(pid & 0x1FFF);
            bits.set(26, piece.len() < PACKET_SIZE - 4);
            bits.set(27, true);
            bits[28..32].store_be((i & 0xF) as u8);
        }
        stream.extend_from_slice(&header);

        if piece.len() < PACKET_SIZE - 4 {
            let stuffing = PACKET_SIZE - 5 - piece.len();
            stream.push(stuffing as u8);
            if stuffing > 0 {
                stream.push(0x00);
                stream.resize(stream.len() + stuffing - 1, 0xFF);
            }
        }
        stream.extend_from_slice(piece);
    }
    stream
}
