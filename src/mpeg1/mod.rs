//! MPEG-1 video (ISO/IEC 11172-2) decoding of I and P pictures.
//!
//! The decoder is driven one start code at a time by [`Mpeg1Decoder::step`].
//! Completed pictures are handed to a [`VideoSink`] when the next picture
//! starts, after which the reference and current buffers swap roles.

pub mod bits;
pub mod frame;
pub mod idct;
pub mod vlc;

use std::fmt;

use log::{debug, trace, warn};
use strum_macros::Display;

use self::bits::{BitReader, ByteSource};
use self::frame::{predict_block, Frame, FrameBufferPair, Plane};
use self::idct::{idct, idct_dc};
use self::vlc::{
    CODE_BLOCK_PATTERN, DCT_DC_SIZE_CHROMINANCE, DCT_DC_SIZE_LUMINANCE,
    DEFAULT_INTRA_QUANT_MATRIX, DEFAULT_NON_INTRA_QUANT_MATRIX, MACROBLOCK_ADDRESS_INCREMENT,
    MACROBLOCK_TYPE_INTRA, MACROBLOCK_TYPE_PREDICTIVE, MOTION, PREMULTIPLIER_MATRIX, RunLevel,
    ZIG_ZAG,
};
use crate::error::{Error, Result};

// Macroblock type flags, as decoded from the macroblock_type tables.
pub const MB_QUANT: i16 = 0x10;
pub const MB_MOTION_FORWARD: i16 = 0x08;
pub const MB_MOTION_BACKWARD: i16 = 0x04;
pub const MB_PATTERN: i16 = 0x02;
pub const MB_INTRA: i16 = 0x01;

const MB_STUFFING: i16 = 34;
const MB_ESCAPE: i16 = 35;

const DC_PREDICTOR_RESET: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StartCode {
    Picture,
    /// Slice start; the value is the 1-based macroblock row.
    Slice(u8),
    UserData,
    Sequence,
    Extension,
    SequenceEnd,
    Gop,
    Reserved(u8),
}

impl From<u8> for StartCode {
    fn from(marker: u8) -> Self {
        match marker {
            0x00 => StartCode::Picture,
            0x01..=0xAF => StartCode::Slice(marker),
            0xB2 => StartCode::UserData,
            0xB3 => StartCode::Sequence,
            0xB5 => StartCode::Extension,
            0xB7 => StartCode::SequenceEnd,
            0xB8 => StartCode::Gop,
            _ => StartCode::Reserved(marker),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PictureType {
    Intra = 1,
    Predictive = 2,
    Bidirectional = 3,
    DcIntra = 4,
}

impl PictureType {
    pub fn from_code(code: u8) -> Option<PictureType> {
        match code {
            1 => Some(PictureType::Intra),
            2 => Some(PictureType::Predictive),
            3 => Some(PictureType::Bidirectional),
            4 => Some(PictureType::DcIntra),
            _ => None,
        }
    }

    /// Whether pictures of this type are reconstructed rather than skipped.
    pub fn is_supported(self) -> bool {
        matches!(self, PictureType::Intra | PictureType::Predictive)
    }
}

/// How the display should treat a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PresentMode {
    /// Regular playback, shown at its presentation time.
    Normal,
    /// Shown at once, e.g. a poster or still.
    Immediate,
    SlideBack,
    SlideForward,
}

impl Default for PresentMode {
    fn default() -> Self {
        PresentMode::Normal
    }
}

/// Receives decoded pictures. The frame is only borrowed for the duration of
/// the call, so implementations must finish with it (or copy it) before returning.
pub trait VideoSink {
    fn push_video(&mut self, frame: &Frame, buffer_index: usize, pts: Option<i64>, mode: PresentMode);
}

impl<F> VideoSink for F
where
    F: FnMut(&Frame, usize, Option<i64>, PresentMode),
{
    fn push_video(&mut self, frame: &Frame, buffer_index: usize, pts: Option<i64>, mode: PresentMode) {
        self(frame, buffer_index, pts, mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub width: u16,
    pub height: u16,
    pub aspect_ratio: u8,
    pub picture_rate: u8,
    /// In units of 400 bit/s.
    pub bit_rate: u32,
    pub mb_width: usize,
    pub mb_height: usize,
    pub custom_intra_matrix: bool,
    pub custom_non_intra_matrix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timecode {
    pub drop_frame: bool,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub pictures: u8,
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, separator, self.pictures
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopHeader {
    pub timecode: Timecode,
    pub closed: bool,
    pub broken_link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    pub picture_type: PictureType,
    pub full_pel_forward: bool,
    pub forward_f_code: u8,
}

/// Adds a coded motion delta to `predictor` and wraps the result into the
/// range allowed by `r_size`.
pub fn reconstruct_motion(predictor: i32, code: i32, residual: i32, r_size: u32) -> i32 {
    let scale = 1 << r_size;
    let delta = if code != 0 && scale != 1 {
        let magnitude = ((code.abs() - 1) << r_size) + residual + 1;
        if code < 0 {
            -magnitude
        } else {
            magnitude
        }
    } else {
        code
    };

    let mut value = predictor + delta;
    if value > (scale << 4) - 1 {
        value -= scale << 5;
    } else if value < -(scale << 4) {
        value += scale << 5;
    }
    value
}

/// Inverse quantisation of one coefficient level, before premultiplication.
/// The result is forced odd (towards zero) and clamped to 12 bits.
pub fn dequantize(level: i32, intra: bool, quantizer_scale: i32, weight: u8) -> i32 {
    let mut value = level << 1;
    if !intra {
        value += level.signum();
    }
    value = value * quantizer_scale * weight as i32 / 16;
    if value & 1 == 0 {
        value -= value.signum();
    }
    value.clamp(-2048, 2047)
}

pub struct Mpeg1Decoder<S> {
    bits: BitReader<S>,
    frames: FrameBufferPair,

    sequence: Option<SequenceHeader>,
    gop: Option<GopHeader>,
    picture: Option<PictureHeader>,
    intra_quant_matrix: [u8; 64],
    non_intra_quant_matrix: [u8; 64],

    // Set between an unsupported or broken picture and the next picture start.
    skip_slices: bool,
    // The current buffer holds a picture that has not been flushed yet.
    pending: bool,
    pending_pts: Option<i64>,
    last_pts: Option<i64>,

    forward_r_size: u32,
    full_pel_forward: bool,
    quantizer_scale: i32,
    // luma, Cb, Cr
    dc_predictor: [i32; 3],
    motion_h: i32,
    motion_v: i32,
    block: [i32; 64],

    pictures: u64,
    presented: u64,
    errors: u64,
}

impl<S: ByteSource> Mpeg1Decoder<S> {
    pub fn new(source: S, frames: FrameBufferPair) -> Self {
        Mpeg1Decoder {
            bits: BitReader::new(source),
            frames,
            sequence: None,
            gop: None,
            picture: None,
            intra_quant_matrix: DEFAULT_INTRA_QUANT_MATRIX,
            non_intra_quant_matrix: DEFAULT_NON_INTRA_QUANT_MATRIX,
            skip_slices: true,
            pending: false,
            pending_pts: None,
            last_pts: None,
            forward_r_size: 0,
            full_pel_forward: false,
            quantizer_scale: 0,
            dc_predictor: [DC_PREDICTOR_RESET; 3],
            motion_h: 0,
            motion_v: 0,
            block: [0; 64],
            pictures: 0,
            presented: 0,
            errors: 0,
        }
    }

    pub fn frames(&self) -> &FrameBufferPair {
        &self.frames
    }

    pub fn source(&self) -> &S {
        self.bits.source()
    }

    pub fn source_mut(&mut self) -> &mut S {
        self.bits.source_mut()
    }

    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.sequence.as_ref()
    }

    pub fn gop_header(&self) -> Option<&GopHeader> {
        self.gop.as_ref()
    }

    pub fn picture_header(&self) -> Option<&PictureHeader> {
        self.picture.as_ref()
    }

    /// Intra and non-intra quantiser matrices, in raster order.
    pub fn quant_matrices(&self) -> (&[u8; 64], &[u8; 64]) {
        (&self.intra_quant_matrix, &self.non_intra_quant_matrix)
    }

    /// Presentation time of the last picture pushed in normal playback.
    pub fn last_pts(&self) -> Option<i64> {
        self.last_pts
    }

    /// I and P pictures started since creation.
    pub fn pictures_decoded(&self) -> u64 {
        self.pictures
    }

    pub fn pictures_presented(&self) -> u64 {
        self.presented
    }

    /// Recovered parse errors since creation.
    pub fn error_count(&self) -> u64 {
        self.errors
    }

    pub fn has_pending_picture(&self) -> bool {
        self.pending
    }

    /// Forgets all stream state, as if freshly created around the same frame buffers.
    pub fn reset(&mut self) {
        self.bits.reset();
        self.sequence = None;
        self.gop = None;
        self.picture = None;
        self.intra_quant_matrix = DEFAULT_INTRA_QUANT_MATRIX;
        self.non_intra_quant_matrix = DEFAULT_NON_INTRA_QUANT_MATRIX;
        self.skip_slices = true;
        self.pending = false;
        self.pending_pts = None;
        self.last_pts = None;
        self.reset_predictors();
        self.block = [0; 64];
    }

    /// Decodes up to and including the next start code's payload and returns it.
    pub fn step(&mut self, sink: &mut dyn VideoSink) -> StartCode {
        self.bits.next_start_code();
        let code = StartCode::from(self.bits.get_bits(8) as u8);
        if let Err(err) = self.dispatch(code, sink) {
            self.errors += 1;
            warn!("{}, skipping to next picture", err);
            self.skip_slices = true;
            self.block = [0; 64];
        }
        code
    }

    /// Steps until a sequence end, which an exhausted source always produces.
    pub fn decode_until_end(&mut self, sink: &mut dyn VideoSink) {
        while self.step(sink) != StartCode::SequenceEnd {}
    }

    /// Pushes the picture in the current buffer and swaps buffers. In normal
    /// mode a picture without a known presentation time is dropped. Any other
    /// mode always pushes, re-sending the last completed picture when nothing
    /// is pending.
    pub fn flush_picture(&mut self, mode: PresentMode, sink: &mut dyn VideoSink) {
        if self.pending {
            self.pending = false;
            let pts = self.pending_pts;
            if pts.is_some() || mode != PresentMode::Normal {
                sink.push_video(self.frames.current(), self.frames.current_index(), pts, mode);
                self.presented += 1;
                if mode == PresentMode::Normal {
                    self.last_pts = pts;
                }
            } else {
                trace!("dropping picture without timestamp");
            }
            self.frames.flip();
        } else if mode != PresentMode::Normal && self.pictures > 0 {
            let index = self.frames.current_index() ^ 1;
            sink.push_video(self.frames.reference(), index, self.last_pts, mode);
            self.presented += 1;
        }
    }

    fn dispatch(&mut self, code: StartCode, sink: &mut dyn VideoSink) -> Result<()> {
        match code {
            StartCode::Sequence => self.decode_sequence_header(),
            StartCode::Gop => self.decode_gop_header(),
            StartCode::Picture => {
                self.flush_picture(PresentMode::Normal, sink);
                self.skip_slices = true;
                self.decode_picture_header()
            }
            StartCode::Slice(row) if !self.skip_slices => self.decode_slice(row),
            StartCode::Slice(_) => Ok(()),
            StartCode::SequenceEnd => {
                debug!("sequence end");
                self.flush_picture(PresentMode::Normal, sink);
                Ok(())
            }
            StartCode::UserData | StartCode::Extension => Ok(()),
            StartCode::Reserved(marker) => Err(Error::InvalidStartCode(marker)),
        }
    }

    fn read_matrix(&mut self, matrix: &mut [u8; 64]) {
        for &position in ZIG_ZAG.iter() {
            matrix[position] = self.bits.get_bits(8) as u8;
        }
    }

    fn decode_sequence_header(&mut self) -> Result<()> {
        let width = self.bits.get_bits(12) as u16;
        let height = self.bits.get_bits(12) as u16;
        let aspect_ratio = self.bits.get_bits(4) as u8;
        let picture_rate = self.bits.get_bits(4) as u8;
        let bit_rate = self.bits.get_bits(18);
        // marker, vbv_buffer_size, constrained_parameters_flag
        self.bits.skip_bits(12);

        let custom_intra_matrix = self.bits.get_bit();
        if custom_intra_matrix {
            let mut matrix = [0; 64];
            self.read_matrix(&mut matrix);
            self.intra_quant_matrix = matrix;
        } else {
            self.intra_quant_matrix = DEFAULT_INTRA_QUANT_MATRIX;
        }
        let custom_non_intra_matrix = self.bits.get_bit();
        if custom_non_intra_matrix {
            let mut matrix = [0; 64];
            self.read_matrix(&mut matrix);
            self.non_intra_quant_matrix = matrix;
        } else {
            self.non_intra_quant_matrix = DEFAULT_NON_INTRA_QUANT_MATRIX;
        }

        if width == 0 || height == 0 {
            self.sequence = None;
            return Err(Error::InvalidPictureHeader("zero sized sequence"));
        }

        let header = SequenceHeader {
            width,
            height,
            aspect_ratio,
            picture_rate,
            bit_rate,
            mb_width: (width as usize + 15) >> 4,
            mb_height: (height as usize + 15) >> 4,
            custom_intra_matrix,
            custom_non_intra_matrix,
        };
        if self.sequence != Some(header) {
            debug!(
                "sequence {}x{} rate code {} at {} bit/s",
                width,
                height,
                picture_rate,
                bit_rate * 400
            );
            if header.mb_width * 16 > self.frames.width()
                || header.mb_height * 16 > self.frames.height()
            {
                warn!(
                    "sequence {}x{} exceeds {}x{} frame buffers",
                    width,
                    height,
                    self.frames.width(),
                    self.frames.height()
                );
            }
        }
        self.sequence = Some(header);
        Ok(())
    }

    fn decode_gop_header(&mut self) -> Result<()> {
        // drop flag, then 24 bits of h:m:marker:s:pictures
        let drop_frame = self.bits.get_bit();
        let t = self.bits.get_bits(24);
        // 30 pictures/s is exact and never drops frames
        let exact_rate = self.sequence.map_or(false, |s| s.picture_rate == 4);
        let header = GopHeader {
            timecode: Timecode {
                drop_frame: drop_frame && !exact_rate,
                hours: ((t >> 19) & 0x1F) as u8,
                minutes: ((t >> 13) & 0x3F) as u8,
                seconds: ((t >> 6) & 0x3F) as u8,
                pictures: (t & 0x3F) as u8,
            },
            closed: self.bits.get_bit(),
            broken_link: self.bits.get_bit(),
        };
        debug!(
            "gop {} closed {} broken {}",
            header.timecode, header.closed, header.broken_link
        );
        self.gop = Some(header);
        Ok(())
    }

    fn decode_picture_header(&mut self) -> Result<()> {
        self.picture = None;
        let temporal_reference = self.bits.get_bits(10) as u16;
        let picture_type = PictureType::from_code(self.bits.get_bits(3) as u8)
            .ok_or(Error::InvalidPictureHeader("picture_coding_type"))?;
        let mut header = PictureHeader {
            temporal_reference,
            picture_type,
            full_pel_forward: false,
            forward_f_code: 0,
        };

        if !picture_type.is_supported() {
            debug!("skipping {} picture {}", picture_type, temporal_reference);
            self.picture = Some(header);
            return Ok(());
        }
        if self.sequence.is_none() {
            debug!("picture {} before any sequence header", temporal_reference);
            return Ok(());
        }

        // vbv_delay
        self.bits.skip_bits(16);
        if picture_type == PictureType::Predictive {
            header.full_pel_forward = self.bits.get_bit();
            header.forward_f_code = self.bits.get_bits(3) as u8;
            if header.forward_f_code == 0 {
                return Err(Error::InvalidPictureHeader("forward_f_code of zero"));
            }
            self.full_pel_forward = header.full_pel_forward;
            self.forward_r_size = header.forward_f_code as u32 - 1;
        }

        trace!("{} picture {}", picture_type, temporal_reference);
        self.picture = Some(header);
        self.skip_slices = false;
        self.pending = true;
        self.pending_pts = self.bits.source().pts();
        self.pictures += 1;
        Ok(())
    }

    fn reset_predictors(&mut self) {
        self.dc_predictor = [DC_PREDICTOR_RESET; 3];
        self.motion_h = 0;
        self.motion_v = 0;
    }

    /// Macroblock column and row of `address`, checked against the sequence and
    /// the frame buffers.
    fn locate(&self, address: i32, mb_width: usize, mb_height: usize) -> Result<(usize, usize)> {
        let limit = (mb_width * mb_height) as i32;
        if address < 0 || address >= limit {
            return Err(Error::MacroblockOverrun { address, limit });
        }
        let (x, y) = (address as usize % mb_width, address as usize / mb_width);
        if (x + 1) * 16 > self.frames.width() || (y + 1) * 16 > self.frames.height() {
            let capacity = (self.frames.width() / 16) * (self.frames.height() / 16);
            return Err(Error::MacroblockOverrun {
                address,
                limit: capacity as i32,
            });
        }
        Ok((x, y))
    }

    fn slice_done(&mut self) -> bool {
        self.bits.peek_bits(23) == 0
    }

    fn decode_slice(&mut self, row: u8) -> Result<()> {
        let (mb_width, mb_height) = match &self.sequence {
            Some(sequence) => (sequence.mb_width, sequence.mb_height),
            None => return Ok(()),
        };
        let picture_type = match &self.picture {
            Some(picture) => picture.picture_type,
            None => return Ok(()),
        };
        let mut address = (row as i32 - 1) * mb_width as i32 - 1;
        if row as usize > mb_height {
            return Err(Error::MacroblockOverrun {
                address: address + 1,
                limit: (mb_width * mb_height) as i32,
            });
        }

        self.reset_predictors();
        self.quantizer_scale = self.bits.get_bits(5) as i32;
        while self.bits.get_bit() {
            self.bits.skip_bits(8);
        }
        trace!("slice {} quantizer {}", row, self.quantizer_scale);

        let type_table = match picture_type {
            PictureType::Intra => &MACROBLOCK_TYPE_INTRA,
            _ => &MACROBLOCK_TYPE_PREDICTIVE,
        };

        let mut first = true;
        while !self.slice_done() {
            let mut increment = 0;
            let mut code = self.bits.get_vlc(&MACROBLOCK_ADDRESS_INCREMENT)?;
            while code == MB_STUFFING {
                code = self.bits.get_vlc(&MACROBLOCK_ADDRESS_INCREMENT)?;
            }
            while code == MB_ESCAPE {
                increment += 33;
                code = self.bits.get_vlc(&MACROBLOCK_ADDRESS_INCREMENT)?;
            }
            increment += code as i32;

            if first {
                // relative to the end of the previous row, nothing to copy
                first = false;
                address += increment;
            } else {
                if increment > 1 {
                    self.reset_predictors();
                }
                while increment > 1 {
                    address += 1;
                    let (x, y) = self.locate(address, mb_width, mb_height)?;
                    self.predict_macroblock(x, y, 0, 0);
                    increment -= 1;
                }
                address += 1;
            }
            let (mb_x, mb_y) = self.locate(address, mb_width, mb_height)?;

            let macroblock_type = self.bits.get_vlc(type_table)?;
            let intra = macroblock_type & MB_INTRA != 0;
            if macroblock_type & MB_QUANT != 0 {
                self.quantizer_scale = self.bits.get_bits(5) as i32;
            }

            if intra {
                self.motion_h = 0;
                self.motion_v = 0;
            } else {
                self.dc_predictor = [DC_PREDICTOR_RESET; 3];
                if macroblock_type & MB_MOTION_FORWARD != 0 {
                    self.motion_h = self.decode_motion_vector(self.motion_h)?;
                    self.motion_v = self.decode_motion_vector(self.motion_v)?;
                } else {
                    self.motion_h = 0;
                    self.motion_v = 0;
                }
                let (mut h, mut v) = (self.motion_h, self.motion_v);
                if self.full_pel_forward {
                    h <<= 1;
                    v <<= 1;
                }
                self.predict_macroblock(mb_x, mb_y, h, v);
            }

            let coded_block_pattern = if macroblock_type & MB_PATTERN != 0 {
                self.bits.get_vlc(&CODE_BLOCK_PATTERN)?
            } else if intra {
                0b11_1111
            } else {
                0
            };
            for index in 0..6 {
                if coded_block_pattern & (0b10_0000 >> index) != 0 {
                    self.decode_block(index, intra, mb_x, mb_y)?;
                }
            }
        }
        Ok(())
    }

    fn decode_motion_vector(&mut self, predictor: i32) -> Result<i32> {
        let r_size = self.forward_r_size;
        let code = self.bits.get_vlc(&MOTION)? as i32;
        let residual = if code != 0 && r_size != 0 {
            self.bits.get_bits(r_size) as i32
        } else {
            0
        };
        Ok(reconstruct_motion(predictor, code, residual, r_size))
    }

    /// Motion compensated copy from the reference picture. Vectors are in half
    /// luma samples; chroma uses half of them, truncated.
    fn predict_macroblock(&mut self, mb_x: usize, mb_y: usize, h: i32, v: i32) {
        let (reference, current) = self.frames.split();
        predict_block(reference, current, Plane::Luma, mb_x * 16, mb_y * 16, 16, h, v);
        for &plane in [Plane::ChromaBlue, Plane::ChromaRed].iter() {
            predict_block(reference, current, plane, mb_x * 8, mb_y * 8, 8, h / 2, v / 2);
        }
    }

    fn decode_block(&mut self, index: usize, intra: bool, mb_x: usize, mb_y: usize) -> Result<()> {
        let mut n = 0;

        if intra {
            let (slot, table) = match index {
                0..=3 => (0, &DCT_DC_SIZE_LUMINANCE),
                4 => (1, &DCT_DC_SIZE_CHROMINANCE),
                _ => (2, &DCT_DC_SIZE_CHROMINANCE),
            };
            let size = self.bits.get_vlc(table)? as u32;
            if size > 0 {
                let differential = self.bits.get_bits(size) as i32;
                self.dc_predictor[slot] += if differential & (1 << (size - 1)) != 0 {
                    differential
                } else {
                    (-1 << size) | (differential + 1)
                };
            }
            self.block[0] = self.dc_predictor[slot] << 8;
            n = 1;
        }

        let matrix = if intra {
            &self.intra_quant_matrix
        } else {
            &self.non_intra_quant_matrix
        };
        loop {
            let coefficient = self.bits.get_vlc_dct()?;
            // a leading 1 after the first coefficient is "10" end of block or "11s"
            if coefficient == RunLevel::new(0, 1) && n > 0 && !self.bits.get_bit() {
                break;
            }

            let mut level;
            if coefficient.is_escape() {
                level = self.bits.get_bits(8) as i32;
                if level == 0 {
                    level = self.bits.get_bits(8) as i32;
                } else if level == 128 {
                    level = self.bits.get_bits(8) as i32 - 256;
                } else if level > 128 {
                    level -= 256;
                }
            } else {
                level = coefficient.level as i32;
                if self.bits.get_bit() {
                    level = -level;
                }
            }

            n += coefficient.run as usize;
            if n >= 64 {
                return Err(Error::CoefficientOverrun);
            }
            let position = ZIG_ZAG[n];
            n += 1;

            let value = dequantize(level, intra, self.quantizer_scale, matrix[position]);
            self.block[position] = value * PREMULTIPLIER_MATRIX[position] as i32;
        }

        let (plane, x, y) = match index {
            0..=3 => (
                Plane::Luma,
                mb_x * 16 + (index & 1) * 8,
                mb_y * 16 + (index >> 1) * 8,
            ),
            4 => (Plane::ChromaBlue, mb_x * 8, mb_y * 8),
            _ => (Plane::ChromaRed, mb_x * 8, mb_y * 8),
        };
        let frame = self.frames.current_mut();
        if n == 1 {
            let value = idct_dc(self.block[0]);
            self.block[0] = 0;
            if intra {
                frame.store_flat(plane, x, y, value);
            } else {
                frame.add_flat(plane, x, y, value);
            }
        } else {
            idct(&mut self.block);
            if intra {
                frame.store_block(plane, x, y, &self.block);
            } else {
                frame.add_block(plane, x, y, &self.block);
            }
            self.block = [0; 64];
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::bits::MemorySource;
    use super::*;
    use crate::config::DecoderConfig;
    use crate::queue::MemoryFeed;
    use crate::synth::{packetize, Macroblock, PesOptions, StreamBuilder};
    use crate::ts::{DemuxSource, DiscardAudio};

    struct Presented {
        frame: Frame,
        buffer_index: usize,
        pts: Option<i64>,
        mode: PresentMode,
    }

    #[derive(Default)]
    struct CollectFrames {
        frames: Vec<Presented>,
    }

    impl VideoSink for CollectFrames {
        fn push_video(&mut self, frame: &Frame, buffer_index: usize, pts: Option<i64>, mode: PresentMode) {
            self.frames.push(Presented {
                frame: frame.clone(),
                buffer_index,
                pts,
                mode,
            });
        }
    }

    fn memory_decoder(es: Vec<u8>, width: usize, height: usize) -> Mpeg1Decoder<MemorySource> {
        let source = MemorySource::new(es).with_pts(3600);
        Mpeg1Decoder::new(source, FrameBufferPair::new(width, height).unwrap())
    }

    fn plane_is(frame: &Frame, plane: Plane, value: u8) -> bool {
        let (_, height) = frame.plane_size(plane);
        (0..height).all(|y| frame.row(plane, y).iter().all(|&s| s == value))
    }

    fn macroblock_luma(frame: &Frame, mb_x: usize, mb_y: usize) -> Vec<u8> {
        (0..16)
            .flat_map(|y| frame.luma_row(mb_y * 16 + y)[mb_x * 16..mb_x * 16 + 16].to_vec())
            .collect()
    }

    #[test]
    fn start_code_classes() {
        assert_eq!(StartCode::from(0x00), StartCode::Picture);
        assert_eq!(StartCode::from(0x01), StartCode::Slice(1));
        assert_eq!(StartCode::from(0xAF), StartCode::Slice(0xAF));
        assert_eq!(StartCode::from(0xB3), StartCode::Sequence);
        assert_eq!(StartCode::from(0xB7), StartCode::SequenceEnd);
        assert_eq!(StartCode::from(0xB8), StartCode::Gop);
        assert_eq!(StartCode::from(0xB0), StartCode::Reserved(0xB0));
        assert_eq!(StartCode::from(0xE0), StartCode::Reserved(0xE0));
    }

    #[test]
    fn flat_intra_picture_through_transport_stream() {
        let config = DecoderConfig::default();
        let (mb_width, mb_height) = (config.frame_width / 16, config.frame_height / 16);
        let row = vec![Macroblock::intra(90, 60, 200); mb_width];

        let mut builder = StreamBuilder::new();
        builder
            .sequence_header(config.frame_width as u16, config.frame_height as u16)
            .gop(&Timecode::default(), true, false)
            .picture(0, PictureType::Intra);
        for slice in 1..=mb_height {
            builder.slice(slice as u8, 8, &row).unwrap();
        }
        let es = builder.sequence_end().finish();
        let ts = packetize(config.video_pid, &es, PesOptions::video(9000));

        let source = DemuxSource::new(
            MemoryFeed::new(ts, config.chunk_size()),
            DiscardAudio,
            &config,
        );
        let frames = FrameBufferPair::new(config.frame_width, config.frame_height).unwrap();
        let mut decoder = Mpeg1Decoder::new(source, frames);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);

        assert_eq!(decoder.error_count(), 0);
        assert_eq!(sink.frames.len(), 1);
        let presented = &sink.frames[0];
        assert_eq!(presented.pts, Some(9000));
        assert_eq!(presented.mode, PresentMode::Normal);
        assert_eq!(presented.buffer_index, 1);
        assert!(plane_is(&presented.frame, Plane::Luma, 90));
        assert!(plane_is(&presented.frame, Plane::ChromaBlue, 60));
        assert!(plane_is(&presented.frame, Plane::ChromaRed, 200));
        assert_eq!(decoder.last_pts(), Some(9000));
        assert_eq!(decoder.source().video_pes_count(), 1);
    }

    #[test]
    fn pictures_without_timestamp_are_not_presented() {
        let es = StreamBuilder::new()
            .sequence_header(16, 16)
            .picture(0, PictureType::Intra)
            .slice(1, 4, &[Macroblock::intra(10, 20, 30)])
            .unwrap()
            .sequence_end()
            .finish();
        let source = MemorySource::new(es);
        let mut decoder = Mpeg1Decoder::new(source, FrameBufferPair::new(16, 16).unwrap());
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        assert!(sink.frames.is_empty());
        assert_eq!(decoder.pictures_decoded(), 1);

        // a forced flush still shows the last completed picture
        decoder.flush_picture(PresentMode::Immediate, &mut sink);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].mode, PresentMode::Immediate);
        assert!(plane_is(&sink.frames[0].frame, Plane::Luma, 10));
    }

    #[test]
    fn sequence_and_gop_headers() {
        let mut intra = [0u8; 64];
        for (i, weight) in intra.iter_mut().enumerate() {
            *weight = i as u8 + 1;
        }
        let timecode = Timecode {
            drop_frame: true,
            hours: 1,
            minutes: 59,
            seconds: 30,
            pictures: 24,
        };
        let es = StreamBuilder::new()
            .sequence_header_with_matrices(352, 190, Some(&intra), None)
            .gop(&timecode, false, true)
            .sequence_end()
            .finish();
        let mut decoder = memory_decoder(es, 352, 192);
        decoder.decode_until_end(&mut CollectFrames::default());

        let sequence = decoder.sequence_header().unwrap();
        assert_eq!((sequence.width, sequence.height), (352, 190));
        assert_eq!((sequence.mb_width, sequence.mb_height), (22, 12));
        assert_eq!(sequence.bit_rate, 3750);
        assert!(sequence.custom_intra_matrix && !sequence.custom_non_intra_matrix);
        assert_eq!(decoder.quant_matrices().0, &intra);
        assert_eq!(decoder.quant_matrices().1, &DEFAULT_NON_INTRA_QUANT_MATRIX);

        let gop = decoder.gop_header().unwrap();
        assert_eq!(gop.timecode, timecode);
        assert!(!gop.closed && gop.broken_link);
        assert_eq!(gop.timecode.to_string(), "01:59:30;24");
    }

    #[test]
    fn gop_timecode_keeps_the_stream_aligned() {
        let timecode = Timecode {
            drop_frame: true,
            hours: 1,
            minutes: 59,
            seconds: 30,
            pictures: 24,
        };
        let es = StreamBuilder::new()
            .picture_rate(4)
            .sequence_header(16, 16)
            .gop(&timecode, true, false)
            .picture(0, PictureType::Intra)
            .slice(1, 8, &[Macroblock::intra(70, 80, 90)])
            .unwrap()
            .sequence_end()
            .finish();
        let mut decoder = memory_decoder(es, 16, 16);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);

        assert_eq!(decoder.error_count(), 0);
        let gop = decoder.gop_header().unwrap();
        assert_eq!(
            gop.timecode,
            Timecode {
                drop_frame: false,
                ..timecode
            }
        );
        assert!(gop.closed && !gop.broken_link);
        assert_eq!(gop.timecode.to_string(), "01:59:30:24");
        assert_eq!(sink.frames.len(), 1);
        assert!(plane_is(&sink.frames[0].frame, Plane::Luma, 70));
    }

    #[test]
    fn motion_vectors_wrap_into_range() {
        // r_size 0 never reads a residual
        for predictor in -16..=15 {
            for code in -16..=16 {
                let value = reconstruct_motion(predictor, code, 0, 0);
                assert_eq!(value, reconstruct_motion(predictor, code, 1, 0));
                assert!((-16..=15).contains(&value));
                assert!(value == predictor + code || (value - predictor - code).abs() == 32);
            }
        }

        for r_size in 1..=6u32 {
            let scale = 1 << r_size;
            let (low, high) = (-(scale << 4), (scale << 4) - 1);
            for predictor in low..=high {
                for code in -16..=16i32 {
                    for residual in 0..scale {
                        let magnitude = ((code.abs() - 1) << r_size) + residual + 1;
                        let delta = if code == 0 { 0 } else { magnitude * code.signum() };
                        let raw = predictor + delta;
                        let value = reconstruct_motion(predictor, code, residual, r_size);
                        assert!(value >= low && value <= high, "r_size {} raw {}", r_size, raw);
                        if raw >= low && raw <= high {
                            assert_eq!(value, raw);
                        } else {
                            assert_eq!((raw - value).abs(), scale << 5);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn dequantisation_is_odd_and_clamped() {
        // (2 * 4 + 1) * 8 = 72, forced odd towards zero
        assert_eq!(dequantize(4, false, 8, 16), 71);
        assert_eq!(dequantize(-4, false, 8, 16), -71);
        assert_eq!(dequantize(1, true, 3, 8), 3);
        assert_eq!(dequantize(2, true, 4, 16), 15);
        assert_eq!(dequantize(255, true, 31, 83), 2047);
        assert_eq!(dequantize(-255, false, 31, 255), -2048);
        assert_eq!(dequantize(0, false, 31, 16), 0);
    }

    fn reference_picture(builder: &mut StreamBuilder) {
        builder
            .sequence_header(32, 32)
            .picture(0, PictureType::Intra)
            .slice(1, 8, &[Macroblock::intra(40, 50, 60), Macroblock::intra(80, 90, 100)])
            .unwrap()
            .slice(2, 8, &[Macroblock::intra(120, 130, 140), Macroblock::intra(160, 170, 180)])
            .unwrap();
    }

    #[test]
    fn skipped_macroblocks_copy_the_reference() {
        let mut builder = StreamBuilder::new();
        reference_picture(&mut builder);
        builder
            .picture_with_motion(1, PictureType::Predictive, false, 1)
            .slice(
                1,
                8,
                &[
                    Macroblock::intra(200, 128, 128),
                    Macroblock::forward(0, 0).after_skipping(2),
                ],
            )
            .unwrap();
        let es = builder.sequence_end().finish();

        let mut decoder = memory_decoder(es, 32, 32);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);

        assert_eq!(decoder.error_count(), 0);
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0].buffer_index, 1);
        assert_eq!(sink.frames[1].buffer_index, 0);
        let predicted = &sink.frames[1].frame;
        for &(x, y, expected) in [(0, 0, 200u8), (1, 0, 80), (0, 1, 120), (1, 1, 160)].iter() {
            assert!(
                macroblock_luma(predicted, x, y).iter().all(|&s| s == expected),
                "macroblock ({}, {})",
                x,
                y
            );
        }
        assert_eq!(predicted.chroma_blue_row(8)[8], 170);
    }

    #[test]
    fn forward_motion_and_residual() {
        let mut builder = StreamBuilder::new();
        reference_picture(&mut builder);
        builder
            .picture_with_motion(1, PictureType::Predictive, true, 1)
            .slice(1, 8, &[Macroblock::forward(0, 0), Macroblock::forward(-16, 0)])
            .unwrap()
            .slice(
                2,
                8,
                &[Macroblock::forward_with_residual(0, 0, 4), Macroblock::forward(0, -16)],
            )
            .unwrap();
        let es = builder.sequence_end().finish();

        let mut decoder = memory_decoder(es, 32, 32);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        assert_eq!(decoder.error_count(), 0);
        let predicted = &sink.frames[1].frame;

        assert!(macroblock_luma(predicted, 0, 0).iter().all(|&s| s == 40));
        // full pel vector of 16 samples to the left
        assert!(macroblock_luma(predicted, 1, 0).iter().all(|&s| s == 40));
        assert_eq!(predicted.chroma_blue_row(0)[8], 50);

        let residual = idct_dc(dequantize(4, false, 8, 16) * PREMULTIPLIER_MATRIX[0] as i32);
        assert_eq!(residual, 9);
        assert!(macroblock_luma(predicted, 0, 1).iter().all(|&s| s as i32 == 120 + residual));
        // chroma blocks were not coded
        assert_eq!(predicted.chroma_red_row(8)[0], 140);

        // full pel vector of 16 samples up
        assert!(macroblock_luma(predicted, 1, 1).iter().all(|&s| s == 80));
    }

    #[test]
    fn escape_coefficients_reconstruct() {
        let ac = [(0u8, 200i16), (2, -150), (5, 40), (0, -3), (20, 1)];
        let es = StreamBuilder::new()
            .sequence_header(16, 16)
            .picture(0, PictureType::Intra)
            .slice(1, 2, &[Macroblock::intra_with_ac(100, 128, 128, &ac)])
            .unwrap()
            .sequence_end()
            .finish();
        let mut decoder = memory_decoder(es, 16, 16);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        assert_eq!(decoder.error_count(), 0);

        let mut block = [0i32; 64];
        block[0] = 100 << 8;
        let mut n = 1;
        for &(run, level) in ac.iter() {
            n += run as usize;
            let position = ZIG_ZAG[n];
            n += 1;
            let value = dequantize(level as i32, true, 2, DEFAULT_INTRA_QUANT_MATRIX[position]);
            block[position] = value * PREMULTIPLIER_MATRIX[position] as i32;
        }
        idct(&mut block);

        let frame = &sink.frames[0].frame;
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(frame.luma_row(y)[x], frame::pin(block[y * 8 + x]), "({}, {})", x, y);
            }
        }
        // the other luma blocks stay flat
        assert!(frame.luma_row(12)[8..].iter().all(|&s| s == 100));
    }

    #[test]
    fn bidirectional_pictures_are_skipped() {
        let mut builder = StreamBuilder::new();
        reference_picture(&mut builder);
        builder
            .picture(1, PictureType::Bidirectional)
            .slice(1, 8, &[Macroblock::intra(0, 0, 0)])
            .unwrap();
        let es = builder.sequence_end().finish();

        let mut decoder = memory_decoder(es, 32, 32);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        assert_eq!(decoder.error_count(), 0);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(decoder.pictures_decoded(), 1);
        assert_eq!(
            decoder.picture_header().map(|p| p.picture_type),
            Some(PictureType::Bidirectional)
        );
    }

    #[test]
    fn invalid_code_recovers_at_next_picture() {
        let mut builder = StreamBuilder::new();
        builder
            .sequence_header(16, 16)
            .picture(0, PictureType::Intra)
            .start_code(1)
            .bits(8, 5)
            .bits(0, 1)
            // eight zeros then a one is not a macroblock address increment
            .bits(0x00, 8)
            .bits(0xFF, 8)
            .picture(1, PictureType::Intra)
            .slice(1, 8, &[Macroblock::intra(77, 128, 128)])
            .unwrap();
        let es = builder.sequence_end().finish();

        let mut decoder = memory_decoder(es, 16, 16);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        assert_eq!(decoder.error_count(), 1);
        assert_eq!(sink.frames.len(), 2);
        assert!(plane_is(&sink.frames[1].frame, Plane::Luma, 77));
    }

    #[test]
    fn macroblocks_outside_the_frame_are_rejected() {
        let es = StreamBuilder::new()
            .sequence_header(64, 16)
            .picture(0, PictureType::Intra)
            .slice(1, 8, &vec![Macroblock::intra(10, 10, 10); 4])
            .unwrap()
            .start_code(0xB0)
            .sequence_end()
            .finish();
        let mut decoder = memory_decoder(es, 32, 16);
        let mut sink = CollectFrames::default();
        decoder.decode_until_end(&mut sink);
        // the overrun and the reserved start code
        assert_eq!(decoder.error_count(), 2);
        assert_eq!(sink.frames.len(), 1);
        assert!(plane_is(&sink.frames[0].frame, Plane::Luma, 10));
    }

    #[test]
    fn reset_forgets_the_stream() {
        let mut builder = StreamBuilder::new();
        reference_picture(&mut builder);
        let es = builder.finish();
        let mut decoder = memory_decoder(es, 32, 32);
        let mut sink = CollectFrames::default();
        while decoder.step(&mut sink) != StartCode::Slice(2) {}
        assert!(decoder.has_pending_picture());

        decoder.reset();
        assert!(!decoder.has_pending_picture());
        assert!(decoder.sequence_header().is_none());
        assert_eq!(decoder.last_pts(), None);
        decoder.decode_until_end(&mut sink);
        assert!(sink.frames.is_empty());
    }
}
