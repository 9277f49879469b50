//! Planar 4:2:0 frame storage and the reconstruction primitives that write into it.
//!
//! A frame is kept as a list of horizontal slices, each covering 16 luma rows.
//! A slice row is `stride = width * 3 / 2` bytes: the luma samples followed by
//! half a row of chroma. The first 8 slice rows carry Cr in that chroma half,
//! the last 8 carry Cb.

use strum_macros::{Display, EnumIter};

use crate::error::{Error, Result};

pub const SLICE_HEIGHT: usize = 16;

/// Largest sample value written by reconstruction; the rest is left as
/// headroom for dithering on output.
pub const MAX_SAMPLE: i32 = 248;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Plane {
    Luma,
    ChromaBlue,
    ChromaRed,
}

#[inline]
pub fn pin(value: i32) -> u8 {
    value.clamp(0, MAX_SAMPLE) as u8
}

#[derive(Clone)]
pub struct Frame {
    width: usize,
    height: usize,
    stride: usize,
    slices: Vec<Box<[u8]>>,
}

impl Frame {
    /// Allocates a frame; both dimensions must be whole macroblocks.
    pub fn new(width: usize, height: usize) -> Result<Frame> {
        if width == 0 || height == 0 || width % 16 != 0 || height % 16 != 0 {
            return Err(Error::InvalidFrameSize { width, height });
        }
        let stride = width * 3 / 2;
        let bytes = stride * SLICE_HEIGHT;
        let count = height / SLICE_HEIGHT;

        let mut slices = Vec::new();
        slices
            .try_reserve_exact(count)
            .map_err(|_| Error::Allocation { bytes: count * bytes })?;
        for _ in 0..count {
            let mut slice = Vec::new();
            slice
                .try_reserve_exact(bytes)
                .map_err(|_| Error::Allocation { bytes })?;
            slice.resize(bytes, 0);
            slices.push(slice.into_boxed_slice());
        }

        Ok(Frame {
            width,
            height,
            stride,
            slices,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Raw slice storage, `height / 16` slices of `stride * 16` bytes.
    pub fn slices(&self) -> &[Box<[u8]>] {
        &self.slices
    }

    pub fn plane_size(&self, plane: Plane) -> (usize, usize) {
        match plane {
            Plane::Luma => (self.width, self.height),
            _ => (self.width / 2, self.height / 2),
        }
    }

    fn locate(&self, plane: Plane, y: usize) -> (usize, usize, usize) {
        match plane {
            Plane::Luma => (y / 16, (y % 16) * self.stride, self.width),
            Plane::ChromaRed => (y / 8, (y % 8) * self.stride + self.width, self.width / 2),
            Plane::ChromaBlue => (y / 8, (y % 8 + 8) * self.stride + self.width, self.width / 2),
        }
    }

    pub fn row(&self, plane: Plane, y: usize) -> &[u8] {
        let (slice, offset, len) = self.locate(plane, y);
        &self.slices[slice][offset..offset + len]
    }

    pub fn row_mut(&mut self, plane: Plane, y: usize) -> &mut [u8] {
        let (slice, offset, len) = self.locate(plane, y);
        &mut self.slices[slice][offset..offset + len]
    }

    pub fn luma_row(&self, y: usize) -> &[u8] {
        self.row(Plane::Luma, y)
    }

    pub fn chroma_blue_row(&self, y: usize) -> &[u8] {
        self.row(Plane::ChromaBlue, y)
    }

    pub fn chroma_red_row(&self, y: usize) -> &[u8] {
        self.row(Plane::ChromaRed, y)
    }

    /// Copies the samples of `other`, reusing this frame's storage when the
    /// geometry matches.
    pub fn copy_from(&mut self, other: &Frame) {
        if self.width != other.width || self.height != other.height {
            *self = other.clone();
            return;
        }
        for (dst, src) in self.slices.iter_mut().zip(other.slices.iter()) {
            dst.copy_from_slice(src);
        }
    }

    pub fn fill(&mut self, value: u8) {
        for slice in self.slices.iter_mut() {
            slice.iter_mut().for_each(|s| *s = value);
        }
    }

    /// Stores an 8x8 block of reconstructed samples at (x, y).
    pub fn store_block(&mut self, plane: Plane, x: usize, y: usize, block: &[i32; 64]) {
        for (row, samples) in block.chunks_exact(8).enumerate() {
            let dst = &mut self.row_mut(plane, y + row)[x..x + 8];
            for (d, &s) in dst.iter_mut().zip(samples) {
                *d = pin(s);
            }
        }
    }

    /// Adds an 8x8 block of residuals onto the prediction at (x, y).
    pub fn add_block(&mut self, plane: Plane, x: usize, y: usize, block: &[i32; 64]) {
        for (row, residuals) in block.chunks_exact(8).enumerate() {
            let dst = &mut self.row_mut(plane, y + row)[x..x + 8];
            for (d, &r) in dst.iter_mut().zip(residuals) {
                *d = pin(*d as i32 + r);
            }
        }
    }

    pub fn store_flat(&mut self, plane: Plane, x: usize, y: usize, value: i32) {
        let value = pin(value);
        for row in 0..8 {
            self.row_mut(plane, y + row)[x..x + 8]
                .iter_mut()
                .for_each(|d| *d = value);
        }
    }

    pub fn add_flat(&mut self, plane: Plane, x: usize, y: usize, value: i32) {
        for row in 0..8 {
            for d in self.row_mut(plane, y + row)[x..x + 8].iter_mut() {
                *d = pin(*d as i32 + value);
            }
        }
    }
}

/// Fills the `size`x`size` block at (x, y) of `current` with the matching block
/// of `reference`, displaced by (dx, dy) in half samples. Odd displacements
/// average two or four neighbouring samples. Reads outside the plane repeat
/// its edge samples.
#[allow(clippy::too_many_arguments)]
pub fn predict_block(
    reference: &Frame,
    current: &mut Frame,
    plane: Plane,
    x: usize,
    y: usize,
    size: usize,
    dx: i32,
    dy: i32,
) {
    const WINDOW: usize = 17;
    let (width, height) = reference.plane_size(plane);
    let half_x = x as i32 * 2 + dx;
    let half_y = y as i32 * 2 + dy;
    let phase = ((half_y & 1) << 1) | (half_x & 1);
    let (sx, sy) = (half_x >> 1, half_y >> 1);

    let mut window = [0u8; WINDOW * WINDOW];
    for row in 0..=size {
        let ry = (sy + row as i32).clamp(0, height as i32 - 1) as usize;
        let src = reference.row(plane, ry);
        for col in 0..=size {
            let rx = (sx + col as i32).clamp(0, width as i32 - 1) as usize;
            window[row * WINDOW + col] = src[rx];
        }
    }

    for row in 0..size {
        let dst = &mut current.row_mut(plane, y + row)[x..x + size];
        let top = &window[row * WINDOW..];
        let bottom = &window[(row + 1) * WINDOW..];
        for (col, d) in dst.iter_mut().enumerate() {
            let a = top[col] as u32;
            *d = match phase {
                0 => a,
                1 => (a + top[col + 1] as u32 + 1) >> 1,
                2 => (a + bottom[col] as u32 + 1) >> 1,
                _ => (a + top[col + 1] as u32 + bottom[col] as u32 + bottom[col + 1] as u32 + 2) >> 2,
            } as u8;
        }
    }
}

/// The reference and current frames used while decoding.
pub struct FrameBufferPair {
    frames: [Frame; 2],
    current: usize,
}

impl FrameBufferPair {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(FrameBufferPair {
            frames: [Frame::new(width, height)?, Frame::new(width, height)?],
            current: 1,
        })
    }

    pub fn width(&self) -> usize {
        self.frames[0].width()
    }

    pub fn height(&self) -> usize {
        self.frames[0].height()
    }

    pub fn reference(&self) -> &Frame {
        &self.frames[self.current ^ 1]
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    /// Index (0 or 1) of the buffer currently being written.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn split(&mut self) -> (&Frame, &mut Frame) {
        let (first, second) = self.frames.split_at_mut(1);
        if self.current == 1 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Swaps the roles of the two buffers. Only called between pictures.
    pub fn flip(&mut self) {
        self.current ^= 1;
    }
}
