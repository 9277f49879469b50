//! Separable 8x8 integer inverse DCT.
//!
//! Input coefficients are expected pre-scaled by `PREMULTIPLIER_MATRIX` and
//! shifted left by 8, which is how the block decoder stores them. Outputs are
//! plain sample values (or residuals for predicted blocks).

/// Value of every output sample of a block whose only nonzero coefficient is DC.
#[inline]
pub fn idct_dc(dc: i32) -> i32 {
    (dc + 128) >> 8
}

#[rustfmt::skip]
#[allow(clippy::identity_op, clippy::erasing_op)]
pub fn idct(block: &mut [i32; 64]) {
    // Columns
    for i in 0..8 {
        let b1 = block[4*8+i];
        let b3 = block[2*8+i] + block[6*8+i];
        let b4 = block[5*8+i] - block[3*8+i];
        let tmp1 = block[1*8+i] + block[7*8+i];
        let tmp2 = block[3*8+i] + block[5*8+i];
        let b6 = block[1*8+i] - block[7*8+i];
        let b7 = tmp1 + tmp2;
        let m0 = block[0*8+i];
        let x4 = ((b6*473 - b4*196 + 128) >> 8) - b7;
        let x0 = x4 - (((tmp1 - tmp2)*362 + 128) >> 8);
        let x1 = m0 - b1;
        let x2 = (((block[2*8+i] - block[6*8+i])*362 + 128) >> 8) - b3;
        let x3 = m0 + b1;
        let y3 = x1 + x2;
        let y4 = x3 + b3;
        let y5 = x1 - x2;
        let y6 = x3 - b3;
        let y7 = -x0 - ((b4*473 + b6*196 + 128) >> 8);
        block[0*8+i] = b7 + y4;
        block[1*8+i] = x4 + y3;
        block[2*8+i] = y5 - x0;
        block[3*8+i] = y6 - y7;
        block[4*8+i] = y6 + y7;
        block[5*8+i] = x0 + y5;
        block[6*8+i] = y3 - x4;
        block[7*8+i] = y4 - b7;
    }

    // Rows, with the final descale
    for i in (0..64).step_by(8) {
        let b1 = block[4+i];
        let b3 = block[2+i] + block[6+i];
        let b4 = block[5+i] - block[3+i];
        let tmp1 = block[1+i] + block[7+i];
        let tmp2 = block[3+i] + block[5+i];
        let b6 = block[1+i] - block[7+i];
        let b7 = tmp1 + tmp2;
        let m0 = block[0+i];
        let x4 = ((b6*473 - b4*196 + 128) >> 8) - b7;
        let x0 = x4 - (((tmp1 - tmp2)*362 + 128) >> 8);
        let x1 = m0 - b1;
        let x2 = (((block[2+i] - block[6+i])*362 + 128) >> 8) - b3;
        let x3 = m0 + b1;
        let y3 = x1 + x2;
        let y4 = x3 + b3;
        let y5 = x1 - x2;
        let y6 = x3 - b3;
        let y7 = -x0 - ((b4*473 + b6*196 + 128) >> 8);
        block[0+i] = (b7 + y4 + 128) >> 8;
        block[1+i] = (x4 + y3 + 128) >> 8;
        block[2+i] = (y5 - x0 + 128) >> 8;
        block[3+i] = (y6 - y7 + 128) >> 8;
        block[4+i] = (y6 + y7 + 128) >> 8;
        block[5+i] = (x0 + y5 + 128) >> 8;
        block[6+i] = (y3 - x4 + 128) >> 8;
        block[7+i] = (y4 - b7 + 128) >> 8;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpeg1::vlc::PREMULTIPLIER_MATRIX;

    #[test]
    fn zero_block_stays_zero() {
        let mut block = [0; 64];
        idct(&mut block);
        assert_eq!(block, [0; 64]);
    }

    #[test]
    fn dc_only_is_flat() {
        for dc in [0, 1, 16, 128, 200, 248, 255].iter() {
            let mut block = [0; 64];
            block[0] = dc << 8;
            idct(&mut block);
            assert!(block.iter().all(|&v| v == *dc), "dc {}", dc);
            assert_eq!(idct_dc(dc << 8), *dc);
        }
    }

    #[test]
    fn dc_fast_path_matches_full_transform() {
        // Dequantised non-intra DC terms land on arbitrary multiples of the
        // DC premultiplier rather than whole multiples of 256.
        for level in -2048..=2047 {
            let coefficient = level * PREMULTIPLIER_MATRIX[0] as i32;
            let mut block = [0; 64];
            block[0] = coefficient;
            idct(&mut block);
            let expected = idct_dc(coefficient);
            assert!(block.iter().all(|&v| v == expected), "level {}", level);
        }
    }

    #[test]
    fn single_ac_term_is_not_flat() {
        let mut block = [0; 64];
        block[1] = 64 * PREMULTIPLIER_MATRIX[1] as i32;
        idct(&mut block);
        assert!(block[0] > 0 && block[7] < 0);
        // horizontal frequency only: every row is identical
        for row in 1..8 {
            assert_eq!(block[..8], block[row * 8..row * 8 + 8]);
        }
    }
}
