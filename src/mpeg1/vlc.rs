//! Static code tables for MPEG-1 video.
//!
//! Variable length codes are stored as flat binary trees: each node holds the
//! state to move to on a `0` bit, the state to move to on a `1` bit, and the
//! decoded value. A node whose two successors are both zero is a leaf.

/// Successor marking a bit pattern that is not a valid code.
pub const INVALID: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlcNode {
    pub zero: u8,
    pub one: u8,
    pub value: i16,
}

impl VlcNode {
    pub const fn branch(zero: u8, one: u8) -> Self {
        VlcNode { zero, one, value: 0 }
    }

    pub const fn leaf(value: i16) -> Self {
        VlcNode { zero: 0, one: 0, value }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.zero == 0 && self.one == 0
    }
}

#[derive(Debug)]
pub struct VlcTable {
    pub name: &'static str,
    pub nodes: &'static [VlcNode],
}

impl VlcTable {
    /// Every leaf of the tree as `(value, code, code_length)`, in depth-first order.
    pub fn codes(&self) -> Vec<(i16, u32, u32)> {
        let mut codes = Vec::new();
        let mut stack = vec![(0usize, 0u32, 0u32)];
        while let Some((state, code, length)) = stack.pop() {
            let node = match self.nodes.get(state) {
                Some(node) => node,
                None => continue,
            };
            if node.is_leaf() {
                codes.push((node.value, code, length));
                continue;
            }
            if length >= 32 {
                continue;
            }
            for (bit, next) in [(1, node.one), (0, node.zero)].iter().copied() {
                if next != INVALID {
                    stack.push((next as usize, (code << 1) | bit, length + 1));
                }
            }
        }
        codes
    }

    /// Length of the longest code, or `None` when some reachable state leaves the
    /// table or fails to terminate within 24 bits (the bit reader's look-ahead).
    pub fn max_code_length(&self) -> Option<u32> {
        let mut longest = 0;
        let mut stack = vec![(0usize, 0u32)];
        while let Some((state, depth)) = stack.pop() {
            let node = self.nodes.get(state)?;
            if node.is_leaf() {
                if depth == 0 {
                    return None;
                }
                longest = longest.max(depth);
                continue;
            }
            if depth >= 24 {
                return None;
            }
            for next in [node.zero, node.one].iter().copied() {
                if next != INVALID {
                    stack.push((next as usize, depth + 1));
                }
            }
        }
        Some(longest)
    }
}

/// A decoded DCT coefficient code. `level == 0` marks the escape code, whose
/// run has already been read and whose level follows as a fixed length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLevel {
    pub run: u8,
    pub level: u8,
}

impl RunLevel {
    pub const fn new(run: u8, level: u8) -> Self {
        RunLevel { run, level }
    }

    pub fn is_escape(&self) -> bool {
        self.level == 0
    }
}

const fn rl(run: u8, level: u8) -> RunLevel {
    RunLevel::new(run, level)
}

// Lookup tables for the DCT coefficient fast path, indexed by the bits that
// follow each prefix.

/// `001xx`, 5 bits; index 0 continues with `00100xxx`.
pub const DCT_001: [RunLevel; 4] = [rl(0, 0), rl(0, 3), rl(4, 1), rl(3, 1)];

/// `00100xxx`, 8 bits.
pub const DCT_00100: [RunLevel; 8] = [
    rl(13, 1), rl(0, 6), rl(12, 1), rl(11, 1), rl(3, 2), rl(1, 3), rl(0, 5), rl(10, 1),
];

/// `0001xx`, 6 bits.
pub const DCT_0001: [RunLevel; 4] = [rl(7, 1), rl(6, 1), rl(1, 2), rl(5, 1)];

/// `00001xx`, 7 bits.
pub const DCT_00001: [RunLevel; 4] = [rl(2, 2), rl(9, 1), rl(0, 4), rl(8, 1)];

/// `0000001xxx`, 10 bits.
pub const DCT_0000001: [RunLevel; 8] = [
    rl(16, 1), rl(5, 2), rl(0, 7), rl(2, 3), rl(1, 4), rl(15, 1), rl(14, 1), rl(4, 2),
];

/// 12 to 16 bit codes, indexed by `(extra_zeros << 4) | next_four_bits` where
/// `extra_zeros` counts the zeros past the seventh.
#[rustfmt::skip]
pub const DCT_LONG: [RunLevel; 80] = [
    // 0000 0001 xxxx
    rl(0, 11), rl(8, 2), rl(4, 3), rl(0, 10), rl(2, 4), rl(7, 2), rl(21, 1), rl(20, 1),
    rl(0, 9), rl(19, 1), rl(18, 1), rl(1, 5), rl(3, 3), rl(0, 8), rl(6, 2), rl(17, 1),
    // 0000 0000 1xxx x
    rl(10, 2), rl(9, 2), rl(5, 3), rl(3, 4), rl(2, 5), rl(1, 7), rl(1, 6), rl(0, 15),
    rl(0, 14), rl(0, 13), rl(0, 12), rl(26, 1), rl(25, 1), rl(24, 1), rl(23, 1), rl(22, 1),
    // 0000 0000 01xx xx
    rl(0, 31), rl(0, 30), rl(0, 29), rl(0, 28), rl(0, 27), rl(0, 26), rl(0, 25), rl(0, 24),
    rl(0, 23), rl(0, 22), rl(0, 21), rl(0, 20), rl(0, 19), rl(0, 18), rl(0, 17), rl(0, 16),
    // 0000 0000 001x xxx
    rl(0, 40), rl(0, 39), rl(0, 38), rl(0, 37), rl(0, 36), rl(0, 35), rl(0, 34), rl(0, 33),
    rl(0, 32), rl(1, 14), rl(1, 13), rl(1, 12), rl(1, 11), rl(1, 10), rl(1, 9), rl(1, 8),
    // 0000 0000 0001 xxxx
    rl(1, 18), rl(1, 17), rl(1, 16), rl(1, 15), rl(6, 3), rl(16, 2), rl(15, 2), rl(14, 2),
    rl(13, 2), rl(12, 2), rl(11, 2), rl(31, 1), rl(30, 1), rl(29, 1), rl(28, 1), rl(27, 1),
];

#[rustfmt::skip]
pub const ZIG_ZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

#[rustfmt::skip]
pub const DEFAULT_INTRA_QUANT_MATRIX: [u8; 64] = [
     8, 16, 19, 22, 26, 27, 29, 34,
    16, 16, 22, 24, 27, 29, 34, 37,
    19, 22, 26, 27, 29, 34, 34, 38,
    22, 22, 26, 27, 29, 34, 37, 40,
    22, 26, 27, 29, 32, 35, 40, 48,
    26, 27, 29, 32, 35, 40, 48, 58,
    26, 27, 29, 34, 38, 46, 56, 69,
    27, 29, 35, 38, 46, 56, 69, 83,
];

pub const DEFAULT_NON_INTRA_QUANT_MATRIX: [u8; 64] = [16; 64];

/// Scale factors folded into dequantisation so the IDCT can skip its input multiplies.
#[rustfmt::skip]
pub const PREMULTIPLIER_MATRIX: [u8; 64] = [
    32, 44, 42, 38, 32, 25, 17,  9,
    44, 62, 58, 52, 44, 35, 24, 12,
    42, 58, 55, 49, 42, 33, 23, 12,
    38, 52, 49, 44, 38, 30, 20, 10,
    32, 44, 42, 38, 32, 25, 17,  9,
    25, 35, 33, 30, 25, 20, 14,  7,
    17, 24, 23, 20, 17, 14,  9,  5,
     9, 12, 12, 10,  9,  7,  5,  2,
];

#[rustfmt::skip]
pub static MACROBLOCK_ADDRESS_INCREMENT: VlcTable = VlcTable {
    name: "macroblock_address_increment",
    nodes: &[
        VlcNode::branch(1, 2),        //   0
        VlcNode::branch(3, 4),        //   1 0
        VlcNode::leaf(1),             //   2 1.
        VlcNode::branch(5, 6),        //   3 00
        VlcNode::branch(7, 8),        //   4 01
        VlcNode::branch(9, 10),       //   5 000
        VlcNode::branch(11, 12),      //   6 001
        VlcNode::leaf(3),             //   7 010.
        VlcNode::leaf(2),             //   8 011.
        VlcNode::branch(13, 14),      //   9 0000
        VlcNode::branch(15, 16),      //  10 0001
        VlcNode::leaf(5),             //  11 0010.
        VlcNode::leaf(4),             //  12 0011.
        VlcNode::branch(17, 18),      //  13 0000 0
        VlcNode::branch(19, 20),      //  14 0000 1
        VlcNode::leaf(7),             //  15 0001 0.
        VlcNode::leaf(6),             //  16 0001 1.
        VlcNode::branch(21, 22),      //  17 0000 00
        VlcNode::branch(23, 24),      //  18 0000 01
        VlcNode::branch(25, 26),      //  19 0000 10
        VlcNode::branch(27, 28),      //  20 0000 11
        VlcNode::branch(INVALID, 29), //  21 0000 000
        VlcNode::branch(INVALID, 30), //  22 0000 001
        VlcNode::branch(31, 32),      //  23 0000 010
        VlcNode::branch(33, 34),      //  24 0000 011
        VlcNode::branch(35, 36),      //  25 0000 100
        VlcNode::branch(37, 38),      //  26 0000 101
        VlcNode::leaf(9),             //  27 0000 110.
        VlcNode::leaf(8),             //  28 0000 111.
        VlcNode::branch(39, 40),      //  29 0000 0001
        VlcNode::branch(41, 42),      //  30 0000 0011
        VlcNode::branch(43, 44),      //  31 0000 0100
        VlcNode::branch(45, 46),      //  32 0000 0101
        VlcNode::leaf(15),            //  33 0000 0110.
        VlcNode::leaf(14),            //  34 0000 0111.
        VlcNode::leaf(13),            //  35 0000 1000.
        VlcNode::leaf(12),            //  36 0000 1001.
        VlcNode::leaf(11),            //  37 0000 1010.
        VlcNode::leaf(10),            //  38 0000 1011.
        VlcNode::branch(47, INVALID), //  39 0000 0001 0
        VlcNode::branch(INVALID, 48), //  40 0000 0001 1
        VlcNode::branch(49, 50),      //  41 0000 0011 0
        VlcNode::branch(51, 52),      //  42 0000 0011 1
        VlcNode::branch(53, 54),      //  43 0000 0100 0
        VlcNode::branch(55, 56),      //  44 0000 0100 1
        VlcNode::branch(57, 58),      //  45 0000 0101 0
        VlcNode::branch(59, 60),      //  46 0000 0101 1
        VlcNode::branch(61, INVALID), //  47 0000 0001 00
        VlcNode::branch(INVALID, 62), //  48 0000 0001 11
        VlcNode::branch(63, 64),      //  49 0000 0011 00
        VlcNode::branch(65, 66),      //  50 0000 0011 01
        VlcNode::branch(67, 68),      //  51 0000 0011 10
        VlcNode::branch(69, 70),      //  52 0000 0011 11
        VlcNode::branch(71, 72),      //  53 0000 0100 00
        VlcNode::branch(73, 74),      //  54 0000 0100 01
        VlcNode::leaf(21),            //  55 0000 0100 10.
        VlcNode::leaf(20),            //  56 0000 0100 11.
        VlcNode::leaf(19),            //  57 0000 0101 00.
        VlcNode::leaf(18),            //  58 0000 0101 01.
        VlcNode::leaf(17),            //  59 0000 0101 10.
        VlcNode::leaf(16),            //  60 0000 0101 11.
        VlcNode::leaf(35),            //  61 0000 0001 000. -- macroblock_escape
        VlcNode::leaf(34),            //  62 0000 0001 111. -- macroblock_stuffing
        VlcNode::leaf(33),            //  63 0000 0011 000.
        VlcNode::leaf(32),            //  64 0000 0011 001.
        VlcNode::leaf(31),            //  65 0000 0011 010.
        VlcNode::leaf(30),            //  66 0000 0011 011.
        VlcNode::leaf(29),            //  67 0000 0011 100.
        VlcNode::leaf(28),            //  68 0000 0011 101.
        VlcNode::leaf(27),            //  69 0000 0011 110.
        VlcNode::leaf(26),            //  70 0000 0011 111.
        VlcNode::leaf(25),            //  71 0000 0100 000.
        VlcNode::leaf(24),            //  72 0000 0100 001.
        VlcNode::leaf(23),            //  73 0000 0100 010.
        VlcNode::leaf(22),            //  74 0000 0100 011.
    ],
};

#[rustfmt::skip]
pub static MACROBLOCK_TYPE_INTRA: VlcTable = VlcTable {
    name: "macroblock_type_intra",
    nodes: &[
        VlcNode::branch(1, 2),       //   0
        VlcNode::branch(INVALID, 3), //   1 0
        VlcNode::leaf(1),            //   2 1.
        VlcNode::leaf(17),           //   3 01.
    ],
};

#[rustfmt::skip]
pub static MACROBLOCK_TYPE_PREDICTIVE: VlcTable = VlcTable {
    name: "macroblock_type_predictive",
    nodes: &[
        VlcNode::branch(1, 2),        //   0
        VlcNode::branch(3, 4),        //   1 0
        VlcNode::leaf(10),            //   2 1.
        VlcNode::branch(5, 6),        //   3 00
        VlcNode::leaf(2),             //   4 01.
        VlcNode::branch(7, 8),        //   5 000
        VlcNode::leaf(8),             //   6 001.
        VlcNode::branch(9, 10),       //   7 0000
        VlcNode::branch(11, 12),      //   8 0001
        VlcNode::branch(INVALID, 13), //   9 00000
        VlcNode::leaf(18),            //  10 00001.
        VlcNode::leaf(26),            //  11 00010.
        VlcNode::leaf(1),             //  12 00011.
        VlcNode::leaf(17),            //  13 000001.
    ],
};

#[rustfmt::skip]
pub static CODE_BLOCK_PATTERN: VlcTable = VlcTable {
    name: "coded_block_pattern",
    nodes: &[
        VlcNode::branch(2, 1),        //   0
        VlcNode::branch(3, 6),        //   1 1
        VlcNode::branch(4, 5),        //   2 0
        VlcNode::branch(8, 11),       //   3 10
        VlcNode::branch(12, 13),      //   4 00
        VlcNode::branch(9, 7),        //   5 01
        VlcNode::branch(10, 14),      //   6 11
        VlcNode::branch(20, 19),      //   7 011
        VlcNode::branch(18, 16),      //   8 100
        VlcNode::branch(23, 17),      //   9 010
        VlcNode::branch(27, 25),      //  10 110
        VlcNode::branch(21, 28),      //  11 101
        VlcNode::branch(15, 22),      //  12 000
        VlcNode::branch(24, 26),      //  13 001
        VlcNode::leaf(60),            //  14 111.
        VlcNode::branch(35, 40),      //  15 0000
        VlcNode::branch(44, 48),      //  16 1001
        VlcNode::branch(38, 36),      //  17 0101
        VlcNode::branch(42, 47),      //  18 1000
        VlcNode::branch(29, 31),      //  19 0111
        VlcNode::branch(39, 32),      //  20 0110
        VlcNode::leaf(32),            //  21 1010.
        VlcNode::branch(45, 46),      //  22 0001
        VlcNode::branch(33, 41),      //  23 0100
        VlcNode::branch(43, 34),      //  24 0010
        VlcNode::leaf(4),             //  25 1101.
        VlcNode::branch(30, 37),      //  26 0011
        VlcNode::leaf(8),             //  27 1100.
        VlcNode::leaf(16),            //  28 1011.
        VlcNode::leaf(44),            //  29 0111 0.
        VlcNode::branch(50, 56),      //  30 0011 0
        VlcNode::leaf(28),            //  31 0111 1.
        VlcNode::leaf(52),            //  32 0110 1.
        VlcNode::leaf(62),            //  33 0100 0.
        VlcNode::branch(61, 59),      //  34 0010 1
        VlcNode::branch(52, 60),      //  35 0000 0
        VlcNode::leaf(1),             //  36 0101 1.
        VlcNode::branch(55, 54),      //  37 0011 1
        VlcNode::leaf(61),            //  38 0101 0.
        VlcNode::leaf(56),            //  39 0110 0.
        VlcNode::branch(57, 58),      //  40 0000 1
        VlcNode::leaf(2),             //  41 0100 1.
        VlcNode::leaf(40),            //  42 1000 0.
        VlcNode::branch(51, 62),      //  43 0010 0
        VlcNode::leaf(48),            //  44 1001 0.
        VlcNode::branch(64, 63),      //  45 0001 0
        VlcNode::branch(49, 53),      //  46 0001 1
        VlcNode::leaf(20),            //  47 1000 1.
        VlcNode::leaf(12),            //  48 1001 1.
        VlcNode::branch(80, 83),      //  49 0001 10
        VlcNode::leaf(63),            //  50 0011 00.
        VlcNode::branch(77, 75),      //  51 0010 00
        VlcNode::branch(65, 73),      //  52 0000 00
        VlcNode::branch(84, 66),      //  53 0001 11
        VlcNode::leaf(24),            //  54 0011 11.
        VlcNode::leaf(36),            //  55 0011 10.
        VlcNode::leaf(3),             //  56 0011 01.
        VlcNode::branch(69, 87),      //  57 0000 10
        VlcNode::branch(81, 79),      //  58 0000 11
        VlcNode::branch(68, 71),      //  59 0010 11
        VlcNode::branch(70, 78),      //  60 0000 01
        VlcNode::branch(67, 76),      //  61 0010 10
        VlcNode::branch(72, 74),      //  62 0010 01
        VlcNode::branch(86, 85),      //  63 0001 01
        VlcNode::branch(88, 82),      //  64 0001 00
        VlcNode::branch(INVALID, 94), //  65 0000 000
        VlcNode::branch(95, 97),      //  66 0001 111
        VlcNode::leaf(33),            //  67 0010 100.
        VlcNode::leaf(9),             //  68 0010 110.
        VlcNode::branch(106, 110),    //  69 0000 100
        VlcNode::branch(102, 116),    //  70 0000 010
        VlcNode::leaf(5),             //  71 0010 111.
        VlcNode::leaf(10),            //  72 0010 010.
        VlcNode::branch(93, 89),      //  73 0000 001
        VlcNode::leaf(6),             //  74 0010 011.
        VlcNode::leaf(18),            //  75 0010 001.
        VlcNode::leaf(17),            //  76 0010 101.
        VlcNode::leaf(34),            //  77 0010 000.
        VlcNode::branch(113, 119),    //  78 0000 011
        VlcNode::branch(103, 104),    //  79 0000 111
        VlcNode::branch(90, 92),      //  80 0001 100
        VlcNode::branch(109, 107),    //  81 0000 110
        VlcNode::branch(117, 118),    //  82 0001 001
        VlcNode::branch(101, 99),     //  83 0001 101
        VlcNode::branch(98, 96),      //  84 0001 110
        VlcNode::branch(100, 91),     //  85 0001 011
        VlcNode::branch(114, 115),    //  86 0001 010
        VlcNode::branch(105, 108),    //  87 0000 101
        VlcNode::branch(112, 111),    //  88 0001 000
        VlcNode::branch(121, 125),    //  89 0000 0011
        VlcNode::leaf(41),            //  90 0001 1000.
        VlcNode::leaf(14),            //  91 0001 0111.
        VlcNode::leaf(21),            //  92 0001 1001.
        VlcNode::branch(124, 122),    //  93 0000 0010
        VlcNode::branch(120, 123),    //  94 0000 0001
        VlcNode::leaf(11),            //  95 0001 1110.
        VlcNode::leaf(19),            //  96 0001 1101.
        VlcNode::leaf(7),             //  97 0001 1111.
        VlcNode::leaf(35),            //  98 0001 1100.
        VlcNode::leaf(13),            //  99 0001 1011.
        VlcNode::leaf(50),            // 100 0001 0110.
        VlcNode::leaf(49),            // 101 0001 1010.
        VlcNode::leaf(58),            // 102 0000 0100.
        VlcNode::leaf(37),            // 103 0000 1110.
        VlcNode::leaf(25),            // 104 0000 1111.
        VlcNode::leaf(45),            // 105 0000 1010.
        VlcNode::leaf(57),            // 106 0000 1000.
        VlcNode::leaf(26),            // 107 0000 1101.
        VlcNode::leaf(29),            // 108 0000 1011.
        VlcNode::leaf(38),            // 109 0000 1100.
        VlcNode::leaf(53),            // 110 0000 1001.
        VlcNode::leaf(23),            // 111 0001 0001.
        VlcNode::leaf(43),            // 112 0001 0000.
        VlcNode::leaf(46),            // 113 0000 0110.
        VlcNode::leaf(42),            // 114 0001 0100.
        VlcNode::leaf(22),            // 115 0001 0101.
        VlcNode::leaf(54),            // 116 0000 0101.
        VlcNode::leaf(51),            // 117 0001 0010.
        VlcNode::leaf(15),            // 118 0001 0011.
        VlcNode::leaf(30),            // 119 0000 0111.
        VlcNode::leaf(39),            // 120 0000 0001 0.
        VlcNode::leaf(47),            // 121 0000 0011 0.
        VlcNode::leaf(55),            // 122 0000 0010 1.
        VlcNode::leaf(27),            // 123 0000 0001 1.
        VlcNode::leaf(59),            // 124 0000 0010 0.
        VlcNode::leaf(31),            // 125 0000 0011 1.
    ],
};

#[rustfmt::skip]
pub static DCT_DC_SIZE_LUMINANCE: VlcTable = VlcTable {
    name: "dct_dc_size_luminance",
    nodes: &[
        VlcNode::branch(2, 1),        //   0
        VlcNode::branch(6, 5),        //   1 1
        VlcNode::branch(3, 4),        //   2 0
        VlcNode::leaf(1),             //   3 00.
        VlcNode::leaf(2),             //   4 01.
        VlcNode::branch(9, 8),        //   5 11
        VlcNode::branch(7, 10),       //   6 10
        VlcNode::leaf(0),             //   7 100.
        VlcNode::branch(12, 11),      //   8 111
        VlcNode::leaf(4),             //   9 110.
        VlcNode::leaf(3),             //  10 101.
        VlcNode::branch(13, 14),      //  11 1111
        VlcNode::leaf(5),             //  12 1110.
        VlcNode::leaf(6),             //  13 1111 0.
        VlcNode::branch(16, 15),      //  14 1111 1
        VlcNode::branch(17, INVALID), //  15 1111 11
        VlcNode::leaf(7),             //  16 1111 10.
        VlcNode::leaf(8),             //  17 1111 110.
    ],
};

#[rustfmt::skip]
pub static DCT_DC_SIZE_CHROMINANCE: VlcTable = VlcTable {
    name: "dct_dc_size_chrominance",
    nodes: &[
        VlcNode::branch(2, 1),        //   0
        VlcNode::branch(4, 3),        //   1 1
        VlcNode::branch(6, 5),        //   2 0
        VlcNode::branch(8, 7),        //   3 11
        VlcNode::leaf(2),             //   4 10.
        VlcNode::leaf(1),             //   5 01.
        VlcNode::leaf(0),             //   6 00.
        VlcNode::branch(10, 9),       //   7 111
        VlcNode::leaf(3),             //   8 110.
        VlcNode::branch(12, 11),      //   9 1111
        VlcNode::leaf(4),             //  10 1110.
        VlcNode::branch(14, 13),      //  11 1111 1
        VlcNode::leaf(5),             //  12 1111 0.
        VlcNode::branch(16, 15),      //  13 1111 11
        VlcNode::leaf(6),             //  14 1111 10.
        VlcNode::branch(17, INVALID), //  15 1111 111
        VlcNode::leaf(7),             //  16 1111 110.
        VlcNode::leaf(8),             //  17 1111 1110.
    ],
};

#[rustfmt::skip]
pub static MOTION: VlcTable = VlcTable {
    name: "motion_code",
    nodes: &[
        VlcNode::branch(1, 2),        //   0
        VlcNode::branch(4, 3),        //   1 0
        VlcNode::leaf(0),             //   2 1.
        VlcNode::branch(6, 5),        //   3 01
        VlcNode::branch(8, 7),        //   4 00
        VlcNode::leaf(-1),            //   5 011.
        VlcNode::leaf(1),             //   6 010.
        VlcNode::branch(9, 10),       //   7 001
        VlcNode::branch(12, 11),      //   8 000
        VlcNode::leaf(2),             //   9 0010.
        VlcNode::leaf(-2),            //  10 0011.
        VlcNode::branch(14, 15),      //  11 0001
        VlcNode::branch(16, 13),      //  12 0000
        VlcNode::branch(20, 18),      //  13 0000 1
        VlcNode::leaf(3),             //  14 0001 0.
        VlcNode::leaf(-3),            //  15 0001 1.
        VlcNode::branch(17, 19),      //  16 0000 0
        VlcNode::branch(INVALID, 23), //  17 0000 00
        VlcNode::branch(27, 25),      //  18 0000 11
        VlcNode::branch(26, 21),      //  19 0000 01
        VlcNode::branch(24, 22),      //  20 0000 10
        VlcNode::branch(32, 28),      //  21 0000 011
        VlcNode::branch(29, 31),      //  22 0000 101
        VlcNode::branch(INVALID, 33), //  23 0000 001
        VlcNode::branch(36, 35),      //  24 0000 100
        VlcNode::leaf(-4),            //  25 0000 111.
        VlcNode::branch(30, 34),      //  26 0000 010
        VlcNode::leaf(4),             //  27 0000 110.
        VlcNode::leaf(-7),            //  28 0000 0111.
        VlcNode::leaf(5),             //  29 0000 1010.
        VlcNode::branch(37, 41),      //  30 0000 0100
        VlcNode::leaf(-5),            //  31 0000 1011.
        VlcNode::leaf(7),             //  32 0000 0110.
        VlcNode::branch(38, 40),      //  33 0000 0011
        VlcNode::branch(42, 39),      //  34 0000 0101
        VlcNode::leaf(-6),            //  35 0000 1001.
        VlcNode::leaf(6),             //  36 0000 1000.
        VlcNode::branch(51, 54),      //  37 0000 0100 0
        VlcNode::branch(50, 49),      //  38 0000 0011 0
        VlcNode::branch(45, 46),      //  39 0000 0101 1
        VlcNode::branch(52, 47),      //  40 0000 0011 1
        VlcNode::branch(43, 53),      //  41 0000 0100 1
        VlcNode::branch(44, 48),      //  42 0000 0101 0
        VlcNode::leaf(10),            //  43 0000 0100 10.
        VlcNode::leaf(9),             //  44 0000 0101 00.
        VlcNode::leaf(8),             //  45 0000 0101 10.
        VlcNode::leaf(-8),            //  46 0000 0101 11.
        VlcNode::branch(57, 66),      //  47 0000 0011 11
        VlcNode::leaf(-9),            //  48 0000 0101 01.
        VlcNode::branch(60, 64),      //  49 0000 0011 01
        VlcNode::branch(56, 61),      //  50 0000 0011 00
        VlcNode::branch(55, 62),      //  51 0000 0100 00
        VlcNode::branch(58, 63),      //  52 0000 0011 10
        VlcNode::leaf(-10),           //  53 0000 0100 11.
        VlcNode::branch(59, 65),      //  54 0000 0100 01
        VlcNode::leaf(12),            //  55 0000 0100 000.
        VlcNode::leaf(16),            //  56 0000 0011 000.
        VlcNode::leaf(13),            //  57 0000 0011 110.
        VlcNode::leaf(14),            //  58 0000 0011 100.
        VlcNode::leaf(11),            //  59 0000 0100 010.
        VlcNode::leaf(15),            //  60 0000 0011 010.
        VlcNode::leaf(-16),           //  61 0000 0011 001.
        VlcNode::leaf(-12),           //  62 0000 0100 001.
        VlcNode::leaf(-14),           //  63 0000 0011 101.
        VlcNode::leaf(-15),           //  64 0000 0011 011.
        VlcNode::leaf(-11),           //  65 0000 0100 011.
        VlcNode::leaf(-13),           //  66 0000 0011 111.
    ],
};

#[rustfmt::skip]
pub static DCT_COEFF: VlcTable = VlcTable {
    name: "dct_coefficient",
    nodes: &[
        VlcNode::branch(1, 2),         //   0
        VlcNode::branch(4, 3),         //   1 0
        VlcNode::leaf(0x0001),         //   2 1.
        VlcNode::branch(7, 8),         //   3 01
        VlcNode::branch(6, 5),         //   4 00
        VlcNode::branch(13, 9),        //   5 001
        VlcNode::branch(11, 10),       //   6 000
        VlcNode::branch(14, 12),       //   7 010
        VlcNode::leaf(0x0101),         //   8 011.
        VlcNode::branch(20, 22),       //   9 0011
        VlcNode::branch(18, 21),       //  10 0001
        VlcNode::branch(16, 19),       //  11 0000
        VlcNode::leaf(0x0201),         //  12 0101.
        VlcNode::branch(17, 15),       //  13 0010
        VlcNode::leaf(0x0002),         //  14 0100.
        VlcNode::leaf(0x0003),         //  15 0010 1.
        VlcNode::branch(27, 25),       //  16 0000 0
        VlcNode::branch(29, 31),       //  17 0010 0
        VlcNode::branch(24, 26),       //  18 0001 0
        VlcNode::branch(32, 30),       //  19 0000 1
        VlcNode::leaf(0x0401),         //  20 0011 0.
        VlcNode::branch(23, 28),       //  21 0001 1
        VlcNode::leaf(0x0301),         //  22 0011 1.
        VlcNode::leaf(0x0102),         //  23 0001 10.
        VlcNode::leaf(0x0701),         //  24 0001 00.
        VlcNode::leaf(-1),             //  25 0000 01. escape
        VlcNode::leaf(0x0601),         //  26 0001 01.
        VlcNode::branch(37, 36),       //  27 0000 00
        VlcNode::leaf(0x0501),         //  28 0001 11.
        VlcNode::branch(35, 34),       //  29 0010 00
        VlcNode::branch(39, 38),       //  30 0000 11
        VlcNode::branch(33, 42),       //  31 0010 01
        VlcNode::branch(40, 41),       //  32 0000 10
        VlcNode::branch(52, 50),       //  33 0010 010
        VlcNode::branch(54, 53),       //  34 0010 001
        VlcNode::branch(48, 49),       //  35 0010 000
        VlcNode::branch(43, 45),       //  36 0000 001
        VlcNode::branch(46, 44),       //  37 0000 000
        VlcNode::leaf(0x0801),         //  38 0000 111.
        VlcNode::leaf(0x0004),         //  39 0000 110.
        VlcNode::leaf(0x0202),         //  40 0000 100.
        VlcNode::leaf(0x0901),         //  41 0000 101.
        VlcNode::branch(51, 47),       //  42 0010 011
        VlcNode::branch(55, 57),       //  43 0000 0010
        VlcNode::branch(60, 56),       //  44 0000 0001
        VlcNode::branch(59, 58),       //  45 0000 0011
        VlcNode::branch(61, 62),       //  46 0000 0000
        VlcNode::leaf(0x0a01),         //  47 0010 0111.
        VlcNode::leaf(0x0d01),         //  48 0010 0000.
        VlcNode::leaf(0x0006),         //  49 0010 0001.
        VlcNode::leaf(0x0103),         //  50 0010 0101.
        VlcNode::leaf(0x0005),         //  51 0010 0110.
        VlcNode::leaf(0x0302),         //  52 0010 0100.
        VlcNode::leaf(0x0b01),         //  53 0010 0011.
        VlcNode::leaf(0x0c01),         //  54 0010 0010.
        VlcNode::branch(76, 75),       //  55 0000 0010 0
        VlcNode::branch(67, 70),       //  56 0000 0001 1
        VlcNode::branch(73, 71),       //  57 0000 0010 1
        VlcNode::branch(78, 74),       //  58 0000 0011 1
        VlcNode::branch(72, 77),       //  59 0000 0011 0
        VlcNode::branch(69, 64),       //  60 0000 0001 0
        VlcNode::branch(68, 63),       //  61 0000 0000 0
        VlcNode::branch(66, 65),       //  62 0000 0000 1
        VlcNode::branch(81, 87),       //  63 0000 0000 01
        VlcNode::branch(91, 80),       //  64 0000 0001 01
        VlcNode::branch(82, 79),       //  65 0000 0000 11
        VlcNode::branch(83, 86),       //  66 0000 0000 10
        VlcNode::branch(93, 92),       //  67 0000 0001 10
        VlcNode::branch(84, 85),       //  68 0000 0000 00
        VlcNode::branch(90, 94),       //  69 0000 0001 00
        VlcNode::branch(88, 89),       //  70 0000 0001 11
        VlcNode::leaf(0x0203),         //  71 0000 0010 11.
        VlcNode::leaf(0x0104),         //  72 0000 0011 00.
        VlcNode::leaf(0x0007),         //  73 0000 0010 10.
        VlcNode::leaf(0x0402),         //  74 0000 0011 11.
        VlcNode::leaf(0x0502),         //  75 0000 0010 01.
        VlcNode::leaf(0x1001),         //  76 0000 0010 00.
        VlcNode::leaf(0x0f01),         //  77 0000 0011 01.
        VlcNode::leaf(0x0e01),         //  78 0000 0011 10.
        VlcNode::branch(105, 107),     //  79 0000 0000 111
        VlcNode::branch(111, 114),     //  80 0000 0001 011
        VlcNode::branch(104, 97),      //  81 0000 0000 010
        VlcNode::branch(125, 119),     //  82 0000 0000 110
        VlcNode::branch(96, 98),       //  83 0000 0000 100
        VlcNode::branch(INVALID, 123), //  84 0000 0000 000
        VlcNode::branch(95, 101),      //  85 0000 0000 001
        VlcNode::branch(106, 121),     //  86 0000 0000 101
        VlcNode::branch(99, 102),      //  87 0000 0000 011
        VlcNode::branch(113, 103),     //  88 0000 0001 110
        VlcNode::branch(112, 116),     //  89 0000 0001 111
        VlcNode::branch(110, 100),     //  90 0000 0001 000
        VlcNode::branch(124, 115),     //  91 0000 0001 010
        VlcNode::branch(117, 122),     //  92 0000 0001 101
        VlcNode::branch(109, 118),     //  93 0000 0001 100
        VlcNode::branch(120, 108),     //  94 0000 0001 001
        VlcNode::branch(127, 136),     //  95 0000 0000 0010
        VlcNode::branch(139, 140),     //  96 0000 0000 1000
        VlcNode::branch(130, 126),     //  97 0000 0000 0101
        VlcNode::branch(145, 146),     //  98 0000 0000 1001
        VlcNode::branch(128, 129),     //  99 0000 0000 0110
        VlcNode::leaf(0x0802),         // 100 0000 0001 0001.
        VlcNode::branch(132, 134),     // 101 0000 0000 0011
        VlcNode::branch(155, 154),     // 102 0000 0000 0111
        VlcNode::leaf(0x0008),         // 103 0000 0001 1101.
        VlcNode::branch(137, 133),     // 104 0000 0000 0100
        VlcNode::branch(143, 144),     // 105 0000 0000 1110
        VlcNode::branch(151, 138),     // 106 0000 0000 1010
        VlcNode::branch(142, 141),     // 107 0000 0000 1111
        VlcNode::leaf(0x000a),         // 108 0000 0001 0011.
        VlcNode::leaf(0x0009),         // 109 0000 0001 1000.
        VlcNode::leaf(0x000b),         // 110 0000 0001 0000.
        VlcNode::leaf(0x1501),         // 111 0000 0001 0110.
        VlcNode::leaf(0x0602),         // 112 0000 0001 1110.
        VlcNode::leaf(0x0303),         // 113 0000 0001 1100.
        VlcNode::leaf(0x1401),         // 114 0000 0001 0111.
        VlcNode::leaf(0x0702),         // 115 0000 0001 0101.
        VlcNode::leaf(0x1101),         // 116 0000 0001 1111.
        VlcNode::leaf(0x1201),         // 117 0000 0001 1010.
        VlcNode::leaf(0x1301),         // 118 0000 0001 1001.
        VlcNode::branch(148, 152),     // 119 0000 0000 1101
        VlcNode::leaf(0x0403),         // 120 0000 0001 0010.
        VlcNode::branch(153, 150),     // 121 0000 0000 1011
        VlcNode::leaf(0x0105),         // 122 0000 0001 1011.
        VlcNode::branch(131, 135),     // 123 0000 0000 0001
        VlcNode::leaf(0x0204),         // 124 0000 0001 0100.
        VlcNode::branch(149, 147),     // 125 0000 0000 1100
        VlcNode::branch(172, 173),     // 126 0000 0000 0101 1
        VlcNode::branch(162, 158),     // 127 0000 0000 0010 0
        VlcNode::branch(170, 161),     // 128 0000 0000 0110 0
        VlcNode::branch(168, 166),     // 129 0000 0000 0110 1
        VlcNode::branch(157, 179),     // 130 0000 0000 0101 0
        VlcNode::branch(169, 167),     // 131 0000 0000 0001 0
        VlcNode::branch(174, 171),     // 132 0000 0000 0011 0
        VlcNode::branch(178, 177),     // 133 0000 0000 0100 1
        VlcNode::branch(156, 159),     // 134 0000 0000 0011 1
        VlcNode::branch(164, 165),     // 135 0000 0000 0001 1
        VlcNode::branch(183, 182),     // 136 0000 0000 0010 1
        VlcNode::branch(175, 176),     // 137 0000 0000 0100 0
        VlcNode::leaf(0x0107),         // 138 0000 0000 1010 1.
        VlcNode::leaf(0x0a02),         // 139 0000 0000 1000 0.
        VlcNode::leaf(0x0902),         // 140 0000 0000 1000 1.
        VlcNode::leaf(0x1601),         // 141 0000 0000 1111 1.
        VlcNode::leaf(0x1701),         // 142 0000 0000 1111 0.
        VlcNode::leaf(0x1901),         // 143 0000 0000 1110 0.
        VlcNode::leaf(0x1801),         // 144 0000 0000 1110 1.
        VlcNode::leaf(0x0503),         // 145 0000 0000 1001 0.
        VlcNode::leaf(0x0304),         // 146 0000 0000 1001 1.
        VlcNode::leaf(0x000d),         // 147 0000 0000 1100 1.
        VlcNode::leaf(0x000c),         // 148 0000 0000 1101 0.
        VlcNode::leaf(0x000e),         // 149 0000 0000 1100 0.
        VlcNode::leaf(0x000f),         // 150 0000 0000 1011 1.
        VlcNode::leaf(0x0205),         // 151 0000 0000 1010 0.
        VlcNode::leaf(0x1a01),         // 152 0000 0000 1101 1.
        VlcNode::leaf(0x0106),         // 153 0000 0000 1011 0.
        VlcNode::branch(180, 181),     // 154 0000 0000 0111 1
        VlcNode::branch(160, 163),     // 155 0000 0000 0111 0
        VlcNode::branch(196, 199),     // 156 0000 0000 0011 10
        VlcNode::leaf(0x001b),         // 157 0000 0000 0101 00.
        VlcNode::branch(203, 185),     // 158 0000 0000 0010 01
        VlcNode::branch(202, 201),     // 159 0000 0000 0011 11
        VlcNode::leaf(0x0013),         // 160 0000 0000 0111 00.
        VlcNode::leaf(0x0016),         // 161 0000 0000 0110 01.
        VlcNode::branch(197, 207),     // 162 0000 0000 0010 00
        VlcNode::leaf(0x0012),         // 163 0000 0000 0111 01.
        VlcNode::branch(191, 192),     // 164 0000 0000 0001 10
        VlcNode::branch(188, 190),     // 165 0000 0000 0001 11
        VlcNode::leaf(0x0014),         // 166 0000 0000 0110 11.
        VlcNode::branch(184, 194),     // 167 0000 0000 0001 01
        VlcNode::leaf(0x0015),         // 168 0000 0000 0110 10.
        VlcNode::branch(186, 193),     // 169 0000 0000 0001 00
        VlcNode::leaf(0x0017),         // 170 0000 0000 0110 00.
        VlcNode::branch(204, 198),     // 171 0000 0000 0011 01
        VlcNode::leaf(0x0019),         // 172 0000 0000 0101 10.
        VlcNode::leaf(0x0018),         // 173 0000 0000 0101 11.
        VlcNode::branch(200, 205),     // 174 0000 0000 0011 00
        VlcNode::leaf(0x001f),         // 175 0000 0000 0100 00.
        VlcNode::leaf(0x001e),         // 176 0000 0000 0100 01.
        VlcNode::leaf(0x001c),         // 177 0000 0000 0100 11.
        VlcNode::leaf(0x001d),         // 178 0000 0000 0100 10.
        VlcNode::leaf(0x001a),         // 179 0000 0000 0101 01.
        VlcNode::leaf(0x0011),         // 180 0000 0000 0111 10.
        VlcNode::leaf(0x0010),         // 181 0000 0000 0111 11.
        VlcNode::branch(189, 206),     // 182 0000 0000 0010 11
        VlcNode::branch(187, 195),     // 183 0000 0000 0010 10
        VlcNode::branch(218, 211),     // 184 0000 0000 0001 010
        VlcNode::leaf(0x0025),         // 185 0000 0000 0010 011.
        VlcNode::branch(215, 216),     // 186 0000 0000 0001 000
        VlcNode::leaf(0x0024),         // 187 0000 0000 0010 100.
        VlcNode::branch(210, 212),     // 188 0000 0000 0001 110
        VlcNode::leaf(0x0022),         // 189 0000 0000 0010 110.
        VlcNode::branch(213, 209),     // 190 0000 0000 0001 111
        VlcNode::branch(221, 222),     // 191 0000 0000 0001 100
        VlcNode::branch(219, 208),     // 192 0000 0000 0001 101
        VlcNode::branch(217, 214),     // 193 0000 0000 0001 001
        VlcNode::branch(223, 220),     // 194 0000 0000 0001 011
        VlcNode::leaf(0x0023),         // 195 0000 0000 0010 101.
        VlcNode::leaf(0x010b),         // 196 0000 0000 0011 100.
        VlcNode::leaf(0x0028),         // 197 0000 0000 0010 000.
        VlcNode::leaf(0x010c),         // 198 0000 0000 0011 011.
        VlcNode::leaf(0x010a),         // 199 0000 0000 0011 101.
        VlcNode::leaf(0x0020),         // 200 0000 0000 0011 000.
        VlcNode::leaf(0x0108),         // 201 0000 0000 0011 111.
        VlcNode::leaf(0x0109),         // 202 0000 0000 0011 110.
        VlcNode::leaf(0x0026),         // 203 0000 0000 0010 010.
        VlcNode::leaf(0x010d),         // 204 0000 0000 0011 010.
        VlcNode::leaf(0x010e),         // 205 0000 0000 0011 001.
        VlcNode::leaf(0x0021),         // 206 0000 0000 0010 111.
        VlcNode::leaf(0x0027),         // 207 0000 0000 0010 001.
        VlcNode::leaf(0x1f01),         // 208 0000 0000 0001 1011.
        VlcNode::leaf(0x1b01),         // 209 0000 0000 0001 1111.
        VlcNode::leaf(0x1e01),         // 210 0000 0000 0001 1100.
        VlcNode::leaf(0x1002),         // 211 0000 0000 0001 0101.
        VlcNode::leaf(0x1d01),         // 212 0000 0000 0001 1101.
        VlcNode::leaf(0x1c01),         // 213 0000 0000 0001 1110.
        VlcNode::leaf(0x010f),         // 214 0000 0000 0001 0011.
        VlcNode::leaf(0x0112),         // 215 0000 0000 0001 0000.
        VlcNode::leaf(0x0111),         // 216 0000 0000 0001 0001.
        VlcNode::leaf(0x0110),         // 217 0000 0000 0001 0010.
        VlcNode::leaf(0x0603),         // 218 0000 0000 0001 0100.
        VlcNode::leaf(0x0b02),         // 219 0000 0000 0001 1010.
        VlcNode::leaf(0x0e02),         // 220 0000 0000 0001 0111.
        VlcNode::leaf(0x0d02),         // 221 0000 0000 0001 1000.
        VlcNode::leaf(0x0c02),         // 222 0000 0000 0001 1001.
        VlcNode::leaf(0x0f02),         // 223 0000 0000 0001 0110.
    ],
};

#[cfg(test)]
mod test {
    use super::*;

    const TREES: [&VlcTable; 8] = [
        &MACROBLOCK_ADDRESS_INCREMENT,
        &MACROBLOCK_TYPE_INTRA,
        &MACROBLOCK_TYPE_PREDICTIVE,
        &CODE_BLOCK_PATTERN,
        &DCT_DC_SIZE_LUMINANCE,
        &DCT_DC_SIZE_CHROMINANCE,
        &MOTION,
        &DCT_COEFF,
    ];

    #[test]
    fn every_tree_terminates() {
        let expected = [11, 2, 6, 9, 7, 8, 11, 16];
        for (table, longest) in TREES.iter().zip(expected.iter()) {
            assert_eq!(table.max_code_length(), Some(*longest), "{}", table.name);
        }
    }

    #[test]
    fn codes_are_prefix_free() {
        for table in TREES.iter() {
            let codes = table.codes();
            for (i, &(_, a, la)) in codes.iter().enumerate() {
                for &(_, b, lb) in &codes[i + 1..] {
                    let shared = la.min(lb);
                    assert_ne!(a >> (la - shared), b >> (lb - shared), "{}", table.name);
                }
            }
        }
    }

    #[test]
    fn alphabets_are_complete() {
        let mut increments: Vec<i16> =
            MACROBLOCK_ADDRESS_INCREMENT.codes().iter().map(|c| c.0).collect();
        increments.sort_unstable();
        assert_eq!(increments, (1..=35).collect::<Vec<_>>());

        let mut motion: Vec<i16> = MOTION.codes().iter().map(|c| c.0).collect();
        motion.sort_unstable();
        assert_eq!(motion, (-16..=16).collect::<Vec<_>>());

        let mut patterns: Vec<i16> = CODE_BLOCK_PATTERN.codes().iter().map(|c| c.0).collect();
        patterns.sort_unstable();
        assert_eq!(patterns, (1..=63).collect::<Vec<_>>());

        for table in [&DCT_DC_SIZE_LUMINANCE, &DCT_DC_SIZE_CHROMINANCE].iter() {
            let mut sizes: Vec<i16> = table.codes().iter().map(|c| c.0).collect();
            sizes.sort_unstable();
            assert_eq!(sizes, (0..=8).collect::<Vec<_>>());
        }
    }

    #[test]
    fn zig_zag_is_a_permutation() {
        let mut seen = [false; 64];
        for &i in ZIG_ZAG.iter() {
            assert!(!seen[i]);
            seen[i] = true;
        }
    }
}
