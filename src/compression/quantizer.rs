use super::plane::ValueType;

pub const MAX_QINDEX: usize = 119;

/// Quantiser step and reconstruction offsets, all held at 4x scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantEntry {
    pub step4: i64,
    pub intra_offset4: i64,
    pub inter_offset4: i64,
}

#[derive(Debug)]
pub struct QuantiserTable {
    entries: [QuantEntry; MAX_QINDEX + 1],
}

pub static QUANTISER_TABLE: QuantiserTable = QuantiserTable::build();

impl QuantiserTable {
    const fn build() -> Self {
        let mut entries = [QuantEntry {
            step4: 4,
            intra_offset4: 1,
            inter_offset4: 1,
        }; MAX_QINDEX + 1];

        entries[1] = QuantEntry {
            step4: 5,
            intra_offset4: 2,
            inter_offset4: 2,
        };

        let mut q = 2;
        while q <= MAX_QINDEX {
            let base = 1i64 << (q / 4);
            let step4 = match q % 4 {
                0 => 4 * base,
                1 => (503_829 * base + 52_958) / 105_917,
                2 => (665_857 * base + 58_854) / 117_708,
                _ => (440_253 * base + 32_722) / 65_444,
            };
            entries[q] = QuantEntry {
                step4,
                intra_offset4: (step4 + 1) >> 1,
                inter_offset4: (3 * step4 + 4) >> 3,
            };
            q += 1;
        }

        Self { entries }
    }

    pub fn entry(&self, qindex: usize) -> &QuantEntry {
        assert!(
            qindex <= MAX_QINDEX,
            "quantiser index {} out of range 0..={}",
            qindex,
            MAX_QINDEX
        );
        &self.entries[qindex]
    }

    pub fn step4(&self, qindex: usize) -> i64 {
        self.entry(qindex).step4
    }

    pub fn offset4(&self, qindex: usize, is_intra: bool) -> i64 {
        let entry = self.entry(qindex);
        if is_intra {
            entry.intra_offset4
        } else {
            entry.inter_offset4
        }
    }

    pub fn max_qindex(&self) -> usize {
        MAX_QINDEX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantizer {
    step4: i64,
    offset4: i64,
}

impl Quantizer {
    pub fn new(qindex: usize, is_intra: bool) -> Self {
        Self {
            step4: QUANTISER_TABLE.step4(qindex),
            offset4: QUANTISER_TABLE.offset4(qindex, is_intra),
        }
    }

    /// Quantisation index of a magnitude.
    #[inline]
    pub fn quantize(&self, magnitude: ValueType) -> u32 {
        ((magnitude.unsigned_abs() as i64 * 4) / self.step4) as u32
    }

    /// Reconstructed magnitude of a non-zero index, or `None` when it does
    /// not fit a sample.
    #[inline]
    pub fn dequantize(&self, index: u32) -> Option<ValueType> {
        if index == 0 {
            return Some(0);
        }
        let mag = (index as i64 * self.step4 + self.offset4 + 2) >> 2;
        ValueType::try_from(mag).ok()
    }
}
