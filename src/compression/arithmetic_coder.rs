use super::context_model::ContextSet;
use crate::error::{CodecError, CodecResult};

const CODE_MSB: u32 = 0x8000;
const CODE_2ND_MSB: u32 = 0x4000;
const CODE_MASK: u32 = 0xFFFF;
const CODE_BITS: usize = 16;

/// Bits the decoder legitimately reads beyond a well-formed stream: the
/// register width minus the two bits the encoder emits when flushing.
pub const MAX_OVERRUN_BITS: usize = CODE_BITS - 2;

pub struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    bits: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            current: 0,
            bits: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | (bit as u8);
        self.bits += 1;
        if self.bits == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.bits = 0;
        }
    }

    pub fn write_exp_golomb(&mut self, val: u32) {
        let val1 = val as u64 + 1;
        let bits = 64 - val1.leading_zeros();
        for _ in 0..bits - 1 {
            self.write_bit(false);
        }
        for i in (0..bits).rev() {
            self.write_bit((val1 >> i) & 1 != 0);
        }
    }

    pub fn write_signed_exp_golomb(&mut self, val: i32) {
        self.write_exp_golomb(val.unsigned_abs());
        if val != 0 {
            self.write_bit(val < 0);
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bits as usize
    }

    /// Pads with zeros up to the next byte boundary.
    pub fn byte_align(&mut self) {
        if self.bits > 0 {
            self.current <<= 8 - self.bits;
            self.bytes.push(self.current);
            self.current = 0;
            self.bits = 0;
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.byte_align();
        self.bytes
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BitReader {
    bytes: Vec<u8>,
    byte_pos: usize,
    bit_pos: u8,
    overrun: usize,
}

impl BitReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            byte_pos: 0,
            bit_pos: 0,
            overrun: 0,
        }
    }

    /// Reads one bit, failing at the end of the data.
    pub fn read_bit(&mut self) -> CodecResult<bool> {
        if self.byte_pos >= self.bytes.len() {
            return Err(CodecError::Truncated(format!(
                "read past end of {} byte buffer",
                self.bytes.len()
            )));
        }
        Ok(self.next_bit())
    }

    /// Reads one bit, supplying zeros past the end and counting them.
    pub fn read_bit_padded(&mut self) -> bool {
        if self.byte_pos >= self.bytes.len() {
            self.overrun += 1;
            return false;
        }
        self.next_bit()
    }

    fn next_bit(&mut self) -> bool {
        let bit = (self.bytes[self.byte_pos] >> (7 - self.bit_pos)) & 1 != 0;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        bit
    }

    pub fn read_exp_golomb(&mut self) -> CodecResult<u32> {
        let mut zeros = 0u32;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 32 {
                return Err(CodecError::Malformed("exp-golomb prefix too long".into()));
            }
        }
        let mut val1 = 1u64;
        for _ in 0..zeros {
            val1 = (val1 << 1) | (self.read_bit()? as u64);
        }
        u32::try_from(val1 - 1)
            .map_err(|_| CodecError::Malformed("exp-golomb value overflows u32".into()))
    }

    pub fn read_signed_exp_golomb(&mut self) -> CodecResult<i32> {
        let magnitude = self.read_exp_golomb()?;
        if magnitude == 0 {
            return Ok(0);
        }
        let magnitude = i32::try_from(magnitude)
            .map_err(|_| CodecError::Malformed("signed exp-golomb overflows i32".into()))?;
        Ok(if self.read_bit()? { -magnitude } else { magnitude })
    }

    pub fn byte_align(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Number of whole bytes consumed so far.
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    pub fn overrun(&self) -> usize {
        self.overrun
    }
}

/// Binary arithmetic encoder over a set of adaptive contexts.
pub struct ArithmeticEncoder {
    writer: BitWriter,
    low: u32,
    high: u32,
    underflow: u32,
    contexts: ContextSet,
    symbols: u64,
}

impl ArithmeticEncoder {
    pub fn new(num_contexts: usize) -> Self {
        Self {
            writer: BitWriter::new(),
            low: 0,
            high: CODE_MASK,
            underflow: 0,
            contexts: ContextSet::new(num_contexts),
            symbols: 0,
        }
    }

    pub fn init_contexts(&mut self) {
        self.contexts.init_contexts();
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub fn symbols_coded(&self) -> u64 {
        self.symbols
    }

    pub fn encode_symbol(&mut self, bit: bool, context_id: usize) {
        let ctx = *self.contexts.get(context_id);
        let range = self.high - self.low + 1;
        let split = range * ctx.count0() / ctx.weight();

        if bit {
            self.low += split;
        } else {
            self.high = self.low + split - 1;
        }

        loop {
            if (self.high & CODE_MSB) == (self.low & CODE_MSB) {
                let out = self.high & CODE_MSB != 0;
                self.writer.write_bit(out);
                while self.underflow > 0 {
                    self.writer.write_bit(!out);
                    self.underflow -= 1;
                }
            } else if (self.low & CODE_2ND_MSB) != 0 && (self.high & CODE_2ND_MSB) == 0 {
                self.underflow += 1;
                self.low -= CODE_2ND_MSB;
                self.high -= CODE_2ND_MSB;
            } else {
                break;
            }
            self.low = (self.low << 1) & CODE_MASK;
            self.high = ((self.high << 1) & CODE_MASK) | 1;
        }

        self.contexts.update(context_id, bit);
        self.symbols += 1;
    }

    /// Flushes the interval. A coder that saw no symbols produces no bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.symbols == 0 {
            return Vec::new();
        }
        let out = self.low & CODE_2ND_MSB != 0;
        self.writer.write_bit(out);
        self.underflow += 1;
        while self.underflow > 0 {
            self.writer.write_bit(!out);
            self.underflow -= 1;
        }
        self.writer.finish()
    }
}

/// Binary arithmetic decoder mirroring [`ArithmeticEncoder`].
pub struct ArithmeticDecoder {
    reader: BitReader,
    low: u32,
    high: u32,
    code: u32,
    contexts: ContextSet,
}

impl ArithmeticDecoder {
    pub fn new(data: Vec<u8>, num_contexts: usize) -> Self {
        let mut reader = BitReader::new(data);
        let mut code = 0u32;
        for _ in 0..CODE_BITS {
            code = (code << 1) | reader.read_bit_padded() as u32;
        }
        Self {
            reader,
            low: 0,
            high: CODE_MASK,
            code,
            contexts: ContextSet::new(num_contexts),
        }
    }

    pub fn init_contexts(&mut self) {
        self.contexts.init_contexts();
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub fn decode_symbol(&mut self, context_id: usize) -> CodecResult<bool> {
        let ctx = *self.contexts.get(context_id);
        let range = self.high - self.low + 1;
        let split = range * ctx.count0() / ctx.weight();
        let bit = self.code - self.low >= split;

        if bit {
            self.low += split;
        } else {
            self.high = self.low + split - 1;
        }

        loop {
            if (self.high & CODE_MSB) == (self.low & CODE_MSB) {
                // shift only
            } else if (self.low & CODE_2ND_MSB) != 0 && (self.high & CODE_2ND_MSB) == 0 {
                self.code -= CODE_2ND_MSB;
                self.low -= CODE_2ND_MSB;
                self.high -= CODE_2ND_MSB;
            } else {
                break;
            }
            self.low = (self.low << 1) & CODE_MASK;
            self.high = ((self.high << 1) & CODE_MASK) | 1;
            self.code = ((self.code << 1) & CODE_MASK) | self.reader.read_bit_padded() as u32;
        }

        if self.reader.overrun() > MAX_OVERRUN_BITS {
            return Err(CodecError::Truncated(format!(
                "arithmetic decoder ran {} bits past the end of its data",
                self.reader.overrun()
            )));
        }

        self.contexts.update(context_id, bit);
        Ok(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_golomb_roundtrip() {
        let mut writer = BitWriter::new();
        for v in [0u32, 1, 2, 7, 255, 65_536] {
            writer.write_exp_golomb(v);
        }
        for v in [0i32, -1, 5, -300] {
            writer.write_signed_exp_golomb(v);
        }
        let bytes = writer.finish();

        let mut reader = BitReader::new(bytes);
        for v in [0u32, 1, 2, 7, 255, 65_536] {
            assert_eq!(reader.read_exp_golomb().unwrap(), v);
        }
        for v in [0i32, -1, 5, -300] {
            assert_eq!(reader.read_signed_exp_golomb().unwrap(), v);
        }
    }

    #[test]
    fn test_reader_reports_end() {
        let mut reader = BitReader::new(vec![0xA0]);
        let bits: Vec<bool> = (0..8).map(|_| reader.read_bit().unwrap()).collect();
        assert_eq!(bits, [true, false, true, false, false, false, false, false]);
        assert!(matches!(reader.read_bit(), Err(CodecError::Truncated(_))));
        assert!(!reader.read_bit_padded());
        assert_eq!(reader.overrun(), 1);
    }

    #[test]
    fn test_single_symbols() {
        for bit in [false, true] {
            let mut enc = ArithmeticEncoder::new(1);
            enc.encode_symbol(bit, 0);
            let data = enc.finish();
            assert_eq!(data.len(), 1);

            let mut dec = ArithmeticDecoder::new(data, 1);
            assert_eq!(dec.decode_symbol(0).unwrap(), bit);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let enc = ArithmeticEncoder::new(4);
        let data = enc.finish();
        assert!(data.is_empty());
        let dec = ArithmeticDecoder::new(data, 4);
        assert_eq!(*dec.contexts().get(0), *ArithmeticEncoder::new(4).contexts().get(0));
    }

    #[test]
    fn test_mixed_contexts() {
        let symbols: Vec<(bool, usize)> = (0..2000)
            .map(|i| ((i * 7 + i / 3) % 5 == 0, i % 3))
            .collect();

        let mut enc = ArithmeticEncoder::new(3);
        for &(bit, ctx) in &symbols {
            enc.encode_symbol(bit, ctx);
        }
        let enc_contexts = enc.contexts().clone();
        let data = enc.finish();

        let mut dec = ArithmeticDecoder::new(data, 3);
        for &(bit, ctx) in &symbols {
            assert_eq!(dec.decode_symbol(ctx).unwrap(), bit);
        }
        assert_eq!(dec.contexts(), &enc_contexts);
    }

    #[test]
    fn test_skewed_source_compresses() {
        let mut enc = ArithmeticEncoder::new(1);
        for i in 0..8000 {
            enc.encode_symbol(i % 50 == 0, 0);
        }
        let data = enc.finish();
        assert!(data.len() < 8000 / 8 / 3, "got {} bytes", data.len());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut enc = ArithmeticEncoder::new(1);
        for i in 0..4000 {
            enc.encode_symbol(i % 3 == 0, 0);
        }
        let mut data = enc.finish();
        data.truncate(data.len() / 2);

        let mut dec = ArithmeticDecoder::new(data, 1);
        let result = (0..4000).try_for_each(|_| dec.decode_symbol(0).map(|_| ()));
        assert!(matches!(result, Err(CodecError::Truncated(_))));
    }
}
