use super::band_header::SubbandHeader;
use crate::compression::arithmetic_coder::{BitReader, BitWriter};
use crate::compression::subband::SubbandList;
use crate::error::{CodecError, CodecResult};
use crate::params::{CodingParams, CompSort, FrameSort};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, ErrorKind};

/// Deepest transform a packet may declare.
pub const MAX_DEPTH: usize = 16;

/// Largest component a packet may declare, in samples.
pub const MAX_SAMPLES: usize = 1 << 26;

/// Coded form of one picture component.
///
/// Layout: component byte, frame-sort byte, u32 width, u32 height, u32
/// length and the bincode parameter block, one unit per band from the root
/// down to band 1, then a CRC32 of everything before it. A band unit is its
/// byte-aligned bit header, a u32 payload length and the payload.
#[derive(Debug, Clone)]
pub struct ComponentPacket {
    pub csort: CompSort,
    pub fsort: FrameSort,
    pub width: usize,
    pub height: usize,
    pub params: CodingParams,
    /// Band list carrying the skip flags and quantisers of every band.
    pub bands: SubbandList,
    /// Arithmetic payload of band `b`, stored at `b - 1`.
    pub payloads: Vec<Vec<u8>>,
}

impl ComponentPacket {
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u8(self.csort as u8)?;
        out.write_u8(self.fsort as u8)?;
        out.write_u32::<LittleEndian>(self.width as u32)?;
        out.write_u32::<LittleEndian>(self.height as u32)?;

        let params = self.params.encode()?;
        out.write_u32::<LittleEndian>(params.len() as u32)?;
        out.extend_from_slice(&params);

        for b in (1..=self.bands.len()).rev() {
            let mut writer = BitWriter::new();
            SubbandHeader::from_band(self.bands.band(b)).write(&mut writer);
            out.extend_from_slice(&writer.finish());

            let payload = &self.payloads[b - 1];
            out.write_u32::<LittleEndian>(payload.len() as u32)?;
            out.extend_from_slice(payload);
        }

        let crc = crc32fast::hash(&out);
        out.write_u32::<LittleEndian>(crc)?;
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> CodecResult<Self> {
        if data.len() < 4 {
            return Err(CodecError::Truncated("component packet too short".into()));
        }
        let (body, tail) = data.split_at(data.len() - 4);
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CodecError::CrcMismatch { expected, actual });
        }

        let mut cursor = Cursor::new(body);
        let csort = CompSort::from_u8(read_u8(&mut cursor)?)?;
        let fsort = FrameSort::from_u8(read_u8(&mut cursor)?)?;
        let width = read_u32(&mut cursor)? as usize;
        let height = read_u32(&mut cursor)? as usize;

        let params_len = read_u32(&mut cursor)? as usize;
        let params = CodingParams::decode(take(&mut cursor, params_len)?)?;
        check_geometry(&params, width, height)?;

        let mut bands = SubbandList::init(params.depth, width, height);
        bands.apply_code_blocks(&params);
        let mut payloads = vec![Vec::new(); bands.len()];

        for b in (1..=bands.len()).rev() {
            let num_blocks = bands.band(b).blocks().len();
            let start = cursor.position() as usize;
            // a header never exceeds two bytes plus two per block
            let window_end = body.len().min(start + 8 + 4 * num_blocks);
            let mut reader = BitReader::new(body[start..window_end].to_vec());
            let header = SubbandHeader::read(&mut reader, num_blocks)?;
            reader.byte_align();
            cursor.set_position((start + reader.byte_position()) as u64);
            header.apply(bands.band_mut(b))?;

            let len = read_u32(&mut cursor)? as usize;
            payloads[b - 1] = take(&mut cursor, len)?.to_vec();
        }

        if (cursor.position() as usize) != body.len() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after the last band",
                body.len() - cursor.position() as usize
            )));
        }

        Ok(Self {
            csort,
            fsort,
            width,
            height,
            params,
            bands,
            payloads,
        })
    }
}

fn check_geometry(params: &CodingParams, width: usize, height: usize) -> CodecResult<()> {
    if params.depth == 0 || params.depth > MAX_DEPTH {
        return Err(CodecError::Malformed(format!(
            "transform depth {} outside 1..={}",
            params.depth, MAX_DEPTH
        )));
    }
    let unit = 1usize << params.depth;
    if width == 0 || height == 0 || width % unit != 0 || height % unit != 0 {
        return Err(CodecError::Malformed(format!(
            "{}x{} component is not divisible by 2^{}",
            width, height, params.depth
        )));
    }
    if width
        .checked_mul(height)
        .map_or(true, |samples| samples > MAX_SAMPLES)
    {
        return Err(CodecError::Malformed(format!(
            "{}x{} component exceeds {} samples",
            width, height, MAX_SAMPLES
        )));
    }
    Ok(())
}

fn truncated(e: std::io::Error) -> CodecError {
    if e.kind() == ErrorKind::UnexpectedEof {
        CodecError::Truncated("component packet ended early".into())
    } else {
        CodecError::Io(e)
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> CodecResult<u8> {
    cursor.read_u8().map_err(truncated)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> CodecResult<u32> {
    cursor.read_u32::<LittleEndian>().map_err(truncated)
}

fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> CodecResult<&'a [u8]> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| CodecError::Truncated(format!("{} byte field overruns packet", len)))?;
    cursor.set_position(end as u64);
    Ok(&data[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::wavelet::WaveletFilter;
    use crate::params::CodeBlockMode;

    fn sample_packet() -> ComponentPacket {
        let params = CodingParams::lossy(2, WaveletFilter::LeGall53)
            .with_spatial_partition(true)
            .with_code_block_mode(CodeBlockMode::QuantMultiple);
        let mut bands = SubbandList::init(2, 32, 32);
        bands.apply_code_blocks(&params);
        bands.band_mut(3).skipped = true;
        bands.band_mut(1).set_qindex(12);
        bands.band_mut(1).blocks_mut()[1].qindex = 15;
        bands.band_mut(1).blocks_mut()[2].skipped = true;

        let payloads = (1..=bands.len()).map(|b| vec![b as u8; b]).collect();
        ComponentPacket {
            csort: CompSort::U,
            fsort: FrameSort::InterRef,
            width: 32,
            height: 32,
            params,
            bands,
            payloads,
        }
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = sample_packet();
        let bytes = packet.to_bytes().unwrap();
        let parsed = ComponentPacket::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.csort, CompSort::U);
        assert_eq!(parsed.fsort, FrameSort::InterRef);
        assert_eq!(parsed.params, packet.params);
        assert_eq!(parsed.payloads, packet.payloads);
        assert!(parsed.bands.band(3).skipped);
        let band1 = parsed.bands.band(1);
        assert!(band1.multi_quants);
        assert_eq!(band1.blocks()[1].qindex, 15);
        assert!(band1.blocks()[2].skipped);
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = sample_packet().to_bytes().unwrap();
        bytes[12] ^= 0x40;
        assert!(matches!(
            ComponentPacket::from_bytes(&bytes),
            Err(CodecError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_short_packet() {
        assert!(matches!(
            ComponentPacket::from_bytes(&[1, 2]),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn test_oversized_component_rejected() {
        let params = CodingParams::lossless(2).encode().unwrap();
        let mut bytes = vec![CompSort::Y as u8, FrameSort::Intra as u8];
        bytes.write_u32::<LittleEndian>(1 << 31).unwrap();
        bytes.write_u32::<LittleEndian>(1 << 31).unwrap();
        bytes.write_u32::<LittleEndian>(params.len() as u32).unwrap();
        bytes.extend_from_slice(&params);
        let crc = crc32fast::hash(&bytes);
        bytes.write_u32::<LittleEndian>(crc).unwrap();

        assert!(matches!(
            ComponentPacket::from_bytes(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }
}
