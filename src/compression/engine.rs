use super::band_codec::{compress_band, decompress_band, CoderKind};
use super::plane::{PicArray, ValueType};
use super::rate::{FixedQuantiser, RateController};
use super::subband::SubbandList;
use super::wavelet::{Direction, WaveletTransform};
use crate::error::{CodecError, CodecResult};
use crate::format::ComponentPacket;
use crate::params::{CodingParams, FrameParams};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Compresses and decompresses picture components with one set of coding
/// parameters.
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    params: CodingParams,
}

impl CompressionEngine {
    pub fn new(params: CodingParams) -> Self {
        assert!(params.depth >= 1, "transform depth must be at least 1");
        Self { params }
    }

    pub fn lossless(depth: usize) -> Self {
        Self::new(CodingParams::lossless(depth))
    }

    pub fn params(&self) -> &CodingParams {
        &self.params
    }

    fn skip_fill(&self, kind: CoderKind, transform: &WaveletTransform) -> ValueType {
        if kind == CoderKind::IntraDc && self.params.fill_skipped_dc_with_mean {
            transform.mean_dc_val()
        } else {
            0
        }
    }

    /// Transforms, quantises and codes `pic`, returning its packet.
    ///
    /// Afterwards `pic` holds the decoder's reconstruction when the frame is
    /// intra, a reference, or local decoding is on; otherwise it holds the
    /// quantised coefficients.
    pub fn compress_component<R: RateController + ?Sized>(
        &self,
        pic: &mut PicArray,
        frame: &FrameParams,
        rate: &mut R,
    ) -> CodecResult<Vec<u8>> {
        let csort = pic.csort();
        let is_intra = frame.sort.is_intra();
        let mut transform = WaveletTransform::new(self.params.depth, self.params.filter);
        transform.transform(Direction::Forward, pic);

        transform.band_list_mut().apply_code_blocks(&self.params);
        transform.set_band_weights(self.params.cpd, frame, csort);

        let mut bands = std::mem::take(transform.band_list_mut());
        let num_bands = bands.len();
        if self.params.lossless {
            let mut exact = FixedQuantiser::new(0);
            for b in (1..=num_bands).rev() {
                bands.band_mut(b).multi_quants = false;
                exact.choose_quantisers(pic, &mut bands, b);
            }
        } else {
            for b in (1..=num_bands).rev() {
                rate.choose_quantisers(pic, &mut bands, b);
            }
        }
        bands.fold_lone_blocks();

        let mut payloads = vec![Vec::new(); num_bands];
        for b in (1..=num_bands).rev() {
            let kind = CoderKind::select(&bands, b, is_intra);
            let fill = self.skip_fill(kind, &transform);
            let payload = compress_band(kind, &bands, b, is_intra, fill, pic);
            let band = bands.band(b);
            debug!(
                band = b,
                coder = kind.name(),
                qindex = band.qindex,
                skipped = band.skipped,
                bytes = payload.len(),
                "coded band"
            );
            payloads[b - 1] = payload;
        }

        let packet = ComponentPacket {
            csort,
            fsort: frame.sort,
            width: pic.width(),
            height: pic.height(),
            params: self.params.clone(),
            bands,
            payloads,
        };
        let bytes = packet.to_bytes()?;

        if is_intra || frame.sort.is_ref() || self.params.local_decode {
            transform.transform(Direction::Backward, pic);
        }
        debug!(component = ?csort, bytes = bytes.len(), "compressed component");
        Ok(bytes)
    }

    /// Compresses independent components in parallel, each with its own
    /// copy of `rate`.
    pub fn compress_components<R>(
        &self,
        pics: &mut [PicArray],
        frame: &FrameParams,
        rate: &R,
    ) -> CodecResult<Vec<Vec<u8>>>
    where
        R: RateController + Clone + Send + Sync,
    {
        pics.par_iter_mut()
            .map(|pic| {
                let mut rate = rate.clone();
                self.compress_component(pic, frame, &mut rate)
            })
            .collect()
    }

    /// Parses a packet and checks it was coded with this engine's transform.
    pub fn decode_session(&self, data: &[u8]) -> CodecResult<DecodeSession> {
        let packet = ComponentPacket::from_bytes(data)?;
        if packet.params.depth != self.params.depth || packet.params.filter != self.params.filter
        {
            return Err(CodecError::ParamsMismatch(format!(
                "packet uses depth {} {:?}, decoder expects depth {} {:?}",
                packet.params.depth, packet.params.filter, self.params.depth, self.params.filter
            )));
        }
        Ok(DecodeSession::new(packet))
    }

    pub fn decompress_component(&self, data: &[u8]) -> CodecResult<PicArray> {
        let mut session = self.decode_session(data)?;
        session.decode_all()?;
        session.finish()
    }

    pub fn decompress_components(&self, packets: &[Vec<u8>]) -> CodecResult<Vec<PicArray>> {
        packets
            .par_iter()
            .map(|data| self.decompress_component(data))
            .collect()
    }
}

/// Band-at-a-time decoder for one component packet.
///
/// A band can only be decoded once its parent has been, so the usable
/// orders all start at the root.
pub struct DecodeSession {
    pic: PicArray,
    transform: WaveletTransform,
    bands: SubbandList,
    payloads: Vec<Vec<u8>>,
    decoded: Vec<bool>,
    is_intra: bool,
    fill_dc_with_mean: bool,
}

impl DecodeSession {
    pub fn new(packet: ComponentPacket) -> Self {
        let num_bands = packet.bands.len();
        Self {
            pic: PicArray::new(packet.width, packet.height, packet.csort),
            transform: WaveletTransform::new(packet.params.depth, packet.params.filter),
            bands: packet.bands,
            payloads: packet.payloads,
            decoded: vec![false; num_bands + 1],
            is_intra: packet.fsort.is_intra(),
            fill_dc_with_mean: packet.params.fill_skipped_dc_with_mean,
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &SubbandList {
        &self.bands
    }

    pub fn is_decoded(&self, band_num: usize) -> bool {
        self.decoded.get(band_num).copied().unwrap_or(false)
    }

    /// Coefficients decoded so far, in the transform domain.
    pub fn coefficients(&self) -> &PicArray {
        &self.pic
    }

    pub fn decode_band(&mut self, band_num: usize) -> CodecResult<()> {
        assert!(
            band_num >= 1 && band_num <= self.bands.len(),
            "band {} outside 1..={}",
            band_num,
            self.bands.len()
        );
        if self.decoded[band_num] {
            return Ok(());
        }

        let parent = self.bands.band(band_num).parent();
        if parent != 0 && !self.decoded[parent] {
            warn!(band = band_num, parent, "band requested before its parent");
            return Err(CodecError::ParentNotDecoded {
                band: band_num,
                parent,
            });
        }

        let kind = CoderKind::select(&self.bands, band_num, self.is_intra);
        let fill = if kind == CoderKind::IntraDc && self.fill_dc_with_mean {
            self.transform.mean_dc_val()
        } else {
            0
        };
        let payload = std::mem::take(&mut self.payloads[band_num - 1]);
        let bytes = payload.len();
        decompress_band(
            kind,
            &self.bands,
            band_num,
            self.is_intra,
            fill,
            &mut self.pic,
            payload,
        )?;
        self.decoded[band_num] = true;
        debug!(band = band_num, coder = kind.name(), bytes, "decoded band");
        Ok(())
    }

    /// Decodes every remaining band from the root down.
    pub fn decode_all(&mut self) -> CodecResult<()> {
        for b in (1..=self.bands.len()).rev() {
            self.decode_band(b)?;
        }
        Ok(())
    }

    /// Completes decoding and returns the synthesised component.
    pub fn finish(mut self) -> CodecResult<PicArray> {
        self.decode_all()?;
        self.transform.transform(Direction::Backward, &mut self.pic);
        Ok(self.pic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::wavelet::WaveletFilter;
    use crate::params::{ChromaFormat, CompSort};

    fn textured(width: usize, height: usize, csort: CompSort) -> PicArray {
        let data = (0..width * height)
            .map(|i| {
                let (x, y) = ((i % width) as ValueType, (i / width) as ValueType);
                (x * 5 + y * 3 + (x * y) % 17) % 200 - 100
            })
            .collect();
        PicArray::from_vec(data, width, height, csort)
    }

    #[test]
    fn test_lossless_roundtrip() {
        let engine = CompressionEngine::lossless(3);
        let original = textured(32, 32, CompSort::Y);
        let mut pic = original.clone();
        let frame = FrameParams::intra(ChromaFormat::Format420);
        let bytes = engine
            .compress_component(&mut pic, &frame, &mut FixedQuantiser::new(0))
            .unwrap();
        assert_eq!(pic, original);

        let decoded = engine.decompress_component(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lossy_matches_local_decode() {
        for filter in [WaveletFilter::Daub97, WaveletFilter::Filter135] {
            let params = CodingParams::lossy(2, filter).with_spatial_partition(true);
            let engine = CompressionEngine::new(params);
            let mut pic = textured(64, 32, CompSort::U);
            let frame = FrameParams::inter(ChromaFormat::Format420, true);
            let bytes = engine
                .compress_component(&mut pic, &frame, &mut FixedQuantiser::new(16).perceptual(true))
                .unwrap();

            let decoded = engine.decompress_component(&bytes).unwrap();
            assert_eq!(decoded, pic);
            assert_eq!(decoded.csort(), CompSort::U);
        }
    }

    #[test]
    fn test_out_of_order_decode_fails() {
        let engine = CompressionEngine::lossless(2);
        let mut pic = textured(16, 16, CompSort::Y);
        let frame = FrameParams::intra(ChromaFormat::Yonly);
        let bytes = engine
            .compress_component(&mut pic, &frame, &mut FixedQuantiser::new(0))
            .unwrap();

        let mut session = engine.decode_session(&bytes).unwrap();
        assert!(matches!(
            session.decode_band(1),
            Err(CodecError::ParentNotDecoded { band: 1, parent: 4 })
        ));
        assert!(matches!(
            session.decode_band(4),
            Err(CodecError::ParentNotDecoded { band: 4, parent: 7 })
        ));
        session.decode_band(7).unwrap();
        session.decode_band(4).unwrap();
        session.decode_band(1).unwrap();
        assert!(session.is_decoded(1));
        assert_eq!(session.finish().unwrap(), pic);
    }

    #[test]
    fn test_params_mismatch() {
        let engine = CompressionEngine::lossless(2);
        let mut pic = textured(16, 16, CompSort::Y);
        let bytes = engine
            .compress_component(
                &mut pic,
                &FrameParams::intra(ChromaFormat::Yonly),
                &mut FixedQuantiser::new(0),
            )
            .unwrap();
        let other = CompressionEngine::lossless(3);
        assert!(matches!(
            other.decompress_component(&bytes),
            Err(CodecError::ParamsMismatch(_))
        ));
    }

    #[test]
    fn test_parallel_components() {
        let engine = CompressionEngine::new(CodingParams::lossy(2, WaveletFilter::LeGall53));
        let mut pics = vec![
            textured(32, 32, CompSort::Y),
            textured(16, 16, CompSort::U),
            textured(16, 16, CompSort::V),
        ];
        let frame = FrameParams::intra(ChromaFormat::Format420);
        let packets = engine
            .compress_components(&mut pics, &frame, &FixedQuantiser::new(12))
            .unwrap();
        let decoded = engine.decompress_components(&packets).unwrap();
        assert_eq!(decoded, pics);
    }

    #[test]
    fn test_skipped_dc_filled_with_mean() {
        let mut params = CodingParams::lossy(1, WaveletFilter::Daub97);
        params.fill_skipped_dc_with_mean = true;
        let engine = CompressionEngine::new(params);
        let mut pic = PicArray::new(8, 8, CompSort::Y);
        let frame = FrameParams::intra(ChromaFormat::Yonly);
        let bytes = engine
            .compress_component(&mut pic, &frame, &mut FixedQuantiser::new(0))
            .unwrap();

        let mut session = engine.decode_session(&bytes).unwrap();
        assert!(session.bands().band(4).skipped);
        session.decode_all().unwrap();
        assert_eq!(session.coefficients()[(0, 0)], 775);
        assert_eq!(session.coefficients()[(3, 3)], 775);
        assert_eq!(session.finish().unwrap(), pic);
    }
}
