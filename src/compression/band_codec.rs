use super::arithmetic_coder::{ArithmeticDecoder, ArithmeticEncoder};
use super::plane::{PicArray, ValueType};
use super::quantizer::Quantizer;
use super::subband::{CodeBlock, Subband, SubbandList};
use crate::error::{CodecError, CodecResult};
use crate::params::CompSort;
use tracing::trace;

/// Context ids used by the coefficient coders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BandContext {
    Sign0 = 0,
    SignPos,
    SignNeg,
    ZFbin1z,
    ZFbin1nz,
    ZFbin2,
    ZFbin3,
    ZFbin4,
    ZFbin5,
    ZFbin6plus,
    NzFbin1z,
    NzFbin1nz,
    NzFbin2,
    NzFbin3,
    NzFbin4,
    NzFbin5,
    NzFbin6plus,
}

pub const TOTAL_COEFF_CTXS: usize = 17;

/// Largest magnitude index a decoder accepts before calling the data corrupt.
pub const MAX_MAGNITUDE_INDEX: u32 = 1 << 24;

impl BandContext {
    #[inline]
    pub fn id(self) -> usize {
        self as usize
    }

    fn for_sign(value: ValueType) -> Self {
        match value.signum() {
            1 => Self::SignPos,
            -1 => Self::SignNeg,
            _ => Self::Sign0,
        }
    }

    /// Context for unary bin `bin` (1-based) of a magnitude.
    pub fn follow(bin: u32, parent_notzero: bool, nhood_nonzero: bool) -> Self {
        use BandContext::*;
        if parent_notzero {
            match bin {
                1 if nhood_nonzero => NzFbin1nz,
                1 => NzFbin1z,
                2 => NzFbin2,
                3 => NzFbin3,
                4 => NzFbin4,
                5 => NzFbin5,
                _ => NzFbin6plus,
            }
        } else {
            match bin {
                1 if nhood_nonzero => ZFbin1nz,
                1 => ZFbin1z,
                2 => ZFbin2,
                3 => ZFbin3,
                4 => ZFbin4,
                5 => ZFbin5,
                _ => ZFbin6plus,
            }
        }
    }
}

/// Position and extent of a band inside the transformed plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub xp: usize,
    pub yp: usize,
    pub xl: usize,
    pub yl: usize,
}

impl Region {
    pub fn of(band: &Subband) -> Self {
        Self {
            xp: band.xp(),
            yp: band.yp(),
            xl: band.xl(),
            yl: band.yl(),
        }
    }
}

/// Whether any causal neighbour (left, up, up-left) inside `region` is
/// non-zero. `plane` is indexed with coordinates offset by `origin`.
fn causal_nhood_nonzero(
    plane: &PicArray,
    region: Region,
    origin: (usize, usize),
    x: usize,
    y: usize,
) -> bool {
    let (px, py) = (x - origin.0, y - origin.1);
    let mut sum = 0u64;
    if y > region.yp {
        sum += plane[(py - 1, px)].unsigned_abs() as u64;
        if x > region.xp {
            sum += plane[(py - 1, px - 1)].unsigned_abs() as u64;
        }
    }
    if x > region.xp {
        sum += plane[(py, px - 1)].unsigned_abs() as u64;
    }
    sum != 0
}

/// Sign context from the previously coded neighbour along the direction a
/// band's coefficients are correlated in.
fn oriented_sign_context(region: Region, data: &PicArray, x: usize, y: usize) -> BandContext {
    match (region.xp != 0, region.yp != 0) {
        (true, false) if y > region.yp => BandContext::for_sign(data[(y - 1, x)]),
        (false, true) if x > region.xp => BandContext::for_sign(data[(y, x - 1)]),
        _ => BandContext::Sign0,
    }
}

/// Context selection and prediction for one flavour of band coder.
///
/// The shared unary/sign protocol lives in [`BandCodec`]; implementors only
/// answer questions about the neighbourhood of the coefficient being coded.
pub trait ContextPolicy {
    const NAME: &'static str;

    fn new(bands: &SubbandList, band_num: usize) -> Self;

    fn parent_notzero(&self, data: &PicArray, x: usize, y: usize) -> bool;

    fn nhood_nonzero(&self, data: &PicArray, x: usize, y: usize) -> bool;

    fn choose_sign_context(&self, data: &PicArray, x: usize, y: usize) -> BandContext;

    fn choose_follow_context(
        &self,
        bin: u32,
        parent_notzero: bool,
        nhood_nonzero: bool,
    ) -> BandContext {
        BandContext::follow(bin, parent_notzero, nhood_nonzero)
    }

    /// Value subtracted before coding and added back after reconstruction.
    fn predict(&self, _data: &PicArray, _x: usize, _y: usize) -> ValueType {
        0
    }

    fn record_residual(&mut self, _x: usize, _y: usize, _residual: ValueType) {}
}

/// Ordinary high-frequency bands, with a co-located parent coefficient.
pub struct GeneralPolicy {
    region: Region,
    parent: Region,
}

impl ContextPolicy for GeneralPolicy {
    const NAME: &'static str = "general";

    fn new(bands: &SubbandList, band_num: usize) -> Self {
        let node = bands.band(band_num);
        let parent = node.parent();
        assert!(parent != 0, "band {} has no parent", band_num);
        Self {
            region: Region::of(node),
            parent: Region::of(bands.band(parent)),
        }
    }

    #[inline]
    fn parent_notzero(&self, data: &PicArray, x: usize, y: usize) -> bool {
        let px = ((x - self.region.xp) >> 1) + self.parent.xp;
        let py = ((y - self.region.yp) >> 1) + self.parent.yp;
        data[(py, px)] != 0
    }

    #[inline]
    fn nhood_nonzero(&self, data: &PicArray, x: usize, y: usize) -> bool {
        causal_nhood_nonzero(data, self.region, (0, 0), x, y)
    }

    fn choose_sign_context(&self, data: &PicArray, x: usize, y: usize) -> BandContext {
        oriented_sign_context(self.region, data, x, y)
    }
}

/// Bands adjacent to the root, coded from neighbours only.
pub struct LowFreqPolicy {
    region: Region,
}

impl ContextPolicy for LowFreqPolicy {
    const NAME: &'static str = "low-freq";

    fn new(bands: &SubbandList, band_num: usize) -> Self {
        Self {
            region: Region::of(bands.band(band_num)),
        }
    }

    fn parent_notzero(&self, _data: &PicArray, _x: usize, _y: usize) -> bool {
        false
    }

    #[inline]
    fn nhood_nonzero(&self, data: &PicArray, x: usize, y: usize) -> bool {
        causal_nhood_nonzero(data, self.region, (0, 0), x, y)
    }

    fn choose_sign_context(&self, data: &PicArray, x: usize, y: usize) -> BandContext {
        oriented_sign_context(self.region, data, x, y)
    }
}

/// Root band of an intra picture: each value is predicted from its decoded
/// neighbours and the residual is coded.
pub struct IntraDcPolicy {
    region: Region,
    residuals: PicArray,
}

impl ContextPolicy for IntraDcPolicy {
    const NAME: &'static str = "intra-dc";

    fn new(bands: &SubbandList, band_num: usize) -> Self {
        let node = bands.band(band_num);
        Self {
            region: Region::of(node),
            residuals: PicArray::new(node.xl(), node.yl(), CompSort::Y),
        }
    }

    fn parent_notzero(&self, _data: &PicArray, _x: usize, _y: usize) -> bool {
        false
    }

    #[inline]
    fn nhood_nonzero(&self, _data: &PicArray, x: usize, y: usize) -> bool {
        causal_nhood_nonzero(
            &self.residuals,
            self.region,
            (self.region.xp, self.region.yp),
            x,
            y,
        )
    }

    fn choose_sign_context(&self, _data: &PicArray, _x: usize, _y: usize) -> BandContext {
        BandContext::Sign0
    }

    fn predict(&self, data: &PicArray, x: usize, y: usize) -> ValueType {
        let (left, up) = (x > self.region.xp, y > self.region.yp);
        match (left, up) {
            (true, true) => {
                let sum = data[(y, x - 1)] as i64
                    + data[(y - 1, x - 1)] as i64
                    + data[(y - 1, x)] as i64;
                (sum / 3) as ValueType
            }
            (false, true) => data[(y - 1, x)],
            (true, false) => data[(y, x - 1)],
            (false, false) => 0,
        }
    }

    fn record_residual(&mut self, x: usize, y: usize, residual: ValueType) {
        self.residuals[(y - self.region.yp, x - self.region.xp)] = residual;
    }
}

/// Which policy codes a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderKind {
    General,
    LowFreq,
    IntraDc,
}

impl CoderKind {
    /// The root and its three children use the neighbour-only coders; the
    /// intra root uses DC prediction.
    pub fn select(bands: &SubbandList, band_num: usize, is_intra: bool) -> Self {
        let n = bands.len();
        if band_num + 3 >= n {
            if is_intra && band_num == n {
                Self::IntraDc
            } else {
                Self::LowFreq
            }
        } else {
            Self::General
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::General => GeneralPolicy::NAME,
            Self::LowFreq => LowFreqPolicy::NAME,
            Self::IntraDc => IntraDcPolicy::NAME,
        }
    }
}

/// Codes the coefficients of one band with a fresh set of contexts.
pub struct BandCodec<P: ContextPolicy> {
    band_num: usize,
    node: Subband,
    policy: P,
    is_intra: bool,
    skip_fill: ValueType,
}

impl<P: ContextPolicy> BandCodec<P> {
    pub fn new(bands: &SubbandList, band_num: usize, is_intra: bool) -> Self {
        Self {
            band_num,
            node: bands.band(band_num).clone(),
            policy: P::new(bands, band_num),
            is_intra,
            skip_fill: 0,
        }
    }

    /// Value written into skipped regions instead of zero.
    pub fn with_skip_fill(mut self, value: ValueType) -> Self {
        self.skip_fill = value;
        self
    }

    fn block_quantizer(&self, block: &CodeBlock) -> Quantizer {
        let qindex = if self.node.multi_quants {
            block.qindex
        } else {
            self.node.qindex
        };
        Quantizer::new(qindex, self.is_intra)
    }

    fn fill(&self, data: &mut PicArray, x0: usize, y0: usize, x1: usize, y1: usize) {
        data.fill_rect(x0, y0, x1, y1, self.skip_fill);
    }

    /// Quantises and codes the band, leaving reconstructed values in `data`.
    /// Returns the arithmetic-coded payload, empty when nothing was coded.
    pub fn compress(&mut self, data: &mut PicArray) -> Vec<u8> {
        let node = Region::of(&self.node);
        if self.node.skipped {
            self.fill(data, node.xp, node.yp, node.xp + node.xl, node.yp + node.yl);
            return Vec::new();
        }

        let mut encoder = ArithmeticEncoder::new(TOTAL_COEFF_CTXS);
        let blocks = self.node.blocks().to_vec();
        for block in &blocks {
            if block.skipped {
                trace!(band = self.band_num, x = block.xstart, y = block.ystart, "skipped block");
                self.fill(data, block.xstart, block.ystart, block.xend, block.yend);
                continue;
            }
            let quant = self.block_quantizer(block);
            for y in block.ystart..block.yend {
                for x in block.xstart..block.xend {
                    self.code_val(&mut encoder, data, &quant, x, y);
                }
            }
        }
        trace!(band = self.band_num, symbols = encoder.symbols_coded(), "band symbols");
        encoder.finish()
    }

    fn code_val(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        data: &mut PicArray,
        quant: &Quantizer,
        x: usize,
        y: usize,
    ) {
        let prediction = self.policy.predict(data, x, y);
        let parent_notzero = self.policy.parent_notzero(data, x, y);
        let nhood_nonzero = self.policy.nhood_nonzero(data, x, y);

        let val = data[(y, x)] - prediction;
        let index = quant.quantize(val);

        for bin in 1..=index {
            let ctx = self.policy.choose_follow_context(bin, parent_notzero, nhood_nonzero);
            encoder.encode_symbol(false, ctx.id());
        }
        let ctx = self
            .policy
            .choose_follow_context(index + 1, parent_notzero, nhood_nonzero);
        encoder.encode_symbol(true, ctx.id());

        let mut recon = 0;
        if index != 0 {
            let sign_ctx = self.policy.choose_sign_context(data, x, y);
            encoder.encode_symbol(val > 0, sign_ctx.id());
            // only samples near the i32 limits can miss the range
            let mag = quant.dequantize(index).unwrap_or(ValueType::MAX);
            recon = if val > 0 { mag } else { -mag };
        }

        self.policy.record_residual(x, y, recon);
        data[(y, x)] = recon + prediction;
    }

    /// Decodes the band from `payload` into `data`.
    pub fn decompress(&mut self, data: &mut PicArray, payload: Vec<u8>) -> CodecResult<()> {
        let node = Region::of(&self.node);
        if self.node.skipped {
            self.fill(data, node.xp, node.yp, node.xp + node.xl, node.yp + node.yl);
            return Ok(());
        }

        let mut decoder = ArithmeticDecoder::new(payload, TOTAL_COEFF_CTXS);
        let blocks = self.node.blocks().to_vec();
        for block in &blocks {
            if block.skipped {
                self.fill(data, block.xstart, block.ystart, block.xend, block.yend);
                continue;
            }
            let quant = self.block_quantizer(block);
            for y in block.ystart..block.yend {
                for x in block.xstart..block.xend {
                    self.decode_val(&mut decoder, data, &quant, x, y)?;
                }
            }
        }
        Ok(())
    }

    fn decode_val(
        &mut self,
        decoder: &mut ArithmeticDecoder,
        data: &mut PicArray,
        quant: &Quantizer,
        x: usize,
        y: usize,
    ) -> CodecResult<()> {
        let prediction = self.policy.predict(data, x, y);
        let parent_notzero = self.policy.parent_notzero(data, x, y);
        let nhood_nonzero = self.policy.nhood_nonzero(data, x, y);

        let mut index = 0u32;
        loop {
            let ctx = self
                .policy
                .choose_follow_context(index + 1, parent_notzero, nhood_nonzero);
            if decoder.decode_symbol(ctx.id())? {
                break;
            }
            index += 1;
            if index > MAX_MAGNITUDE_INDEX {
                return Err(CodecError::Malformed(format!(
                    "band {} coefficient at ({}, {}) exceeds the magnitude limit",
                    self.band_num, x, y
                )));
            }
        }

        let mut recon = 0;
        if index != 0 {
            let sign_ctx = self.policy.choose_sign_context(data, x, y);
            let mag = quant
                .dequantize(index)
                .ok_or_else(|| self.out_of_range(x, y))?;
            recon = if decoder.decode_symbol(sign_ctx.id())? {
                mag
            } else {
                -mag
            };
        }

        self.policy.record_residual(x, y, recon);
        data[(y, x)] = recon
            .checked_add(prediction)
            .ok_or_else(|| self.out_of_range(x, y))?;
        Ok(())
    }

    fn out_of_range(&self, x: usize, y: usize) -> CodecError {
        CodecError::Malformed(format!(
            "band {} coefficient at ({}, {}) does not fit a sample",
            self.band_num, x, y
        ))
    }
}

/// Codes band `band_num` with the coder `kind` selects.
pub fn compress_band(
    kind: CoderKind,
    bands: &SubbandList,
    band_num: usize,
    is_intra: bool,
    skip_fill: ValueType,
    data: &mut PicArray,
) -> Vec<u8> {
    match kind {
        CoderKind::General => BandCodec::<GeneralPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .compress(data),
        CoderKind::LowFreq => BandCodec::<LowFreqPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .compress(data),
        CoderKind::IntraDc => BandCodec::<IntraDcPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .compress(data),
    }
}

pub fn decompress_band(
    kind: CoderKind,
    bands: &SubbandList,
    band_num: usize,
    is_intra: bool,
    skip_fill: ValueType,
    data: &mut PicArray,
    payload: Vec<u8>,
) -> CodecResult<()> {
    match kind {
        CoderKind::General => BandCodec::<GeneralPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .decompress(data, payload),
        CoderKind::LowFreq => BandCodec::<LowFreqPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .decompress(data, payload),
        CoderKind::IntraDc => BandCodec::<IntraDcPolicy>::new(bands, band_num, is_intra)
            .with_skip_fill(skip_fill)
            .decompress(data, payload),
    }
}
