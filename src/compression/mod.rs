pub mod arithmetic_coder;
pub mod band_codec;
pub mod context_model;
pub mod engine;
pub mod plane;
pub mod quantizer;
pub mod rate;
pub mod subband;
pub mod wavelet;

pub use arithmetic_coder::{ArithmeticDecoder, ArithmeticEncoder, BitReader, BitWriter};
pub use band_codec::{
    compress_band, decompress_band, BandCodec, BandContext, CoderKind, ContextPolicy,
    GeneralPolicy, IntraDcPolicy, LowFreqPolicy, TOTAL_COEFF_CTXS,
};
pub use context_model::{Context, ContextSet, CONTEXT_WEIGHT_LIMIT};
pub use engine::{CompressionEngine, DecodeSession};
pub use plane::{PicArray, ValueType};
pub use quantizer::{QuantEntry, Quantizer, QuantiserTable, MAX_QINDEX, QUANTISER_TABLE};
pub use rate::{FixedQuantiser, RateController};
pub use subband::{CodeBlock, Subband, SubbandList};
pub use wavelet::{Direction, WaveletFilter, WaveletTransform};
