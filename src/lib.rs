pub mod compression;
pub mod error;
pub mod format;
pub mod params;

pub use compression::{
    CompressionEngine, DecodeSession, Direction, FixedQuantiser, PicArray, RateController,
    SubbandList, WaveletFilter, WaveletTransform,
};
pub use error::{CodecError, CodecResult};
pub use format::ComponentPacket;
pub use params::{
    ChromaFormat, CodeBlockGrid, CodeBlockMode, CodingParams, CompSort, FrameParams, FrameSort,
};

pub const VERSION: &str = "0.4.0";
