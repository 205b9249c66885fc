use crate::compression::wavelet::WaveletFilter;
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompSort {
    Y = 0,
    U = 1,
    V = 2,
}

impl CompSort {
    pub fn from_u8(v: u8) -> CodecResult<Self> {
        match v {
            0 => Ok(Self::Y),
            1 => Ok(Self::U),
            2 => Ok(Self::V),
            _ => Err(CodecError::Malformed(format!("Unknown component: {}", v))),
        }
    }

    pub fn is_chroma(&self) -> bool {
        !matches!(self, Self::Y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameSort {
    Intra = 0,
    InterRef = 1,
    InterNonRef = 2,
}

impl FrameSort {
    pub fn from_u8(v: u8) -> CodecResult<Self> {
        match v {
            0 => Ok(Self::Intra),
            1 => Ok(Self::InterRef),
            2 => Ok(Self::InterNonRef),
            _ => Err(CodecError::Malformed(format!("Unknown frame sort: {}", v))),
        }
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, Self::Intra)
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Intra | Self::InterRef)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaFormat {
    Yonly,
    Format444,
    Format422,
    #[default]
    Format420,
    Format411,
}

impl ChromaFormat {
    /// Horizontal and vertical chroma subsampling factors.
    pub fn chroma_factors(&self) -> (f64, f64) {
        match self {
            Self::Format422 => (2.0, 1.0),
            Self::Format411 => (4.0, 1.0),
            Self::Format420 => (2.0, 2.0),
            Self::Yonly | Self::Format444 => (1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameParams {
    pub sort: FrameSort,
    pub chroma: ChromaFormat,
}

impl FrameParams {
    pub fn intra(chroma: ChromaFormat) -> Self {
        Self {
            sort: FrameSort::Intra,
            chroma,
        }
    }

    pub fn inter(chroma: ChromaFormat, is_ref: bool) -> Self {
        Self {
            sort: if is_ref {
                FrameSort::InterRef
            } else {
                FrameSort::InterNonRef
            },
            chroma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlockGrid {
    pub horizontal: usize,
    pub vertical: usize,
}

impl CodeBlockGrid {
    pub const fn new(horizontal: usize, vertical: usize) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

impl Default for CodeBlockGrid {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodeBlockMode {
    #[default]
    QuantSingle,
    QuantMultiple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingParams {
    pub depth: usize,
    pub filter: WaveletFilter,
    /// Viewing resolution in cycles per degree; zero disables perceptual weighting.
    pub cpd: f32,
    pub chroma: ChromaFormat,
    /// Code-block grid per level, stored at `level - 1`. Level `depth` holds
    /// the finest bands, level 1 the bands beside the root.
    pub code_blocks: Vec<CodeBlockGrid>,
    pub code_block_mode: CodeBlockMode,
    pub lossless: bool,
    pub local_decode: bool,
    pub fill_skipped_dc_with_mean: bool,
}

impl Default for CodingParams {
    fn default() -> Self {
        Self {
            depth: 4,
            filter: WaveletFilter::Daub97,
            cpd: 20.0,
            chroma: ChromaFormat::Format420,
            code_blocks: vec![CodeBlockGrid::default(); 4],
            code_block_mode: CodeBlockMode::QuantSingle,
            lossless: false,
            local_decode: true,
            fill_skipped_dc_with_mean: false,
        }
    }
}

impl CodingParams {
    pub fn lossless(depth: usize) -> Self {
        Self {
            depth,
            filter: WaveletFilter::LeGall53,
            cpd: 0.0,
            code_blocks: vec![CodeBlockGrid::default(); depth],
            lossless: true,
            ..Self::default()
        }
    }

    pub fn lossy(depth: usize, filter: WaveletFilter) -> Self {
        Self {
            depth,
            filter,
            code_blocks: vec![CodeBlockGrid::default(); depth],
            ..Self::default()
        }
    }

    /// Uses a spatially partitioned layout; the finer levels get more blocks.
    pub fn with_spatial_partition(mut self, multi_quants: bool) -> Self {
        self.code_blocks = (1..=self.depth)
            .map(|level| match level {
                1 => CodeBlockGrid::new(1, 1),
                2 => CodeBlockGrid::new(8, 6),
                _ => CodeBlockGrid::new(12, 8),
            })
            .collect();
        self.code_block_mode = if multi_quants {
            CodeBlockMode::QuantMultiple
        } else {
            CodeBlockMode::QuantSingle
        };
        self
    }

    pub fn with_code_blocks(mut self, grids: Vec<CodeBlockGrid>) -> Self {
        self.code_blocks = grids;
        self
    }

    pub fn with_code_block_mode(mut self, mode: CodeBlockMode) -> Self {
        self.code_block_mode = mode;
        self
    }

    pub fn with_cpd(mut self, cpd: f32) -> Self {
        self.cpd = cpd;
        self
    }

    /// Grid for a transform level, defaulting to a single block.
    pub fn code_block_grid(&self, level: usize) -> CodeBlockGrid {
        level
            .checked_sub(1)
            .and_then(|i| self.code_blocks.get(i))
            .copied()
            .unwrap_or_default()
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CodecError::Params(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        bincode::deserialize(data).map_err(|e| CodecError::Params(e.to_string()))
    }
}
