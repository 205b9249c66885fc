use crate::params::{CodeBlockMode, CodingParams};

/// Smallest code-block dimension a band may be partitioned into.
pub const MIN_BLOCK_DIM: usize = 4;

/// A rectangle of coefficients sharing one quantiser index and skip flag.
///
/// Coordinates are absolute positions in the transformed plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlock {
    pub xstart: usize,
    pub ystart: usize,
    pub xend: usize,
    pub yend: usize,
    pub qindex: usize,
    pub skipped: bool,
}

impl CodeBlock {
    pub fn new(xstart: usize, ystart: usize, xend: usize, yend: usize) -> Self {
        Self {
            xstart,
            ystart,
            xend,
            yend,
            qindex: 0,
            skipped: false,
        }
    }

    pub fn width(&self) -> usize {
        self.xend - self.xstart
    }

    pub fn height(&self) -> usize {
        self.yend - self.ystart
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subband {
    xp: usize,
    yp: usize,
    xl: usize,
    yl: usize,
    depth: usize,
    weight: f64,
    parent: usize,
    children: Vec<usize>,
    pub qindex: usize,
    pub skipped: bool,
    pub multi_quants: bool,
    blocks: Vec<CodeBlock>,
    xnum: usize,
    ynum: usize,
}

impl Subband {
    pub fn new(xp: usize, yp: usize, xl: usize, yl: usize, depth: usize) -> Self {
        let mut band = Self {
            xp,
            yp,
            xl,
            yl,
            depth,
            weight: 1.0,
            parent: 0,
            children: Vec::new(),
            qindex: 0,
            skipped: false,
            multi_quants: false,
            blocks: Vec::new(),
            xnum: 0,
            ynum: 0,
        };
        band.set_num_blocks(1, 1);
        band
    }

    pub fn xp(&self) -> usize {
        self.xp
    }

    pub fn yp(&self) -> usize {
        self.yp
    }

    pub fn xl(&self) -> usize {
        self.xl
    }

    pub fn yl(&self) -> usize {
        self.yl
    }

    /// Decomposition level that produced this band, 1 being the finest.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn scale(&self) -> usize {
        1 << self.depth
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Index of the parent band, 0 for the root.
    pub fn parent(&self) -> usize {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.xp && x < self.xp + self.xl && y >= self.yp && y < self.yp + self.yl
    }

    /// Partitions the band into an `xnum` by `ynum` grid of code blocks,
    /// resetting every block's quantiser and skip flag.
    pub fn set_num_blocks(&mut self, xnum: usize, ynum: usize) {
        let max_x = (self.xl / MIN_BLOCK_DIM).max(1);
        let max_y = (self.yl / MIN_BLOCK_DIM).max(1);
        assert!(
            xnum >= 1 && ynum >= 1 && xnum <= max_x && ynum <= max_y,
            "code-block grid {}x{} exceeds {}x{} for a {}x{} band",
            xnum,
            ynum,
            max_x,
            max_y,
            self.xl,
            self.yl
        );

        let xbounds: Vec<usize> = (0..=xnum).map(|i| i * self.xl / xnum + self.xp).collect();
        let ybounds: Vec<usize> = (0..=ynum).map(|j| j * self.yl / ynum + self.yp).collect();

        self.blocks.clear();
        for j in 0..ynum {
            for i in 0..xnum {
                self.blocks.push(CodeBlock::new(
                    xbounds[i],
                    ybounds[j],
                    xbounds[i + 1],
                    ybounds[j + 1],
                ));
            }
        }
        self.xnum = xnum;
        self.ynum = ynum;
    }

    /// Grid dimensions as (horizontal, vertical).
    pub fn num_blocks(&self) -> (usize, usize) {
        (self.xnum, self.ynum)
    }

    pub fn has_multiple_blocks(&self) -> bool {
        self.blocks.len() > 1
    }

    /// Code blocks in raster order.
    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [CodeBlock] {
        &mut self.blocks
    }

    /// Sets the band quantiser and copies it to every block.
    pub fn set_qindex(&mut self, qindex: usize) {
        self.qindex = qindex;
        for block in &mut self.blocks {
            block.qindex = qindex;
        }
    }

    /// Moves the flags of a lone code block onto the band itself, since a
    /// single-block header only carries band-level skip and quantiser.
    pub fn fold_lone_block(&mut self) {
        let block = match self.blocks.as_slice() {
            [block] => *block,
            _ => return,
        };
        if block.skipped {
            self.skipped = true;
        }
        if self.multi_quants {
            self.set_qindex(block.qindex);
            self.multi_quants = false;
        }
    }
}

/// Every subband of one transformed component, addressed `1..=len()`.
///
/// Band 1 is the finest horizontal-high band and band `len()` the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubbandList {
    bands: Vec<Subband>,
    depth: usize,
}

impl SubbandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the `3 * depth + 1` bands of a `width` by `height` plane.
    pub fn init(depth: usize, width: usize, height: usize) -> Self {
        assert!(depth >= 1, "transform depth must be at least 1");
        let mut bands = Vec::with_capacity(3 * depth + 1);
        let (mut xl, mut yl) = (width, height);

        for level in 1..=depth {
            xl /= 2;
            yl /= 2;
            bands.push(Subband::new(xl, 0, xl, yl, level));
            bands.push(Subband::new(0, yl, xl, yl, level));
            bands.push(Subband::new(xl, yl, xl, yl, level));
            if level == depth {
                bands.push(Subband::new(0, 0, xl, yl, level));
            }
        }

        let mut list = Self { bands, depth };
        let root = list.len();
        for child in root - 3..root {
            list.link(root, child);
        }
        for level in 1..depth {
            for k in 1..=3 {
                list.link(3 * level + k, 3 * (level - 1) + k);
            }
        }
        list.validate();
        list
    }

    fn link(&mut self, parent: usize, child: usize) {
        self.band_mut(parent).children.push(child);
        self.band_mut(child).parent = parent;
    }

    fn validate(&self) {
        for b in 1..=self.len() {
            let band = self.band(b);
            if b == self.len() {
                assert_eq!(band.parent, 0, "root band {} has a parent", b);
            } else {
                assert!(
                    band.parent > b && band.parent <= self.len(),
                    "band {} has invalid parent {}",
                    b,
                    band.parent
                );
            }
            for &child in &band.children {
                assert!(child >= 1 && child < b, "band {} has invalid child {}", b, child);
            }
        }
    }

    pub fn clear(&mut self) {
        self.bands.clear();
        self.depth = 0;
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Index of the root (DC) band.
    pub fn root(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn band(&self, b: usize) -> &Subband {
        &self.bands[b - 1]
    }

    #[inline]
    pub fn band_mut(&mut self, b: usize) -> &mut Subband {
        &mut self.bands[b - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Subband)> {
        self.bands.iter().enumerate().map(|(i, band)| (i + 1, band))
    }

    /// Code-block level of band `b`: `depth` for the finest bands, 0 for the root.
    pub fn block_level(&self, b: usize) -> usize {
        self.depth - (b - 1) / 3
    }

    /// Imposes the per-level code-block layout, clamping each grid so no
    /// block is smaller than [`MIN_BLOCK_DIM`], and sets each band's
    /// multiple-quantiser flag.
    pub fn fold_lone_blocks(&mut self) {
        for band in &mut self.bands {
            band.fold_lone_block();
        }
    }

    pub fn apply_code_blocks(&mut self, params: &CodingParams) {
        for b in 1..=self.len() {
            let grid = params.code_block_grid(self.block_level(b));
            let band = self.band_mut(b);
            let xnum = grid.horizontal.clamp(1, (band.xl / MIN_BLOCK_DIM).max(1));
            let ynum = grid.vertical.clamp(1, (band.yl / MIN_BLOCK_DIM).max(1));
            band.set_num_blocks(xnum, ynum);
            band.multi_quants = params.code_block_mode == CodeBlockMode::QuantMultiple
                && band.has_multiple_blocks();
        }
    }
}
