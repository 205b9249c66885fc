use super::plane::{PicArray, ValueType};
use super::subband::SubbandList;
use crate::params::{CompSort, FrameParams};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Lifting filter kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveletFilter {
    /// Daubechies 9/7 biorthogonal filter.
    #[default]
    Daub97,
    /// LeGall 5/3, the low-complexity reversible filter.
    LeGall53,
    /// 13/5 filter with 4-tap predict and update.
    Filter135,
    /// Fixed-point approximation of the 9/7 filter.
    Approx97,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parity {
    Even,
    Odd,
}

/// One lifting stage: every sample of `target` parity has `delta(s1, s3)`
/// added to it, where `s1` and `s3` are the sums of the opposite-parity
/// samples one and three positions away.
#[derive(Clone, Copy)]
struct LiftingStage {
    target: Parity,
    delta: fn(i64, i64) -> i64,
}

fn daub97_predict1(s1: i64, _: i64) -> i64 {
    -((6497 * s1) >> 12)
}

fn daub97_update1(s1: i64, _: i64) -> i64 {
    -((217 * s1) >> 12)
}

fn daub97_predict2(s1: i64, _: i64) -> i64 {
    (3616 * s1) >> 12
}

fn daub97_update2(s1: i64, _: i64) -> i64 {
    (1817 * s1) >> 12
}

fn legall_predict(s1: i64, _: i64) -> i64 {
    -((s1 + 1) >> 1)
}

fn legall_update(s1: i64, _: i64) -> i64 {
    (s1 + 2) >> 2
}

fn four_tap_predict(s1: i64, s3: i64) -> i64 {
    -((9 * s1 - s3 + 8) >> 4)
}

fn four_tap_update(s1: i64, s3: i64) -> i64 {
    (9 * s1 - s3 + 16) >> 5
}

const DAUB97_STAGES: [LiftingStage; 4] = [
    LiftingStage {
        target: Parity::Odd,
        delta: daub97_predict1,
    },
    LiftingStage {
        target: Parity::Even,
        delta: daub97_update1,
    },
    LiftingStage {
        target: Parity::Odd,
        delta: daub97_predict2,
    },
    LiftingStage {
        target: Parity::Even,
        delta: daub97_update2,
    },
];

const LEGALL53_STAGES: [LiftingStage; 2] = [
    LiftingStage {
        target: Parity::Odd,
        delta: legall_predict,
    },
    LiftingStage {
        target: Parity::Even,
        delta: legall_update,
    },
];

const APPROX97_STAGES: [LiftingStage; 2] = [
    LiftingStage {
        target: Parity::Odd,
        delta: four_tap_predict,
    },
    LiftingStage {
        target: Parity::Even,
        delta: legall_update,
    },
];

const FILTER135_STAGES: [LiftingStage; 2] = [
    LiftingStage {
        target: Parity::Odd,
        delta: four_tap_predict,
    },
    LiftingStage {
        target: Parity::Even,
        delta: four_tap_update,
    },
];

const DAUB97_MEAN_DC: [ValueType; 6] = [775, 1174, 1778, 2692, 4074, 6165];

impl WaveletFilter {
    fn stages(&self) -> &'static [LiftingStage] {
        match self {
            Self::Daub97 => &DAUB97_STAGES,
            Self::LeGall53 => &LEGALL53_STAGES,
            Self::Approx97 => &APPROX97_STAGES,
            Self::Filter135 => &FILTER135_STAGES,
        }
    }

    /// Gain of the low-pass branch of one filter pass.
    pub fn low_factor(&self) -> f64 {
        match self {
            Self::Daub97 | Self::Approx97 => 1.149604398,
            Self::LeGall53 => 1.5,
            Self::Filter135 => 1.32867759,
        }
    }

    /// Gain of the high-pass branch of one filter pass.
    pub fn high_factor(&self) -> f64 {
        match self {
            Self::Daub97 | Self::Approx97 => 0.869864452,
            Self::LeGall53 => 0.75,
            Self::Filter135 => 0.819043889,
        }
    }

    /// Typical root-band value of a mid-grey intra picture after `depth`
    /// levels, used to fill a skipped intra DC band.
    pub fn mean_dc_val(&self, depth: usize) -> ValueType {
        match self {
            Self::Daub97 => depth
                .checked_sub(1)
                .and_then(|i| DAUB97_MEAN_DC.get(i))
                .copied()
                .unwrap_or(512),
            _ => 512,
        }
    }

    /// Multiplicative effect of `depth` levels of 2-D low-pass filtering on
    /// a constant signal.
    pub fn dc_gain(&self, depth: usize) -> f64 {
        match self {
            Self::Daub97 => 1.2302f64.powi(2 * depth as i32),
            _ => 1.0,
        }
    }

    /// Runs every lifting stage over an interleaved line of even length.
    fn lift(&self, line: &mut [ValueType], direction: Direction) {
        match direction {
            Direction::Forward => {
                for stage in self.stages() {
                    apply_stage(line, stage, 1);
                }
            }
            Direction::Backward => {
                for stage in self.stages().iter().rev() {
                    apply_stage(line, stage, -1);
                }
            }
        }
    }

    /// Forward 1-D split: lift, then pack low-pass samples into the first
    /// half and high-pass samples into the second.
    fn split_line(&self, line: &mut [ValueType], scratch: &mut Vec<ValueType>) {
        self.lift(line, Direction::Forward);
        let half = line.len() / 2;
        scratch.clear();
        scratch.extend_from_slice(line);
        for i in 0..half {
            line[i] = scratch[2 * i];
            line[half + i] = scratch[2 * i + 1];
        }
    }

    /// Inverse of [`split_line`](Self::split_line).
    fn synth_line(&self, line: &mut [ValueType], scratch: &mut Vec<ValueType>) {
        let half = line.len() / 2;
        scratch.clear();
        scratch.extend_from_slice(line);
        for i in 0..half {
            line[2 * i] = scratch[i];
            line[2 * i + 1] = scratch[half + i];
        }
        self.lift(line, Direction::Backward);
    }
}

/// Sample at `k`, clamped to the nearest in-range index of the same parity.
#[inline]
fn tap(line: &[ValueType], k: isize, parity: Parity) -> i64 {
    let n = line.len() as isize;
    let (lo, hi) = match parity {
        Parity::Even => (0, n - 2),
        Parity::Odd => (1, n - 1),
    };
    line[k.clamp(lo, hi) as usize] as i64
}

fn apply_stage(line: &mut [ValueType], stage: &LiftingStage, sign: i64) {
    let (start, source) = match stage.target {
        Parity::Odd => (1, Parity::Even),
        Parity::Even => (0, Parity::Odd),
    };
    for i in (start..line.len()).step_by(2) {
        let k = i as isize;
        let s1 = tap(line, k - 1, source) + tap(line, k + 1, source);
        let s3 = tap(line, k - 3, source) + tap(line, k + 3, source);
        let value = line[i] as i64 + sign * (stage.delta)(s1, s3);
        line[i] = value as ValueType;
    }
}

/// Multi-level 2-D wavelet transform over a [`PicArray`].
#[derive(Debug, Clone)]
pub struct WaveletTransform {
    depth: usize,
    filter: WaveletFilter,
    band_list: SubbandList,
}

impl WaveletTransform {
    pub fn new(depth: usize, filter: WaveletFilter) -> Self {
        assert!(depth >= 1, "transform depth must be at least 1");
        Self {
            depth,
            filter,
            band_list: SubbandList::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn filter(&self) -> WaveletFilter {
        self.filter
    }

    pub fn band_list(&self) -> &SubbandList {
        &self.band_list
    }

    pub fn band_list_mut(&mut self) -> &mut SubbandList {
        &mut self.band_list
    }

    /// Builds the band list for a plane without transforming it, as a
    /// decoder does before reading coefficients.
    pub fn init_band_list(&mut self, width: usize, height: usize) {
        self.check_dimensions(width, height);
        self.band_list = SubbandList::init(self.depth, width, height);
    }

    fn check_dimensions(&self, width: usize, height: usize) {
        let unit = 1usize << self.depth;
        assert!(
            width > 0 && height > 0 && width % unit == 0 && height % unit == 0,
            "{}x{} plane is not divisible by 2^{}",
            width,
            height,
            self.depth
        );
    }

    pub fn mean_dc_val(&self) -> ValueType {
        self.filter.mean_dc_val(self.depth)
    }

    pub fn dc_gain(&self) -> f64 {
        self.filter.dc_gain(self.depth)
    }

    /// Transforms `pic` in place. A forward transform rebuilds the band
    /// list; a backward transform leaves it stale and clears it.
    pub fn transform(&mut self, direction: Direction, pic: &mut PicArray) {
        let (width, height) = (pic.width(), pic.height());
        self.check_dimensions(width, height);
        let mut scratch = Vec::with_capacity(width.max(height));
        let mut column = Vec::with_capacity(height);

        match direction {
            Direction::Forward => {
                for level in 0..self.depth {
                    let (xl, yl) = (width >> level, height >> level);
                    trace!(level = level + 1, xl, yl, filter = ?self.filter, "split");
                    for y in 0..yl {
                        self.filter
                            .split_line(&mut pic.row_mut(y)[..xl], &mut scratch);
                    }
                    for x in 0..xl {
                        load_column(pic, x, yl, &mut column);
                        self.filter.split_line(&mut column, &mut scratch);
                        store_column(pic, x, &column);
                    }
                }
                self.band_list = SubbandList::init(self.depth, width, height);
            }
            Direction::Backward => {
                for level in (0..self.depth).rev() {
                    let (xl, yl) = (width >> level, height >> level);
                    trace!(level = level + 1, xl, yl, filter = ?self.filter, "synth");
                    for x in 0..xl {
                        load_column(pic, x, yl, &mut column);
                        self.filter.synth_line(&mut column, &mut scratch);
                        store_column(pic, x, &column);
                    }
                    for y in 0..yl {
                        self.filter
                            .synth_line(&mut pic.row_mut(y)[..xl], &mut scratch);
                    }
                }
                self.band_list.clear();
            }
        }
    }

    /// Perceptual weight of every band before gain compensation, indexed
    /// `b - 1`. All weights are exactly 1 when `cpd` is zero.
    pub fn raw_band_weights(&self, cpd: f32, frame: &FrameParams, csort: CompSort) -> Vec<f64> {
        let bands = &self.band_list;
        let n = bands.len();
        if cpd == 0.0 || n == 0 {
            return vec![1.0; n];
        }

        let (chroma_xfac, chroma_yfac) = if csort.is_chroma() {
            frame.chroma.chroma_factors()
        } else {
            (1.0, 1.0)
        };
        let xlen = 2.0 * bands.band(1).xl() as f64;
        let ylen = 2.0 * bands.band(1).yl() as f64;
        let cpd = cpd as f64;

        let mut weights: Vec<f64> = bands
            .iter()
            .map(|(_, band)| {
                let mut xfreq = cpd * (band.xp() as f64 + band.xl() as f64 / 2.0) / xlen;
                let mut yfreq = cpd * (band.yp() as f64 + band.yl() as f64 / 2.0) / ylen;
                if !frame.sort.is_intra() {
                    xfreq /= 8.0;
                    yfreq /= 8.0;
                }
                perceptual_weight(xfreq / chroma_xfac, yfreq / chroma_yfac, csort)
            })
            .collect();

        // DC gets the lowest weight of all. Taken from the band beside the
        // root; Dirac encoders derive it from the root's own weight, so these
        // weights differ from theirs at the DC band.
        weights[n - 1] = weights[n - 2] / 6.0;
        let min_weight = weights.iter().copied().fold(f64::INFINITY, f64::min);
        weights[n - 1] = min_weight;

        // normalise so white noise keeps the same RMS whatever the weights
        let overall: f64 = bands
            .iter()
            .map(|(b, band)| {
                let scale = band.scale() as f64;
                1.0 / (scale * scale * weights[b - 1] * weights[b - 1])
            })
            .sum::<f64>()
            .sqrt();
        for w in &mut weights {
            *w *= overall;
        }
        weights
    }

    /// Sets each band's weight, compensating for the gain the unscaled
    /// lifting filters apply.
    pub fn set_band_weights(&mut self, cpd: f32, frame: &FrameParams, csort: CompSort) {
        let weights = self.raw_band_weights(cpd, frame, csort);
        let lfac = self.filter.low_factor();
        let hfac = self.filter.high_factor();
        let level_gain = lfac.powi(self.depth as i32 - 1);

        for (i, weight) in weights.into_iter().enumerate() {
            let band = self.band_list.band_mut(i + 1);
            let orient_gain = match (band.xp() == 0, band.yp() == 0) {
                (true, true) => lfac * lfac,
                (false, false) => hfac * hfac,
                _ => lfac * hfac,
            };
            band.set_weight(weight / level_gain / orient_gain);
        }
    }
}

/// Curve extending CCIR 959 noise weightings to two dimensions, with a
/// 20% allowance for chroma.
fn perceptual_weight(xf: f64, yf: f64, csort: CompSort) -> f64 {
    let mut freq_sqd = xf * xf + yf * yf;
    if csort.is_chroma() {
        freq_sqd *= 1.2;
    }
    0.255 * (1.0 + 0.2561 * freq_sqd).powf(0.75)
}

fn load_column(pic: &PicArray, x: usize, len: usize, column: &mut Vec<ValueType>) {
    column.clear();
    column.extend((0..len).map(|y| pic[(y, x)]));
}

fn store_column(pic: &mut PicArray, x: usize, column: &[ValueType]) {
    for (y, &v) in column.iter().enumerate() {
        pic[(y, x)] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChromaFormat;

    const ALL_FILTERS: [WaveletFilter; 4] = [
        WaveletFilter::Daub97,
        WaveletFilter::LeGall53,
        WaveletFilter::Filter135,
        WaveletFilter::Approx97,
    ];

    fn ramp(width: usize, height: usize) -> PicArray {
        let data = (0..width * height)
            .map(|i| ((i * 37 + i / width * 11) % 255) as ValueType - 128)
            .collect();
        PicArray::from_vec(data, width, height, CompSort::Y)
    }

    #[test]
    fn test_lines_are_invertible() {
        for filter in ALL_FILTERS {
            for len in [2usize, 4, 6, 8, 16] {
                let original: Vec<ValueType> = (0..len as ValueType).map(|i| i * i - 7).collect();
                let mut line = original.clone();
                let mut scratch = Vec::new();
                filter.split_line(&mut line, &mut scratch);
                filter.synth_line(&mut line, &mut scratch);
                assert_eq!(line, original, "{:?} length {}", filter, len);
            }
        }
    }

    #[test]
    fn test_transform_roundtrip() {
        for filter in ALL_FILTERS {
            let original = ramp(32, 16);
            let mut pic = original.clone();
            let mut wt = WaveletTransform::new(3, filter);
            wt.transform(Direction::Forward, &mut pic);
            assert_ne!(pic, original);
            assert_eq!(wt.band_list().len(), 10);
            wt.transform(Direction::Backward, &mut pic);
            assert_eq!(pic, original, "{:?}", filter);
            assert!(wt.band_list().is_empty());
        }
    }

    #[test]
    fn test_legall_constant_plane() {
        let mut pic = PicArray::filled(8, 8, CompSort::Y, 128);
        let mut wt = WaveletTransform::new(2, WaveletFilter::LeGall53);
        wt.transform(Direction::Forward, &mut pic);

        for y in 0..8 {
            for x in 0..8 {
                let expected = if x < 2 && y < 2 { 128 } else { 0 };
                assert_eq!(pic[(y, x)], expected, "at ({}, {})", y, x);
            }
        }
    }

    #[test]
    fn test_mean_dc_and_gain() {
        assert_eq!(WaveletFilter::Daub97.mean_dc_val(1), 775);
        assert_eq!(WaveletFilter::Daub97.mean_dc_val(6), 6165);
        assert_eq!(WaveletFilter::Daub97.mean_dc_val(7), 512);
        assert_eq!(WaveletFilter::LeGall53.mean_dc_val(4), 512);
        assert_eq!(WaveletFilter::Filter135.dc_gain(5), 1.0);
        let gain = WaveletFilter::Daub97.dc_gain(2);
        assert!((gain - 1.2302f64.powi(4)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_cpd_gives_unit_weights() {
        let mut pic = ramp(32, 32);
        let mut wt = WaveletTransform::new(3, WaveletFilter::Daub97);
        wt.transform(Direction::Forward, &mut pic);
        let frame = FrameParams::intra(ChromaFormat::Format420);
        let weights = wt.raw_band_weights(0.0, &frame, CompSort::U);
        assert_eq!(weights.len(), 10);
        assert!(weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_perceptual_weights() {
        let mut pic = ramp(64, 64);
        let mut wt = WaveletTransform::new(4, WaveletFilter::Daub97);
        wt.transform(Direction::Forward, &mut pic);
        let frame = FrameParams::intra(ChromaFormat::Format420);
        let weights = wt.raw_band_weights(20.0, &frame, CompSort::Y);

        let root = weights[12];
        assert!(weights.iter().all(|&w| w >= root));
        // the finest diagonal band is the least important
        assert!(weights[2] > weights[0]);
        assert!(weights[0] > weights[9]);

        let noise: f64 = wt
            .band_list()
            .iter()
            .map(|(b, band)| {
                let s = band.scale() as f64;
                1.0 / (s * s * weights[b - 1] * weights[b - 1])
            })
            .sum();
        assert!((noise - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gain_compensation() {
        let mut pic = ramp(16, 16);
        let mut wt = WaveletTransform::new(2, WaveletFilter::LeGall53);
        wt.transform(Direction::Forward, &mut pic);
        wt.set_band_weights(0.0, &FrameParams::intra(ChromaFormat::Yonly), CompSort::Y);

        let bands = wt.band_list();
        assert!((bands.band(7).weight() - 1.0 / (1.5 * 1.5 * 1.5)).abs() < 1e-12);
        assert!((bands.band(3).weight() - 1.0 / (1.5 * 0.75 * 0.75)).abs() < 1e-12);
        assert!((bands.band(1).weight() - 1.0 / (1.5 * 1.5 * 0.75)).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_indivisible_plane_panics() {
        let mut pic = PicArray::new(12, 8, CompSort::Y);
        WaveletTransform::new(3, WaveletFilter::LeGall53).transform(Direction::Forward, &mut pic);
    }
}
