use super::plane::PicArray;
use super::quantizer::{Quantizer, MAX_QINDEX};
use super::subband::SubbandList;

/// Picks quantisers and skip flags before a band is coded.
///
/// Called once per band, from the root down to band 1, after the forward
/// transform and after code blocks and weights are in place.
pub trait RateController {
    fn choose_quantisers(&mut self, pic: &PicArray, bands: &mut SubbandList, band_num: usize);
}

/// Uses one quantiser index everywhere, optionally raised for perceptually
/// less important bands. Bands and blocks whose coefficients all quantise to
/// zero are marked skipped.
#[derive(Debug, Clone)]
pub struct FixedQuantiser {
    qindex: usize,
    perceptual: bool,
}

impl FixedQuantiser {
    pub fn new(qindex: usize) -> Self {
        assert!(
            qindex <= MAX_QINDEX,
            "quantiser index {} out of range 0..={}",
            qindex,
            MAX_QINDEX
        );
        Self {
            qindex,
            perceptual: false,
        }
    }

    /// Scales the step with each band's weight relative to the lightest band.
    pub fn perceptual(mut self, enabled: bool) -> Self {
        self.perceptual = enabled;
        self
    }

    pub fn qindex(&self) -> usize {
        self.qindex
    }

    fn band_qindex(&self, bands: &SubbandList, band_num: usize) -> usize {
        if !self.perceptual {
            return self.qindex;
        }
        let min_weight = bands
            .iter()
            .map(|(_, band)| band.weight())
            .fold(f64::INFINITY, f64::min);
        let ratio = bands.band(band_num).weight() / min_weight;
        // four indices per doubling of the step
        let offset = (4.0 * ratio.log2()).round().max(0.0) as usize;
        (self.qindex + offset).min(MAX_QINDEX)
    }
}

impl RateController for FixedQuantiser {
    fn choose_quantisers(&mut self, pic: &PicArray, bands: &mut SubbandList, band_num: usize) {
        let qindex = self.band_qindex(bands, band_num);
        let quant = Quantizer::new(qindex, true);
        let band = bands.band_mut(band_num);
        band.set_qindex(qindex);

        let partitioned = band.has_multiple_blocks();
        let mut any_coded = false;
        for block in band.blocks_mut() {
            let zero = (block.ystart..block.yend).all(|y| {
                pic.row(y)[block.xstart..block.xend]
                    .iter()
                    .all(|&v| quant.quantize(v) == 0)
            });
            block.skipped = partitioned && zero;
            any_coded |= !zero;
        }
        band.skipped = !any_coded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CompSort;

    #[test]
    fn test_zero_band_is_skipped() {
        let pic = PicArray::new(16, 16, CompSort::Y);
        let mut bands = SubbandList::init(2, 16, 16);
        let mut rate = FixedQuantiser::new(10);
        rate.choose_quantisers(&pic, &mut bands, 1);
        assert!(bands.band(1).skipped);
        assert_eq!(bands.band(1).qindex, 10);
    }

    #[test]
    fn test_blocks_skipped_individually() {
        let mut pic = PicArray::new(16, 16, CompSort::Y);
        pic[(1, 9)] = 40;
        let mut bands = SubbandList::init(1, 16, 16);
        bands.band_mut(1).set_num_blocks(2, 2);

        FixedQuantiser::new(4).choose_quantisers(&pic, &mut bands, 1);
        let band = bands.band(1);
        assert!(!band.skipped);
        let skipped: Vec<bool> = band.blocks().iter().map(|b| b.skipped).collect();
        assert_eq!(skipped, vec![false, true, true, true]);
    }

    #[test]
    fn test_small_values_quantise_away() {
        let mut pic = PicArray::new(8, 8, CompSort::Y);
        pic[(0, 4)] = 3;
        let mut bands = SubbandList::init(1, 8, 8);
        // step 4.0
        FixedQuantiser::new(8).choose_quantisers(&pic, &mut bands, 1);
        assert!(bands.band(1).skipped);
        FixedQuantiser::new(0).choose_quantisers(&pic, &mut bands, 1);
        assert!(!bands.band(1).skipped);
    }

    #[test]
    fn test_perceptual_offsets() {
        let mut bands = SubbandList::init(1, 8, 8);
        bands.band_mut(4).set_weight(1.0);
        bands.band_mut(1).set_weight(2.0);
        bands.band_mut(2).set_weight(2.0);
        bands.band_mut(3).set_weight(4.0);
        let rate = FixedQuantiser::new(10).perceptual(true);
        assert_eq!(rate.band_qindex(&bands, 4), 10);
        assert_eq!(rate.band_qindex(&bands, 1), 14);
        assert_eq!(rate.band_qindex(&bands, 3), 18);
    }
}
