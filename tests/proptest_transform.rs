//! Property-based tests for the lifting transforms.

use proptest::prelude::*;
use wavelet_core::{CompSort, Direction, PicArray, WaveletFilter, WaveletTransform};

fn any_filter() -> impl Strategy<Value = WaveletFilter> {
    prop_oneof![
        Just(WaveletFilter::Daub97),
        Just(WaveletFilter::LeGall53),
        Just(WaveletFilter::Filter135),
        Just(WaveletFilter::Approx97),
    ]
}

/// A plane whose dimensions are divisible by `2^depth`, with its depth.
fn plane_and_depth() -> impl Strategy<Value = (PicArray, usize)> {
    (1usize..=4, 1usize..=3, 1usize..=3).prop_flat_map(|(depth, kx, ky)| {
        let width = kx << depth;
        let height = ky << depth;
        prop::collection::vec(-1024i32..1024, width * height).prop_map(move |data| {
            (PicArray::from_vec(data, width, height, CompSort::Y), depth)
        })
    })
}

proptest! {
    #[test]
    fn transform_is_exactly_invertible((original, depth) in plane_and_depth(), filter in any_filter()) {
        let mut pic = original.clone();
        let mut wt = WaveletTransform::new(depth, filter);
        wt.transform(Direction::Forward, &mut pic);
        prop_assert_eq!(wt.band_list().len(), 3 * depth + 1);
        wt.transform(Direction::Backward, &mut pic);
        prop_assert_eq!(pic, original);
    }

    #[test]
    fn constant_plane_collects_in_root(value in -500i32..500, depth in 1usize..=3) {
        let size = 4 << depth;
        let mut pic = PicArray::filled(size, size, CompSort::Y, value);
        let mut wt = WaveletTransform::new(depth, WaveletFilter::LeGall53);
        wt.transform(Direction::Forward, &mut pic);

        let root = wt.band_list().band(wt.band_list().root()).clone();
        for y in 0..size {
            for x in 0..size {
                let expected = if root.contains(x, y) { value } else { 0 };
                prop_assert_eq!(pic[(y, x)], expected);
            }
        }
    }
}
