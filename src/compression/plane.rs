use crate::params::CompSort;
use std::ops::{Index, IndexMut};

pub type ValueType = i32;

/// A picture component held as a dense grid of signed samples.
///
/// Indexing is `(y, x)`, row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PicArray {
    data: Vec<ValueType>,
    width: usize,
    height: usize,
    csort: CompSort,
}

impl PicArray {
    pub fn new(width: usize, height: usize, csort: CompSort) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
            csort,
        }
    }

    pub fn filled(width: usize, height: usize, csort: CompSort, value: ValueType) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
            csort,
        }
    }

    pub fn from_vec(data: Vec<ValueType>, width: usize, height: usize, csort: CompSort) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "sample buffer does not match {}x{}",
            width,
            height
        );
        Self {
            data,
            width,
            height,
            csort,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn csort(&self) -> CompSort {
        self.csort
    }

    pub fn as_slice(&self) -> &[ValueType] {
        &self.data
    }

    pub fn row(&self, y: usize) -> &[ValueType] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [ValueType] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    /// Sets every sample of the rectangle `[x0, x1) x [y0, y1)` to `value`.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, value: ValueType) {
        for y in y0..y1 {
            self.row_mut(y)[x0..x1].fill(value);
        }
    }

    pub fn rect_is_zero(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> bool {
        (y0..y1).all(|y| self.row(y)[x0..x1].iter().all(|&v| v == 0))
    }
}

impl Index<(usize, usize)> for PicArray {
    type Output = ValueType;

    #[inline]
    fn index(&self, (y, x): (usize, usize)) -> &ValueType {
        &self.data[y * self.width + x]
    }
}

impl IndexMut<(usize, usize)> for PicArray {
    #[inline]
    fn index_mut(&mut self, (y, x): (usize, usize)) -> &mut ValueType {
        &mut self.data[y * self.width + x]
    }
}
