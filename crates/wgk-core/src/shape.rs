use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{GpuError, Result};

/// A fixed-capacity tensor shape.
///
/// Dimensions are stored inline (no heap allocation) up to [`Shape::MAX_RANK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: [usize; Shape::MAX_RANK],
    rank: usize,
}

impl Shape {
    pub const MAX_RANK: usize = 8;

    /// Create a shape from a slice of dimensions.
    ///
    /// # Panics
    /// Panics if `dims.len() > MAX_RANK`.
    pub fn new(dims: &[usize]) -> Self {
        match Self::try_new(dims) {
            Ok(shape) => shape,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create a shape, rejecting ranks above `MAX_RANK`.
    pub fn try_new(dims: &[usize]) -> Result<Self> {
        if dims.len() > Self::MAX_RANK {
            return Err(GpuError::RankExceeded {
                rank: dims.len(),
                max: Self::MAX_RANK,
            });
        }
        let mut data = [0usize; Self::MAX_RANK];
        data[..dims.len()].copy_from_slice(dims);
        Ok(Shape {
            dims: data,
            rank: dims.len(),
        })
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims().iter().product()
    }

    /// Returns the live dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.rank]
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        assert!(index < self.rank, "index {index} out of range for rank {}", self.rank);
        &self.dims[index]
    }
}

impl IndexMut<usize> for Shape {
    fn index_mut(&mut self, index: usize) -> &mut usize {
        assert!(index < self.rank, "index {index} out of range for rank {}", self.rank);
        &mut self.dims[index]
    }
}

/// Formats as a bare comma-separated list (`2, 3, 4`) so the result can be
/// slotted directly into shader source.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(&dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}
