//! GPU resource usage counters.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Texture fetches, bound buffers and texture coordinate sets a shader
/// pass needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub fetches: usize,
    pub buffers: usize,
    pub coords: usize,
}

impl ResourceUsage {
    #[inline]
    pub const fn new(fetches: usize, buffers: usize, coords: usize) -> Self {
        Self {
            fetches,
            buffers,
            coords,
        }
    }

    /// Usage of a single intermediate or single-plane source.
    pub const SINGLE: Self = Self::new(1, 1, 1);

    #[inline]
    pub fn set(&mut self, fetches: usize, buffers: usize, coords: usize) {
        *self = Self::new(fetches, buffers, coords);
    }

    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Sum every counter.
    #[inline]
    pub fn accumulate(&mut self, u: &ResourceUsage) {
        self.fetches += u.fetches;
        self.buffers += u.buffers;
        self.coords += u.coords;
    }

    /// Filters multiply fetches, everything else sums.
    #[inline]
    pub fn filter_accumulate(&mut self, u: &ResourceUsage) {
        self.fetches *= u.fetches;
        self.buffers += u.buffers;
        self.coords += u.coords;
    }
}

impl AddAssign for ResourceUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.accumulate(&rhs);
    }
}
