//! Frame range and image structure descriptors.
//!
//! Every node in the graph reports an [`ImageRangeInfo`] (which frames it
//! can produce) and an [`ImageStructureInfo`] (how large those frames are).
//! Composite nodes derive theirs from their inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive `(first, last)` window of global frames.
pub type FrameRange = (i32, i32);

/// Frame range of a node's output.
///
/// `cut_in..=cut_out` is the active sub-range within `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageRangeInfo {
    pub start: i32,
    pub end: i32,
    pub cut_in: i32,
    pub cut_out: i32,
    pub fps: f32,
}

impl ImageRangeInfo {
    /// Create a range whose cut points cover the whole range.
    #[inline]
    pub fn new(start: i32, end: i32, fps: f32) -> Self {
        Self {
            start,
            end,
            cut_in: start,
            cut_out: end,
            fps,
        }
    }

    /// Create a range with explicit cut points.
    #[inline]
    pub fn with_cuts(start: i32, end: i32, cut_in: i32, cut_out: i32, fps: f32) -> Self {
        Self {
            start,
            end,
            cut_in,
            cut_out,
            fps,
        }
    }

    /// First frame, honoring cut info when requested.
    #[inline]
    pub fn first(&self, use_cut_info: bool) -> i32 {
        if use_cut_info {
            self.cut_in
        } else {
            self.start
        }
    }

    /// Last frame, honoring cut info when requested.
    #[inline]
    pub fn last(&self, use_cut_info: bool) -> i32 {
        if use_cut_info {
            self.cut_out
        } else {
            self.end
        }
    }

    /// Number of frames in the (cut) range.
    #[inline]
    pub fn duration(&self, use_cut_info: bool) -> i32 {
        self.last(use_cut_info) - self.first(use_cut_info) + 1
    }

    /// Whether `frame` lies in the (cut) range.
    #[inline]
    pub fn contains(&self, frame: i32, use_cut_info: bool) -> bool {
        frame >= self.first(use_cut_info) && frame <= self.last(use_cut_info)
    }

    /// Whether `start <= cut_in <= cut_out <= end` holds.
    pub fn is_well_formed(&self) -> bool {
        self.start <= self.cut_in && self.cut_in <= self.cut_out && self.cut_out <= self.end
    }

    /// Return a well-formed copy of this range.
    ///
    /// Reversed bounds are swapped and cut points are clamped into
    /// `start..=end`.
    pub fn normalized(&self) -> Self {
        let (start, end) = if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        };
        let (a, b) = if self.cut_in <= self.cut_out {
            (self.cut_in, self.cut_out)
        } else {
            (self.cut_out, self.cut_in)
        };
        Self {
            start,
            end,
            cut_in: a.clamp(start, end),
            cut_out: b.clamp(start, end),
            fps: self.fps,
        }
    }

    /// Shift every frame number by `-offset`.
    #[inline]
    pub fn shifted(&self, offset: i32) -> Self {
        Self {
            start: self.start - offset,
            end: self.end - offset,
            cut_in: self.cut_in - offset,
            cut_out: self.cut_out - offset,
            fps: self.fps,
        }
    }
}

impl Default for ImageRangeInfo {
    fn default() -> Self {
        Self::new(1, 1, 0.0)
    }
}

impl fmt::Display for ImageRangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] cut [{}, {}] @ {} fps",
            self.start, self.end, self.cut_in, self.cut_out, self.fps
        )
    }
}

/// Pixel dimensions of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageStructureInfo {
    pub width: i32,
    pub height: i32,
    pub pixel_aspect: f32,
}

impl ImageStructureInfo {
    #[inline]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            pixel_aspect: 1.0,
        }
    }

    /// Display aspect ratio (width over height, pixel aspect applied).
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 * self.pixel_aspect / self.height as f32
    }
}

impl Default for ImageStructureInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_aspect: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cut_accessors() {
        let info = ImageRangeInfo::with_cuts(1, 100, 10, 20, 24.0);
        assert_eq!(info.first(true), 10);
        assert_eq!(info.last(false), 100);
        assert_eq!(info.duration(true), 11);
        assert!(info.contains(15, true));
        assert!(!info.contains(25, true));
        assert!(info.contains(25, false));
    }

    #[test]
    fn test_normalized_swaps_reversed_cuts() {
        let info = ImageRangeInfo::with_cuts(1, 50, 40, 10, 24.0);
        let n = info.normalized();
        assert_eq!((n.cut_in, n.cut_out), (10, 40));
        assert!(n.is_well_formed());
    }

    #[test]
    fn test_normalized_clamps_cuts() {
        let info = ImageRangeInfo::with_cuts(10, 20, 0, 30, 24.0);
        let n = info.normalized();
        assert_eq!((n.cut_in, n.cut_out), (10, 20));
    }

    #[test]
    fn test_shifted() {
        let info = ImageRangeInfo::with_cuts(10, 20, 12, 18, 30.0).shifted(9);
        assert_eq!(info, ImageRangeInfo::with_cuts(1, 11, 3, 9, 30.0));
    }

    #[test]
    fn test_structure_aspect() {
        let s = ImageStructureInfo::new(1920, 1080);
        assert!((s.aspect() - 16.0 / 9.0).abs() < 1e-5);
        assert_eq!(ImageStructureInfo::default().aspect(), 1.0);
    }

    proptest! {
        #[test]
        fn normalized_is_always_well_formed(
            start in -1000i32..1000,
            end in -1000i32..1000,
            cut_in in -1000i32..1000,
            cut_out in -1000i32..1000,
        ) {
            let info = ImageRangeInfo::with_cuts(start, end, cut_in, cut_out, 24.0);
            let n = info.normalized();
            prop_assert!(n.is_well_formed());
            prop_assert_eq!(n.normalized(), n);
        }
    }
}
