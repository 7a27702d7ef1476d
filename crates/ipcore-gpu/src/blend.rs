//! Blend modes used when an image is drawn over the current framebuffer.
//!
//! Merge shaders composite their inputs internally. Blend modes only apply
//! to images rendered with the Blend render type.

use serde::{Deserialize, Serialize};

/// Blend mode for compositing an image onto its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum BlendMode {
    #[default]
    Unspecified = 0,
    Replace = 1,
    Over = 2,
    Add = 3,
    Difference = 4,
    ReverseDifference = 5,
    Dissolve = 6,
}

impl BlendMode {
    /// All blend modes in display order.
    pub const ALL: [BlendMode; 7] = [
        Self::Unspecified,
        Self::Replace,
        Self::Over,
        Self::Add,
        Self::Difference,
        Self::ReverseDifference,
        Self::Dissolve,
    ];

    /// Name as written in composite property values.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Replace => "replace",
            Self::Over => "over",
            Self::Add => "add",
            Self::Difference => "difference",
            Self::ReverseDifference => "-difference",
            Self::Dissolve => "dissolve",
        }
    }

    /// Parse a composite name. Unknown names fall back to `Over`, and
    /// `topmost` is drawn as `Replace`.
    pub fn from_name(name: &str) -> Self {
        if name == "topmost" {
            return Self::Replace;
        }
        Self::ALL
            .into_iter()
            .skip(1)
            .find(|mode| mode.name() == name)
            .unwrap_or(Self::Over)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for mode in BlendMode::ALL.iter().skip(1) {
            assert_eq!(BlendMode::from_name(mode.name()), *mode);
        }
    }

    #[test]
    fn test_unknown_and_topmost() {
        assert_eq!(BlendMode::from_name("bogus"), BlendMode::Over);
        assert_eq!(BlendMode::from_name("topmost"), BlendMode::Replace);
    }
}
