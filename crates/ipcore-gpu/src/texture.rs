//! CPU-side texture payloads handed to the renderer as shader arguments.
//!
//! LUT nodes upload channel and 3D tables through these. Upload itself is
//! the renderer's business.

use serde::{Deserialize, Serialize};

/// Texel storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Float32,
    /// Normalized unsigned shorts for renderers without float textures.
    UShort16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Texels {
    F32(Vec<f32>),
    U16(Vec<u16>),
}

/// A 1D, 2D or 3D table with interleaved channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureData {
    /// Content hash, stable for identical data.
    pub id: String,
    /// Width, height, depth. Unused dimensions are 1.
    pub dimensions: [usize; 3],
    pub channels: usize,
    pub texels: Texels,
}

impl TextureData {
    pub fn new(id: impl Into<String>, dimensions: [usize; 3], channels: usize, texels: Texels) -> Self {
        Self {
            id: id.into(),
            dimensions,
            channels,
            texels,
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self.texels {
            Texels::F32(_) => TextureFormat::Float32,
            Texels::U16(_) => TextureFormat::UShort16,
        }
    }

    /// Number of dimensions larger than one.
    pub fn dimensionality(&self) -> usize {
        self.dimensions.iter().filter(|&&d| d > 1).count().max(1)
    }

    /// Texel count times channels.
    pub fn len(&self) -> usize {
        match &self.texels {
            Texels::F32(v) => v.len(),
            Texels::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memory usage estimate in bytes.
    pub fn memory_size(&self) -> usize {
        match &self.texels {
            Texels::F32(v) => v.len() * 4,
            Texels::U16(v) => v.len() * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_sizes() {
        let t = TextureData::new("a", [4, 4, 4], 3, Texels::F32(vec![0.0; 4 * 4 * 4 * 3]));
        assert_eq!(t.dimensionality(), 3);
        assert_eq!(t.memory_size(), 4 * 4 * 4 * 3 * 4);
        assert_eq!(t.format(), TextureFormat::Float32);

        let c = TextureData::new("b", [256, 1, 1], 3, Texels::U16(vec![0; 256 * 3]));
        assert_eq!(c.dimensionality(), 1);
        assert_eq!(c.memory_size(), 256 * 3 * 2);
    }
}
