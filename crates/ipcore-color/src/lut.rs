//! LUT file parsing and the preparation applied to tables before upload.
//!
//! Two formats are read: `.cube` (1D or 3D, optional domain) and Cinespace
//! `.csp` (per-channel pre-LUT followed by a 1D or 3D table). Whatever the
//! source, a loaded table ends up as a [`LutData`]: interleaved RGB samples,
//! an input matrix, and an optional pre-LUT.

use crate::error::ColorError;
use glam::{Mat4, Vec3, Vec4};
use std::path::Path;

/// One pre-LUT channel as `(input, output)` pairs sorted by input.
pub type ChannelMap = Vec<(f32, f32)>;

const EXTENSIONS: &[&str] = &["cube", "csp"];

/// Largest accepted size of one 3D axis.
pub const MAX_AXIS_SIZE: usize = 256;
/// Largest accepted channel LUT or pre-LUT channel.
pub const MAX_CHANNEL_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq)]
pub struct LutData {
    /// `[n]` for channel LUTs, `[x, y, z]` for 3D LUTs.
    pub dimensions: Vec<usize>,
    /// Interleaved RGB. 3D tables are red-fastest.
    pub data: Vec<f32>,
    pub prelut: [ChannelMap; 3],
    /// Uniformly resampled pre-LUT, interleaved RGB. Empty when the
    /// pre-LUT folded into `in_matrix`.
    pub prelut_data: Vec<f32>,
    pub in_matrix: Mat4,
    pub conditioning_gamma: f32,
}

impl Default for LutData {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            data: Vec::new(),
            prelut: Default::default(),
            prelut_data: Vec::new(),
            in_matrix: Mat4::IDENTITY,
            conditioning_gamma: 1.0,
        }
    }
}

pub fn is_lut_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn parse_floats(s: &str) -> Vec<f32> {
    s.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

fn parse_vec3(s: &str) -> Option<[f32; 3]> {
    let vals = parse_floats(s);
    (vals.len() == 3).then(|| [vals[0], vals[1], vals[2]])
}

/// Validate a size read from a LUT file.
fn table_size(value: f32, max: usize, what: &str) -> Result<usize, ColorError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > max as f32 {
        return Err(ColorError::InvalidLut(format!(
            "{} {} out of range (at most {})",
            what, value, max
        )));
    }
    Ok(value as usize)
}

/// Number of RGB samples in a table of the given dimensions.
fn sample_count(dimensions: &[usize]) -> Result<usize, ColorError> {
    dimensions
        .iter()
        .try_fold(3usize, |n, &d| n.checked_mul(d))
        .ok_or_else(|| ColorError::InvalidLut(format!("LUT dimensions {:?} are too large", dimensions)))
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

impl LutData {
    /// Read and parse a LUT file, picking the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, ColorError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !path.exists() {
            return Err(ColorError::InvalidLut(format!(
                "LUT file {} does not exist",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut lut = match ext.as_str() {
            "cube" => Self::from_cube(&content)?,
            "csp" => Self::from_csp(&content)?,
            other => {
                return Err(ColorError::InvalidLut(format!(
                    "Unknown LUT file format {}",
                    other
                )))
            }
        };

        for channel in lut.prelut.iter_mut() {
            channel.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        Ok(lut)
    }

    /// Parse a .cube file. `DOMAIN_MIN`/`DOMAIN_MAX` become the input matrix.
    pub fn from_cube(content: &str) -> Result<Self, ColorError> {
        let mut size_1d = 0usize;
        let mut size_3d = 0usize;
        let mut data = Vec::new();
        let mut domain_min = [0.0f32; 3];
        let mut domain_max = [1.0f32; 3];

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("TITLE") {
                continue;
            }
            if let Some(rest) = line.strip_prefix("LUT_1D_SIZE") {
                size_1d = rest
                    .trim()
                    .parse()
                    .map_err(|e| ColorError::Parse(format!("bad LUT_1D_SIZE: {}", e)))?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("LUT_3D_SIZE") {
                size_3d = rest
                    .trim()
                    .parse()
                    .map_err(|e| ColorError::Parse(format!("bad LUT_3D_SIZE: {}", e)))?;
                continue;
            }
            if let Some(rest) = line.strip_prefix("DOMAIN_MIN") {
                if let Some(v) = parse_vec3(rest) {
                    domain_min = v;
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("DOMAIN_MAX") {
                if let Some(v) = parse_vec3(rest) {
                    domain_max = v;
                }
                continue;
            }

            if let Some(v) = parse_vec3(line) {
                data.extend_from_slice(&v);
            }
        }

        let dimensions = match (size_1d, size_3d) {
            (0, 0) => return Err(ColorError::InvalidLut("missing LUT size".into())),
            (n, 0) => vec![table_size(n as f32, MAX_CHANNEL_SIZE, "LUT_1D_SIZE")?],
            (0, n) => vec![table_size(n as f32, MAX_AXIS_SIZE, "LUT_3D_SIZE")?; 3],
            _ => {
                return Err(ColorError::InvalidLut(
                    "both LUT_1D_SIZE and LUT_3D_SIZE present".into(),
                ))
            }
        };

        let samples = sample_count(&dimensions)?;
        if data.len() != samples {
            return Err(ColorError::DimensionMismatch {
                expected: samples / 3,
                got: data.len() / 3,
            });
        }
        if dimensions.iter().any(|&n| n < 2) {
            return Err(ColorError::InvalidLut(
                "LUT must have at least 2 entries per axis".into(),
            ));
        }

        let min = Vec3::from(domain_min);
        let range = Vec3::from(domain_max) - min;
        if range.min_element().abs() < 1e-10 {
            return Err(ColorError::InvalidLut("empty LUT domain".into()));
        }
        let scale = Vec3::ONE / range;

        Ok(Self {
            dimensions,
            data,
            in_matrix: Mat4::from_translation(-min * scale) * Mat4::from_scale(scale),
            ..Self::default()
        })
    }

    /// Parse a Cinespace .csp file.
    pub fn from_csp(content: &str) -> Result<Self, ColorError> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        if lines.next() != Some("CSPLUTV100") {
            return Err(ColorError::Parse("missing CSPLUTV100 header".into()));
        }
        let is_3d = match lines.next() {
            Some("1D") => false,
            Some("3D") => true,
            other => {
                return Err(ColorError::Parse(format!(
                    "expected 1D or 3D, got {:?}",
                    other.unwrap_or("")
                )))
            }
        };

        let mut body = Vec::new();
        let mut in_metadata = false;
        for line in lines {
            match line {
                "BEGIN METADATA" => in_metadata = true,
                "END METADATA" => in_metadata = false,
                _ if in_metadata => {}
                _ => body.push(line),
            }
        }

        let mut tokens = body.iter().copied().flat_map(str::split_whitespace);
        let mut next_f32 = |what: &str| -> Result<f32, ColorError> {
            tokens
                .next()
                .ok_or_else(|| ColorError::Parse(format!("unexpected end of file reading {}", what)))?
                .parse::<f32>()
                .map_err(|e| ColorError::Parse(format!("bad {}: {}", what, e)))
        };

        let mut lut = Self::default();
        for channel in lut.prelut.iter_mut() {
            let n = table_size(next_f32("prelut size")?, MAX_CHANNEL_SIZE, "prelut size")?;
            let mut inputs = Vec::with_capacity(n);
            for _ in 0..n {
                inputs.push(next_f32("prelut input")?);
            }
            for input in inputs {
                channel.push((input, next_f32("prelut output")?));
            }
        }

        lut.dimensions = if is_3d {
            vec![
                table_size(next_f32("x size")?, MAX_AXIS_SIZE, "x size")?,
                table_size(next_f32("y size")?, MAX_AXIS_SIZE, "y size")?,
                table_size(next_f32("z size")?, MAX_AXIS_SIZE, "z size")?,
            ]
        } else {
            vec![table_size(next_f32("size")?, MAX_CHANNEL_SIZE, "size")?]
        };

        let samples = sample_count(&lut.dimensions)?;
        if samples == 0 {
            return Err(ColorError::InvalidLut("zero sized LUT".into()));
        }
        lut.data.reserve(samples.min(MAX_CHANNEL_SIZE));
        for _ in 0..samples {
            lut.data.push(next_f32("LUT sample")?);
        }

        Ok(lut)
    }

    pub fn is_3d(&self) -> bool {
        self.dimensions.len() == 3
    }

    pub fn is_channel(&self) -> bool {
        self.dimensions.len() == 1
    }

    pub fn has_prelut(&self) -> bool {
        !self.prelut_data.is_empty()
    }

    /// Smallest and largest sample in the table.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Trilinear lookup of a 3D table, `rgb` in `[0, 1]`.
    pub fn sample_3d(&self, rgb: [f32; 3]) -> [f32; 3] {
        let (sx, sy, sz) = (self.dimensions[0], self.dimensions[1], self.dimensions[2]);
        let sizes = [sx, sy, sz];

        let mut lo = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for c in 0..3 {
            let n = (sizes[c] - 1) as f32;
            let p = rgb[c].clamp(0.0, 1.0) * n;
            lo[c] = (p as usize).min(sizes[c].saturating_sub(2));
            frac[c] = p - lo[c] as f32;
        }
        let hi = [
            (lo[0] + 1).min(sx - 1),
            (lo[1] + 1).min(sy - 1),
            (lo[2] + 1).min(sz - 1),
        ];

        let at = |r: usize, g: usize, b: usize, c: usize| self.data[(r + g * sx + b * sx * sy) * 3 + c];

        let mut out = [0.0f32; 3];
        for (c, o) in out.iter_mut().enumerate() {
            let c00 = lerp(at(lo[0], lo[1], lo[2], c), at(hi[0], lo[1], lo[2], c), frac[0]);
            let c10 = lerp(at(lo[0], hi[1], lo[2], c), at(hi[0], hi[1], lo[2], c), frac[0]);
            let c01 = lerp(at(lo[0], lo[1], hi[2], c), at(hi[0], lo[1], hi[2], c), frac[0]);
            let c11 = lerp(at(lo[0], hi[1], hi[2], c), at(hi[0], hi[1], hi[2], c), frac[0]);
            *o = lerp(lerp(c00, c10, frac[1]), lerp(c01, c11, frac[1]), frac[2]);
        }
        out
    }

    fn sample_interleaved(table: &[f32], rgb: [f32; 3]) -> [f32; 3] {
        let size = table.len() / 3;
        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let idx_f = rgb[c].clamp(0.0, 1.0) * (size - 1) as f32;
            let idx_lo = (idx_f as usize).min(size.saturating_sub(2));
            let idx_hi = (idx_lo + 1).min(size - 1);
            let t = idx_f - idx_lo as f32;
            out[c] = lerp(table[idx_lo * 3 + c], table[idx_hi * 3 + c], t);
        }
        out
    }

    /// Per-channel linear lookup of a channel table, `rgb` in `[0, 1]`.
    pub fn sample_channel(&self, rgb: [f32; 3]) -> [f32; 3] {
        Self::sample_interleaved(&self.data, rgb)
    }

    /// CPU reference of what the GPU pipeline computes for one pixel.
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut c = Vec3::from(rgb);
        if self.has_prelut() && self.conditioning_gamma != 1.0 {
            c = c.powf(self.conditioning_gamma);
        }
        let c = (self.in_matrix * Vec4::from((c, 1.0))).truncate();
        let mut c = c.to_array();
        if self.has_prelut() {
            c = Self::sample_interleaved(&self.prelut_data, c);
        }
        if self.is_3d() {
            self.sample_3d(c)
        } else {
            self.sample_channel(c)
        }
    }

    /// Resample 3D tables with a non power-of-two side, rounding each side
    /// up. Channel tables are left alone.
    pub fn resample_power_of_two(&mut self) {
        if !self.is_3d() || self.dimensions.iter().all(|n| n.is_power_of_two()) {
            return;
        }

        let sizes: Vec<usize> = self
            .dimensions
            .iter()
            .map(|n| n.next_power_of_two().max(2))
            .collect();
        let (xs, ys, zs) = (sizes[0], sizes[1], sizes[2]);

        let mut data = Vec::with_capacity(xs * ys * zs * 3);
        for b in 0..zs {
            for g in 0..ys {
                for r in 0..xs {
                    let rgb = [
                        r as f32 / (xs - 1) as f32,
                        g as f32 / (ys - 1) as f32,
                        b as f32 / (zs - 1) as f32,
                    ];
                    data.extend_from_slice(&self.sample_3d(rgb));
                }
            }
        }

        self.data = data;
        self.dimensions = sizes;
    }

    /// Fold a pre-LUT whose channels are all straight lines into the input
    /// matrix. Returns false if any channel is non-linear.
    pub fn simplify_prelut(&mut self) -> bool {
        if self.prelut.iter().all(|c| c.len() < 2) {
            for c in self.prelut.iter_mut() {
                c.clear();
            }
            return true;
        }

        let mut linear = true;
        let mut colinear = [false; 3];

        for (i, channel) in self.prelut.iter().enumerate() {
            if channel.len() < 2 {
                continue;
            }
            let a = channel[0];
            let b = channel[channel.len() - 1];
            colinear[i] = true;
            for v in &channel[1..channel.len() - 1] {
                let cross = (b.0 - a.0) * (v.1 - a.1) - (b.1 - a.1) * (v.0 - a.0);
                if cross != 0.0 {
                    colinear[i] = false;
                    linear = false;
                }
            }
        }

        if colinear.iter().all(|&c| c) {
            let mut slope = [1.0f32; 3];
            let mut intercept = [0.0f32; 3];
            for (i, channel) in self.prelut.iter_mut().enumerate() {
                let p0 = channel[0];
                let p1 = channel[channel.len() - 1];
                let m = (p1.1 - p0.1) / (p1.0 - p0.0);
                slope[i] = m;
                intercept[i] = p0.1 - m * p0.0;
                channel.clear();
            }
            let m = Mat4::from_translation(Vec3::from(intercept)) * Mat4::from_scale(Vec3::from(slope));
            self.in_matrix = m * self.in_matrix;
        }

        linear
    }

    /// Resample the remaining pre-LUT to `nsamples` uniform entries per
    /// channel. Inputs are normalized first and the normalization becomes the
    /// input matrix.
    pub fn compile_prelut(&mut self, nsamples: usize) {
        if self.prelut.iter().any(|c| c.is_empty()) || nsamples < 2 {
            return;
        }

        let mut scales = [1.0f32; 3];
        let mut offsets = [0.0f32; 3];

        for (q, channel) in self.prelut.iter_mut().enumerate() {
            let (min, max) = channel
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)));
            let range = max - min;
            scales[q] = if range == 0.0 { 1.0 } else { range };
            offsets[q] = min;
            for p in channel.iter_mut() {
                p.0 = (p.0 - offsets[q]) / scales[q];
            }
        }

        let mut out = vec![0.0f32; nsamples * 3];
        for i in 0..nsamples {
            let t = i as f32 / (nsamples - 1) as f32;
            for (q, channel) in self.prelut.iter().enumerate() {
                let i1 = channel.partition_point(|p| p.0 < t).min(channel.len() - 1);
                let i0 = i1.saturating_sub(1);
                let (t0, v0) = channel[i0];
                let (t1, v1) = channel[i1];
                out[i * 3 + q] = if t1 != t0 {
                    lerp(v0, v1, (t - t0) / (t1 - t0))
                } else {
                    v0
                };
            }
        }

        self.prelut_data = out;
        let m = Mat4::from_translation(Vec3::from(offsets)) * Mat4::from_scale(Vec3::from(scales));
        self.in_matrix = m.inverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_3D: &str = "LUT_3D_SIZE 2\n\
        0.0 0.0 0.0\n1.0 0.0 0.0\n\
        0.0 1.0 0.0\n1.0 1.0 0.0\n\
        0.0 0.0 1.0\n1.0 0.0 1.0\n\
        0.0 1.0 1.0\n1.0 1.0 1.0\n";

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-3)
    }

    #[test]
    fn test_cube_1d_interpolation() {
        let lut = LutData::from_cube("LUT_1D_SIZE 2\n0.0 0.0 0.0\n1.0 1.0 1.0\n").unwrap();
        assert!(lut.is_channel());
        assert!(close(lut.apply([0.25, 0.5, 0.75]), [0.25, 0.5, 0.75]));
    }

    #[test]
    fn test_cube_3d_identity() {
        let lut = LutData::from_cube(IDENTITY_3D).unwrap();
        assert_eq!(lut.dimensions, vec![2, 2, 2]);
        assert!(close(lut.apply([0.5, 0.2, 0.9]), [0.5, 0.2, 0.9]));
    }

    #[test]
    fn test_cube_domain_becomes_matrix() {
        let cube = "LUT_1D_SIZE 2\nDOMAIN_MIN 0 0 0\nDOMAIN_MAX 2 2 2\n0 0 0\n1 1 1\n";
        let lut = LutData::from_cube(cube).unwrap();
        assert!(close(lut.apply([1.0, 2.0, 0.0]), [0.5, 1.0, 0.0]));
    }

    #[test]
    fn test_cube_wrong_size() {
        let cube = "LUT_1D_SIZE 5\n0.0 0.0 0.0\n1.0 1.0 1.0\n";
        assert!(matches!(
            LutData::from_cube(cube),
            Err(ColorError::DimensionMismatch { expected: 5, got: 2 })
        ));
    }

    #[test]
    fn test_oversized_tables_are_rejected() {
        let huge_3d = "CSPLUTV100\n3D\n2\n0 1\n0 1\n2\n0 1\n0 1\n2\n0 1\n0 1\n1e7 1e7 1e7\n0 0 0\n";
        assert!(matches!(LutData::from_csp(huge_3d), Err(ColorError::InvalidLut(ref m)) if m.contains("x size")));

        let huge_prelut = "CSPLUTV100\n1D\n1e30\n0 1\n";
        assert!(matches!(LutData::from_csp(huge_prelut), Err(ColorError::InvalidLut(_))));

        for bad in ["-2", "2.5", "nan", "inf"] {
            let csp = format!("CSPLUTV100\n1D\n{}\n0 1\n0 1\n", bad);
            assert!(LutData::from_csp(&csp).is_err(), "{}", bad);
        }

        let cube = format!("LUT_3D_SIZE {}\n0 0 0\n", MAX_AXIS_SIZE + 1);
        assert!(matches!(LutData::from_cube(&cube), Err(ColorError::InvalidLut(_))));
        assert!(LutData::from_cube("LUT_3D_SIZE 18446744073709551615\n0 0 0\n").is_err());
    }

    #[test]
    fn test_csp_3d_with_linear_prelut() {
        let csp = "CSPLUTV100\n3D\n\nBEGIN METADATA\nfoo\nEND METADATA\n\
            2\n0 2\n0 1\n2\n0 2\n0 1\n2\n0 2\n0 1\n\n2 2 2\n\
            0 0 0\n1 0 0\n0 1 0\n1 1 0\n0 0 1\n1 0 1\n0 1 1\n1 1 1\n";
        let mut lut = LutData::from_csp(csp).unwrap();
        assert_eq!(lut.prelut[0], vec![(0.0, 0.0), (2.0, 1.0)]);
        assert!(lut.simplify_prelut());
        assert!(lut.prelut.iter().all(|c| c.is_empty()));
        assert!(close(lut.apply([1.0, 1.0, 2.0]), [0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_nonlinear_prelut_compiles() {
        let mut lut = LutData::from_cube(IDENTITY_3D).unwrap();
        for c in lut.prelut.iter_mut() {
            *c = vec![(0.0, 0.0), (0.5, 0.25), (1.0, 1.0)];
        }
        assert!(!lut.simplify_prelut());
        lut.compile_prelut(5);
        assert_eq!(lut.prelut_data.len(), 15);
        assert!((lut.prelut_data[6] - 0.25).abs() < 1e-6);
        assert!(close(lut.apply([0.5, 0.5, 0.5]), [0.25, 0.25, 0.25]));
    }

    #[test]
    fn test_resample_power_of_two() {
        let mut cube = String::from("LUT_3D_SIZE 3\n");
        for b in 0..3 {
            for g in 0..3 {
                for r in 0..3 {
                    cube.push_str(&format!("{} {} {}\n", r as f32 / 2.0, g as f32 / 2.0, b as f32 / 2.0));
                }
            }
        }
        let mut lut = LutData::from_cube(&cube).unwrap();
        lut.resample_power_of_two();
        assert_eq!(lut.dimensions, vec![4, 4, 4]);
        assert_eq!(lut.data.len(), 64 * 3);
        assert!(close(lut.sample_3d([1.0 / 3.0, 0.0, 1.0]), [1.0 / 3.0, 0.0, 1.0]));
    }

    #[test]
    fn test_is_lut_file() {
        assert!(is_lut_file(Path::new("film.CUBE")));
        assert!(is_lut_file(Path::new("/a/b.csp")));
        assert!(!is_lut_file(Path::new("b.png")));
    }
}
