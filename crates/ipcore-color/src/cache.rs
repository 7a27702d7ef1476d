//! Process-wide LUT cache shared by every LUT node of a graph.

use crate::error::ColorError;
use crate::lut::LutData;
use ipcore_core::LutConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Find `file` as given, or relative to each directory of `search_path`.
pub fn resolve_lut_path(file: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(file);
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    search_path
        .iter()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.exists())
}

/// Parsed and prepared LUTs keyed by file name.
#[derive(Debug, Default)]
pub struct LutCache {
    entries: RwLock<HashMap<PathBuf, Arc<LutData>>>,
}

impl LutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path`, reusing an earlier parse when `config.reuse` is set.
    ///
    /// Fresh loads are resampled to power-of-two sides and have their
    /// pre-LUT simplified and compiled to `config.prelut_size` samples.
    pub fn load(&self, path: &Path, config: &LutConfig) -> Result<Arc<LutData>, ColorError> {
        if config.reuse {
            if let Some(lut) = self.entries.read().get(path) {
                info!("re-using LUT data from '{}'", path.display());
                return Ok(lut.clone());
            }
        }

        let mut lut = LutData::from_file(path)?;
        lut.resample_power_of_two();
        let linear = lut.simplify_prelut();
        lut.compile_prelut(config.prelut_size);

        if lut.is_channel() && !linear {
            self.entries.write().remove(path);
            return Err(ColorError::UnsupportedPrelut);
        }

        let (min, max) = lut.min_max();
        debug!(
            "loaded LUT '{}' dimensions={:?} range=[{}, {}] prelut={}",
            path.display(),
            lut.dimensions,
            min,
            max,
            lut.has_prelut()
        );

        let lut = Arc::new(lut);
        self.entries.write().insert(path.to_path_buf(), lut.clone());
        Ok(lut)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reuse_returns_same_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.cube", "LUT_1D_SIZE 2\n0 0 0\n1 1 1\n");
        let cache = LutCache::new();
        let config = LutConfig::default();

        let a = cache.load(&path, &config).unwrap();
        let b = cache.load(&path, &config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_reuse_reparses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.cube", "LUT_1D_SIZE 2\n0 0 0\n1 1 1\n");
        let cache = LutCache::new();
        let config = LutConfig {
            reuse: false,
            ..LutConfig::default()
        };

        let a = cache.load(&path, &config).unwrap();
        let b = cache.load(&path, &config).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_channel_lut_with_nonlinear_prelut_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let csp = "CSPLUTV100\n1D\n3\n0 0.5 1\n0 0.25 1\n3\n0 0.5 1\n0 0.25 1\n3\n0 0.5 1\n0 0.25 1\n\
            2\n0 0 0\n1 1 1\n";
        let path = write_file(dir.path(), "bad.csp", csp);
        let cache = LutCache::new();

        let err = cache.load(&path, &LutConfig::default()).unwrap_err();
        assert!(matches!(err, ColorError::UnsupportedPrelut));
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_3d_gets_power_of_two_and_prelut() {
        let dir = tempfile::tempdir().unwrap();
        let mut csp = String::from("CSPLUTV100\n3D\n");
        for _ in 0..3 {
            csp.push_str("3\n0 0.5 1\n0 0.25 1\n");
        }
        csp.push_str("3 3 3\n");
        for b in 0..3 {
            for g in 0..3 {
                for r in 0..3 {
                    csp.push_str(&format!("{} {} {}\n", r as f32 / 2.0, g as f32 / 2.0, b as f32 / 2.0));
                }
            }
        }
        let path = write_file(dir.path(), "film.csp", &csp);
        let config = LutConfig {
            prelut_size: 16,
            ..LutConfig::default()
        };

        let lut = LutCache::new().load(&path, &config).unwrap();
        assert_eq!(lut.dimensions, vec![4, 4, 4]);
        assert_eq!(lut.prelut_data.len(), 48);
    }

    #[test]
    fn test_resolve_uses_search_path() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "look.cube", "LUT_1D_SIZE 2\n0 0 0\n1 1 1\n");
        let search = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];

        assert_eq!(
            resolve_lut_path("look.cube", &search),
            Some(dir.path().join("look.cube"))
        );
        assert_eq!(resolve_lut_path("missing.cube", &search), None);
    }

    #[test]
    fn test_missing_file_is_error() {
        let cache = LutCache::new();
        assert!(cache
            .load(Path::new("/nonexistent/x.cube"), &LutConfig::default())
            .is_err());
    }
}
