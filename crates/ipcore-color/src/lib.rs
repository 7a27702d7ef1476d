//! IPCore Color - LUT parsing, preparation, and the shared LUT cache.

pub mod cache;
pub mod error;
pub mod lut;

pub use cache::{resolve_lut_path, LutCache};
pub use error::ColorError;
pub use lut::{ChannelMap, LutData};
