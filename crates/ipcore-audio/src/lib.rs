//! IPCore Audio - sample buffers and mixing helpers.
//!
//! Architecture:
//! - `AudioBuffer`: interleaved f32 samples anchored at an absolute sample
//! - `time`: conversions between seconds and sample positions
//! - `mixer`: summing, region scaling, and cross-fade envelopes used by
//!   composite nodes when they combine their inputs' audio

pub mod buffer;
pub mod mixer;
pub mod time;

pub use buffer::AudioBuffer;
pub use mixer::{add_into, apply_fade, linear_fade, mask_outside, scale_region, Fade};
pub use time::{samples_to_time, time_to_samples, Time};
