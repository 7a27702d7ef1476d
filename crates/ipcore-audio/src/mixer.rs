//! Mixing helpers used by composite nodes.

use crate::buffer::AudioBuffer;
use tracing::trace;

/// Which side of a cross-fade a buffer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fade {
    /// Outgoing input, gain goes 1 -> 0 across the window.
    Out,
    /// Incoming input, gain goes 0 -> 1 across the window.
    In,
}

/// Sum `src` into `dst` sample by sample. Extra samples in either buffer are
/// ignored.
pub fn add_into(dst: &mut AudioBuffer, src: &AudioBuffer) {
    if dst.size_in_floats() != src.size_in_floats() {
        trace!(
            "mixing buffers of different sizes ({} vs {})",
            dst.size_in_floats(),
            src.size_in_floats()
        );
    }
    for (d, s) in dst.samples_mut().iter_mut().zip(src.samples()) {
        *d += *s;
    }
}

/// Multiply `count` frames starting at frame `start` by `factor`.
pub fn scale_region(buf: &mut AudioBuffer, start: usize, count: usize, factor: f32) {
    let channels = buf.channels();
    let size = buf.size();
    let start = start.min(size);
    let end = start.saturating_add(count).min(size);
    for s in &mut buf.samples_mut()[start * channels..end * channels] {
        *s *= factor;
    }
}

/// Silence every frame of `buf` outside the absolute sample span
/// `[start, end)`.
pub fn mask_outside(buf: &mut AudioBuffer, start: i64, end: i64) {
    let first = buf.start_sample();
    let size = buf.size();
    if start > first {
        buf.zero_region(0, (start - first).min(size as i64) as usize);
    }
    if end < first + size as i64 {
        let keep = (end - first).max(0) as usize;
        buf.zero_region(keep, size.saturating_sub(keep));
    }
}

/// Gain of the outgoing input at absolute sample `sample` of a cross-fade
/// running from `start` to `end`. The incoming input gets `1.0 - gain`.
pub fn linear_fade(start: i64, end: i64, sample: i64) -> f32 {
    if end <= start {
        return if sample < end { 1.0 } else { 0.0 };
    }
    ((end - sample) as f32 / (end - start) as f32).clamp(0.0, 1.0)
}

/// Apply the cross-fade envelope to the part of `buf` that overlaps the
/// window `[start, end]` (absolute samples). Samples outside the window are
/// left alone.
pub fn apply_fade(buf: &mut AudioBuffer, start: i64, end: i64, fade: Fade) {
    let first = buf.start_sample();
    let size = buf.size() as i64;

    if first > end || first + size < start {
        return;
    }

    let lo = (start - first).max(0);
    let hi = size - (first + size - end).max(0);
    let channels = buf.channels();

    for i in lo..hi {
        let out = linear_fade(start, end, first + i);
        let gain = match fade {
            Fade::Out => out,
            Fade::In => 1.0 - out,
        };
        let base = i as usize * channels;
        for s in &mut buf.samples_mut()[base..base + channels] {
            *s *= gain;
        }
    }
}
