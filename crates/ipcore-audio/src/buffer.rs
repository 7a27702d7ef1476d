//! Interleaved audio sample buffer.

use crate::time::{samples_to_time, time_to_samples, Time};

/// A window of interleaved f32 audio starting at an absolute sample.
///
/// `size()` counts sample frames (one value per channel), not floats.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: usize,
    rate: f64,
    start_sample: i64,
}

impl AudioBuffer {
    pub fn new(frames: usize, channels: usize, rate: f64, start_time: Time) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            channels,
            rate,
            start_sample: time_to_samples(start_time, rate),
        }
    }

    /// Same shape and rate as `other`, silent, at `start_time`.
    pub fn like(other: &AudioBuffer, start_time: Time) -> Self {
        Self::new(other.size(), other.channels, other.rate, start_time)
    }

    /// Number of sample frames.
    pub fn size(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn size_in_floats(&self) -> usize {
        self.samples.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn start_sample(&self) -> i64 {
        self.start_sample
    }

    pub fn start_time(&self) -> Time {
        samples_to_time(self.start_sample, self.rate)
    }

    pub fn set_start_time(&mut self, t: Time) {
        self.start_sample = time_to_samples(t, self.rate);
    }

    pub fn set_start_sample(&mut self, sample: i64) {
        self.start_sample = sample;
    }

    pub fn duration(&self) -> Time {
        samples_to_time(self.size() as i64, self.rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Samples of frame `index`, one per channel.
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    pub fn zero(&mut self) {
        self.samples.fill(0.0);
    }

    /// Silence `count` frames starting at frame `start`. Clipped to the buffer.
    pub fn zero_region(&mut self, start: usize, count: usize) {
        let size = self.size();
        let start = start.min(size);
        let end = start.saturating_add(count).min(size);
        self.samples[start * self.channels..end * self.channels].fill(0.0);
    }

    /// Set every sample to `value`.
    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let buf = AudioBuffer::new(100, 2, 48000.0, 0.5);
        assert_eq!(buf.size(), 100);
        assert_eq!(buf.size_in_floats(), 200);
        assert_eq!(buf.start_sample(), 24000);
        assert!((buf.start_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_region_clips() {
        let mut buf = AudioBuffer::new(4, 2, 48000.0, 0.0);
        buf.fill(1.0);
        buf.zero_region(3, 10);
        assert_eq!(buf.frame(2), &[1.0, 1.0]);
        assert_eq!(buf.frame(3), &[0.0, 0.0]);
        buf.zero_region(0, 1);
        assert_eq!(buf.frame(0), &[0.0, 0.0]);
        assert_eq!(buf.peak(), 1.0);
    }

    #[test]
    fn test_like() {
        let a = AudioBuffer::new(8, 1, 44100.0, 0.0);
        let b = AudioBuffer::like(&a, 1.0);
        assert_eq!(b.size(), 8);
        assert_eq!(b.start_sample(), 44100);
    }
}
