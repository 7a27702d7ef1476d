//! Evaluation contexts passed down the graph.

use crate::image::IpImage;
use ipcore_audio::AudioBuffer;
use ipcore_gpu::ImageKey;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Which thread an evaluation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreadType {
    #[default]
    Display,
    Cache,
    Audio,
}

/// Owner of image buffers that may be cache resident.
///
/// Partially built image lists are handed back here on the error path
/// instead of being dropped.
pub trait ImageCache: Send + Sync {
    fn check_in_and_delete(&self, images: Vec<IpImage>);
}

/// Cache that simply drops what it is given.
#[derive(Debug, Default)]
pub struct NullImageCache;

impl ImageCache for NullImageCache {
    fn check_in_and_delete(&self, images: Vec<IpImage>) {
        drop(images);
    }
}

/// Cache that remembers which images were checked in.
#[derive(Debug, Default)]
pub struct RecordingImageCache {
    checked_in: Mutex<Vec<(ImageKey, String)>>,
}

impl RecordingImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node names of every image checked in so far, in order.
    pub fn checked_in_nodes(&self) -> Vec<String> {
        self.checked_in.lock().iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn checked_in_keys(&self) -> Vec<ImageKey> {
        self.checked_in.lock().iter().map(|(k, _)| *k).collect()
    }

    pub fn len(&self) -> usize {
        self.checked_in.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked_in.lock().is_empty()
    }
}

impl ImageCache for RecordingImageCache {
    fn check_in_and_delete(&self, images: Vec<IpImage>) {
        let mut checked_in = self.checked_in.lock();
        for image in images {
            checked_in.push((image.key, image.node));
        }
    }
}

/// Per-call evaluation state.
#[derive(Clone)]
pub struct Context {
    pub frame: i32,
    /// Frame the evaluation started from at the root.
    pub base_frame: i32,
    pub fps: f32,
    pub view_width: i32,
    pub view_height: i32,
    pub eye: i32,
    pub thread: ThreadType,
    pub cache: Arc<dyn ImageCache>,
}

impl Context {
    pub fn new(frame: i32, fps: f32, cache: Arc<dyn ImageCache>) -> Self {
        Self {
            frame,
            base_frame: frame,
            fps,
            view_width: 0,
            view_height: 0,
            eye: 0,
            thread: ThreadType::Display,
            cache,
        }
    }

    /// Copy of this context at another frame.
    pub fn at_frame(&self, frame: i32) -> Self {
        let mut context = self.clone();
        context.frame = frame;
        context
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("frame", &self.frame)
            .field("base_frame", &self.base_frame)
            .field("fps", &self.fps)
            .field("view_width", &self.view_width)
            .field("view_height", &self.view_height)
            .field("eye", &self.eye)
            .field("thread", &self.thread)
            .finish()
    }
}

/// Audio request: fill `buffer` for the window it describes.
#[derive(Debug, Clone)]
pub struct AudioContext {
    pub buffer: AudioBuffer,
    pub fps: f64,
}

impl AudioContext {
    pub fn new(buffer: AudioBuffer, fps: f64) -> Self {
        Self { buffer, fps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RenderType;

    #[test]
    fn test_recording_cache() {
        let cache = RecordingImageCache::new();
        let a = IpImage::new("a", RenderType::Blend, 1, 1);
        let key = a.key;
        cache.check_in_and_delete(vec![a, IpImage::new("b", RenderType::Blend, 1, 1)]);
        assert_eq!(cache.checked_in_nodes(), vec!["a", "b"]);
        assert_eq!(cache.checked_in_keys()[0], key);
    }

    #[test]
    fn test_at_frame_keeps_base() {
        let context = Context::new(10, 24.0, Arc::new(NullImageCache));
        let sub = context.at_frame(3);
        assert_eq!(sub.frame, 3);
        assert_eq!(sub.base_frame, 10);
    }
}
