//! Frame remapping shared by the stack-like nodes.

use crate::node::NodeRef;
use ipcore_core::{ImageRangeInfo, ImageStructureInfo};
use tracing::warn;

/// How a node's own frames map onto the frames of its inputs.
///
/// `info` is the node's range before `offset` is applied; the range it
/// reports is `info.shifted(offset)` so its first frame is 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMapping {
    pub info: ImageRangeInfo,
    pub offset: i32,
    pub use_cut_info: bool,
    pub align: bool,
}

impl FrameMapping {
    /// The range the node reports.
    pub fn visible_info(&self) -> ImageRangeInfo {
        self.info.shifted(self.offset)
    }

    /// Frame of `input` shown at node frame `frame`.
    ///
    /// Unless `unconstrained`, the result is clamped to the input's
    /// (cut) range.
    pub fn input_frame(&self, input: &ImageRangeInfo, frame: i32, unconstrained: bool) -> i32 {
        let mut frame = frame + self.offset;
        if !unconstrained {
            frame = frame.max(self.info.start).min(self.info.end);
        }

        let first = input.first(self.use_cut_info);
        let last = input.last(self.use_cut_info);

        if self.align {
            let f = first + (frame - self.info.start);
            if unconstrained {
                f
            } else {
                f.min(last)
            }
        } else if unconstrained {
            frame
        } else if frame < first {
            first
        } else if frame > last {
            last
        } else {
            frame
        }
    }

    /// Whether `input` has a frame to show at node frame `frame`.
    pub fn in_range(&self, input: &ImageRangeInfo, frame: i32) -> bool {
        let f = self.input_frame(input, frame, true);
        input.contains(f, self.use_cut_info)
    }

    /// Inverse of `input_frame`: node frames of the given `input` frames.
    pub fn to_eval_frames(&self, input: &ImageRangeInfo, frames: &[i32]) -> Vec<i32> {
        frames
            .iter()
            .map(|&f| {
                if self.align {
                    f - input.first(self.use_cut_info) + self.info.start - self.offset
                } else {
                    f - self.offset
                }
            })
            .collect()
    }
}

/// Range and structure of one input, read for a range recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InputInfo {
    pub range: ImageRangeInfo,
    pub structure: ImageStructureInfo,
}

/// Read every input's range and structure. Malformed ranges are
/// normalized.
pub(crate) fn read_inputs(node: NodeRef<'_>) -> Vec<InputInfo> {
    node.inputs()
        .into_iter()
        .map(|input| {
            let mut range = input.image_range_info();
            if !range.is_well_formed() {
                warn!(
                    "{}: input {} has malformed range {}, normalizing",
                    node.name(),
                    input.name(),
                    range
                );
                range = range.normalized();
            }
            let context = node.graph().context_for_frame(range.start);
            let structure = input.image_structure_info(&context);
            InputInfo { range, structure }
        })
        .collect()
}

/// `output.fps`, or the first input's rate when it is unset.
pub(crate) fn output_fps(requested: f32, inputs: &[InputInfo]) -> f32 {
    match inputs.first() {
        Some(first) if requested == 0.0 => first.range.fps,
        _ => requested,
    }
}

/// The computed structure when `auto_size` is set, otherwise the
/// `output.size` of the node.
pub(crate) fn output_structure(
    node: NodeRef<'_>,
    auto_size: bool,
    computed: ImageStructureInfo,
) -> ImageStructureInfo {
    if auto_size {
        return computed;
    }
    match node.prop_values::<i32>("output.size").as_slice() {
        [w, h, ..] => ImageStructureInfo {
            width: *w,
            height: *h,
            pixel_aspect: computed.pixel_aspect,
        },
        _ => computed,
    }
}

/// Seconds covered by `frames` at `fps`; zero without a rate.
pub(crate) fn frames_to_seconds(frames: i32, fps: f64) -> f64 {
    if fps > 0.0 {
        frames as f64 / fps
    } else {
        0.0
    }
}

/// Aspect a fitted input is scaled to.
pub(crate) fn structure_aspect(structure: &ImageStructureInfo) -> f32 {
    if structure.height > 0 {
        structure.width as f32 / structure.height as f32
    } else {
        1.0
    }
}
