//! Switch: show exactly one of the inputs.
//!
//! The active input is picked by `output.input`, matched against each
//! input's name or the name of its first leaf. The node takes its range
//! and structure from the active input alone.

use super::timing::{frames_to_seconds, output_fps, output_structure, read_inputs, structure_aspect, FrameMapping};
use crate::context::{AudioContext, Context};
use crate::image::{IpImage, IpImageId, RenderType};
use crate::node::{Invalidation, IpNode, MetaEvalVisitor, NodeRef, RangeCache, TestEvaluationResult};
use ipcore_audio::AudioBuffer;
use ipcore_core::defaults::OUTPUT_SIZE;
use ipcore_core::{EngineConfig, ImageRangeInfo, ImageStructureInfo, IpError, PropertyContainer, Result};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchRanges {
    pub active: usize,
    pub mapping: FrameMapping,
    pub structure: ImageStructureInfo,
    pub input_ranges: Vec<ImageRangeInfo>,
}

impl SwitchRanges {
    fn active_range(&self) -> ImageRangeInfo {
        self.input_ranges.get(self.active).copied().unwrap_or_default()
    }

    fn input_frame(&self, frame: i32, unconstrained: bool) -> i32 {
        self.mapping.input_frame(&self.active_range(), frame, unconstrained)
    }
}

#[derive(Default)]
pub struct SwitchNode {
    ranges: RangeCache<SwitchRanges>,
}

impl SwitchNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self, node: NodeRef<'_>) -> Arc<SwitchRanges> {
        self.ranges.lazy_update(|| compute_ranges(node))
    }

    /// Index of the input currently shown.
    pub fn active_input(&self, node: NodeRef<'_>) -> usize {
        self.ranges(node).active
    }
}

fn active_index(node: NodeRef<'_>) -> usize {
    let wanted = node.prop("output.input", String::new());
    if wanted.is_empty() {
        return 0;
    }
    node.inputs()
        .iter()
        .position(|input| input.name() == wanted || input.first_leaf_name() == wanted)
        .unwrap_or(0)
}

fn compute_ranges(node: NodeRef<'_>) -> SwitchRanges {
    let use_cut_info = node.prop("mode.useCutInfo", 1i32) != 0;
    let align = node.prop("mode.alignStartFrames", 0i32) != 0;
    let auto_edl = node.prop("mode.autoEDL", 1i32) != 0;
    let auto_size = node.prop("output.autoSize", 1i32) != 0;
    let requested_fps = node.prop("output.fps", 0.0f32);

    let inputs = read_inputs(node);
    let active = active_index(node);
    let fps = output_fps(requested_fps, &inputs);

    let (mut info, computed) = match inputs.get(active) {
        Some(input) => {
            let r = input.range;
            (
                ImageRangeInfo::new(r.first(use_cut_info), r.last(use_cut_info), fps),
                ImageStructureInfo::new(input.structure.width, input.structure.height),
            )
        }
        None => (ImageRangeInfo::new(1, 1, fps), ImageStructureInfo::default()),
    };
    info.fps = fps;

    let mapping = FrameMapping {
        info,
        offset: if auto_edl { info.start - 1 } else { 0 },
        use_cut_info,
        align,
    };
    let structure = output_structure(node, auto_size, computed);
    debug!("{}: switch to input {} range {}", node.name(), active, mapping.visible_info());

    SwitchRanges {
        active,
        mapping,
        structure,
        input_ranges: inputs.iter().map(|i| i.range).collect(),
    }
}

impl IpNode for SwitchNode {
    fn type_name(&self) -> &str {
        "Switch"
    }

    fn declare_properties(&self, props: &mut PropertyContainer, _config: &EngineConfig) -> Result<()> {
        props.declare("output.fps", 0.0f32)?;
        props.declare_array("output.size", OUTPUT_SIZE.to_vec())?;
        props.declare("output.autoSize", 1i32)?;
        props.declare("output.input", String::new())?;
        props.declare("mode.useCutInfo", 1i32)?;
        props.declare("mode.autoEDL", 1i32)?;
        props.declare("mode.alignStartFrames", 0i32)?;
        Ok(())
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        let ranges = self.ranges(node);
        let Some(input) = node.input(ranges.active) else {
            return Ok(IpImage::new_no_image(node.name(), "No Inputs"));
        };

        let mut root = IpImage::new(
            node.name(),
            RenderType::Blend,
            ranges.structure.width,
            ranges.structure.height,
        );
        let mut c = context.at_frame(ranges.input_frame(context.frame, false));
        c.fps = ranges.mapping.info.fps;

        let mut image = input.evaluate(&c)?;
        image.fit_to_aspect(structure_aspect(&ranges.structure));
        root.append_child(image);
        root.record_resource_usage();
        Ok(root)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        let ranges = self.ranges(node);
        let Some(input) = node.input(ranges.active) else {
            return Ok(None);
        };
        let c = context.at_frame(ranges.input_frame(context.frame, false));
        input.evaluate_identifier(&c)?.map(Some).ok_or_else(|| {
            IpError::EvaluationFailed(format!(
                "switch {} got no identifier from input {}",
                node.name(),
                input.name()
            ))
        })
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        self.ranges(node).mapping.visible_info()
    }

    fn image_structure_info(&self, node: NodeRef<'_>, _context: &Context) -> ImageStructureInfo {
        self.ranges(node).structure
    }

    fn audio_fill_buffer(&self, node: NodeRef<'_>, context: &mut AudioContext) -> usize {
        let ranges = self.ranges(node);
        let Some(input) = node.input(ranges.active) else {
            return 0;
        };

        let range = ranges.active_range();
        let first = ranges.mapping.info.start - ranges.mapping.offset;
        let offset = ranges.input_frame(first, true) - range.start;
        let start_time = context.buffer.start_time() + frames_to_seconds(offset, context.fps);
        let mut sub = AudioContext::new(AudioBuffer::like(&context.buffer, start_time), context.fps);

        let filled = input.audio_fill_buffer(&mut sub).min(sub.buffer.size());
        let n = filled * context.buffer.channels();
        context.buffer.samples_mut()[..n].copy_from_slice(&sub.buffer.samples()[..n]);
        filled
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        let ranges = self.ranges(node);
        visitor.enter(context, node);
        if let Some(input) = node.input(ranges.active) {
            let c = context.at_frame(ranges.input_frame(context.frame, false));
            if visitor.traverse_child(&c, ranges.active, node, input) {
                input.meta_evaluate(&c, visitor);
            }
        }
        visitor.leave(context, node);
    }

    fn test_evaluate(&self, node: NodeRef<'_>, context: &Context, result: &mut TestEvaluationResult) {
        let ranges = self.ranges(node);
        if let Some(input) = node.input(ranges.active) {
            let c = context.at_frame(ranges.input_frame(context.frame, false));
            input.test_evaluate(&c, result);
        }
    }

    /// Only the active input has frames in this node.
    fn map_input_to_eval_frames(&self, node: NodeRef<'_>, index: usize, frames: &[i32]) -> Vec<i32> {
        let ranges = self.ranges(node);
        if index != ranges.active {
            return Vec::new();
        }
        ranges.mapping.to_eval_frames(&ranges.active_range(), frames)
    }

    fn property_changed(&self, _node: NodeRef<'_>, name: &str) -> Result<Invalidation> {
        Ok(match name {
            "mode.useCutInfo" | "mode.alignStartFrames" | "mode.autoEDL" | "output.fps" => {
                self.ranges.mark_range_dirty();
                Invalidation::RANGE
            }
            "output.input" => {
                self.ranges.mark_dirty();
                Invalidation::ALL
            }
            "output.autoSize" | "output.size" => {
                self.ranges.mark_structure_dirty();
                Invalidation::STRUCTURE
            }
            _ => Invalidation::NONE,
        })
    }

    fn inputs_changed(&self, _node: NodeRef<'_>) {
        self.ranges.mark_dirty();
    }

    fn input_range_changed(&self, _node: NodeRef<'_>, _index: usize) {
        self.ranges.mark_range_dirty();
    }

    fn input_structure_changed(&self, _node: NodeRef<'_>, _index: usize) {
        self.ranges.mark_structure_dirty();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
