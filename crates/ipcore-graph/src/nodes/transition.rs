//! Transition: play input 0, then cross to input 1.
//!
//! Input 1 starts at node frame `parameters.startFrame`, or right after
//! input 0 when that frame lies past its end. The merge function blends
//! the two over `parameters.numFrames` frames from the start frame, and
//! their audio is cross-faded over the same window.

use super::timing::{frames_to_seconds, output_fps, output_structure, read_inputs, structure_aspect};
use crate::compose::{
    accumulate, assemble_merge_expressions, balance_resource_usage,
    convert_blend_render_types_to_intermediate, filter_accumulate, ModifiedImages, UsageAccumulator,
};
use crate::context::{AudioContext, Context};
use crate::definition::NodeDefinition;
use crate::image::{IpImage, IpImageId, RenderType};
use crate::node::{
    default_evaluate, Invalidation, IpNode, MetaEvalVisitor, NodeRef, RangeCache, TestEvaluationResult,
};
use ipcore_audio::{add_into, apply_fade, mask_outside, time_to_samples, AudioBuffer, Fade};
use ipcore_core::defaults::OUTPUT_SIZE;
use ipcore_core::{
    EngineConfig, FrameRange, ImageRangeInfo, ImageStructureInfo, IpError, PropertyContainer, Result,
};
use ipcore_gpu::Expression;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRanges {
    pub info: ImageRangeInfo,
    pub structure: ImageStructureInfo,
    /// Input ranges, with `start`/`end` replaced by the cut points when
    /// cut info is used.
    pub input_ranges: Vec<ImageRangeInfo>,
    /// Each input's uncut first frame.
    pub media_starts: Vec<i32>,
    /// Each input's span in node frames, ends inclusive.
    pub global_ranges: Vec<FrameRange>,
    /// First frame of the blend window.
    pub start_frame: i32,
    pub duration: i32,
    /// Node frame showing input 1's first frame.
    pub input1_start: i32,
    pub fit: bool,
}

impl TransitionRanges {
    /// Frame of input `index` shown at node frame `frame`. The frame is
    /// always clamped to the node's range.
    pub fn input_frame(&self, index: usize, frame: i32) -> i32 {
        let Some(range) = self.input_ranges.get(index) else {
            return frame;
        };
        let (fs, fe) = (range.start, range.end);
        let len = fe - fs + 1;
        let frame = frame.max(self.info.start).min(self.info.end);

        if index == 0 {
            if frame - 1 >= len {
                fe
            } else if frame <= 1 {
                fs
            } else {
                fs + frame - 1
            }
        } else if frame >= self.input1_start {
            let offset = frame - self.input1_start;
            if offset >= len {
                fe
            } else {
                fs + offset
            }
        } else {
            fs
        }
    }
}

pub struct TransitionNode {
    definition: NodeDefinition,
    ranges: RangeCache<TransitionRanges>,
}

impl TransitionNode {
    pub fn new(definition: NodeDefinition) -> Self {
        Self {
            definition,
            ranges: RangeCache::new(),
        }
    }

    pub fn ranges(&self, node: NodeRef<'_>) -> Arc<TransitionRanges> {
        self.ranges.lazy_update(|| compute_ranges(node))
    }

    pub fn range_generation(&self) -> u64 {
        self.ranges.generation()
    }
}

fn compute_ranges(node: NodeRef<'_>) -> TransitionRanges {
    let use_cut_info = node.prop("mode.useCutInfo", 1i32) != 0;
    let fit = node.prop("output.fit", 0i32) != 0;
    let auto_size = node.prop("output.autoSize", 1i32) != 0;
    let requested_fps = node.prop("output.fps", 0.0f32);
    let start_frame = (node.prop("parameters.startFrame", 1.0f32) as i32).max(1);
    let duration = (node.prop("parameters.numFrames", 10.0f32) as i32).max(0);

    let inputs = read_inputs(node);
    let fps = output_fps(requested_fps, &inputs);

    if inputs.len() != 2 {
        return TransitionRanges {
            info: ImageRangeInfo::new(1, 1, fps),
            structure: ImageStructureInfo::default(),
            input_ranges: inputs.iter().map(|i| i.range).collect(),
            media_starts: inputs.iter().map(|i| i.range.start).collect(),
            global_ranges: Vec::new(),
            start_frame,
            duration,
            input1_start: start_frame,
            fit,
        };
    }

    let input_ranges: Vec<ImageRangeInfo> = inputs
        .iter()
        .map(|input| {
            let r = input.range;
            ImageRangeInfo {
                start: r.first(use_cut_info),
                end: r.last(use_cut_info),
                ..r
            }
        })
        .collect();

    let len0 = input_ranges[0].end - input_ranges[0].start + 1;
    let len1 = input_ranges[1].end - input_ranges[1].start + 1;
    // Input 0 covers node frames 1..=len0. A start frame past its end
    // places input 1 directly after it.
    let overlap = (1 + len0 - start_frame).max(0);
    let input1_start = len0 + 1 - overlap;

    let mut info = ImageRangeInfo::new(1, (len0 + len1 - overlap).max(1), fps);
    info.cut_in = info.start;
    info.cut_out = info.end;

    let computed = ImageStructureInfo::new(
        inputs[0].structure.width.max(inputs[1].structure.width),
        inputs[0].structure.height.max(inputs[1].structure.height),
    );
    let structure = output_structure(node, auto_size, computed);

    debug!(
        "{}: transition range {} start {} duration {}",
        node.name(),
        info,
        start_frame,
        duration
    );

    TransitionRanges {
        info,
        structure,
        media_starts: inputs.iter().map(|i| i.range.start).collect(),
        input_ranges,
        global_ranges: vec![(1, start_frame + duration - 1), (input1_start, info.end)],
        start_frame,
        duration,
        input1_start,
        fit,
    }
}

impl IpNode for TransitionNode {
    fn type_name(&self) -> &str {
        self.definition.name()
    }

    fn declare_properties(&self, props: &mut PropertyContainer, _config: &EngineConfig) -> Result<()> {
        props.declare("node.active", 1i32)?;
        props.declare("output.fps", 0.0f32)?;
        props.declare_array("output.size", OUTPUT_SIZE.to_vec())?;
        props.declare("output.autoSize", 1i32)?;
        props.declare("output.fit", 0i32)?;
        props.declare("mode.useCutInfo", 1i32)?;
        self.definition.declare_parameters(props)
    }

    fn max_inputs(&self) -> Option<usize> {
        Some(2)
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        if node.prop("node.active", 1i32) == 0 {
            return default_evaluate(node, context);
        }

        let inputs = node.inputs();
        match inputs.len() {
            0 => return Ok(IpImage::new_no_image(node.name(), "No Inputs")),
            1 => return Ok(IpImage::new_no_image(node.name(), "Missing an Input")),
            _ => {}
        }

        let ranges = self.ranges(node);
        let aspect = structure_aspect(&ranges.structure);
        let mut root = IpImage::intermediate(
            node.name(),
            RenderType::Merge,
            ranges.structure.width,
            ranges.structure.height,
        );

        let mut images = Vec::with_capacity(2);
        for (i, input) in inputs.iter().enumerate() {
            let mut c = context.at_frame(ranges.input_frame(i, context.frame));
            c.fps = ranges.info.fps;
            match input.evaluate(&c) {
                Ok(mut image) => {
                    if ranges.fit {
                        image.fit_to_aspect(aspect);
                    }
                    images.push(image);
                }
                Err(e) => {
                    context.cache.check_in_and_delete(images);
                    return Err(e);
                }
            }
        }

        let function = self.definition.function();
        let mut modified = ModifiedImages::new();
        convert_blend_render_types_to_intermediate(&mut images, &mut modified);

        let accum: UsageAccumulator = if function.is_filter() {
            filter_accumulate
        } else {
            accumulate
        };
        balance_resource_usage(accum, &mut images, &mut modified, &node.config().resources, 0);

        let exprs = assemble_merge_expressions(node.name(), &mut images, &modified, function.is_filter());
        root.append_children(images);
        root.merge_expr = Some(self.definition.bind(root.key, exprs, node, context));
        root.shader_expr = Some(Expression::source_rgba(root.key));
        root.record_resource_usage();
        Ok(root)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        let inputs = node.inputs();
        if inputs.is_empty() {
            return Ok(None);
        }

        let ranges = self.ranges(node);
        let mut id = String::new();
        let mut children = Vec::with_capacity(inputs.len());

        for (i, input) in inputs.iter().enumerate() {
            let c = context.at_frame(ranges.input_frame(i, context.frame));
            let child = input.evaluate_identifier(&c)?.ok_or_else(|| {
                IpError::EvaluationFailed(format!(
                    "transition {} got no identifier from input {}",
                    node.name(),
                    input.name()
                ))
            })?;
            if i > 0 {
                id.push('+');
            }
            id.push_str(&child.id);
            children.push(child);
        }

        Ok(Some(IpImageId::with_children(id, children)))
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        self.ranges(node).info
    }

    fn image_structure_info(&self, node: NodeRef<'_>, _context: &Context) -> ImageStructureInfo {
        self.ranges(node).structure
    }

    /// Audio is gathered in node time: each input is read at its own
    /// offset, silenced outside its span and faded across the window.
    fn audio_fill_buffer(&self, node: NodeRef<'_>, context: &mut AudioContext) -> usize {
        let inputs = node.inputs();
        if inputs.is_empty() {
            return 0;
        }

        let ranges = self.ranges(node);
        let fps = if context.fps > 0.0 {
            context.fps
        } else {
            ranges.info.fps as f64
        };
        if fps <= 0.0 {
            return 0;
        }

        let rate = context.buffer.rate();
        let start_time = context.buffer.start_time();
        let first_sample = context.buffer.start_sample();
        let last_sample = first_sample + context.buffer.size() as i64;
        let to_sample = |frames: i32| time_to_samples(frames_to_seconds(frames, fps), rate);

        let window_start = to_sample(ranges.start_frame - 1);
        let window_end = to_sample(ranges.start_frame - 1 + ranges.duration);
        let mut filled = 0;

        for (i, input) in inputs.iter().enumerate() {
            let (Some(range), Some(&(g0, g1))) = (ranges.input_ranges.get(i), ranges.global_ranges.get(i)) else {
                continue;
            };
            let span_start = to_sample(g0 - 1);
            let span_end = to_sample(g1);
            if first_sample >= span_end || last_sample <= span_start {
                continue;
            }

            let media_start = ranges.media_starts.get(i).copied().unwrap_or(range.start);
            let shift = if i == 1 { ranges.input1_start - 1 } else { 0 };
            let offset = range.start - media_start - shift;

            let buffer = AudioBuffer::like(&context.buffer, start_time + frames_to_seconds(offset, fps));
            let mut sub = AudioContext::new(buffer, fps);
            filled = filled.max(input.audio_fill_buffer(&mut sub));

            let mut samples = sub.buffer;
            samples.set_start_sample(first_sample);
            mask_outside(&mut samples, span_start, span_end);

            let fade = if i == 0 { Fade::Out } else { Fade::In };
            apply_fade(&mut samples, window_start, window_end, fade);
            add_into(&mut context.buffer, &samples);
        }

        filled
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        let ranges = self.ranges(node);
        visitor.enter(context, node);
        for (i, input) in node.inputs().into_iter().enumerate() {
            let c = context.at_frame(ranges.input_frame(i, context.frame));
            if visitor.traverse_child(&c, i, node, input) {
                input.meta_evaluate(&c, visitor);
            }
        }
        visitor.leave(context, node);
    }

    fn test_evaluate(&self, node: NodeRef<'_>, context: &Context, result: &mut TestEvaluationResult) {
        let ranges = self.ranges(node);
        for (i, input) in node.inputs().into_iter().enumerate() {
            let c = context.at_frame(ranges.input_frame(i, context.frame));
            input.test_evaluate(&c, result);
        }
    }

    fn map_input_to_eval_frames(&self, node: NodeRef<'_>, index: usize, frames: &[i32]) -> Vec<i32> {
        let ranges = self.ranges(node);
        let Some(range) = ranges.input_ranges.get(index) else {
            return frames.to_vec();
        };
        let first = if index == 0 { 1 } else { ranges.input1_start };
        frames.iter().map(|&f| f - range.start + first).collect()
    }

    fn property_changed(&self, _node: NodeRef<'_>, name: &str) -> Result<Invalidation> {
        Ok(match name {
            "mode.useCutInfo" | "output.fps" | "output.fit" | "parameters.startFrame" | "parameters.numFrames" => {
                self.ranges.mark_range_dirty();
                Invalidation::RANGE
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
