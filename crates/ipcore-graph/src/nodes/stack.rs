//! Stack: composite all inputs with one merge function.
//!
//! Input ranges are unioned (or aligned to a common start) and the node's
//! frames are renumbered to start at 1. Each input is evaluated at its
//! remapped frame; inputs with nothing to show follow the out-of-range
//! policy.

use super::timing::{
    frames_to_seconds, output_fps, output_structure, read_inputs, structure_aspect, FrameMapping,
};
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
use ipcore_audio::{add_into, mask_outside, time_to_samples, AudioBuffer};
use ipcore_core::defaults::OUTPUT_SIZE;
use ipcore_core::{
    EngineConfig, FrameRange, ImageRangeInfo, ImageStructureInfo, IpError, PropertyContainer, Result,
};
use ipcore_gpu::{BlendMode, Expression};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// What a stack shows for an input outside its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRangePolicy {
    /// Keep showing the nearest frame of the input.
    Hold,
    /// Transparent placeholder; the input is left out of the identifier.
    Blank,
    /// Opaque black placeholder.
    Black,
}

impl OutOfRangePolicy {
    /// Unknown names are treated as `blank`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "hold" => Self::Hold,
            "black" => Self::Black,
            _ => Self::Blank,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Blank => "blank",
            Self::Black => "black",
        }
    }
}

/// Which inputs a stack takes its audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveAudioInput {
    /// First input that produced any samples.
    Topmost,
    /// Sum of every input.
    All,
    First,
    /// Input whose first leaf has this name.
    Named(String),
}

impl ActiveAudioInput {
    pub fn from_name(name: &str) -> Self {
        match name {
            ".topmost." => Self::Topmost,
            ".all." => Self::All,
            ".first." => Self::First,
            other => Self::Named(other.to_string()),
        }
    }
}

/// Range state of a stack, recomputed when inputs or timing change.
#[derive(Debug, Clone, PartialEq)]
pub struct StackRanges {
    pub mapping: FrameMapping,
    pub structure: ImageStructureInfo,
    pub input_ranges: Vec<ImageRangeInfo>,
    pub input_structures: Vec<ImageStructureInfo>,
    /// Each input's (cut) range in node frames, ends inclusive.
    pub global_ranges: Vec<FrameRange>,
    pub policy: OutOfRangePolicy,
    pub fit: bool,
}

pub struct StackNode {
    definition: NodeDefinition,
    ranges: RangeCache<StackRanges>,
}

impl StackNode {
    pub fn new(definition: NodeDefinition) -> Self {
        Self {
            definition,
            ranges: RangeCache::new(),
        }
    }

    pub fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    /// Current range state, recomputing it when stale.
    pub fn ranges(&self, node: NodeRef<'_>) -> Arc<StackRanges> {
        self.ranges.lazy_update(|| compute_ranges(node))
    }

    /// Number of range recomputations so far.
    pub fn range_generation(&self) -> u64 {
        self.ranges.generation()
    }

    /// Force the next range query to recompute.
    pub fn invalidate(&self) {
        self.ranges.mark_dirty();
    }

    /// Frame of input `index` shown at `frame`.
    pub fn input_frame(&self, node: NodeRef<'_>, index: usize, frame: i32, unconstrained: bool) -> i32 {
        let ranges = self.ranges(node);
        match ranges.input_ranges.get(index) {
            Some(input) => ranges.mapping.input_frame(input, frame, unconstrained),
            None => frame + ranges.mapping.offset,
        }
    }
}

fn compute_ranges(node: NodeRef<'_>) -> StackRanges {
    let use_cut_info = node.prop("timing.useCutInfo", 1i32) != 0;
    let align = node.prop("timing.alignStartFrames", 0i32) != 0;
    let auto_size = node.prop("output.autoSize", 1i32) != 0;
    let requested_fps = node.prop("output.fps", 0.0f32);
    let policy = OutOfRangePolicy::from_name(&node.prop("output.outOfRangePolicy", "hold".to_string()));
    let fit = node.prop("output.fit", 0i32) != 0;

    let inputs = read_inputs(node);
    let mut info = ImageRangeInfo::default();
    let mut computed = ImageStructureInfo::default();
    let mut max_duration = 0;

    for (i, input) in inputs.iter().enumerate() {
        let range = &input.range;
        if i == 0 {
            info = ImageRangeInfo::new(range.first(use_cut_info), range.last(use_cut_info), range.fps);
            computed = ImageStructureInfo::new(input.structure.width, input.structure.height);
            max_duration = range.duration(use_cut_info);
        } else {
            computed.width = computed.width.max(input.structure.width);
            computed.height = computed.height.max(input.structure.height);
            info.start = info.start.min(range.first(use_cut_info));
            info.end = info.end.max(range.last(use_cut_info));
            max_duration = max_duration.max(range.duration(use_cut_info));
        }
    }

    if align {
        info.end = info.start + max_duration - 1;
    }

    info.cut_in = info.start;
    info.cut_out = info.end;
    info.fps = output_fps(requested_fps, &inputs);

    let mapping = FrameMapping {
        info,
        offset: info.start - 1,
        use_cut_info,
        align,
    };

    let global_ranges = inputs
        .iter()
        .map(|input| {
            let r = &input.range;
            let frames = mapping.to_eval_frames(r, &[r.first(use_cut_info), r.last(use_cut_info)]);
            (frames[0], frames[1])
        })
        .collect();

    let structure = output_structure(node, auto_size, computed);
    debug!(
        "{}: stack range {} size {}x{}",
        node.name(),
        mapping.visible_info(),
        structure.width,
        structure.height
    );

    StackRanges {
        mapping,
        structure,
        input_ranges: inputs.iter().map(|i| i.range).collect(),
        input_structures: inputs.iter().map(|i| i.structure).collect(),
        global_ranges,
        policy,
        fit,
    }
}

impl IpNode for StackNode {
    fn type_name(&self) -> &str {
        self.definition.name()
    }

    fn declare_properties(&self, props: &mut PropertyContainer, _config: &EngineConfig) -> Result<()> {
        props.declare("node.active", 1i32)?;
        props.declare("timing.useCutInfo", 1i32)?;
        props.declare("timing.alignStartFrames", 0i32)?;
        props.declare("output.outOfRangePolicy", "hold".to_string())?;
        props.declare("output.autoSize", 1i32)?;
        props.declare("output.activeAudioInput", ".all.".to_string())?;
        props.declare("output.fps", 0.0f32)?;
        props.declare_array("output.size", OUTPUT_SIZE.to_vec())?;
        props.declare("output.fit", 0i32)?;
        self.definition.declare_parameters(props)
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        if node.prop("node.active", 1i32) == 0 {
            return default_evaluate(node, context);
        }

        let ranges = self.ranges(node);
        let inputs = node.inputs();
        let function = self.definition.function();

        if inputs.len() != function.image_parameter_count() {
            return Ok(IpImage::new_no_image(node.name(), "Missing Inputs"));
        }

        let aspect = structure_aspect(&ranges.structure);
        let mut root = IpImage::intermediate(
            node.name(),
            RenderType::Merge,
            ranges.structure.width,
            ranges.structure.height,
        );
        if inputs.is_empty() {
            return Ok(root);
        }

        let mut images = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            let range = ranges.input_ranges.get(i).copied().unwrap_or_default();
            let placeholder = match ranges.policy {
                OutOfRangePolicy::Hold => None,
                _ if ranges.mapping.in_range(&range, context.frame) => None,
                policy => {
                    let s = ranges.input_structures.get(i).copied().unwrap_or_default();
                    Some(if policy == OutOfRangePolicy::Black {
                        IpImage::new_black_image(node.name(), s.width, s.height)
                    } else {
                        IpImage::new_blank_image(node.name(), s.width, s.height)
                    })
                }
            };

            let mut image = match placeholder {
                Some(image) => image,
                None => {
                    let mut c = context.at_frame(ranges.mapping.input_frame(&range, context.frame, false));
                    c.fps = ranges.mapping.info.fps;
                    match input.evaluate(&c) {
                        Ok(image) => image,
                        Err(e) => {
                            context.cache.check_in_and_delete(images);
                            return Err(e);
                        }
                    }
                }
            };

            if ranges.fit {
                image.fit_to_aspect(aspect);
            }
            images.push(image);
        }

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
        root.blend_mode = BlendMode::from_name(function.name());
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
            let range = ranges.input_ranges.get(i).copied().unwrap_or_default();
            if ranges.policy == OutOfRangePolicy::Blank && !ranges.mapping.in_range(&range, context.frame) {
                continue;
            }
            let c = context.at_frame(ranges.mapping.input_frame(&range, context.frame, false));
            let child = input.evaluate_identifier(&c)?.ok_or_else(|| {
                IpError::EvaluationFailed(format!(
                    "stack {} got no identifier from input {}",
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
        self.ranges(node).mapping.visible_info()
    }

    fn image_structure_info(&self, node: NodeRef<'_>, _context: &Context) -> ImageStructureInfo {
        self.ranges(node).structure
    }

    fn audio_fill_buffer(&self, node: NodeRef<'_>, context: &mut AudioContext) -> usize {
        let inputs = node.inputs();
        if inputs.is_empty() {
            return 0;
        }

        let ranges = self.ranges(node);
        let selection = ActiveAudioInput::from_name(&node.prop("output.activeAudioInput", ".all.".to_string()));
        let only = match &selection {
            ActiveAudioInput::Named(name) => inputs.iter().position(|i| i.first_leaf_name() == name.as_str()),
            _ => None,
        };

        let fps = if context.fps > 0.0 {
            context.fps
        } else {
            ranges.mapping.info.fps as f64
        };
        if fps <= 0.0 {
            return 0;
        }
        let rate = context.buffer.rate();
        let start_time = context.buffer.start_time();
        let first_sample = context.buffer.start_sample();
        let to_sample = |frames: i32| time_to_samples(frames_to_seconds(frames, fps), rate);
        let mut filled = 0;

        for (i, input) in inputs.iter().enumerate() {
            if only.is_some_and(|index| index != i) {
                continue;
            }

            let range = ranges.input_ranges.get(i).copied().unwrap_or_default();
            let offset = ranges.mapping.input_frame(&range, 1, true) - range.start;
            let buffer = AudioBuffer::like(&context.buffer, start_time + frames_to_seconds(offset, fps));
            let mut sub = AudioContext::new(buffer, fps);

            filled = filled.max(input.audio_fill_buffer(&mut sub));

            // Media outside the input's cut stays silent.
            let mut samples = sub.buffer;
            if let Some(&(g0, g1)) = ranges.global_ranges.get(i) {
                samples.set_start_sample(first_sample);
                mask_outside(&mut samples, to_sample(g0 - 1), to_sample(g1));
            }
            add_into(&mut context.buffer, &samples);

            match selection {
                ActiveAudioInput::Topmost if filled > 0 => break,
                ActiveAudioInput::First => break,
                _ => {}
            }
        }

        filled
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        let ranges = self.ranges(node);
        visitor.enter(context, node);
        for (i, input) in node.inputs().into_iter().enumerate() {
            let range = ranges.input_ranges.get(i).copied().unwrap_or_default();
            let c = context.at_frame(ranges.mapping.input_frame(&range, context.frame, false));
            if visitor.traverse_child(&c, i, node, input) {
                input.meta_evaluate(&c, visitor);
            }
        }
        visitor.leave(context, node);
    }

    fn test_evaluate(&self, node: NodeRef<'_>, context: &Context, result: &mut TestEvaluationResult) {
        let ranges = self.ranges(node);
        for (i, input) in node.inputs().into_iter().enumerate() {
            let range = ranges.input_ranges.get(i).copied().unwrap_or_default();
            let c = context.at_frame(ranges.mapping.input_frame(&range, context.frame, false));
            input.test_evaluate(&c, result);
        }
    }

    fn map_input_to_eval_frames(&self, node: NodeRef<'_>, index: usize, frames: &[i32]) -> Vec<i32> {
        let ranges = self.ranges(node);
        match ranges.input_ranges.get(index) {
            Some(input) => ranges.mapping.to_eval_frames(input, frames),
            None => frames.to_vec(),
        }
    }

    fn property_changed(&self, _node: NodeRef<'_>, name: &str) -> Result<Invalidation> {
        Ok(match name {
            "timing.useCutInfo"
            | "timing.alignStartFrames"
            | "output.outOfRangePolicy"
            | "output.fps"
            | "output.fit" => {
                self.ranges.mark_range_dirty();
                Invalidation::RANGE
            }
            "output.autoSize" | "output.size" => {
                self.ranges.mark_structure_dirty();
                Invalidation::STRUCTURE
            }
            "output.activeAudioInput" => Invalidation::AUDIO,
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
