//! Leaf node standing in for a media reader.
//!
//! Frames are identified as `<node>:<frame>` and audio is a constant
//! level over the media's duration. Reading can be made to fail through
//! `debug.failEvaluate`.

use crate::context::{AudioContext, Context};
use crate::image::{FrameBufferRef, IpImage, IpImageId, RenderType};
use crate::node::{Invalidation, IpNode, NodeRef, TestEvaluationResult};
use ipcore_audio::time_to_samples;
use ipcore_core::{EngineConfig, ImageRangeInfo, ImageStructureInfo, IpError, PropertyContainer, Result};
use ipcore_gpu::Expression;
use std::any::Any;

#[derive(Debug, Default)]
pub struct SourceNode;

impl SourceNode {
    pub fn new() -> Self {
        Self
    }
}

impl IpNode for SourceNode {
    fn type_name(&self) -> &str {
        "Source"
    }

    fn declare_properties(&self, props: &mut PropertyContainer, config: &EngineConfig) -> Result<()> {
        props.declare("media.start", 1i32)?;
        props.declare("media.end", 100i32)?;
        props.declare("media.cutIn", i32::MIN)?;
        props.declare("media.cutOut", i32::MAX)?;
        props.declare("media.fps", config.render.default_fps)?;
        props.declare("media.width", 640i32)?;
        props.declare("media.height", 480i32)?;
        props.declare("media.pixelAspect", 1.0f32)?;
        props.declare("media.planes", 1i32)?;
        props.declare("media.poorRandomAccess", 0i32)?;
        props.declare("audio.active", 0i32)?;
        props.declare("audio.value", 0.0f32)?;
        props.declare("debug.failEvaluate", 0i32)?;
        Ok(())
    }

    fn max_inputs(&self) -> Option<usize> {
        Some(0)
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        if node.prop("debug.failEvaluate", 0i32) != 0 {
            return Err(IpError::ReadFailed(format!(
                "{}: unable to read frame {}",
                node.name(),
                context.frame
            )));
        }

        let structure = self.image_structure_info(node, context);
        let planes = node.prop("media.planes", 1i32).max(1) as usize;
        let mut image = IpImage::new(node.name(), RenderType::Blend, structure.width, structure.height);
        image.pixel_aspect = structure.pixel_aspect;
        image.fb = Some(FrameBufferRef::new(format!("{}:{}", node.name(), context.frame), planes));
        image.shader_expr = Some(Expression::source_rgba(image.key));
        image.record_resource_usage();
        Ok(image)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        Ok(Some(IpImageId::new(format!("{}:{}", node.name(), context.frame))))
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        let props = node.properties();
        let start = props.get_or("media.start", 1i32);
        let end = props.get_or("media.end", 1i32);
        // Unset cut points cover the whole range.
        let cut_in = props.get_or("media.cutIn", i32::MIN).max(start).min(end);
        let cut_out = props.get_or("media.cutOut", i32::MAX).max(start).min(end);
        ImageRangeInfo::with_cuts(start, end, cut_in, cut_out, props.get_or("media.fps", 0.0f32))
    }

    fn image_structure_info(&self, node: NodeRef<'_>, _context: &Context) -> ImageStructureInfo {
        let props = node.properties();
        ImageStructureInfo {
            width: props.get_or("media.width", 0i32),
            height: props.get_or("media.height", 0i32),
            pixel_aspect: props.get_or("media.pixelAspect", 1.0f32),
        }
    }

    /// Local time zero is the first frame of the media.
    fn audio_fill_buffer(&self, node: NodeRef<'_>, context: &mut AudioContext) -> usize {
        if node.prop("audio.active", 0i32) == 0 {
            return 0;
        }
        let value = node.prop("audio.value", 0.0f32);
        let range = self.image_range_info(node);
        let fps = if range.fps > 0.0 {
            range.fps as f64
        } else {
            context.fps
        };
        if fps <= 0.0 {
            return 0;
        }

        let buffer = &mut context.buffer;
        let rate = buffer.rate();
        let media_end = time_to_samples(range.duration(false) as f64 / fps, rate);
        let first = buffer.start_sample();
        let lo = (-first).clamp(0, buffer.size() as i64) as usize;
        let hi = (media_end - first).clamp(0, buffer.size() as i64) as usize;
        if lo >= hi {
            return 0;
        }

        let channels = buffer.channels();
        for s in &mut buffer.samples_mut()[lo * channels..hi * channels] {
            *s = value;
        }
        hi - lo
    }

    fn test_evaluate(&self, node: NodeRef<'_>, _context: &Context, result: &mut TestEvaluationResult) {
        if node.prop("media.poorRandomAccess", 0i32) != 0 {
            result.poor_random_access_performance = true;
        }
    }

    fn property_changed(&self, _node: NodeRef<'_>, name: &str) -> Result<Invalidation> {
        Ok(if name.starts_with("media.") {
            Invalidation::RANGE | Invalidation::STRUCTURE | Invalidation::AUDIO
        } else if name.starts_with("audio.") {
            Invalidation::AUDIO
        } else {
            Invalidation::NONE
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
