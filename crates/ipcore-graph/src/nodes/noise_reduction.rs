//! Denoise filter node.
//!
//! When active with a non-zero amount the input is flattened to its own
//! buffer and sampled through the `noiseReduction` filter by an
//! intermediate image. Otherwise the input passes through untouched.

use crate::compose::convert_blend_render_type_to_intermediate;
use crate::context::Context;
use crate::image::{IpImage, IpImageId, RenderType};
use crate::node::{IpNode, NodeRef};
use ipcore_core::{EngineConfig, PropertyContainer, Result};
use ipcore_gpu::function::builtins;
use ipcore_gpu::{Expression, Value};
use std::any::Any;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    amount: f32,
    radius: f32,
    threshold: f32,
}

#[derive(Debug, Default)]
pub struct NoiseReductionNode;

impl NoiseReductionNode {
    pub fn new() -> Self {
        Self
    }

    fn settings(node: NodeRef<'_>) -> Option<Settings> {
        let props = node.properties();
        let active = props.get_or("node.active", 1i32) != 0;
        let amount = props.get_or("node.amount", 0.0f32);
        (active && amount != 0.0).then(|| Settings {
            amount,
            radius: props.get_or("node.radius", 0.0f32),
            threshold: props.get_or("node.threshold", 5.0f32),
        })
    }
}

impl IpNode for NoiseReductionNode {
    fn type_name(&self) -> &str {
        "NoiseReduction"
    }

    fn declare_properties(&self, props: &mut PropertyContainer, _config: &EngineConfig) -> Result<()> {
        props.declare("node.active", 1i32)?;
        props.declare("node.amount", 0.0f32)?;
        props.declare("node.radius", 0.0f32)?;
        props.declare("node.threshold", 5.0f32)?;
        Ok(())
    }

    fn max_inputs(&self) -> Option<usize> {
        Some(1)
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        let Some(input) = node.input(0) else {
            return Ok(IpImage::new_no_image(node.name(), "No Input"));
        };
        let mut head = input.evaluate(context)?;
        let Some(settings) = Self::settings(node) else {
            return Ok(head);
        };

        convert_blend_render_type_to_intermediate(&mut head);
        let mut root = IpImage::intermediate(node.name(), RenderType::Blend, head.width, head.height);
        root.pixel_aspect = head.pixel_aspect;

        let shader = Expression::apply(
            builtins::noise_reduction(),
            Expression::source_rgba(head.key),
            vec![
                ("amount", Value::Float(settings.amount)),
                ("radius", Value::Float(settings.radius)),
                ("threshold", Value::Float(settings.threshold)),
            ],
            root.key,
        );
        root.resource_usage = shader.resource_usage();
        root.shader_expr = Some(shader);
        root.append_child(head);
        Ok(root)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        let Some(input) = node.input(0) else {
            return Ok(None);
        };
        let child = input.evaluate_identifier(context)?;
        Ok(match (Self::settings(node), child) {
            (Some(s), Some(child)) => Some(IpImageId::with_children(
                format!("{}:{}/{}/{}", node.name(), s.amount, s.radius, s.threshold),
                vec![child],
            )),
            (_, child) => child,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
