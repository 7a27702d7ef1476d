//! Shader function signatures.
//!
//! A [`ShaderFunction`] describes one GLSL entry point the renderer knows
//! how to compile: its name, its parameters, and what it costs. Nodes bind
//! arguments to these to build expression trees.

use crate::resource::ResourceUsage;
use std::sync::{Arc, OnceLock};

/// What a function does with its image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Samples an image. Leaves of every expression tree.
    Source,
    /// Samples its input more than once (kernels). Multiplies fetches.
    Filter,
    /// Combines several images into one.
    Merge,
    /// Per-pixel color operation on a single input.
    Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    InputImage,
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Sampler1D,
    Sampler3D,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderParameter {
    pub name: String,
    pub ty: ParamType,
}

impl ShaderParameter {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Parameters bound by the node at evaluation time rather than from
/// properties.
pub const SPECIAL_PARAMETERS: &[&str] = &["frame", "fps", "baseFrame", "stereoEye", "_offset"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderFunction {
    name: String,
    kind: FunctionKind,
    parameters: Vec<ShaderParameter>,
    usage: ResourceUsage,
}

impl ShaderFunction {
    pub fn new(
        name: impl Into<String>,
        kind: FunctionKind,
        parameters: Vec<ShaderParameter>,
        usage: ResourceUsage,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters,
            usage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn parameters(&self) -> &[ShaderParameter] {
        &self.parameters
    }

    /// Own cost, excluding arguments.
    pub fn resource_usage(&self) -> ResourceUsage {
        self.usage
    }

    pub fn is_filter(&self) -> bool {
        self.kind == FunctionKind::Filter
    }

    pub fn is_source(&self) -> bool {
        self.kind == FunctionKind::Source
    }

    /// Parameters that take an image expression.
    pub fn image_parameters(&self) -> impl Iterator<Item = &ShaderParameter> {
        self.parameters
            .iter()
            .filter(|p| p.ty == ParamType::InputImage)
    }

    pub fn image_parameter_count(&self) -> usize {
        self.image_parameters().count()
    }

    pub fn is_input_image_parameter(&self, name: &str) -> bool {
        self.image_parameters().any(|p| p.name == name)
    }

    /// Whether `name` is bound at evaluation time.
    pub fn is_special_parameter(name: &str) -> bool {
        SPECIAL_PARAMETERS.contains(&name)
    }
}

/// Functions every renderer provides.
pub mod builtins {
    use super::*;

    fn image(name: &str) -> ShaderParameter {
        ShaderParameter::new(name, ParamType::InputImage)
    }

    /// Plain RGBA fetch from an image.
    pub fn source_rgba() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "sourceRGBA",
                FunctionKind::Source,
                Vec::new(),
                ResourceUsage::SINGLE,
            ))
        })
        .clone()
    }

    /// N-input composite (`over`, `add`, `difference`, `replace`, ...).
    pub fn composite(name: &str, inputs: usize) -> ShaderFunction {
        let parameters = (0..inputs)
            .map(|i| image(&format!("i{}", i)))
            .collect();
        ShaderFunction::new(name, FunctionKind::Merge, parameters, ResourceUsage::default())
    }

    /// Two-input dissolve driven by the transition window.
    pub fn cross_dissolve() -> ShaderFunction {
        ShaderFunction::new(
            "crossDissolve",
            FunctionKind::Merge,
            vec![
                image("i0"),
                image("i1"),
                ShaderParameter::new("startFrame", ParamType::Float),
                ShaderParameter::new("numFrames", ParamType::Float),
                ShaderParameter::new("frame", ParamType::Float),
            ],
            ResourceUsage::default(),
        )
    }

    pub fn conditioning_gamma() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "conditioningGamma",
                FunctionKind::Color,
                vec![image("in"), ShaderParameter::new("gamma", ParamType::Float)],
                ResourceUsage::default(),
            ))
        })
        .clone()
    }

    pub fn color_matrix() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "colorMatrix",
                FunctionKind::Color,
                vec![image("in"), ShaderParameter::new("M", ParamType::Mat4)],
                ResourceUsage::default(),
            ))
        })
        .clone()
    }

    /// Per-channel 1D table lookup.
    pub fn channel_lut() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "channelLUT",
                FunctionKind::Color,
                vec![
                    image("in"),
                    ShaderParameter::new("lut", ParamType::Sampler1D),
                    ShaderParameter::new("outScale", ParamType::Vec3),
                    ShaderParameter::new("outOffset", ParamType::Vec3),
                ],
                ResourceUsage::default(),
            ))
        })
        .clone()
    }

    /// 3D table lookup.
    pub fn lut_3d() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "LUT3D",
                FunctionKind::Color,
                vec![
                    image("in"),
                    ShaderParameter::new("lut", ParamType::Sampler3D),
                    ShaderParameter::new("inScale", ParamType::Vec3),
                    ShaderParameter::new("inOffset", ParamType::Vec3),
                    ShaderParameter::new("outScale", ParamType::Vec3),
                    ShaderParameter::new("outOffset", ParamType::Vec3),
                ],
                ResourceUsage::default(),
            ))
        })
        .clone()
    }

    /// Edge-preserving 3x3 denoise kernel.
    pub fn noise_reduction() -> Arc<ShaderFunction> {
        static F: OnceLock<Arc<ShaderFunction>> = OnceLock::new();
        F.get_or_init(|| {
            Arc::new(ShaderFunction::new(
                "noiseReduction",
                FunctionKind::Filter,
                vec![
                    image("in"),
                    ShaderParameter::new("amount", ParamType::Float),
                    ShaderParameter::new("radius", ParamType::Float),
                    ShaderParameter::new("threshold", ParamType::Float),
                ],
                ResourceUsage::new(9, 0, 0),
            ))
        })
        .clone()
    }
}
