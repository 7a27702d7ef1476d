//! Node definitions and the node factory.
//!
//! A [`NodeDefinition`] pairs a node protocol name with the shader function
//! its instances evaluate to. Non-image parameters of the function become
//! `parameters.<name>` properties on each instance; the special parameters
//! (`frame`, `fps`, `baseFrame`, `stereoEye`) are bound from the
//! evaluation context instead.

use crate::context::Context;
use crate::node::{IpNode, NodeRef};
use crate::nodes::{LutNode, NoiseReductionNode, SourceNode, StackNode, SwitchNode, TransitionNode};
use glam::Mat4;
use ipcore_core::{IpError, PropertyContainer, Result};
use ipcore_gpu::function::builtins;
use ipcore_gpu::{Argument, Expression, ImageKey, ParamType, ShaderFunction, Value};
use std::sync::Arc;

/// Composite operations a stack can be built with.
pub const STACK_COMPOSITES: &[&str] = &["over", "add", "difference", "-difference", "replace", "topmost"];

#[derive(Debug, Clone)]
pub struct NodeDefinition {
    name: String,
    function: Arc<ShaderFunction>,
    defaults: Vec<(String, Value)>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>, function: ShaderFunction) -> Self {
        Self {
            name: name.into(),
            function: Arc::new(function),
            defaults: Vec::new(),
        }
    }

    /// Default value of the `parameters.<param>` property.
    pub fn with_default(mut self, param: &str, value: Value) -> Self {
        self.defaults.push((param.to_string(), value));
        self
    }

    /// A stack compositing `inputs` images with `composite`.
    pub fn stack(composite: &str, inputs: usize) -> Self {
        Self::new("Stack", builtins::composite(composite, inputs))
    }

    pub fn cross_dissolve() -> Self {
        Self::new("Transition", builtins::cross_dissolve())
            .with_default("startFrame", Value::Float(1.0))
            .with_default("numFrames", Value::Float(10.0))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &Arc<ShaderFunction> {
        &self.function
    }

    pub fn image_parameter_count(&self) -> usize {
        self.function.image_parameter_count()
    }

    pub fn is_filter(&self) -> bool {
        self.function.is_filter()
    }

    fn default_for(&self, param: &str) -> Option<&Value> {
        self.defaults
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, value)| value)
    }

    /// Declare `parameters.<name>` for every bindable parameter.
    pub fn declare_parameters(&self, props: &mut PropertyContainer) -> Result<()> {
        for param in self.function.parameters() {
            if param.ty == ParamType::InputImage || ShaderFunction::is_special_parameter(&param.name) {
                continue;
            }
            let name = format!("parameters.{}", param.name);
            let default = self.default_for(&param.name);
            match (param.ty, default) {
                (ParamType::Float, Some(Value::Float(v))) => props.declare(&name, *v)?,
                (ParamType::Float, _) => props.declare(&name, 0.0f32)?,
                (ParamType::Int, Some(Value::Int(v))) => props.declare(&name, *v)?,
                (ParamType::Int | ParamType::Bool, _) => props.declare(&name, 0i32)?,
                (ParamType::Vec2, _) => props.declare(&name, [0.0f32; 2])?,
                (ParamType::Vec3, _) => props.declare(&name, [0.0f32; 3])?,
                (ParamType::Vec4, _) => props.declare(&name, [0.0f32; 4])?,
                (ParamType::Mat4, _) => props.declare(&name, Mat4::IDENTITY)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Bind the function for `image`: image parameters take `inputs` in
    /// order, the rest come from properties or the context.
    pub fn bind(
        &self,
        image: ImageKey,
        inputs: impl IntoIterator<Item = Expression>,
        node: NodeRef<'_>,
        context: &Context,
    ) -> Expression {
        let mut inputs = inputs.into_iter();
        let props = node.properties();
        let mut arguments = Vec::with_capacity(self.function.parameters().len());

        for param in self.function.parameters() {
            if param.ty == ParamType::InputImage {
                if let Some(expr) = inputs.next() {
                    arguments.push(Argument::image(param.name.clone(), expr));
                }
                continue;
            }

            let name = format!("parameters.{}", param.name);
            let from_property = match param.ty {
                ParamType::Float => props.get::<f32>(&name).ok().map(Value::Float),
                ParamType::Int => props.get::<i32>(&name).ok().map(Value::Int),
                ParamType::Bool => props.get::<i32>(&name).ok().map(|v| Value::Bool(v != 0)),
                ParamType::Vec2 => props.get::<[f32; 2]>(&name).ok().map(Value::Vec2),
                ParamType::Vec3 => props.get::<[f32; 3]>(&name).ok().map(Value::Vec3),
                ParamType::Vec4 => props.get::<[f32; 4]>(&name).ok().map(Value::Vec4),
                ParamType::Mat4 => props.get::<Mat4>(&name).ok().map(Value::Mat4),
                _ => None,
            };
            let value = from_property.or_else(|| special_value(&param.name, param.ty, context));
            if let Some(value) = value {
                arguments.push(Argument::bound(param.name.clone(), value));
            }
        }

        Expression::new(self.function.clone(), arguments, image)
    }
}

fn special_value(name: &str, ty: ParamType, context: &Context) -> Option<Value> {
    let number = |v: f32| match ty {
        ParamType::Int => Some(Value::Int(v as i32)),
        ParamType::Float => Some(Value::Float(v)),
        _ => None,
    };
    match name {
        "frame" => number(context.frame as f32),
        "baseFrame" => number(context.base_frame as f32),
        "stereoEye" => number(context.eye as f32),
        "fps" => number(context.fps),
        _ => None,
    }
}

/// Builds a node of a registered type. The argument is the number of
/// inputs the node will be wired to.
pub type NodeConstructor = Box<dyn Fn(usize) -> Box<dyn IpNode> + Send + Sync>;

/// Registry of node types by name.
pub struct NodeFactory {
    constructors: Vec<(String, NodeConstructor)>,
}

impl NodeFactory {
    /// Create a factory with all built-in node types.
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: Vec::new(),
        };
        factory.register(
            "Stack",
            Box::new(|n| Box::new(StackNode::new(NodeDefinition::stack("over", n)))),
        );
        for &composite in STACK_COMPOSITES {
            factory.register(
                &format!("Stack:{}", composite),
                Box::new(move |n| Box::new(StackNode::new(NodeDefinition::stack(composite, n)))),
            );
        }
        factory.register(
            "Transition",
            Box::new(|_| Box::new(TransitionNode::new(NodeDefinition::cross_dissolve()))),
        );
        factory.register("Switch", Box::new(|_| Box::new(SwitchNode::new())));
        factory.register("LUT", Box::new(|_| Box::new(LutNode::new())));
        factory.register("NoiseReduction", Box::new(|_| Box::new(NoiseReductionNode::new())));
        factory.register("Source", Box::new(|_| Box::new(SourceNode::new())));
        factory
    }

    /// Register a node type, replacing any earlier one of the same name.
    pub fn register(&mut self, name: &str, constructor: NodeConstructor) {
        self.constructors.retain(|(n, _)| n != name);
        self.constructors.push((name.to_string(), constructor));
    }

    pub fn create(&self, type_name: &str, input_count: usize) -> Result<Box<dyn IpNode>> {
        self.constructors
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, constructor)| constructor(input_count))
            .ok_or_else(|| IpError::Graph(format!("unknown node type {}", type_name)))
    }

    /// All registered type names.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}
