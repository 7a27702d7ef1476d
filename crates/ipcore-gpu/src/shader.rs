//! Shader expression trees.
//!
//! An [`Expression`] is a call of a [`ShaderFunction`] with bound
//! arguments. Image arguments are themselves expressions; the leaves are
//! `sourceRGBA` fetches of a particular image. The renderer walks the tree to
//! generate and bind one shader program per render pass.

use crate::function::{builtins, FunctionKind, ShaderFunction};
use crate::resource::ResourceUsage;
use crate::texture::TextureData;
use glam::Mat4;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Identifies the image an expression is attached to.
pub type ImageKey = u64;

/// A non-image argument value.
#[derive(Debug, Clone)]
pub enum Value {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4(Mat4),
    Texture(Arc<TextureData>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Vec2(v) => write!(f, "{:?}", v),
            Self::Vec3(v) => write!(f, "{:?}", v),
            Self::Vec4(v) => write!(f, "{:?}", v),
            Self::Mat4(_) => write!(f, "mat4"),
            Self::Texture(t) => write!(f, "tex:{}", t.id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Argument {
    Image { name: String, expr: Box<Expression> },
    Bound { name: String, value: Value },
}

impl Argument {
    pub fn image(name: impl Into<String>, expr: Expression) -> Self {
        Self::Image {
            name: name.into(),
            expr: Box::new(expr),
        }
    }

    pub fn bound(name: impl Into<String>, value: Value) -> Self {
        Self::Bound {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Image { name, .. } | Self::Bound { name, .. } => name,
        }
    }
}

/// A bound function call.
#[derive(Debug, Clone)]
pub struct Expression {
    function: Arc<ShaderFunction>,
    arguments: SmallVec<[Argument; 4]>,
    image: ImageKey,
}

impl Expression {
    pub fn new(function: Arc<ShaderFunction>, arguments: Vec<Argument>, image: ImageKey) -> Self {
        Self {
            function,
            arguments: arguments.into(),
            image,
        }
    }

    /// Fetch of `image`'s own pixels.
    pub fn source_rgba(image: ImageKey) -> Self {
        Self::new(builtins::source_rgba(), Vec::new(), image)
    }

    /// Apply a single-input function to `input`, binding the remaining
    /// parameters from `values`.
    pub fn apply(
        function: Arc<ShaderFunction>,
        input: Expression,
        values: Vec<(&str, Value)>,
        image: ImageKey,
    ) -> Self {
        let mut arguments = Vec::with_capacity(values.len() + 1);
        let input_name = function
            .image_parameters()
            .next()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "in".to_string());
        arguments.push(Argument::image(input_name, input));
        arguments.extend(values.into_iter().map(|(n, v)| Argument::bound(n, v)));
        Self::new(function, arguments, image)
    }

    pub fn function(&self) -> &ShaderFunction {
        &self.function
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn image(&self) -> ImageKey {
        self.image
    }

    pub fn is_source(&self) -> bool {
        self.function.is_source()
    }

    /// Image argument expressions, in parameter order.
    pub fn image_arguments(&self) -> impl Iterator<Item = &Expression> {
        self.arguments.iter().filter_map(|a| match a {
            Argument::Image { expr, .. } => Some(expr.as_ref()),
            Argument::Bound { .. } => None,
        })
    }

    pub fn bound_value(&self, name: &str) -> Option<&Value> {
        self.arguments.iter().find_map(|a| match a {
            Argument::Bound { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    /// Cost of the whole tree. Filters multiply the fetches of their
    /// inputs, every other function sums them.
    pub fn resource_usage(&self) -> ResourceUsage {
        let mut usage = self.function.resource_usage();
        for arg in self.image_arguments() {
            let u = arg.resource_usage();
            usage.coords += u.coords;
            usage.buffers += u.buffers;
            if self.function.is_filter() {
                usage.fetches *= u.fetches;
            } else {
                usage.fetches += u.fetches;
            }
        }
        usage
    }

    fn count_kind(&self, kind: FunctionKind, max: usize, count: &mut usize) {
        if *count >= max {
            return;
        }
        if self.function.kind() == kind {
            *count += 1;
        }
        for arg in self.image_arguments() {
            arg.count_kind(kind, max, count);
        }
    }

    /// Number of source fetches in the tree, counting no further than `max`.
    pub fn source_function_count(&self, max: usize) -> usize {
        let mut count = 0;
        self.count_kind(FunctionKind::Source, max, &mut count);
        count
    }

    /// Number of filter functions in the tree, counting no further than `max`.
    pub fn filter_function_count(&self, max: usize) -> usize {
        let mut count = 0;
        self.count_kind(FunctionKind::Filter, max, &mut count);
        count
    }

    /// Replace every source leaf of this tree with `replacement`.
    pub fn replace_source(self, replacement: &Expression) -> Expression {
        if self.is_source() {
            return replacement.clone();
        }
        let Expression {
            function,
            arguments,
            image,
        } = self;
        let arguments = arguments
            .into_iter()
            .map(|a| match a {
                Argument::Image { name, expr } => Argument::Image {
                    name,
                    expr: Box::new(expr.replace_source(replacement)),
                },
                bound => bound,
            })
            .collect();
        Expression {
            function,
            arguments,
            image,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_source() {
            return write!(f, "{}#{}", self.name(), self.image);
        }
        write!(f, "{}(", self.name())?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Argument::Image { expr, .. } => write!(f, "{}", expr)?,
                Argument::Bound { name, value } => write!(f, "{}={}", name, value)?,
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn over(a: Expression, b: Expression) -> Expression {
        Expression::new(
            Arc::new(builtins::composite("over", 2)),
            vec![Argument::image("i0", a), Argument::image("i1", b)],
            100,
        )
    }

    #[test]
    fn test_source_usage() {
        assert_eq!(Expression::source_rgba(1).resource_usage(), ResourceUsage::SINGLE);
    }

    #[test]
    fn test_merge_usage_sums() {
        let e = over(Expression::source_rgba(1), Expression::source_rgba(2));
        assert_eq!(e.resource_usage(), ResourceUsage::new(2, 2, 2));
        assert_eq!(e.source_function_count(8), 2);
        assert_eq!(e.source_function_count(1), 1);
    }

    #[test]
    fn test_filter_usage_multiplies() {
        let e = Expression::apply(
            builtins::noise_reduction(),
            Expression::source_rgba(1),
            vec![("amount", Value::Float(0.5))],
            1,
        );
        assert_eq!(e.resource_usage(), ResourceUsage::new(9, 1, 1));
        assert_eq!(e.filter_function_count(1), 1);
        assert!(matches!(e.bound_value("amount"), Some(Value::Float(v)) if *v == 0.5));
    }

    #[test]
    fn test_replace_source() {
        let shader = Expression::apply(
            builtins::color_matrix(),
            Expression::source_rgba(7),
            vec![("M", Value::Mat4(Mat4::IDENTITY))],
            7,
        );
        let merge = over(Expression::source_rgba(1), Expression::source_rgba(2));
        let replaced = shader.replace_source(&merge);
        assert_eq!(
            replaced.to_string(),
            "colorMatrix(over(sourceRGBA#1, sourceRGBA#2), M=mat4)"
        );
    }
}
