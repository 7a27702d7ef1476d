//! IPCore GPU - renderer-facing shader model
//!
//! The graph never compiles shaders. It builds [`Expression`] trees out of
//! named [`ShaderFunction`]s and hands them to the renderer inside each
//! `IPImage`. This crate also carries the [`ResourceUsage`] bookkeeping used
//! to decide how many images can be merged in a single pass.

pub mod blend;
pub mod function;
pub mod resource;
pub mod shader;
pub mod texture;

pub use blend::BlendMode;
pub use function::{FunctionKind, ParamType, ShaderFunction, ShaderParameter};
pub use resource::ResourceUsage;
pub use shader::{Argument, Expression, ImageKey, Value};
pub use texture::{Texels, TextureData, TextureFormat};
