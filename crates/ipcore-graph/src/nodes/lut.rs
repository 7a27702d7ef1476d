//! Color lookup node.
//!
//! LUTs come either from a file (`lut.file`, loaded through the graph's
//! [`LutCache`](ipcore_color::LutCache)) or straight from the `lut.lut`,
//! `lut.prelut` and `lut.size` properties. Whenever one of those changes the
//! node regenerates its tables and keeps them as a [`GeneratedLut`] until
//! the next change. Evaluation wraps the input's shader with:
//!
//! 1. conditioning gamma (only with a pre-LUT),
//! 2. the input matrix,
//! 3. the pre-LUT and the 3D table, or the channel table,
//! 4. the output matrix.
//!
//! Without float texture support tables are uploaded as normalized unsigned
//! shorts and carry the scale and offset needed to expand them again.

use crate::compose::convert_blend_render_type_to_intermediate;
use crate::context::Context;
use crate::image::{IpImage, IpImageId};
use crate::node::{Invalidation, IpNode, NodeRef};
use glam::Mat4;
use ipcore_color::resolve_lut_path;
use ipcore_core::{EngineConfig, IpError, LutConfig, PropertyContainer, Result};
use ipcore_gpu::function::builtins;
use ipcore_gpu::{Expression, Texels, TextureData, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error};

/// An uploaded table and how to expand its samples.
#[derive(Debug, Clone)]
pub struct LutTable {
    pub texture: Arc<TextureData>,
    pub scale: f32,
    pub offset: f32,
}

impl LutTable {
    fn out_scale(&self) -> Value {
        Value::Vec3([self.scale; 3])
    }

    fn out_offset(&self) -> Value {
        Value::Vec3([self.offset; 3])
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedLut {
    pub table: LutTable,
    pub prelut: Option<LutTable>,
    /// `[x, y, z]` for 3D tables, `[n, 1, 1]` for channel tables.
    pub dimensions: [usize; 3],
    pub is_3d: bool,
    pub in_matrix: Mat4,
    pub out_matrix: Mat4,
}

impl GeneratedLut {
    pub fn id(&self) -> &str {
        &self.table.texture.id
    }
}

fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Map `values` from `[min, min + range]` onto the full `u16` range.
fn normalize_u16(values: &[f32], min: f32, range: f32) -> Vec<u16> {
    let max = u16::MAX as f64;
    values
        .iter()
        .map(|&v| {
            let f = (v - min) as f64 / range as f64;
            if f > 1.0 {
                u16::MAX
            } else {
                (f * max) as u16
            }
        })
        .collect()
}

fn lerp_channel(lut: &[f32], n: usize, channel: usize, v: f32) -> f32 {
    let last = (n - 1) as f32;
    let i0 = (v * last) as usize;
    let i1 = if i0 as f32 >= last { i0 } else { i0 + 1 };
    let d = v * last - i0 as f32;
    let v0 = lut[i0 * 3 + channel];
    let v1 = lut[i1 * 3 + channel];
    v0 * (1.0 - d) + v1 * d
}

fn pack_rgb(c: [f32; 3]) -> u32 {
    let b = |v: f32| (v * 255.0) as u8 as u32;
    b(c[0]) | b(c[1]) << 8 | b(c[2]) << 16
}

/// Generate a 3D table from `lut`, red fastest.
fn generate_3d(lut: &[f32], sizes: [usize; 3], float_textures: bool, file: &str) -> Result<LutTable> {
    let n = sizes[0] * sizes[1] * sizes[2];
    if n * 3 != lut.len() {
        let mut msg = format!("3D LUT size mismatch {} != {}", n * 3, lut.len());
        if !file.is_empty() {
            msg.push_str(&format!(" ({})", file));
        }
        error!("{}", msg);
        return Err(IpError::EvaluationFailed(msg));
    }

    let mut h = (sizes[0] << 16 | sizes[1] << 8 | sizes[2]) as u32;
    for (i, &c) in lut.iter().enumerate() {
        h = h.wrapping_add((i as i32).wrapping_mul((1000.0 * c) as i32) as u32);
    }

    let (texels, scale, offset) = if float_textures {
        (Texels::F32(lut.to_vec()), 1.0, 0.0)
    } else {
        let (min, max) = min_max(lut);
        let low = normalize_u16(lut, min, max - min);
        for (i, &v) in low.iter().enumerate() {
            h = h.wrapping_add((i as u32).wrapping_mul(v as u32));
        }
        (Texels::U16(low), max - min, min)
    };

    let mut id = h.to_string();
    if !file.is_empty() {
        id.push(':');
        id.push_str(file);
    }

    Ok(LutTable {
        texture: Arc::new(TextureData::new(id, sizes, 3, texels)),
        scale,
        offset,
    })
}

/// Generate a channel table from interleaved RGB samples. Returns the table
/// and the resampled values, or nothing for an empty input.
fn generate_1d(lut: &[f32], float_textures: bool) -> Option<(LutTable, Vec<f32>)> {
    let n = lut.len() / 3;
    if n == 0 {
        return None;
    }

    let mut h = n as u32;
    let mut out = vec![0.0f32; n * 3];
    for i in 0..n {
        let t = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
        let c = [0, 1, 2].map(|channel| lerp_channel(lut, n, channel, t));
        out[i * 3..i * 3 + 3].copy_from_slice(&c);
        h ^= pack_rgb(c);
        h = h.rotate_left(8);
    }

    let (texels, scale, offset) = if float_textures {
        (Texels::F32(out.clone()), 1.0, 0.0)
    } else {
        let (min, max) = min_max(&out);
        let low = normalize_u16(&out, min, max - min);
        for &v in &low {
            h ^= v as u32;
            h = h.rotate_left(8);
        }
        (Texels::U16(low), max - min, min)
    };

    let table = LutTable {
        texture: Arc::new(TextureData::new(h.to_string(), [n, 1, 1], 3, texels)),
        scale,
        offset,
    };
    Some((table, out))
}

#[derive(Default)]
pub struct LutNode {
    generated: RwLock<Option<Arc<GeneratedLut>>>,
}

impl LutNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current tables, whether or not the node is active.
    pub fn generated(&self) -> Option<Arc<GeneratedLut>> {
        self.generated.read().clone()
    }

    fn active_lut(&self, node: NodeRef<'_>) -> Option<Arc<GeneratedLut>> {
        if node.prop("lut.active", 0i32) == 1 {
            self.generated()
        } else {
            None
        }
    }

    /// Load `lut.file` into the table properties, then regenerate.
    fn update_properties(&self, node: NodeRef<'_>) -> Result<()> {
        let file = node.prop("lut.file", String::new());
        if !file.is_empty() {
            let config = &node.config().lut;
            let path = resolve_lut_path(&file, &config.search_path)
                .ok_or_else(|| IpError::ReadFailed(format!("Unable to read lut: '{}'", file)))?;
            let prelut_size = node.prop("lut.preLUTSize", config.prelut_size as i32).max(0) as usize;
            let lut_config = LutConfig {
                prelut_size,
                ..config.clone()
            };
            let data = node.services().luts.load(&path, &lut_config)?;

            let mut size: Vec<i32> = data.dimensions.iter().map(|&d| d as i32).collect();
            size.resize(3, 0);

            node.store_property("lut.file", path.display().to_string())?;
            node.store_property("lut.inMatrix", data.in_matrix)?;
            node.store_property("lut.conditioningGamma", data.conditioning_gamma)?;
            node.store_property_values("lut.lut", data.data.clone())?;
            node.store_property_values("lut.prelut", data.prelut_data.clone())?;
            node.store_property_values("lut.size", size)?;
            node.store_property("lut.type", "RGB".to_string())?;
        }
        self.generate(node)
    }

    fn generate(&self, node: NodeRef<'_>) -> Result<()> {
        *self.generated.write() = None;

        let mut sizes = node.prop_values::<i32>("lut.size");
        sizes.resize(3, 0);
        let sizes = [0, 1, 2].map(|i| sizes[i].max(0) as usize);
        let float_textures = node.config().render.float_textures;
        let lut = node.prop_values::<f32>("lut.lut");
        let in_matrix = node.prop("lut.inMatrix", Mat4::IDENTITY);
        let out_matrix = node.prop("lut.outMatrix", Mat4::IDENTITY);

        let generated = if sizes.iter().all(|&s| s > 0) {
            let file = node.prop("lut.file", String::new());
            let table = generate_3d(&lut, sizes, float_textures, &file)?;
            node.store_property_values("lut:output.size", sizes.iter().map(|&s| s as i32).collect())?;
            node.store_property_values("lut:output.lut", lut)?;

            let prelut = node.prop_values::<f32>("lut.prelut");
            let prelut = match generate_1d(&prelut, float_textures) {
                Some((mut pre, values)) => {
                    node.store_property_values("lut:output.prelut", values)?;
                    let id = format!("{}:{}:preLUT", pre.texture.id, table.texture.id);
                    pre.texture = Arc::new(TextureData { id, ..(*pre.texture).clone() });
                    Some(pre)
                }
                None => None,
            };

            Some(GeneratedLut {
                table,
                prelut,
                dimensions: sizes,
                is_3d: true,
                in_matrix,
                out_matrix,
            })
        } else if sizes[0] > 0 {
            generate_1d(&lut, float_textures)
                .map(|(table, values)| -> Result<GeneratedLut> {
                    let n = values.len() / 3;
                    node.store_property_values("lut:output.size", vec![n as i32, 0, 0])?;
                    node.store_property_values("lut:output.lut", values)?;
                    Ok(GeneratedLut {
                        table,
                        prelut: None,
                        dimensions: [n, 1, 1],
                        is_3d: false,
                        in_matrix,
                        out_matrix,
                    })
                })
                .transpose()?
        } else {
            None
        };

        if let Some(lut) = &generated {
            node.store_property("lut.scale", lut.table.scale)?;
            node.store_property("lut.offset", lut.table.offset)?;
            let texture = &lut.table.texture;
            debug!(
                "{}: generated {}D LUT {} {:?} ({} bytes)",
                node.name(),
                texture.dimensionality(),
                lut.id(),
                lut.dimensions,
                texture.memory_size()
            );
        }
        *self.generated.write() = generated.map(Arc::new);
        Ok(())
    }

    fn add_pipeline(&self, node: NodeRef<'_>, image: &mut IpImage) {
        let Some(lut) = self.active_lut(node) else {
            return;
        };
        let Some(mut expr) = image.shader_expr.take() else {
            error!("cannot add LUT pipeline, image has no shader: {}", image.node);
            return;
        };
        let key = image.key;

        if lut.prelut.is_some() {
            let gamma = node.prop("lut.conditioningGamma", 1.0f32);
            if gamma != 1.0 {
                expr = Expression::apply(
                    builtins::conditioning_gamma(),
                    expr,
                    vec![("gamma", Value::Float(gamma))],
                    key,
                );
            }
        }

        expr = Expression::apply(
            builtins::color_matrix(),
            expr,
            vec![("M", Value::Mat4(lut.in_matrix))],
            key,
        );

        if lut.is_3d {
            if let Some(pre) = &lut.prelut {
                expr = Expression::apply(
                    builtins::channel_lut(),
                    expr,
                    vec![
                        ("lut", Value::Texture(pre.texture.clone())),
                        ("outScale", pre.out_scale()),
                        ("outOffset", pre.out_offset()),
                    ],
                    key,
                );
            }
            let grid = lut.dimensions.map(|d| 1.0 / d as f32);
            expr = Expression::apply(
                builtins::lut_3d(),
                expr,
                vec![
                    ("lut", Value::Texture(lut.table.texture.clone())),
                    ("inScale", Value::Vec3(grid.map(|g| 1.0 - g))),
                    ("inOffset", Value::Vec3(grid.map(|g| g / 2.0))),
                    ("outScale", lut.table.out_scale()),
                    ("outOffset", lut.table.out_offset()),
                ],
                key,
            );
        } else {
            expr = Expression::apply(
                builtins::channel_lut(),
                expr,
                vec![
                    ("lut", Value::Texture(lut.table.texture.clone())),
                    ("outScale", lut.table.out_scale()),
                    ("outOffset", lut.table.out_offset()),
                ],
                key,
            );
        }

        expr = Expression::apply(
            builtins::color_matrix(),
            expr,
            vec![("M", Value::Mat4(lut.out_matrix))],
            key,
        );

        image.resource_usage = expr.resource_usage();
        image.shader_expr = Some(expr);
    }
}

impl IpNode for LutNode {
    fn type_name(&self) -> &str {
        "LUT"
    }

    fn declare_properties(&self, props: &mut PropertyContainer, config: &EngineConfig) -> Result<()> {
        props.declare("lut.inMatrix", Mat4::IDENTITY)?;
        props.declare("lut.outMatrix", Mat4::IDENTITY)?;
        props.declare_array("lut.lut", Vec::<f32>::new())?;
        props.declare_array("lut.prelut", Vec::<f32>::new())?;
        props.declare("lut.scale", 1.0f32)?;
        props.declare("lut.offset", 0.0f32)?;
        props.declare("lut.conditioningGamma", 1.0f32)?;
        props.declare("lut.type", "Luminance".to_string())?;
        props.declare("lut.name", String::new())?;
        props.declare("lut.file", String::new())?;
        props.declare_array("lut.size", vec![0i32, 0, 0])?;
        props.declare("lut.active", 0i32)?;
        props.declare("lut.preLUTSize", config.lut.prelut_size as i32)?;
        props.declare("lut:output.size", 256i32)?;
        props.declare("lut:output.type", "Luminance".to_string())?;
        props.declare_array("lut:output.lut", Vec::<f32>::new())?;
        props.declare_array("lut:output.prelut", Vec::<f32>::new())?;
        props.declare("matrix:output.RGBA", Mat4::IDENTITY)?;
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
        convert_blend_render_type_to_intermediate(&mut head);
        self.add_pipeline(node, &mut head);
        Ok(head)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        let Some(input) = node.input(0) else {
            return Ok(None);
        };
        let child = input.evaluate_identifier(context)?;
        Ok(match (self.active_lut(node), child) {
            (Some(lut), Some(child)) => Some(IpImageId::with_children(
                format!("{}:{}", node.name(), lut.id()),
                vec![child],
            )),
            (_, child) => child,
        })
    }

    fn property_changed(&self, node: NodeRef<'_>, name: &str) -> Result<Invalidation> {
        match name {
            "lut.file" | "lut.preLUTSize" => self.update_properties(node)?,
            "lut.lut" | "lut.prelut" | "lut.size" | "lut.inMatrix" | "lut.outMatrix" => {
                self.generate(node)?
            }
            _ => {}
        }
        Ok(Invalidation::NONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
