//! Resource balancing and merge expression assembly.
//!
//! A merge node samples all of its children in one shader pass. When the
//! children together need more buffers, texture coordinates or fetches than
//! the renderer allows, the most expensive ones are rendered to
//! intermediate buffers first and then sampled as a single texture.

use crate::context::Context;
use crate::image::{Destination, IpImage, RenderType};
use ipcore_core::ResourceLimits;
use ipcore_gpu::{BlendMode, Expression, ImageKey, ResourceUsage};
use smallvec::SmallVec;
use std::collections::HashSet;
use tracing::trace;

/// Keys of images whose shader expression was replaced by an intermediate
/// render and must be emitted as a plain source fetch.
pub type ModifiedImages = HashSet<ImageKey>;

/// How the children's usages combine.
pub type UsageAccumulator = fn(&[IpImage]) -> ResourceUsage;

/// Sum of every child's usage.
pub fn accumulate(images: &[IpImage]) -> ResourceUsage {
    let mut usage = ResourceUsage::default();
    for image in images {
        usage.accumulate(&image.resource_usage);
    }
    usage
}

/// Usage of a filter applied over the children: fetches multiply.
pub fn filter_accumulate(images: &[IpImage]) -> ResourceUsage {
    let mut usage = ResourceUsage::new(1, 0, 0);
    for image in images {
        usage.filter_accumulate(&image.resource_usage);
    }
    usage
}

fn assign_by_resource_count(
    field: fn(&ResourceUsage) -> usize,
    total: usize,
    max: usize,
    images: &mut [IpImage],
    modified: &mut ModifiedImages,
) -> bool {
    if total <= max {
        return false;
    }

    let mut order: Vec<usize> = (0..images.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(field(&images[i].resource_usage)));

    let mut remaining = total;
    let mut changed = false;
    for i in order {
        if remaining <= max {
            break;
        }
        let image = &mut images[i];
        let count = field(&image.resource_usage);
        if count <= 1 {
            continue;
        }
        if image.merge_expr.is_some() {
            modified.insert(image.key);
        } else if image.shader_expr.is_none() {
            continue;
        }
        trace!("rendering {} to an intermediate buffer ({} > {})", image.node, total, max);
        remaining -= count - 1;
        image.destination = Destination::IntermediateBuffer;
        image.resource_usage = ResourceUsage::SINGLE;
        changed = true;
    }
    changed
}

/// Push children to intermediate buffers until the merge fits in `limits`.
///
/// `incoming_samplers` counts buffers the merge shader binds on top of
/// its children. Usage is recomputed between the buffer, coordinate and
/// fetch passes.
pub fn balance_resource_usage(
    accum: UsageAccumulator,
    images: &mut [IpImage],
    modified: &mut ModifiedImages,
    limits: &ResourceLimits,
    incoming_samplers: usize,
) {
    let usage = accum(images);
    assign_by_resource_count(
        |u| u.buffers,
        usage.buffers + incoming_samplers,
        limits.max_buffers,
        images,
        modified,
    );

    let usage = accum(images);
    assign_by_resource_count(|u| u.coords, usage.coords, limits.max_coords, images, modified);

    let usage = accum(images);
    assign_by_resource_count(|u| u.fetches, usage.fetches, limits.max_fetches, images, modified);
}

/// Whether `image` is a blend group that must be flattened before a
/// merge can sample it.
pub fn will_convert_to_intermediate(image: &IpImage) -> bool {
    image.render_type == RenderType::Blend
        && image.shader_expr.is_none()
        && image.merge_expr.is_none()
        && !image.children.is_empty()
        && !image.no_intermediate
}

/// Render a blend group to an intermediate buffer and sample it.
pub fn convert_blend_render_type_to_intermediate(image: &mut IpImage) -> bool {
    if !will_convert_to_intermediate(image) {
        return false;
    }
    image.destination = Destination::IntermediateBuffer;
    let shader = Expression::source_rgba(image.key);
    image.resource_usage = shader.resource_usage();
    image.shader_expr = Some(shader);
    true
}

pub fn convert_blend_render_types_to_intermediate(
    images: &mut [IpImage],
    modified: &mut ModifiedImages,
) -> bool {
    let mut any = false;
    for image in images.iter_mut() {
        if convert_blend_render_type_to_intermediate(image) {
            modified.insert(image.key);
            any = true;
        }
    }
    any
}

fn wrap_for_paint(node: &str, image: IpImage) -> IpImage {
    let mut wrapper = IpImage::intermediate(node, RenderType::Blend, image.width, image.height);
    let shader = Expression::source_rgba(wrapper.key);
    wrapper.resource_usage = shader.resource_usage();
    wrapper.shader_expr = Some(shader);
    wrapper.append_child(image);
    wrapper
}

/// Take each child's expression as an argument of the parent's merge
/// function, in child order, and decide where each child renders.
pub fn assemble_merge_expressions(
    node: &str,
    images: &mut Vec<IpImage>,
    modified: &ModifiedImages,
    is_filter: bool,
) -> SmallVec<[Expression; 4]> {
    let mut exprs = SmallVec::new();
    let old = std::mem::take(images);

    for image in old {
        let needs_uncrop = image.fb.as_ref().map_or(false, |fb| fb.needs_uncrop);
        let mut image = if !image.commands.is_empty() || needs_uncrop {
            wrap_for_paint(node, image)
        } else {
            image
        };

        let shader = image
            .shader_expr
            .take()
            .unwrap_or_else(|| Expression::source_rgba(image.key));

        if modified.contains(&image.key) {
            exprs.push(shader);
        } else if let Some(merge) = image.merge_expr.take() {
            if is_filter && merge.source_function_count(2) == 1 && merge.filter_function_count(1) == 0 {
                exprs.push(shader.replace_source(&merge));
                image.destination = Destination::CurrentFrameBuffer;
            } else {
                image.merge_expr = Some(merge);
                exprs.push(shader);
                image.destination = Destination::IntermediateBuffer;
                image.blend_mode = BlendMode::Replace;
            }
        } else if matches!(
            image.destination,
            Destination::IntermediateBuffer | Destination::DataBuffer
        ) {
            exprs.push(shader);
        } else {
            exprs.push(shader);
            image.destination = Destination::CurrentFrameBuffer;
        }

        images.push(image);
    }
    exprs
}

/// Put `root` behind an intermediate render when paint commands in a
/// non-intermediate subtree would otherwise be drawn straight to the
/// frame buffer.
pub fn insert_intermediate_for_paint(node: &str, root: IpImage, context: &Context) -> IpImage {
    fn needs_render(image: &IpImage) -> bool {
        if image.destination == Destination::IntermediateBuffer {
            return false;
        }
        !image.commands.is_empty() || image.children.iter().any(needs_render)
    }

    if root.destination == Destination::IntermediateBuffer || !needs_render(&root) {
        return root;
    }

    let mut wrapper = IpImage::intermediate(
        node,
        RenderType::Blend,
        context.view_width,
        context.view_height,
    );
    let mut root = root;
    root.fit_to_aspect(wrapper.display_aspect());
    wrapper.append_child(root);
    let shader = Expression::source_rgba(wrapper.key);
    wrapper.resource_usage = shader.resource_usage();
    wrapper.shader_expr = Some(shader);
    wrapper
}
