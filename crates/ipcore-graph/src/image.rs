//! Per-evaluation render descriptors.
//!
//! An [`IpImage`] tree is what a node's `evaluate` hands back to the
//! renderer. It owns its children; dropping the root drops the whole tree.
//! Images whose buffers may be cache resident must go back through
//! [`ImageCache::check_in_and_delete`](crate::context::ImageCache) instead.

use glam::{Mat4, Vec3};
use ipcore_core::defaults::{NO_IMAGE_HEIGHT, NO_IMAGE_WIDTH};
use ipcore_gpu::{BlendMode, Expression, ImageKey, ResourceUsage};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

fn next_key() -> ImageKey {
    NEXT_KEY.fetch_add(1, Ordering::Relaxed)
}

/// How the renderer treats an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderType {
    /// Children are drawn one after the other with the image's blend mode.
    Blend,
    /// Children are sampled together by a single merge shader.
    Merge,
    RecordOnly,
    Group,
    External,
    NoRender,
}

/// Where an image is rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    CurrentFrameBuffer,
    IntermediateBuffer,
    TemporaryBuffer,
    Left,
    Right,
    Main,
    NoBuffer,
    OutputTexture,
    DataBuffer,
}

/// Pixel format of an image's render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Unsigned8,
    Unsigned16,
    Half,
    Float,
}

/// A decoded frame buffer backing a leaf image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferRef {
    pub id: String,
    pub planes: usize,
    /// Buffer was read cropped and must be uncropped before merging.
    pub needs_uncrop: bool,
}

impl FrameBufferRef {
    pub fn new(id: impl Into<String>, planes: usize) -> Self {
        Self {
            id: id.into(),
            planes,
            needs_uncrop: false,
        }
    }
}

/// A paint operation drawn on top of an image (annotations, overlays).
#[derive(Debug, Clone, PartialEq)]
pub struct PaintCommand {
    pub kind: String,
    pub points: Vec<[f32; 2]>,
}

/// One renderable unit of an evaluation result.
#[derive(Debug, Clone)]
pub struct IpImage {
    pub key: ImageKey,
    /// Name of the node that produced the image.
    pub node: String,
    pub width: i32,
    pub height: i32,
    pub pixel_aspect: f32,
    pub render_type: RenderType,
    pub destination: Destination,
    pub data_type: DataType,
    pub blend_mode: BlendMode,
    pub fb: Option<FrameBufferRef>,
    pub merge_expr: Option<Expression>,
    pub shader_expr: Option<Expression>,
    pub children: Vec<IpImage>,
    pub resource_usage: ResourceUsage,
    pub transform: Mat4,
    pub commands: Vec<PaintCommand>,
    /// Never render this image to an intermediate buffer.
    pub no_intermediate: bool,
    pub attributes: BTreeMap<String, String>,
}

impl IpImage {
    pub fn new(node: &str, render_type: RenderType, width: i32, height: i32) -> Self {
        Self {
            key: next_key(),
            node: node.to_string(),
            width,
            height,
            pixel_aspect: 1.0,
            render_type,
            destination: Destination::CurrentFrameBuffer,
            data_type: DataType::default(),
            blend_mode: BlendMode::Unspecified,
            fb: None,
            merge_expr: None,
            shader_expr: None,
            children: Vec::new(),
            resource_usage: ResourceUsage::default(),
            transform: Mat4::IDENTITY,
            commands: Vec::new(),
            no_intermediate: false,
            attributes: BTreeMap::new(),
        }
    }

    /// An image rendered to a float intermediate buffer.
    pub fn intermediate(node: &str, render_type: RenderType, width: i32, height: i32) -> Self {
        let mut image = Self::new(node, render_type, width, height);
        image.destination = Destination::IntermediateBuffer;
        image.data_type = DataType::Float;
        image
    }

    fn placeholder(node: &str, id: String, type_name: &str, width: i32, height: i32) -> Self {
        let mut image = Self::new(node, RenderType::Blend, width, height);
        image.fb = Some(FrameBufferRef::new(id, 1));
        image.shader_expr = Some(Expression::source_rgba(image.key));
        image
            .attributes
            .insert("Type".to_string(), type_name.to_string());
        image.record_resource_usage();
        image
    }

    /// Stand-in for a missing image. The message says why there is none.
    pub fn new_no_image(node: &str, message: &str) -> Self {
        let mut image = Self::placeholder(
            node,
            IpImageId::no_image().id,
            "NoImage",
            NO_IMAGE_WIDTH,
            NO_IMAGE_HEIGHT,
        );
        image.attributes.insert("Node".to_string(), node.to_string());
        if !message.is_empty() {
            image
                .attributes
                .insert("Message".to_string(), message.to_string());
        }
        image
    }

    /// Transparent image used for out of range inputs.
    pub fn new_blank_image(node: &str, width: i32, height: i32) -> Self {
        Self::placeholder(node, IpImageId::blank(width, height).id, "Blank", width, height)
    }

    /// Opaque black image used for out of range inputs.
    pub fn new_black_image(node: &str, width: i32, height: i32) -> Self {
        Self::placeholder(node, IpImageId::black(width, height).id, "Black", width, height)
    }

    pub fn new_error_image(node: &str, message: &str) -> Self {
        let mut image = Self::placeholder(
            node,
            IpImageId::error().id,
            "Error",
            NO_IMAGE_WIDTH,
            NO_IMAGE_HEIGHT,
        );
        image.attributes.insert("Node".to_string(), node.to_string());
        image
            .attributes
            .insert("Message".to_string(), message.to_string());
        image
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether this is one of the placeholder images (`NoImage`, `Blank`,
    /// `Black` or `Error`).
    pub fn is_placeholder(&self) -> bool {
        self.attributes.contains_key("Type")
    }

    pub fn append_child(&mut self, child: IpImage) {
        self.children.push(child);
    }

    pub fn append_children(&mut self, children: impl IntoIterator<Item = IpImage>) {
        self.children.extend(children);
    }

    pub fn take_children(&mut self) -> Vec<IpImage> {
        std::mem::take(&mut self.children)
    }

    /// Recompute `resource_usage` from whatever this image renders with.
    pub fn record_resource_usage(&mut self) {
        self.resource_usage = if let Some(merge) = &self.merge_expr {
            merge.resource_usage()
        } else if let Some(fb) = &self.fb {
            ResourceUsage::new(fb.planes, fb.planes, 1)
        } else if self.render_type == RenderType::Blend {
            let mut usage = ResourceUsage::default();
            for child in &self.children {
                usage.accumulate(&child.resource_usage);
            }
            usage
        } else {
            ResourceUsage::default()
        };
    }

    pub fn display_aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 * self.pixel_aspect / self.height as f32
    }

    /// Scale that letterboxes this image into a frame of `aspect`.
    pub fn fit_to_aspect_matrix(&self, aspect: f32) -> Mat4 {
        let image_aspect = self.display_aspect();
        if image_aspect > aspect {
            let s = aspect / image_aspect;
            Mat4::from_scale(Vec3::new(s, s, 1.0))
        } else {
            Mat4::IDENTITY
        }
    }

    pub fn fit_to_aspect(&mut self, aspect: f32) {
        self.transform = self.fit_to_aspect_matrix(aspect) * self.transform;
    }

    /// Number of images in this tree, including this one.
    pub fn count_images(&self) -> usize {
        1 + self.children.iter().map(IpImage::count_images).sum::<usize>()
    }

    /// Whether any image in this tree carries paint commands.
    pub fn has_paint_commands(&self) -> bool {
        !self.commands.is_empty() || self.children.iter().any(IpImage::has_paint_commands)
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} [{:?} -> {:?}] {}x{}",
            "",
            self.node,
            self.render_type,
            self.destination,
            self.width,
            self.height,
            indent = depth * 2
        )?;
        if let Some(fb) = &self.fb {
            write!(f, " fb={}", fb.id)?;
        }
        if let Some(merge) = &self.merge_expr {
            write!(f, " merge={}", merge)?;
        }
        if let Some(shader) = &self.shader_expr {
            write!(f, " shader={}", shader)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for IpImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Content identifier of an evaluation, used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IpImageId {
    pub id: String,
    pub children: Vec<IpImageId>,
}

impl IpImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(id: impl Into<String>, children: Vec<IpImageId>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }

    pub fn blank(width: i32, height: i32) -> Self {
        Self::new(format!("{}x{}(BLANK)", width, height))
    }

    pub fn black(width: i32, height: i32) -> Self {
        Self::new(format!("{}x{}(BLACK)", width, height))
    }

    pub fn no_image() -> Self {
        Self::new("(NOIMAGE)")
    }

    pub fn error() -> Self {
        Self::new("(ERROR)")
    }
}

impl fmt::Display for IpImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.children.is_empty() {
            write!(f, "{{")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
