//! IPCore Core - Foundation types for the image-processing graph
//!
//! This crate provides the fundamental types used throughout IPCore:
//! - Error taxonomy shared by every node (`IpError`)
//! - Frame range and image structure descriptors
//! - The typed property/container model that holds node state
//! - Engine configuration

pub mod config;
pub mod error;
pub mod property;
pub mod range;

pub use config::{AudioConfig, EngineConfig, LutConfig, RenderConfig, ResourceLimits};
pub use error::{IpError, Result};
pub use property::{Component, Layout, Property, PropertyContainer, PropertyData, PropertyValue};
pub use range::{FrameRange, ImageRangeInfo, ImageStructureInfo};

/// Placeholder image constants shared by the graph and renderer.
pub mod defaults {
    /// Width of a "no image" placeholder.
    pub const NO_IMAGE_WIDTH: i32 = 1280;

    /// Height of a "no image" placeholder.
    pub const NO_IMAGE_HEIGHT: i32 = 720;

    /// Default output size of composite nodes.
    pub const OUTPUT_SIZE: [i32; 2] = [720, 480];
}
