//! IPCore Graph - node graph evaluation for the image-processing engine
//!
//! Architecture:
//! - `graph`: arena of nodes addressed by `NodeId`, wiring, cycle checks,
//!   change propagation and the evaluation entry points
//! - `node`: the `IpNode` contract, `NodeRef`, range caches and meta
//!   evaluation visitors
//! - `image`: the `IpImage` render tree returned by `evaluate`
//! - `compose`: resource balancing and merge expression assembly shared by
//!   the composite nodes
//! - `definition`: shader-function backed node definitions and the factory
//! - `nodes`: Stack, Transition, Switch, LUT, NoiseReduction and Source

pub mod compose;
pub mod context;
pub mod definition;
pub mod graph;
pub mod image;
pub mod node;
pub mod nodes;

pub use context::{AudioContext, Context, ImageCache, NullImageCache, RecordingImageCache, ThreadType};
pub use definition::{NodeDefinition, NodeFactory, STACK_COMPOSITES};
pub use graph::{GraphServices, IpGraph, NodeId};
pub use image::{DataType, Destination, FrameBufferRef, IpImage, IpImageId, PaintCommand, RenderType};
pub use node::{
    Invalidation, IpNode, MetaEvalInfo, MetaEvalInfoCollector, MetaEvalVisitor, NodeRef, RangeCache,
    TestEvaluationResult,
};
pub use nodes::{
    ActiveAudioInput, GeneratedLut, LutNode, NoiseReductionNode, OutOfRangePolicy, SourceNode, StackNode,
    SwitchNode, TransitionNode,
};
