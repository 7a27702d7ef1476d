//! Concrete node types.

mod lut;
mod noise_reduction;
mod source;
mod stack;
mod switch;
mod timing;
mod transition;

pub use lut::{GeneratedLut, LutNode, LutTable};
pub use noise_reduction::NoiseReductionNode;
pub use source::SourceNode;
pub use stack::{ActiveAudioInput, OutOfRangePolicy, StackNode, StackRanges};
pub use switch::{SwitchNode, SwitchRanges};
pub use timing::FrameMapping;
pub use transition::TransitionNode;
