//! The node contract.
//!
//! Every node type implements [`IpNode`]. Nodes never hold references to
//! each other; the graph hands them a [`NodeRef`] on every call which gives
//! access to their inputs, properties and the shared services.
//!
//! Default method bodies reproduce the behavior of a plain node (pass the
//! single input through, group several inputs under a blend root). They
//! are also exported as `default_*` functions so node types can fall back
//! to them from their own overrides.

use crate::context::{AudioContext, Context};
use crate::graph::{GraphServices, IpGraph, NodeId, Slot};
use crate::image::{IpImage, IpImageId, RenderType};
use ipcore_core::{
    EngineConfig, ImageRangeInfo, ImageStructureInfo, PropertyContainer, PropertyValue, Result,
};
use parking_lot::{Mutex, RwLockReadGuard};
use std::any::Any;
use std::ops::BitOr;
use std::sync::Arc;

/// What a property edit invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Invalidation {
    pub range: bool,
    pub structure: bool,
    pub audio: bool,
}

impl Invalidation {
    pub const NONE: Self = Self {
        range: false,
        structure: false,
        audio: false,
    };
    pub const RANGE: Self = Self {
        range: true,
        structure: false,
        audio: false,
    };
    pub const STRUCTURE: Self = Self {
        range: false,
        structure: true,
        audio: false,
    };
    pub const AUDIO: Self = Self {
        range: false,
        structure: false,
        audio: true,
    };
    pub const ALL: Self = Self {
        range: true,
        structure: true,
        audio: true,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl BitOr for Invalidation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            range: self.range || rhs.range,
            structure: self.structure || rhs.structure,
            audio: self.audio || rhs.audio,
        }
    }
}

struct CacheState<S> {
    range_dirty: bool,
    structure_dirty: bool,
    snapshot: Option<Arc<S>>,
    generation: u64,
}

/// Lazily recomputed range/structure state of a composite node.
///
/// The state is computed under the cache lock and handed out as an
/// immutable snapshot, so evaluation never holds the lock while it
/// recurses into inputs.
pub struct RangeCache<S> {
    state: Mutex<CacheState<S>>,
}

impl<S> RangeCache<S> {
    /// A cache that computes on first use.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                range_dirty: true,
                structure_dirty: true,
                snapshot: None,
                generation: 0,
            }),
        }
    }

    pub fn mark_range_dirty(&self) {
        self.state.lock().range_dirty = true;
    }

    pub fn mark_structure_dirty(&self) {
        self.state.lock().structure_dirty = true;
    }

    pub fn mark_dirty(&self) {
        let mut state = self.state.lock();
        state.range_dirty = true;
        state.structure_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        let state = self.state.lock();
        state.range_dirty || state.structure_dirty || state.snapshot.is_none()
    }

    /// Number of recomputations so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Current snapshot, recomputing it first when dirty.
    pub fn lazy_update(&self, compute: impl FnOnce() -> S) -> Arc<S> {
        let mut state = self.state.lock();
        if !state.range_dirty && !state.structure_dirty {
            if let Some(snapshot) = &state.snapshot {
                return snapshot.clone();
            }
        }
        let snapshot = Arc::new(compute());
        state.snapshot = Some(snapshot.clone());
        state.range_dirty = false;
        state.structure_dirty = false;
        state.generation += 1;
        snapshot
    }
}

impl<S> Default for RangeCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// One node visited by a meta evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEvalInfo {
    /// Frame the node was visited at, in its own frame numbering.
    pub source_frame: i32,
    pub node: NodeId,
    pub name: String,
    pub type_name: String,
}

impl MetaEvalInfo {
    pub fn new(context: &Context, node: NodeRef<'_>) -> Self {
        Self {
            source_frame: context.frame,
            node: node.id(),
            name: node.name().to_string(),
            type_name: node.type_name().to_string(),
        }
    }
}

/// Visitor driven by `meta_evaluate`. Nodes remap the frame for each input
/// exactly as `evaluate` would.
pub trait MetaEvalVisitor {
    fn enter(&mut self, context: &Context, node: NodeRef<'_>);

    fn leave(&mut self, _context: &Context, _node: NodeRef<'_>) {}

    /// Whether to descend into input `index` of `parent`.
    fn traverse_child(
        &mut self,
        _context: &Context,
        _index: usize,
        _parent: NodeRef<'_>,
        _child: NodeRef<'_>,
    ) -> bool {
        true
    }
}

/// Records every node visited.
#[derive(Debug, Default)]
pub struct MetaEvalInfoCollector {
    pub infos: Vec<MetaEvalInfo>,
}

impl MetaEvalVisitor for MetaEvalInfoCollector {
    fn enter(&mut self, context: &Context, node: NodeRef<'_>) {
        self.infos.push(MetaEvalInfo::new(context, node));
    }
}

/// Records the path from the root down to `leaf`.
#[derive(Debug)]
pub struct MetaEvalPath {
    pub leaf: NodeId,
    pub infos: Vec<MetaEvalInfo>,
    pub found: bool,
}

impl MetaEvalPath {
    pub fn new(leaf: NodeId) -> Self {
        Self {
            leaf,
            infos: Vec::new(),
            found: false,
        }
    }
}

impl MetaEvalVisitor for MetaEvalPath {
    fn enter(&mut self, context: &Context, node: NodeRef<'_>) {
        self.infos.push(MetaEvalInfo::new(context, node));
        if node.id() == self.leaf {
            self.found = true;
        }
    }

    fn leave(&mut self, _context: &Context, _node: NodeRef<'_>) {
        if !self.found {
            self.infos.pop();
        }
    }

    fn traverse_child(&mut self, _: &Context, _: usize, _: NodeRef<'_>, _: NodeRef<'_>) -> bool {
        !self.found
    }
}

/// Collects the nodes of a type closest to the root on every branch. The
/// search does not descend below a match.
#[derive(Debug)]
pub struct MetaEvalClosestByTypeName {
    pub type_name: String,
    pub infos: Vec<MetaEvalInfo>,
}

impl MetaEvalClosestByTypeName {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            infos: Vec::new(),
        }
    }
}

impl MetaEvalVisitor for MetaEvalClosestByTypeName {
    fn enter(&mut self, context: &Context, node: NodeRef<'_>) {
        if node.type_name() == self.type_name {
            self.infos.push(MetaEvalInfo::new(context, node));
        }
    }

    fn traverse_child(&mut self, _: &Context, _: usize, parent: NodeRef<'_>, _: NodeRef<'_>) -> bool {
        self.infos.last().map_or(true, |info| info.node != parent.id())
    }
}

/// Stops at the first node of a type.
#[derive(Debug)]
pub struct MetaEvalFirstClosestByTypeName {
    pub type_name: String,
    pub infos: Vec<MetaEvalInfo>,
}

impl MetaEvalFirstClosestByTypeName {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            infos: Vec::new(),
        }
    }
}

impl MetaEvalVisitor for MetaEvalFirstClosestByTypeName {
    fn enter(&mut self, context: &Context, node: NodeRef<'_>) {
        if node.type_name() == self.type_name {
            self.infos.push(MetaEvalInfo::new(context, node));
        }
    }

    fn traverse_child(&mut self, _: &Context, _: usize, _: NodeRef<'_>, _: NodeRef<'_>) -> bool {
        self.infos.is_empty()
    }
}

/// Properties of the subgraph gathered by `test_evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TestEvaluationResult {
    pub poor_random_access_performance: bool,
}

/// Behavior of one node type.
pub trait IpNode: Send + Sync + 'static {
    /// Protocol name, e.g. `"Stack"`.
    fn type_name(&self) -> &str;

    fn declare_properties(&self, _props: &mut PropertyContainer, _config: &EngineConfig) -> Result<()> {
        Ok(())
    }

    fn max_inputs(&self) -> Option<usize> {
        None
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
        default_evaluate(node, context)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
        default_evaluate_identifier(node, context)
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        default_image_range_info(node)
    }

    fn image_structure_info(&self, node: NodeRef<'_>, context: &Context) -> ImageStructureInfo {
        default_image_structure_info(node, context)
    }

    /// Fill `context.buffer` and return the number of valid sample frames.
    fn audio_fill_buffer(&self, node: NodeRef<'_>, context: &mut AudioContext) -> usize {
        default_audio_fill_buffer(node, context)
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        default_meta_evaluate(node, context, visitor)
    }

    fn test_evaluate(&self, node: NodeRef<'_>, context: &Context, result: &mut TestEvaluationResult) {
        default_test_evaluate(node, context, result)
    }

    /// Map this node's frames to the global frames of input `index`.
    fn map_input_to_eval_frames(&self, _node: NodeRef<'_>, _index: usize, frames: &[i32]) -> Vec<i32> {
        frames.to_vec()
    }

    /// Called after property `name` was written.
    fn property_changed(&self, _node: NodeRef<'_>, _name: &str) -> Result<Invalidation> {
        Ok(Invalidation::NONE)
    }

    fn inputs_changed(&self, _node: NodeRef<'_>) {}

    fn input_range_changed(&self, _node: NodeRef<'_>, _index: usize) {}

    fn input_structure_changed(&self, _node: NodeRef<'_>, _index: usize) {}

    fn as_any(&self) -> &dyn Any;
}

pub fn default_evaluate(node: NodeRef<'_>, context: &Context) -> Result<IpImage> {
    let inputs = node.inputs();
    match inputs.as_slice() {
        [] => Ok(IpImage::new_no_image(node.name(), "No Input")),
        [input] => input.evaluate(context),
        _ => {
            let mut head = IpImage::new(node.name(), RenderType::Blend, 0, 0);
            for input in &inputs {
                match input.evaluate(context) {
                    Ok(image) => head.append_child(image),
                    Err(e) => {
                        context.cache.check_in_and_delete(head.take_children());
                        return Err(e);
                    }
                }
            }
            head.record_resource_usage();
            Ok(head)
        }
    }
}

pub fn default_evaluate_identifier(node: NodeRef<'_>, context: &Context) -> Result<Option<IpImageId>> {
    let inputs = node.inputs();
    match inputs.as_slice() {
        [] => Ok(None),
        [input] => input.evaluate_identifier(context),
        _ => {
            let mut children = Vec::with_capacity(inputs.len());
            for input in &inputs {
                if let Some(id) = input.evaluate_identifier(context)? {
                    children.push(id);
                }
            }
            Ok(Some(IpImageId::with_children(node.name(), children)))
        }
    }
}

pub fn default_image_range_info(node: NodeRef<'_>) -> ImageRangeInfo {
    node.input(0)
        .map(|input| input.image_range_info())
        .unwrap_or_default()
}

pub fn default_image_structure_info(node: NodeRef<'_>, context: &Context) -> ImageStructureInfo {
    node.input(0)
        .map(|input| input.image_structure_info(context))
        .unwrap_or_default()
}

pub fn default_audio_fill_buffer(node: NodeRef<'_>, context: &mut AudioContext) -> usize {
    node.input(0)
        .map_or(0, |input| input.audio_fill_buffer(context))
}

pub fn default_meta_evaluate(node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
    visitor.enter(context, node);
    for (i, input) in node.inputs().into_iter().enumerate() {
        if visitor.traverse_child(context, i, node, input) {
            input.meta_evaluate(context, visitor);
        }
    }
    visitor.leave(context, node);
}

pub fn default_test_evaluate(node: NodeRef<'_>, context: &Context, result: &mut TestEvaluationResult) {
    for input in node.inputs() {
        input.test_evaluate(context, result);
    }
}

/// A node of a graph, borrowed for the duration of one call.
#[derive(Clone, Copy)]
pub struct NodeRef<'g> {
    graph: &'g IpGraph,
    id: NodeId,
    slot: &'g Slot,
}

impl<'g> NodeRef<'g> {
    pub(crate) fn new(graph: &'g IpGraph, id: NodeId, slot: &'g Slot) -> Self {
        Self { graph, id, slot }
    }

    pub(crate) fn slot(&self) -> &'g Slot {
        self.slot
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &'g IpGraph {
        self.graph
    }

    pub fn name(&self) -> &'g str {
        &self.slot.name
    }

    pub fn type_name(&self) -> &'g str {
        self.slot.node.type_name()
    }

    pub fn node(&self) -> &'g dyn IpNode {
        self.slot.node.as_ref()
    }

    pub fn input_ids(&self) -> &'g [NodeId] {
        &self.slot.inputs
    }

    pub fn input_count(&self) -> usize {
        self.slot.inputs.len()
    }

    pub fn input(&self, index: usize) -> Option<NodeRef<'g>> {
        self.slot
            .inputs
            .get(index)
            .and_then(|id| self.graph.get(*id))
    }

    pub fn inputs(&self) -> Vec<NodeRef<'g>> {
        self.slot
            .inputs
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .collect()
    }

    pub fn output_ids(&self) -> &'g [NodeId] {
        &self.slot.outputs
    }

    pub fn services(&self) -> &'g GraphServices {
        self.graph.services()
    }

    pub fn config(&self) -> &'g EngineConfig {
        &self.graph.services().config
    }

    pub fn properties(&self) -> RwLockReadGuard<'g, PropertyContainer> {
        self.slot.properties.read()
    }

    /// First element of a property, or `default`.
    pub fn prop<T: PropertyValue>(&self, name: &str, default: T) -> T {
        self.slot.properties.read().get_or(name, default)
    }

    /// All elements of a property, empty when missing or mistyped.
    pub fn prop_values<T: PropertyValue>(&self, name: &str) -> Vec<T> {
        self.slot.properties.read().values(name).unwrap_or_default()
    }

    /// Write a property without notifying the node. For nodes publishing
    /// derived state from inside `property_changed`.
    pub fn store_property<T: PropertyValue>(&self, name: &str, value: T) -> Result<()> {
        self.slot.properties.write().set(name, value)
    }

    pub fn store_property_values<T: PropertyValue>(&self, name: &str, values: Vec<T>) -> Result<()> {
        self.slot.properties.write().set_values(name, values)
    }

    pub fn evaluate(&self, context: &Context) -> Result<IpImage> {
        self.node().evaluate(*self, context)
    }

    pub fn evaluate_identifier(&self, context: &Context) -> Result<Option<IpImageId>> {
        self.node().evaluate_identifier(*self, context)
    }

    pub fn image_range_info(&self) -> ImageRangeInfo {
        self.node().image_range_info(*self)
    }

    pub fn image_structure_info(&self, context: &Context) -> ImageStructureInfo {
        self.node().image_structure_info(*self, context)
    }

    pub fn audio_fill_buffer(&self, context: &mut AudioContext) -> usize {
        self.node().audio_fill_buffer(*self, context)
    }

    pub fn meta_evaluate(&self, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        self.node().meta_evaluate(*self, context, visitor)
    }

    pub fn test_evaluate(&self, context: &Context, result: &mut TestEvaluationResult) {
        self.node().test_evaluate(*self, context, result)
    }

    pub fn map_input_to_eval_frames(&self, index: usize, frames: &[i32]) -> Vec<i32> {
        self.node().map_input_to_eval_frames(*self, index, frames)
    }

    /// Name of the leaf reached by following first inputs from here.
    pub fn first_leaf_name(&self) -> &'g str {
        let mut node = *self;
        while let Some(input) = node.input(0) {
            node = input;
        }
        node.name()
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.slot.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_range_cache_recomputes_only_when_dirty() {
        let cache: RangeCache<i32> = RangeCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            7
        };

        assert!(cache.is_dirty());
        assert_eq!(*cache.lazy_update(compute), 7);
        assert_eq!(*cache.lazy_update(compute), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_dirty());

        cache.mark_range_dirty();
        assert!(cache.is_dirty());
        cache.lazy_update(compute);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.generation(), 2);

        cache.mark_structure_dirty();
        cache.lazy_update(compute);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalidation_union() {
        let inv = Invalidation::RANGE | Invalidation::AUDIO;
        assert!(inv.range && inv.audio && !inv.structure);
        assert!(Invalidation::NONE.is_none());
        assert_eq!(Invalidation::RANGE | Invalidation::STRUCTURE | Invalidation::AUDIO, Invalidation::ALL);
    }
}
