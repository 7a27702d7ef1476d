//! The node graph.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Structural edits (adding
//! nodes, rewiring inputs) take `&mut self`; evaluation and property edits
//! take `&self` and may run concurrently from the display and audio
//! threads. Input edges are checked for cycles when they are made, so every
//! walk over the graph can assume a DAG.

use crate::context::{AudioContext, Context, ImageCache, NullImageCache};
use crate::image::{IpImage, IpImageId};
use crate::node::{
    IpNode, MetaEvalClosestByTypeName, MetaEvalInfo, MetaEvalVisitor, NodeRef, TestEvaluationResult,
};
use ipcore_audio::AudioBuffer;
use ipcore_color::LutCache;
use ipcore_core::{
    EngineConfig, ImageRangeInfo, ImageStructureInfo, IpError, PropertyContainer, PropertyValue,
    Result,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Unique identifier for a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared services every node can reach through its [`NodeRef`].
#[derive(Clone)]
pub struct GraphServices {
    pub config: Arc<EngineConfig>,
    pub luts: Arc<LutCache>,
    pub image_cache: Arc<dyn ImageCache>,
}

impl GraphServices {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            luts: Arc::new(LutCache::new()),
            image_cache: Arc::new(NullImageCache),
        }
    }

    pub fn with_image_cache(mut self, cache: Arc<dyn ImageCache>) -> Self {
        self.image_cache = cache;
        self
    }

    /// Share a LUT cache between graphs.
    pub fn with_lut_cache(mut self, luts: Arc<LutCache>) -> Self {
        self.luts = luts;
        self
    }
}

impl Default for GraphServices {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

pub(crate) struct Slot {
    pub(crate) name: String,
    pub(crate) node: Box<dyn IpNode>,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) properties: RwLock<PropertyContainer>,
}

type AudioKey = (NodeId, i64, usize);

#[derive(Default)]
struct AudioCache {
    generation: u64,
    entries: HashMap<AudioKey, (AudioBuffer, usize)>,
}

/// Owner of every node and its wiring.
pub struct IpGraph {
    nodes: HashMap<NodeId, Slot>,
    next_id: u32,
    services: GraphServices,
    fps: f32,
    audio_cache: RwLock<AudioCache>,
}

impl std::fmt::Debug for IpGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpGraph")
            .field("nodes", &self.nodes.len())
            .field("next_id", &self.next_id)
            .field("fps", &self.fps)
            .finish_non_exhaustive()
    }
}

impl IpGraph {
    pub fn new(services: GraphServices) -> Self {
        let fps = services.config.render.default_fps;
        Self {
            nodes: HashMap::new(),
            next_id: 0,
            services,
            fps,
            audio_cache: RwLock::new(AudioCache::default()),
        }
    }

    pub fn services(&self) -> &GraphServices {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.fps = fps;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in creation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, slot)| slot.name == name)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes.get(&id).map(|slot| NodeRef::new(self, id, slot))
    }

    pub fn node_ref(&self, id: NodeId) -> Result<NodeRef<'_>> {
        self.get(id).ok_or_else(|| unknown_node(id))
    }

    /// Concrete node behind `id`, when it is a `T`.
    pub fn node_as<T: IpNode>(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(&id)?.node.as_any().downcast_ref::<T>()
    }

    /// Add a node and declare its properties.
    pub fn add_node(&mut self, name: &str, node: Box<dyn IpNode>) -> Result<NodeId> {
        if self.find_node(name).is_some() {
            return Err(IpError::Graph(format!("a node named {} already exists", name)));
        }
        let mut properties = PropertyContainer::new();
        node.declare_properties(&mut properties, &self.services.config)?;

        let id = NodeId(self.next_id);
        self.next_id += 1;
        debug!("adding {} node {} as {}", node.type_name(), name, id);
        self.nodes.insert(
            id,
            Slot {
                name: name.to_string(),
                node,
                inputs: Vec::new(),
                outputs: Vec::new(),
                properties: RwLock::new(properties),
            },
        );
        Ok(id)
    }

    /// Remove a node. Fails while another node still uses it as an input.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let slot = self.nodes.get(&id).ok_or_else(|| unknown_node(id))?;
        if !slot.outputs.is_empty() {
            let users: Vec<&str> = slot
                .outputs
                .iter()
                .filter_map(|o| self.nodes.get(o).map(|s| s.name.as_str()))
                .collect();
            return Err(IpError::Graph(format!(
                "{} is still an input of {}",
                slot.name,
                users.join(", ")
            )));
        }
        if let Some(slot) = self.nodes.remove(&id) {
            for input in slot.inputs {
                self.detach_output(input, id);
            }
            debug!("removed node {}", slot.name);
        }
        Ok(())
    }

    /// Does `from` reach `target` by following inputs?
    fn depends_on(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(slot) = self.nodes.get(&id) {
                stack.extend(slot.inputs.iter().copied());
            }
        }
        false
    }

    fn detach_output(&mut self, input: NodeId, output: NodeId) {
        if let Some(slot) = self.nodes.get_mut(&input) {
            if let Some(pos) = slot.outputs.iter().position(|&o| o == output) {
                slot.outputs.remove(pos);
            }
        }
    }

    /// Replace the inputs of `id`.
    pub fn set_inputs(&mut self, id: NodeId, inputs: Vec<NodeId>) -> Result<()> {
        let slot = self.nodes.get(&id).ok_or_else(|| unknown_node(id))?;
        if let Some(max) = slot.node.max_inputs() {
            if inputs.len() > max {
                return Err(IpError::Graph(format!(
                    "{} accepts no more than {} inputs",
                    slot.name, max
                )));
            }
        }
        for &input in &inputs {
            let input_slot = self.nodes.get(&input).ok_or_else(|| unknown_node(input))?;
            if self.depends_on(input, id) {
                return Err(IpError::Graph(format!(
                    "{} would cause a cycle",
                    input_slot.name
                )));
            }
        }

        let old = match self.nodes.get_mut(&id) {
            Some(slot) => std::mem::replace(&mut slot.inputs, inputs.clone()),
            None => return Err(unknown_node(id)),
        };
        for input in old {
            self.detach_output(input, id);
        }
        for input in &inputs {
            if let Some(slot) = self.nodes.get_mut(input) {
                slot.outputs.push(id);
            }
        }

        let node = self.node_ref(id)?;
        node.node().inputs_changed(node);
        self.propagate_range_change(id);
        self.propagate_image_structure_change(id);
        Ok(())
    }

    pub fn add_input(&mut self, id: NodeId, input: NodeId) -> Result<()> {
        let mut inputs = self.node_ref(id)?.input_ids().to_vec();
        inputs.push(input);
        self.set_inputs(id, inputs)
    }

    /// Remove the first occurrence of `input` from the inputs of `id`.
    pub fn remove_input(&mut self, id: NodeId, input: NodeId) -> Result<()> {
        let mut inputs = self.node_ref(id)?.input_ids().to_vec();
        match inputs.iter().position(|&i| i == input) {
            Some(pos) => {
                inputs.remove(pos);
                self.set_inputs(id, inputs)
            }
            None => Ok(()),
        }
    }

    /// Nodes ordered so that every node comes after its inputs (Kahn's
    /// algorithm). None if the wiring contains a cycle.
    pub fn topological_order(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        for (&id, slot) in &self.nodes {
            in_degree.insert(id, slot.inputs.len());
        }

        let mut queue: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop() {
            result.push(id);
            let Some(slot) = self.nodes.get(&id) else {
                continue;
            };
            for dep in &slot.outputs {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(*dep);
                        queue.sort_by(|a, b| b.cmp(a));
                    }
                }
            }
        }

        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }

    /// Write a property and let the node react to it.
    pub fn set_property<T: PropertyValue>(&self, id: NodeId, name: &str, value: T) -> Result<()> {
        let node = self.node_ref(id)?;
        node.slot().properties.write().set(name, value)?;
        self.property_changed(node, name)
    }

    pub fn set_property_values<T: PropertyValue>(
        &self,
        id: NodeId,
        name: &str,
        values: Vec<T>,
    ) -> Result<()> {
        let node = self.node_ref(id)?;
        node.slot().properties.write().set_values(name, values)?;
        self.property_changed(node, name)
    }

    pub fn property<T: PropertyValue>(&self, id: NodeId, name: &str) -> Result<T> {
        self.node_ref(id)?.properties().get(name)
    }

    fn property_changed(&self, node: NodeRef<'_>, name: &str) -> Result<()> {
        let invalidation = node.node().property_changed(node, name)?;
        if invalidation.range {
            self.propagate_range_change(node.id());
        }
        if invalidation.structure {
            self.propagate_image_structure_change(node.id());
        }
        if invalidation.audio && !invalidation.range {
            self.flush_audio_cache();
        }
        Ok(())
    }

    fn propagate(&self, id: NodeId, notify: impl Fn(NodeRef<'_>, usize)) {
        let mut queue = VecDeque::from([id]);
        let mut seen = HashSet::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(slot) = self.nodes.get(&current) else {
                continue;
            };
            for &output in &slot.outputs {
                let Some(out) = self.get(output) else {
                    continue;
                };
                if seen.insert(output) {
                    for (index, _) in out
                        .input_ids()
                        .iter()
                        .enumerate()
                        .filter(|(_, &i)| i == current)
                    {
                        notify(out, index);
                    }
                    queue.push_back(output);
                }
            }
        }
    }

    /// Tell every node downstream of `id` that an input range changed.
    pub fn propagate_range_change(&self, id: NodeId) {
        self.propagate(id, |node, index| node.node().input_range_changed(node, index));
        self.flush_audio_cache();
    }

    pub fn propagate_image_structure_change(&self, id: NodeId) {
        self.propagate(id, |node, index| {
            node.node().input_structure_changed(node, index)
        });
    }

    /// Drop all cached audio.
    pub fn flush_audio_cache(&self) {
        let mut cache = self.audio_cache.write();
        cache.generation += 1;
        cache.entries.clear();
    }

    /// Bumped by every `flush_audio_cache`.
    pub fn audio_cache_generation(&self) -> u64 {
        self.audio_cache.read().generation
    }

    pub fn context_for_frame(&self, frame: i32) -> Context {
        Context::new(frame, self.fps, self.services.image_cache.clone())
    }

    pub fn evaluate(&self, root: NodeId, frame: i32) -> Result<IpImage> {
        let node = self.node_ref(root)?;
        node.evaluate(&self.context_for_frame(frame)).map_err(|e| {
            warn!("evaluating {} at frame {} failed: {}", node.name(), frame, e);
            e
        })
    }

    pub fn evaluate_identifier(&self, root: NodeId, frame: i32) -> Result<Option<IpImageId>> {
        let node = self.node_ref(root)?;
        node.evaluate_identifier(&self.context_for_frame(frame))
    }

    pub fn image_range_info(&self, id: NodeId) -> Result<ImageRangeInfo> {
        Ok(self.node_ref(id)?.image_range_info())
    }

    pub fn image_structure_info(&self, id: NodeId, frame: i32) -> Result<ImageStructureInfo> {
        let node = self.node_ref(id)?;
        Ok(node.image_structure_info(&self.context_for_frame(frame)))
    }

    /// Render `frames` sample frames of `root`'s audio starting at
    /// `start_time` seconds. Results are cached until the next flush.
    pub fn audio_fill_buffer(
        &self,
        root: NodeId,
        start_time: f64,
        frames: usize,
    ) -> Result<(AudioBuffer, usize)> {
        let node = self.node_ref(root)?;
        let audio = &self.services.config.audio;
        let buffer = AudioBuffer::new(frames, audio.channels, audio.sample_rate as f64, start_time);
        let key = (root, buffer.start_sample(), frames);

        if let Some(hit) = self.audio_cache.read().entries.get(&key) {
            return Ok(hit.clone());
        }

        let generation = self.audio_cache_generation();
        let fps = match node.image_range_info().fps {
            fps if fps > 0.0 => fps,
            _ => self.fps,
        };
        let mut context = AudioContext::new(buffer, fps as f64);
        let filled = node.audio_fill_buffer(&mut context);
        let result = (context.buffer, filled);

        let mut cache = self.audio_cache.write();
        if cache.generation == generation {
            cache.entries.insert(key, result.clone());
        }
        Ok(result)
    }

    pub fn meta_evaluate(&self, root: NodeId, frame: i32, visitor: &mut dyn MetaEvalVisitor) -> Result<()> {
        let node = self.node_ref(root)?;
        node.meta_evaluate(&self.context_for_frame(frame), visitor);
        Ok(())
    }

    /// Closest nodes of `type_name` on every branch below `root`.
    pub fn find_nodes_by_type_name(
        &self,
        root: NodeId,
        frame: i32,
        type_name: &str,
    ) -> Result<Vec<MetaEvalInfo>> {
        let mut visitor = MetaEvalClosestByTypeName::new(type_name);
        self.meta_evaluate(root, frame, &mut visitor)?;
        Ok(visitor.infos)
    }

    pub fn test_evaluate(&self, root: NodeId, frame: i32) -> Result<TestEvaluationResult> {
        let node = self.node_ref(root)?;
        let mut result = TestEvaluationResult::default();
        node.test_evaluate(&self.context_for_frame(frame), &mut result);
        Ok(result)
    }
}

impl Default for IpGraph {
    fn default() -> Self {
        Self::new(GraphServices::default())
    }
}

fn unknown_node(id: NodeId) -> IpError {
    IpError::Graph(format!("no node with id {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::SourceNode;

    fn source(graph: &mut IpGraph, name: &str) -> NodeId {
        graph.add_node(name, Box::new(SourceNode::new())).unwrap()
    }

    #[test]
    fn test_add_and_find() {
        let mut graph = IpGraph::default();
        let a = source(&mut graph, "a");
        assert_eq!(graph.find_node("a"), Some(a));
        assert!(graph.add_node("a", Box::new(SourceNode::new())).is_err());
        assert!(graph.node_as::<SourceNode>(a).is_some());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = IpGraph::default();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        let c = source(&mut graph, "c");
        graph.set_inputs(b, vec![a]).unwrap();
        graph.set_inputs(c, vec![b]).unwrap();

        let err = graph.set_inputs(a, vec![c]).unwrap_err();
        assert_eq!(err.to_string(), "graph error: c would cause a cycle");
        let err = graph.set_inputs(a, vec![a]).unwrap_err();
        assert!(err.to_string().contains("a would cause a cycle"));
    }

    #[test]
    fn test_remove_node_in_use() {
        let mut graph = IpGraph::default();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        graph.set_inputs(b, vec![a]).unwrap();
        assert!(graph.remove_node(a).is_err());

        graph.remove_input(b, a).unwrap();
        graph.remove_node(a).unwrap();
        assert!(graph.find_node("a").is_none());
        assert!(graph.get(b).unwrap().input_ids().is_empty());
    }

    #[test]
    fn test_topological_order() {
        let mut graph = IpGraph::default();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        let c = source(&mut graph, "c");
        graph.set_inputs(a, vec![c]).unwrap();
        graph.set_inputs(b, vec![a]).unwrap();
        assert_eq!(graph.topological_order(), Some(vec![c, a, b]));
    }

    #[test]
    fn test_flush_bumps_generation() {
        let graph = IpGraph::default();
        let g = graph.audio_cache_generation();
        graph.flush_audio_cache();
        assert_eq!(graph.audio_cache_generation(), g + 1);
    }

    #[test]
    fn test_unknown_node() {
        let graph = IpGraph::default();
        assert!(matches!(graph.evaluate(NodeId(42), 1), Err(IpError::Graph(_))));
    }
}
