//! Graph building helpers shared by the integration tests.

use ipcore_graph::{IpGraph, NodeDefinition, NodeFactory, NodeId, SourceNode, StackNode, TransitionNode};

pub fn source(graph: &mut IpGraph, name: &str, start: i32, end: i32) -> NodeId {
    let id = graph.add_node(name, Box::new(SourceNode::new())).unwrap();
    graph.set_property(id, "media.start", start).unwrap();
    graph.set_property(id, "media.end", end).unwrap();
    id
}

pub fn source_with_cuts(graph: &mut IpGraph, name: &str, range: (i32, i32), cuts: (i32, i32)) -> NodeId {
    let id = source(graph, name, range.0, range.1);
    graph.set_property(id, "media.cutIn", cuts.0).unwrap();
    graph.set_property(id, "media.cutOut", cuts.1).unwrap();
    id
}

pub fn with_audio(graph: &IpGraph, id: NodeId, value: f32) {
    graph.set_property(id, "audio.active", 1i32).unwrap();
    graph.set_property(id, "audio.value", value).unwrap();
}

pub fn stack(graph: &mut IpGraph, name: &str, inputs: Vec<NodeId>) -> NodeId {
    let node = StackNode::new(NodeDefinition::stack("over", inputs.len()));
    let id = graph.add_node(name, Box::new(node)).unwrap();
    graph.set_inputs(id, inputs).unwrap();
    id
}

pub fn transition(graph: &mut IpGraph, inputs: [NodeId; 2], start_frame: f32, num_frames: f32) -> NodeId {
    let node = TransitionNode::new(NodeDefinition::cross_dissolve());
    let id = graph.add_node("transition", Box::new(node)).unwrap();
    graph.set_inputs(id, inputs.to_vec()).unwrap();
    graph.set_property(id, "parameters.startFrame", start_frame).unwrap();
    graph.set_property(id, "parameters.numFrames", num_frames).unwrap();
    id
}

/// Add a node through the factory, as the command line tool does.
pub fn create(graph: &mut IpGraph, type_name: &str, name: &str, inputs: Vec<NodeId>) -> NodeId {
    let node = NodeFactory::new().create(type_name, inputs.len()).unwrap();
    let id = graph.add_node(name, node).unwrap();
    graph.set_inputs(id, inputs).unwrap();
    id
}
