//! JSON graph descriptions.
//!
//! ```json
//! {
//!   "fps": 24,
//!   "root": "stack",
//!   "frames": [1, 10, 40],
//!   "audio": { "start": 0.0, "frames": 48000 },
//!   "nodes": [
//!     { "name": "a", "type": "Source", "properties": { "media.end": 50 } },
//!     { "name": "stack", "type": "Stack", "inputs": ["a"] }
//!   ]
//! }
//! ```
//!
//! Property values are converted to the declared layout of the target
//! property; arrays set every element.

use anyhow::{anyhow, bail, Context as _, Result};
use glam::Mat4;
use ipcore_core::Layout;
use ipcore_graph::{GraphServices, IpGraph, NodeFactory, NodeId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AudioRequest {
    #[serde(default)]
    pub start: f64,
    pub frames: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub fps: Option<f32>,
    pub root: String,
    #[serde(default)]
    pub frames: Vec<i32>,
    #[serde(default)]
    pub audio: Option<AudioRequest>,
    pub nodes: Vec<NodeDescription>,
}

impl GraphDescription {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("invalid graph description")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&data)
    }

    /// Create every node, wire the inputs, then apply each node's
    /// properties. Returns the graph and its root.
    pub fn build(&self, factory: &NodeFactory, services: GraphServices) -> Result<(IpGraph, NodeId)> {
        let mut graph = IpGraph::new(services);
        if let Some(fps) = self.fps {
            graph.set_fps(fps);
        }

        let mut ids = BTreeMap::new();
        for desc in &self.nodes {
            let node = factory.create(&desc.type_name, desc.inputs.len())?;
            ids.insert(desc.name.as_str(), graph.add_node(&desc.name, node)?);
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| anyhow!("unknown node '{}'", name))
        };

        for desc in &self.nodes {
            let inputs = desc
                .inputs
                .iter()
                .map(|name| lookup(name.as_str()))
                .collect::<Result<Vec<_>>>()?;
            graph.set_inputs(lookup(desc.name.as_str())?, inputs)?;
        }

        for desc in &self.nodes {
            let id = lookup(desc.name.as_str())?;
            for (name, value) in &desc.properties {
                apply_property(&graph, id, name, value)
                    .with_context(|| format!("setting {}.{}", desc.name, name))?;
            }
        }

        let root = lookup(self.root.as_str())?;
        Ok((graph, root))
    }
}

fn as_array(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        other => vec![other],
    }
}

fn floats(value: &Value) -> Result<Vec<f32>> {
    as_array(value)
        .into_iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| anyhow!("expected a number, got {}", v)))
        .collect()
}

fn apply_property(graph: &IpGraph, id: NodeId, name: &str, value: &Value) -> Result<()> {
    let (layout, width) = {
        let node = graph.node_ref(id)?;
        let props = node.properties();
        let property = props
            .property(name)
            .ok_or_else(|| anyhow!("no such property"))?;
        (property.layout(), property.width())
    };

    match (layout, width) {
        (Layout::Float, 16) => {
            let values = floats(value)?;
            if values.len() % 16 != 0 {
                bail!("matrix needs 16 values per element, got {}", values.len());
            }
            let matrices = values.chunks(16).map(Mat4::from_cols_slice).collect();
            graph.set_property_values::<Mat4>(id, name, matrices)?;
        }
        (Layout::Float, 1) => graph.set_property_values(id, name, floats(value)?)?,
        (Layout::Int, 1) => {
            let values = as_array(value)
                .into_iter()
                .map(|v| match v {
                    Value::Bool(b) => Ok(*b as i32),
                    other => other
                        .as_i64()
                        .map(|i| i as i32)
                        .ok_or_else(|| anyhow!("expected an integer, got {}", other)),
                })
                .collect::<Result<Vec<i32>>>()?;
            graph.set_property_values(id, name, values)?;
        }
        (Layout::String, 1) => {
            let values = as_array(value)
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<String>>();
            graph.set_property_values(id, name, values)?;
        }
        (layout, width) => bail!("unsupported property type {}[{}]", layout.name(), width),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"{
        "root": "stack",
        "frames": [1, 5],
        "nodes": [
            { "name": "a", "type": "Source", "properties": { "media.end": 10, "media.fps": 30 } },
            { "name": "b", "type": "Source", "properties": { "media.start": 5, "media.end": 20 } },
            { "name": "stack", "type": "Stack:add", "inputs": ["a", "b"],
              "properties": { "output.outOfRangePolicy": "blank", "output.size": [320, 240] } }
        ]
    }"#;

    #[test]
    fn test_build_stack() {
        let desc = GraphDescription::from_json(STACK).unwrap();
        let (graph, root) = desc.build(&NodeFactory::new(), GraphServices::default()).unwrap();

        assert_eq!(graph.len(), 3);
        let range = graph.image_range_info(root).unwrap();
        assert_eq!((range.start, range.end), (1, 20));
        assert_eq!(range.fps, 30.0);
        assert_eq!(
            graph.property::<String>(root, "output.outOfRangePolicy").unwrap(),
            "blank"
        );
        let a = graph.find_node("a").unwrap();
        assert_eq!(graph.property::<f32>(a, "media.fps").unwrap(), 30.0);
    }

    #[test]
    fn test_matrix_property() {
        let json = r#"{
            "root": "lut",
            "nodes": [
                { "name": "src", "type": "Source" },
                { "name": "lut", "type": "LUT", "inputs": ["src"],
                  "properties": { "lut.outMatrix": [2,0,0,0, 0,2,0,0, 0,0,2,0, 0,0,0,1] } }
            ]
        }"#;
        let desc = GraphDescription::from_json(json).unwrap();
        let (graph, root) = desc.build(&NodeFactory::new(), GraphServices::default()).unwrap();
        let m = graph.property::<Mat4>(root, "lut.outMatrix").unwrap();
        assert_eq!(m, Mat4::from_scale(glam::Vec3::splat(2.0)));
    }

    #[test]
    fn test_unknown_input() {
        let json = r#"{ "root": "s", "nodes": [ { "name": "s", "type": "Stack", "inputs": ["missing"] } ] }"#;
        let desc = GraphDescription::from_json(json).unwrap();
        let err = desc.build(&NodeFactory::new(), GraphServices::default()).unwrap_err();
        assert!(err.to_string().contains("unknown node 'missing'"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, STACK).unwrap();

        let desc = GraphDescription::load(&path).unwrap();
        assert_eq!(desc.frames, vec![1, 5]);
        assert_eq!(desc.nodes[2].type_name, "Stack:add");
        assert!(GraphDescription::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_unknown_property() {
        let json = r#"{ "root": "s", "nodes": [ { "name": "s", "type": "Source", "properties": { "media.bogus": 1 } } ] }"#;
        let desc = GraphDescription::from_json(json).unwrap();
        assert!(desc.build(&NodeFactory::new(), GraphServices::default()).is_err());
    }
}
