//! LUT files loaded through graph nodes.

use crate::support::{create, source};
use ipcore_color::LutCache;
use ipcore_core::{EngineConfig, IpError};
use ipcore_gpu::Texels;
use ipcore_graph::{GraphServices, IpGraph, LutNode, NodeId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn identity_cube() -> String {
    let mut cube = String::from("LUT_3D_SIZE 2\n");
    for b in 0..2 {
        for g in 0..2 {
            for r in 0..2 {
                cube.push_str(&format!("{} {} {}\n", r, g, b));
            }
        }
    }
    cube
}

fn lut_on_source(graph: &mut IpGraph, name: &str) -> NodeId {
    let src = source(graph, &format!("{}_src", name), 1, 10);
    create(graph, "LUT", name, vec![src])
}

#[test]
fn test_shared_cache_parses_once() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "look.cube", &identity_cube());

    let mut config = EngineConfig::default();
    config.lut.search_path = vec![dir.path().to_path_buf()];
    let luts = Arc::new(LutCache::new());
    let mut graph = IpGraph::new(GraphServices::new(config).with_lut_cache(luts.clone()));

    let first = lut_on_source(&mut graph, "grade1");
    let second = lut_on_source(&mut graph, "grade2");
    for id in [first, second] {
        graph.set_property(id, "lut.file", "look.cube".to_string()).unwrap();
        graph.set_property(id, "lut.active", 1i32).unwrap();
    }

    assert_eq!(luts.len(), 1);
    assert!(luts.contains(&dir.path().join("look.cube")));
    assert_eq!(
        graph.property::<String>(first, "lut.file").unwrap(),
        dir.path().join("look.cube").display().to_string()
    );

    let a = graph.node_as::<LutNode>(first).unwrap().generated().unwrap();
    let b = graph.node_as::<LutNode>(second).unwrap().generated().unwrap();
    assert!(a.is_3d && b.is_3d);
    assert_eq!(a.id(), b.id());

    let id = graph.evaluate_identifier(second, 2).unwrap().unwrap();
    assert_eq!(id.id, format!("grade2:{}", b.id()));
    assert_eq!(id.children[0].id, "grade2_src:2");
}

#[test]
fn test_ushort_tables_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "wide.cube", "LUT_1D_SIZE 2\n0.5 0.5 0.5\n2.5 2.5 2.5\n");

    let mut config = EngineConfig::default();
    config.render.float_textures = false;
    let mut graph = IpGraph::new(GraphServices::new(config));
    let lut = lut_on_source(&mut graph, "lut");
    graph.set_property(lut, "lut.file", path.display().to_string()).unwrap();

    let generated = graph.node_as::<LutNode>(lut).unwrap().generated().unwrap();
    assert!(!generated.is_3d);
    assert_eq!(generated.table.scale, 2.0);
    assert_eq!(generated.table.offset, 0.5);
    assert!(matches!(generated.table.texture.texels, Texels::U16(_)));
    assert_eq!(graph.property::<f32>(lut, "lut.offset").unwrap(), 0.5);
}

#[test]
fn test_nonlinear_prelut_on_channel_lut_fails() {
    let dir = tempfile::tempdir().unwrap();
    let csp = "CSPLUTV100\n1D\n3\n0 0.5 1\n0 0.25 1\n3\n0 0.5 1\n0 0.25 1\n3\n0 0.5 1\n0 0.25 1\n\
        2\n0 0 0\n1 1 1\n";
    let path = write_file(dir.path(), "bad.csp", csp);

    let mut graph = IpGraph::default();
    let lut = lut_on_source(&mut graph, "lut");
    let err = graph
        .set_property(lut, "lut.file", path.display().to_string())
        .unwrap_err();
    assert!(matches!(err, IpError::ReadFailed(ref m) if m.contains("non-linear prelut")));
    assert!(graph.node_as::<LutNode>(lut).unwrap().generated().is_none());

    // The image still passes through the inactive node.
    let image = graph.evaluate(lut, 1).unwrap();
    assert_eq!(image.fb.as_ref().unwrap().id, "lut_src:1");
}

#[test]
fn test_malformed_csp_size_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let csp = "CSPLUTV100\n3D\n2\n0 1\n0 1\n2\n0 1\n0 1\n2\n0 1\n0 1\n1e7 1e7 1e7\n0 0 0\n";
    let path = write_file(dir.path(), "huge.csp", csp);

    let mut graph = IpGraph::default();
    let lut = lut_on_source(&mut graph, "lut");
    let err = graph
        .set_property(lut, "lut.file", path.display().to_string())
        .unwrap_err();
    assert!(matches!(err, IpError::ReadFailed(ref m) if m.contains("out of range")));
    assert!(graph.node_as::<LutNode>(lut).unwrap().generated().is_none());
    assert_eq!(graph.evaluate(lut, 3).unwrap().fb.as_ref().unwrap().id, "lut_src:3");
}

#[test]
fn test_reload_without_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "look.cube", &identity_cube());

    let mut config = EngineConfig::default();
    config.lut.reuse = false;
    let mut graph = IpGraph::new(GraphServices::new(config));
    let lut = lut_on_source(&mut graph, "lut");
    graph.set_property(lut, "lut.file", path.display().to_string()).unwrap();
    let before = graph.node_as::<LutNode>(lut).unwrap().generated().unwrap();

    graph.set_property(lut, "lut.preLUTSize", 256i32).unwrap();
    let after = graph.node_as::<LutNode>(lut).unwrap().generated().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.id(), after.id());
}
