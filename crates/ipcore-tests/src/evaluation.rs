//! Image trees, identifiers and failure handling of evaluated graphs.

use crate::support::{create, source, stack, transition};
use ipcore_core::IpError;
use ipcore_graph::{
    Destination, GraphServices, ImageCache, IpGraph, IpImage, MetaEvalInfoCollector, RecordingImageCache,
    RenderType,
};
use std::sync::Arc;

fn ramp(n: usize) -> Vec<f32> {
    (0..n).flat_map(|i| [i as f32 / (n - 1) as f32; 3]).collect()
}

#[test]
fn test_blank_policy_never_touches_out_of_range_input() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 20);
    let b = source(&mut graph, "b", 11, 20);
    graph.set_property(b, "debug.failEvaluate", 1i32).unwrap();
    let s = stack(&mut graph, "stack", vec![a, b]);
    graph.set_property(s, "output.outOfRangePolicy", "blank".to_string()).unwrap();

    for f in 1..=10 {
        let image = graph.evaluate(s, f).unwrap();
        assert_eq!(image.children.len(), 2);
        assert_eq!(image.children[1].attribute("Type"), Some("Blank"));
        assert_eq!(graph.evaluate_identifier(s, f).unwrap().unwrap().id, format!("a:{}", f));
    }
    for f in 11..=20 {
        let err = graph.evaluate(s, f).unwrap_err();
        assert!(matches!(err, IpError::ReadFailed(_)), "frame {}: {}", f, err);
        assert_eq!(
            graph.evaluate_identifier(s, f).unwrap().unwrap().id,
            format!("a:{}+b:{}", f, f)
        );
    }
}

#[test]
fn test_black_policy_placeholder() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 20);
    let b = source(&mut graph, "b", 1, 5);
    let s = stack(&mut graph, "stack", vec![a, b]);
    graph.set_property(s, "output.outOfRangePolicy", "black".to_string()).unwrap();

    let image = graph.evaluate(s, 12).unwrap();
    assert_eq!(image.children[1].attribute("Type"), Some("Black"));
    // Black inputs still take part in the identifier.
    assert_eq!(graph.evaluate_identifier(s, 12).unwrap().unwrap().id, "a:12+b:5");
}

#[test]
fn test_failed_input_checks_in_finished_siblings() {
    let cache = Arc::new(RecordingImageCache::new());
    let services = GraphServices::default().with_image_cache(cache.clone() as Arc<dyn ImageCache>);
    let mut graph = IpGraph::new(services);

    let a = source(&mut graph, "a", 1, 10);
    let b = source(&mut graph, "b", 1, 10);
    let c = source(&mut graph, "c", 1, 10);
    graph.set_property(b, "debug.failEvaluate", 1i32).unwrap();
    let s = stack(&mut graph, "stack", vec![a, b, c]);

    let err = graph.evaluate(s, 4).unwrap_err();
    assert!(matches!(err, IpError::ReadFailed(ref m) if m.contains("b: unable to read frame 4")));
    assert_eq!(cache.checked_in_nodes(), vec!["a".to_string()]);

    // A later successful evaluation checks nothing in.
    graph.set_property(b, "debug.failEvaluate", 0i32).unwrap();
    let image = graph.evaluate(s, 4).unwrap();
    assert_eq!(image.children.len(), 3);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_transition_tree_at_window() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 50);
    let b = source(&mut graph, "b", 1, 30);
    let t = transition(&mut graph, [a, b], 40.0, 10.0);

    let image = graph.evaluate(t, 45).unwrap();
    assert_eq!(image.node, "transition");
    assert_eq!(image.render_type, RenderType::Merge);
    assert_eq!(image.children.len(), 2);
    assert_eq!(image.children[0].fb.as_ref().unwrap().id, "a:45");
    assert_eq!(image.children[1].fb.as_ref().unwrap().id, "b:6");
    assert_eq!(image.merge_expr.as_ref().unwrap().name(), "crossDissolve");
}

fn find<'a>(image: &'a IpImage, node: &str) -> Option<&'a IpImage> {
    if image.node == node {
        return Some(image);
    }
    image.children.iter().find_map(|c| find(c, node))
}

#[test]
fn test_lut_and_denoise_chain() {
    let mut graph = IpGraph::default();
    let src = source(&mut graph, "src", 1, 24);
    let lut = create(&mut graph, "LUT", "lut", vec![src]);
    graph.set_property_values(lut, "lut.lut", ramp(16)).unwrap();
    graph.set_property_values(lut, "lut.size", vec![16i32, 0, 0]).unwrap();
    graph.set_property(lut, "lut.active", 1i32).unwrap();
    let nr = create(&mut graph, "NoiseReduction", "nr", vec![lut]);
    graph.set_property(nr, "node.amount", 0.25f32).unwrap();
    let s = stack(&mut graph, "stack", vec![nr]);

    let image = graph.evaluate(s, 3).unwrap();
    let denoise = find(&image, "nr").unwrap();
    assert_eq!(denoise.destination, Destination::IntermediateBuffer);
    assert_eq!(denoise.shader_expr.as_ref().unwrap().name(), "noiseReduction");

    let graded = &denoise.children[0];
    assert_eq!(graded.node, "src");
    assert_eq!(graded.shader_expr.as_ref().unwrap().name(), "colorMatrix");
    assert_eq!(graded.fb.as_ref().unwrap().id, "src:3");

    let id = graph.evaluate_identifier(s, 3).unwrap().unwrap();
    assert_eq!(id.id, "nr:0.25/0/5");
    let lut_id = &id.children[0].children[0];
    assert!(lut_id.id.starts_with("lut:"));
    assert_eq!(lut_id.children[0].id, "src:3");
}

#[test]
fn test_meta_evaluation_follows_remapped_frames() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 101, 150);
    let b = source(&mut graph, "b", 1, 30);
    let t = transition(&mut graph, [a, b], 40.0, 10.0);
    let s = stack(&mut graph, "stack", vec![t]);

    let mut collector = MetaEvalInfoCollector::default();
    graph.meta_evaluate(s, 45, &mut collector).unwrap();
    let visited: Vec<(String, i32)> = collector
        .infos
        .iter()
        .map(|info| (info.name.clone(), info.source_frame))
        .collect();
    assert_eq!(
        visited,
        vec![
            ("stack".to_string(), 45),
            ("transition".to_string(), 45),
            ("a".to_string(), 145),
            ("b".to_string(), 6),
        ]
    );

    let found = graph.find_nodes_by_type_name(s, 45, "Source").unwrap();
    assert_eq!(found.len(), 2);
}

#[test]
fn test_poor_random_access_is_reported() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 10);
    let b = source(&mut graph, "b", 1, 10);
    let s = stack(&mut graph, "stack", vec![a, b]);
    assert!(!graph.test_evaluate(s, 1).unwrap().poor_random_access_performance);

    graph.set_property(b, "media.poorRandomAccess", 1i32).unwrap();
    assert!(graph.test_evaluate(s, 1).unwrap().poor_random_access_performance);
}
