//! Range computation and frame remapping across whole graphs.

use crate::support::{create, source, source_with_cuts, stack, transition};
use ipcore_graph::{IpGraph, IpImageId, StackNode, SwitchNode, TransitionNode};
use proptest::prelude::*;

fn frame_of(id: &IpImageId) -> i32 {
    id.id
        .rsplit(':')
        .next()
        .and_then(|f| f.parse().ok())
        .unwrap_or_else(|| panic!("no frame in identifier {}", id.id))
}

#[test]
fn test_single_input_is_renumbered_from_one() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "src", 10, 20);
    let s = stack(&mut graph, "stack", vec![a]);
    graph.set_property(s, "timing.useCutInfo", 0i32).unwrap();

    let range = graph.image_range_info(s).unwrap();
    assert_eq!((range.start, range.end), (1, 11));

    for f in 1..=11 {
        let id = graph.evaluate_identifier(s, f).unwrap().unwrap();
        assert_eq!(id.id, format!("src:{}", f + 9));
    }
    // Outside the range the held frame is the nearest end.
    assert_eq!(graph.evaluate_identifier(s, -3).unwrap().unwrap().id, "src:10");
    assert_eq!(graph.evaluate_identifier(s, 30).unwrap().unwrap().id, "src:20");
}

#[test]
fn test_cut_info_toggle_updates_range() {
    let mut graph = IpGraph::default();
    let a = source_with_cuts(&mut graph, "a", (1, 100), (20, 40));
    let s = stack(&mut graph, "stack", vec![a]);

    let range = graph.image_range_info(s).unwrap();
    assert_eq!((range.start, range.end), (1, 21));
    assert_eq!(graph.evaluate_identifier(s, 1).unwrap().unwrap().id, "a:20");

    graph.set_property(s, "timing.useCutInfo", 0i32).unwrap();
    let range = graph.image_range_info(s).unwrap();
    assert_eq!((range.start, range.end), (1, 100));
    assert_eq!(graph.evaluate_identifier(s, 1).unwrap().unwrap().id, "a:1");
}

#[test]
fn test_source_change_reaches_nested_stacks() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 10);
    let b = source(&mut graph, "b", 1, 10);
    let inner = stack(&mut graph, "inner", vec![a, b]);
    let outer = stack(&mut graph, "outer", vec![inner]);

    assert_eq!(graph.image_range_info(outer).unwrap().end, 10);
    graph.set_property(b, "media.end", 60i32).unwrap();
    assert_eq!(graph.image_range_info(inner).unwrap().end, 60);
    assert_eq!(graph.image_range_info(outer).unwrap().end, 60);

    graph.set_property(a, "media.width", 1920i32).unwrap();
    assert_eq!(graph.image_structure_info(outer, 1).unwrap().width, 1920);
}

#[test]
fn test_transition_overlap_maps_ends() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 101, 150);
    let b = source(&mut graph, "b", 1, 30);
    let t = transition(&mut graph, [a, b], 40.0, 10.0);

    let range = graph.image_range_info(t).unwrap();
    assert_eq!((range.start, range.end), (1, 69));

    let first = graph.evaluate_identifier(t, 1).unwrap().unwrap();
    assert_eq!(first.id, "a:101+b:1");
    let last = graph.evaluate_identifier(t, 69).unwrap().unwrap();
    assert_eq!(last.id, "a:150+b:30");

    let mid = graph.evaluate_identifier(t, 45).unwrap().unwrap();
    assert_eq!(mid.children.len(), 2);
    assert_eq!(frame_of(&mid.children[0]), 145);
    assert_eq!(frame_of(&mid.children[1]), 6);

    let node = graph.node_as::<TransitionNode>(t).unwrap();
    let ranges = node.ranges(graph.get(t).unwrap());
    assert_eq!(ranges.global_ranges, vec![(1, 49), (40, 69)]);
}

#[test]
fn test_switch_follows_selected_input() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 10);
    let b = source(&mut graph, "b", 201, 250);
    let sw = create(&mut graph, "Switch", "switch", vec![a, b]);

    let range = graph.image_range_info(sw).unwrap();
    assert_eq!((range.start, range.end), (1, 10));

    graph.set_property(sw, "output.input", "b".to_string()).unwrap();
    let range = graph.image_range_info(sw).unwrap();
    assert_eq!((range.start, range.end), (1, 50));
    assert_eq!(graph.evaluate_identifier(sw, 1).unwrap().unwrap().id, "b:201");

    let node = graph.node_as::<SwitchNode>(sw).unwrap();
    assert_eq!(node.active_input(graph.get(sw).unwrap()), 1);
}

#[test]
fn test_factory_composite_stack() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 10);
    let b = source(&mut graph, "b", 5, 30);
    let s = create(&mut graph, "Stack:add", "sum", vec![a, b]);

    let range = graph.image_range_info(s).unwrap();
    assert_eq!((range.start, range.end), (1, 30));
    let image = graph.evaluate(s, 8).unwrap();
    assert_eq!(image.merge_expr.as_ref().unwrap().name(), "add");
}

#[derive(Debug, Clone)]
struct Input {
    start: i32,
    len: i32,
    cuts: Option<(i32, i32)>,
}

fn input_strategy() -> impl Strategy<Value = Input> {
    (-50i32..200, 1i32..120, proptest::option::of((0i32..120, 0i32..120))).prop_map(|(start, len, cuts)| {
        Input {
            start,
            len,
            cuts: cuts.map(|(a, b)| (start + a.min(b), start + a.max(b))),
        }
    })
}

fn build(graph: &mut IpGraph, inputs: &[Input], use_cut_info: bool, align: bool) -> ipcore_graph::NodeId {
    let ids = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let name = format!("in{}", i);
            let end = input.start + input.len - 1;
            match input.cuts {
                Some(cuts) => source_with_cuts(graph, &name, (input.start, end), cuts),
                None => source(graph, &name, input.start, end),
            }
        })
        .collect();
    let s = stack(graph, "stack", ids);
    graph.set_property(s, "timing.useCutInfo", use_cut_info as i32).unwrap();
    graph.set_property(s, "timing.alignStartFrames", align as i32).unwrap();
    s
}

proptest! {
    #[test]
    fn prop_range_recompute_is_idempotent(
        inputs in proptest::collection::vec(input_strategy(), 1..6),
        use_cut_info in any::<bool>(),
        align in any::<bool>(),
    ) {
        let mut graph = IpGraph::default();
        let s = build(&mut graph, &inputs, use_cut_info, align);

        let first = graph.image_range_info(s).unwrap();
        let node = graph.node_as::<StackNode>(s).unwrap();
        let before = node.ranges(graph.get(s).unwrap());
        node.invalidate();
        let second = graph.image_range_info(s).unwrap();
        let after = node.ranges(graph.get(s).unwrap());

        prop_assert_eq!(first, second);
        prop_assert_eq!(&*before, &*after);
        prop_assert_eq!(first.start, 1);
        prop_assert!(first.end >= first.start);
    }

    #[test]
    fn prop_held_frames_stay_inside_input_ranges(
        inputs in proptest::collection::vec(input_strategy(), 1..4),
        use_cut_info in any::<bool>(),
        align in any::<bool>(),
    ) {
        let mut graph = IpGraph::default();
        let s = build(&mut graph, &inputs, use_cut_info, align);
        let range = graph.image_range_info(s).unwrap();

        for f in (range.start - 2)..=(range.end + 2) {
            let id = graph.evaluate_identifier(s, f).unwrap().unwrap();
            prop_assert_eq!(id.children.len(), inputs.len());
            for (input, child) in inputs.iter().zip(&id.children) {
                let end = input.start + input.len - 1;
                let (first, last) = match (use_cut_info, input.cuts) {
                    (true, Some((cut_in, cut_out))) => (cut_in.min(end), cut_out.min(end)),
                    _ => (input.start, end),
                };
                let frame = frame_of(child);
                prop_assert!(frame >= first && frame <= last, "{} outside [{}, {}]", frame, first, last);
            }
        }
    }
}
