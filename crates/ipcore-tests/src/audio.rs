//! Audio gathered through stacks, switches and transitions.

use crate::support::{create, source, source_with_cuts, stack, transition, with_audio};
use ipcore_audio::time_to_samples;
use ipcore_graph::IpGraph;

const RATE: f64 = 48000.0;

fn close(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() < 1e-3
}

#[test]
fn test_stack_sums_every_input() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 48);
    let b = source(&mut graph, "b", 1, 12);
    with_audio(&graph, a, 0.25);
    with_audio(&graph, b, 0.5);
    let s = stack(&mut graph, "stack", vec![a, b]);

    // Two seconds of media in a, half a second in b.
    let (buffer, filled) = graph.audio_fill_buffer(s, 0.0, 96000).unwrap();
    assert_eq!(filled, 96000);
    assert!(close(buffer.frame(0)[0], 0.75));
    assert!(close(buffer.frame(23999)[1], 0.75));
    assert!(close(buffer.frame(24000)[0], 0.25));
    assert!(close(buffer.peak(), 0.75));
}

#[test]
fn test_stack_silences_media_outside_cut() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 48);
    let b = source_with_cuts(&mut graph, "b", (1, 96), (49, 96));
    with_audio(&graph, b, 0.5);
    let s = stack(&mut graph, "stack", vec![a, b]);

    // b is cut to node frames 49..=96, seconds 2.0 to 4.0.
    let (buffer, _) = graph.audio_fill_buffer(s, 0.0, 240000).unwrap();
    let at = |sample: usize| buffer.frame(sample)[0];
    assert_eq!(at(12000), 0.0);
    assert_eq!(at(95999), 0.0);
    assert!(close(at(96000), 0.5));
    assert!(close(at(191999), 0.5));
    assert_eq!(at(192000), 0.0);

    // Without cut info the whole media plays.
    graph.set_property(s, "timing.useCutInfo", 0i32).unwrap();
    let (buffer, _) = graph.audio_fill_buffer(s, 0.0, 240000).unwrap();
    assert!(close(buffer.frame(12000)[0], 0.5));
}

#[test]
fn test_stack_audio_selection() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 24);
    let b = source(&mut graph, "b", 1, 24);
    with_audio(&graph, b, 0.5);
    let s = stack(&mut graph, "stack", vec![a, b]);

    let sample = |graph: &IpGraph| {
        let (buffer, filled) = graph.audio_fill_buffer(s, 0.0, 4800).unwrap();
        (buffer.frame(100)[0], filled)
    };

    // a is silent, so the topmost audible input is b.
    graph.set_property(s, "output.activeAudioInput", ".topmost.".to_string()).unwrap();
    assert_eq!(sample(&graph), (0.5, 4800));

    graph.set_property(s, "output.activeAudioInput", ".first.".to_string()).unwrap();
    assert_eq!(sample(&graph), (0.0, 0));

    with_audio(&graph, a, 0.125);
    assert_eq!(sample(&graph), (0.125, 4800));

    graph.set_property(s, "output.activeAudioInput", ".topmost.".to_string()).unwrap();
    assert_eq!(sample(&graph), (0.125, 4800));

    graph.set_property(s, "output.activeAudioInput", "b".to_string()).unwrap();
    assert_eq!(sample(&graph), (0.5, 4800));

    graph.set_property(s, "output.activeAudioInput", ".all.".to_string()).unwrap();
    assert_eq!(sample(&graph), (0.625, 4800));
}

#[test]
fn test_cached_audio_is_flushed_by_changes() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 24);
    with_audio(&graph, a, 0.5);
    let s = stack(&mut graph, "stack", vec![a]);

    let (first, _) = graph.audio_fill_buffer(s, 0.0, 480).unwrap();
    let generation = graph.audio_cache_generation();
    let (again, _) = graph.audio_fill_buffer(s, 0.0, 480).unwrap();
    assert_eq!(first.samples(), again.samples());

    graph.set_property(a, "audio.value", 0.75f32).unwrap();
    assert!(graph.audio_cache_generation() > generation);
    let (changed, _) = graph.audio_fill_buffer(s, 0.0, 480).unwrap();
    assert!(close(changed.frame(0)[0], 0.75));
}

#[test]
fn test_transition_envelope() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 48);
    let b = source(&mut graph, "b", 1, 48);
    with_audio(&graph, a, 1.0);
    with_audio(&graph, b, 2.0);
    // Window over node frames 25..=48, seconds 1.0 to 2.0.
    let t = transition(&mut graph, [a, b], 25.0, 24.0);
    assert_eq!(graph.image_range_info(t).unwrap().end, 72);
    assert_eq!(
        (time_to_samples(1.0, RATE), time_to_samples(2.0, RATE)),
        (48000, 96000)
    );

    let (buffer, filled) = graph.audio_fill_buffer(t, 0.0, 144000).unwrap();
    assert_eq!(filled, 96000);
    let at = |sample: usize| buffer.frame(sample)[0];

    // Before the window only a plays, after it only b.
    assert!(close(at(0), 1.0));
    assert!(close(at(47999), 1.0));
    assert!(close(at(120000), 2.0));
    assert!(close(at(143999), 2.0));

    // a fades out while b fades in.
    assert!(close(at(48000), 1.0));
    assert!(close(at(60000), 0.75 + 2.0 * 0.25));
    assert!(close(at(72000), 0.5 + 1.0));
    assert!(close(at(95999), 2.0));
    assert_eq!(buffer.size(), (3.0 * RATE) as usize);
}

#[test]
fn test_switch_audio_follows_active_input() {
    let mut graph = IpGraph::default();
    let a = source(&mut graph, "a", 1, 24);
    let b = source(&mut graph, "b", 101, 124);
    with_audio(&graph, a, 0.25);
    with_audio(&graph, b, 0.5);
    let sw = create(&mut graph, "Switch", "switch", vec![a, b]);

    let (buffer, filled) = graph.audio_fill_buffer(sw, 0.0, 4800).unwrap();
    assert_eq!((buffer.frame(0)[0], filled), (0.25, 4800));

    graph.set_property(sw, "output.input", "b".to_string()).unwrap();
    let (buffer, filled) = graph.audio_fill_buffer(sw, 0.0, 4800).unwrap();
    assert_eq!((buffer.frame(0)[0], filled), (0.5, 4800));
}
