//! IPCore - graph evaluation tool
//!
//! Loads a JSON graph description and prints what the root node produces:
//! its range and structure, then for each requested frame the identifier
//! and the image tree, and optionally the peak level of an audio request.
//!
//! Usage: `ipcore <graph.json> [config.json]`

mod description;

use anyhow::{bail, Result};
use description::GraphDescription;
use ipcore_core::EngineConfig;
use ipcore_graph::{GraphServices, IpGraph, NodeFactory, NodeId};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(graph_path) = args.next().map(PathBuf::from) else {
        bail!("usage: ipcore <graph.json> [config.json]");
    };

    let config = match args.next() {
        Some(path) => EngineConfig::load(&PathBuf::from(path))?,
        None => EngineConfig::from_env(),
    };

    let desc = GraphDescription::load(&graph_path)?;
    let (graph, root) = desc.build(&NodeFactory::new(), GraphServices::new(config))?;
    info!("loaded {} nodes from {}", graph.len(), graph_path.display());

    report(&graph, root, &desc)
}

fn report(graph: &IpGraph, root: NodeId, desc: &GraphDescription) -> Result<()> {
    let range = graph.image_range_info(root)?;
    println!("range: {}", range);

    let frames = if desc.frames.is_empty() {
        vec![range.start]
    } else {
        desc.frames.clone()
    };

    for frame in frames {
        let structure = graph.image_structure_info(root, frame)?;
        println!();
        println!(
            "frame {}: {}x{} aspect {}",
            frame, structure.width, structure.height, structure.pixel_aspect
        );

        match graph.evaluate_identifier(root, frame)? {
            Some(id) => println!("id: {}", id),
            None => println!("id: <none>"),
        }

        match graph.evaluate(root, frame) {
            Ok(image) => print!("{}", image),
            Err(e) => warn!("frame {}: {}", frame, e),
        }
    }

    if let Some(audio) = desc.audio {
        let (buffer, filled) = graph.audio_fill_buffer(root, audio.start, audio.frames)?;
        println!();
        println!(
            "audio: {} of {} frames filled from {:.3}s, peak {:.4}",
            filled,
            buffer.size(),
            audio.start,
            buffer.peak()
        );
    }

    Ok(())
}
