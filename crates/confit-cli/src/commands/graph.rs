//! Dependency graph inspection.

use anyhow::Result;
use confit_scheduler::DependencyGraph;
use std::path::Path;

use super::load_objects;

/// Print the dependency layers of the configs in `objects_path`.
pub fn run(objects_path: &Path) -> Result<()> {
    let objects = load_objects(objects_path)?;

    let graph = match DependencyGraph::build(&objects) {
        Ok(graph) => graph,
        Err(e) => {
            println!("Dependency error: {}", e);
            std::process::exit(1);
        }
    };

    for (index, layer) in graph.layers().iter().enumerate() {
        println!("Layer {}:", index);
        for coordinate in layer {
            let deps: Vec<String> = graph
                .predecessors(coordinate)
                .map(ToString::to_string)
                .collect();
            if deps.is_empty() {
                println!("  {}", coordinate);
            } else {
                println!("  {} <- {}", coordinate, deps.join(", "));
            }
            for unknown in graph.unknown_references(coordinate) {
                println!("    ! unknown reference {}", unknown);
            }
        }
    }
    Ok(())
}
