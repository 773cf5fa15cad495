use distributed_construction::{
    construct_graph, DedupePolicy, Edge, GraphOptions, Handle, ThreadCluster, VertexID,
};

use anyhow::Context;
use log::info;

const GLOBAL_EDGES: [(u64, u64, f64); 28] = [
    (1, 2, 1.0),
    (1, 4, 1.0),
    (1, 7, 1.0),
    (2, 0, 1.0),
    (2, 4, 1.0),
    (2, 5, 1.0),
    (2, 6, 1.0),
    (3, 0, 1.0),
    (3, 7, 1.0),
    (4, 0, 1.0),
    (4, 10, 1.0),
    (5, 0, 1.0),
    (5, 7, 1.0),
    (5, 11, 1.0),
    (6, 7, 1.0),
    (6, 11, 1.0),
    (8, 9, 1.0),
    (8, 10, 1.0),
    (8, 11, 1.0),
    (8, 14, 1.0),
    (8, 15, 1.0),
    (9, 12, 1.0),
    (9, 14, 1.0),
    (10, 11, 1.0),
    (10, 12, 1.0),
    (10, 13, 1.0),
    (10, 14, 1.0),
    (11, 13, 1.0),
];

fn main() -> anyhow::Result<()> {
    let ranks: usize = match std::env::var("GRAPH_RANKS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("GRAPH_RANKS={} is not a rank count", value))?,
        Err(_) => 4,
    };
    anyhow::ensure!(ranks > 0, "GRAPH_RANKS must be at least 1");

    let options = GraphOptions::default()
        .symmetrize(true)
        .dedupe_policy(DedupePolicy::Sum)
        .do_expensive_check(true);

    let results = ThreadCluster::run(ranks, |comm| {
        let handle = Handle::new(&comm);
        let rank = handle.rank();

        // round-robin the input so every rank starts with an arbitrary share
        let edges: Vec<Edge> = GLOBAL_EDGES
            .iter()
            .skip(rank)
            .step_by(ranks)
            .map(|&e| Edge::from(e))
            .collect();

        let graph = construct_graph(&handle, &edges, None, &options)?;
        for (old, new) in graph.renumber_map.iter() {
            let neighbors: Vec<VertexID> = graph.view.neighbors(new).map(|(v, _)| v).collect();
            info!("{} (was {}) -> {:?}", new, old, neighbors);
        }
        Ok::<_, distributed_construction::GraphError>(graph)
    });

    for result in results {
        let graph = result?;
        println!(
            "rank {}: vertices {:?} of {}, {} of {} edges",
            graph.view.rank(),
            graph.view.vertex_range(),
            graph.view.global_vertex_count(),
            graph.view.local_edge_count(),
            graph.view.global_edge_count()
        );
    }

    Ok(())
}
