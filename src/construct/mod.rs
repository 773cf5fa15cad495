mod dedup;
mod error;
mod graph;
mod handle;
#[cfg(feature = "mpi")]
mod mpicomm;
mod options;
mod partition;
mod pipeline;
mod renumber;
mod shuffle;
mod threadcomm;
mod traits;
mod types;

pub use error::*;
pub use handle::Handle;
pub use traits::*;
pub use types::*;

#[cfg(feature = "mpi")]
pub use mpicomm::MpiComm;
pub use threadcomm::{ThreadCluster, ThreadComm};

pub use dedup::{
    deduplicate, process_local_edges, remove_self_loops, sort_edges, symmetrize, DedupePolicy,
};
pub use graph::{GraphView, Segment, SegmentCsr, StoredEdge};
pub use options::GraphOptions;
pub use partition::{canonical_owner, mix64, VertexPartitionScheme};
pub use pipeline::{construct_graph, ConstructedGraph};
pub use renumber::{renumber, RenumberMap, VertexOrder};
pub use shuffle::{exchange_grouped, reply, shuffle_edges, shuffle_values, ShuffleKey, Shuffled};

// Helper functions

/// Given a list of counts, create a list of displacements
fn displs_from_counts(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}
