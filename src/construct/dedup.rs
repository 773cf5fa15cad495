use log::{debug, info};
use rayon::slice::ParallelSliceMut;

use super::{CommBroker, EdgeRecord, Handle};

/// How parallel edges (same source, same destination) are collapsed.
///
/// There is no implicit choice: the policy changes the meaning of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupePolicy {
    /// Keep every parallel edge
    #[default]
    None,
    Sum,
    Min,
    Max,
    /// Keep the edge that entered the pipeline first: lowest rank of
    /// origin, then lowest position in that rank's input
    KeepFirst,
}

impl DedupePolicy {
    /// Combine two present weights
    fn combine(self, acc: f64, w: f64) -> f64 {
        match self {
            DedupePolicy::Sum => acc + w,
            DedupePolicy::Min => acc.min(w),
            DedupePolicy::Max => acc.max(w),
            DedupePolicy::KeepFirst | DedupePolicy::None => acc,
        }
    }

    /// Collapse a group of parallel edges sorted by origin into one.
    ///
    /// Only the weights that are present take part in the reduction; the
    /// result is unweighted iff no edge in the group had a weight. Id and
    /// type come from the first edge.
    fn merge(self, group: &[EdgeRecord]) -> EdgeRecord {
        let mut merged = group[0];
        if self == DedupePolicy::KeepFirst {
            return merged;
        }

        let weight = group
            .iter()
            .filter_map(EdgeRecord::weight)
            .reduce(|acc, w| self.combine(acc, w));
        merged.set_weight(weight);
        merged
    }
}

/// Sort edges by (major, minor, origin rank, origin position)
pub fn sort_edges<C: CommBroker>(handle: &Handle<C>, edges: &mut [EdgeRecord], transposed: bool) {
    handle.install(|| edges.par_sort_unstable_by_key(|e| e.sort_key(transposed)));
}

/// Remove self-loops in place, returning how many were dropped
pub fn remove_self_loops(edges: &mut Vec<EdgeRecord>) -> usize {
    let before = edges.len();
    edges.retain(|e| !e.is_self_loop());
    let removed = before - edges.len();
    debug!("Removed {} self loops", removed);
    removed
}

/// Collapse parallel edges of a sorted edge list.
///
/// Edges must be sorted with [`sort_edges`] (either orientation: parallel
/// edges are adjacent in both).
pub fn deduplicate(edges: Vec<EdgeRecord>, policy: DedupePolicy) -> Vec<EdgeRecord> {
    if policy == DedupePolicy::None {
        return edges;
    }

    let before = edges.len();
    let deduped: Vec<EdgeRecord> = edges
        .chunk_by(|a, b| (a.src, a.dst) == (b.src, b.dst))
        .map(|group| policy.merge(group))
        .collect();

    debug!(
        "Collapsed {} edges into {} with {:?}",
        before,
        deduped.len(),
        policy
    );
    deduped
}

/// Add the reverse of every edge whose reverse is missing.
///
/// Input must be sorted by (src, dst); reverse copies inherit attributes and
/// origin of the edge they mirror. The output is not sorted.
pub fn symmetrize(mut edges: Vec<EdgeRecord>) -> Vec<EdgeRecord> {
    let has_edge = |edges: &[EdgeRecord], src: u64, dst: u64| {
        edges
            .binary_search_by_key(&(src, dst), |e| (e.src, e.dst))
            .is_ok()
    };

    let missing: Vec<EdgeRecord> = edges
        .iter()
        .filter(|e| !e.is_self_loop() && !has_edge(&edges, e.dst, e.src))
        .map(EdgeRecord::reversed)
        .collect();

    debug!("Adding {} reverse edges", missing.len());
    edges.extend(missing);
    edges
}

/// Local clean-up of a post-shuffle edge partition.
///
/// Every edge sharing endpoints with another (and, when symmetrizing, with
/// its reverse) must already be on this rank. Returns edges sorted by
/// (major, minor, origin).
pub fn process_local_edges<C: CommBroker>(
    handle: &Handle<C>,
    mut edges: Vec<EdgeRecord>,
    policy: DedupePolicy,
    drop_self_loops: bool,
    symmetrize_edges: bool,
) -> Vec<EdgeRecord> {
    info!(
        "Cleaning up {} local edges (policy {:?}, symmetrize {})",
        edges.len(),
        policy,
        symmetrize_edges
    );

    if drop_self_loops {
        remove_self_loops(&mut edges);
    }

    sort_edges(handle, &mut edges, false);
    let mut edges = deduplicate(edges, policy);

    if symmetrize_edges {
        edges = symmetrize(edges);
        sort_edges(handle, &mut edges, false);
    }

    edges
}
