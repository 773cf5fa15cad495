use std::cmp::Reverse;
use std::ops::Range;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};
use rayon::slice::ParallelSliceMut;

use super::shuffle::{exchange_grouped, partition_by_rank, reply, shuffle_values};
use super::{
    canonical_owner, CommBroker, Count, EdgeRecord, GraphError, Handle, LookupReply, Result,
    VertexDegree, VertexID, VertexPartitionScheme,
};

/// Order of the new ids inside a rank's range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexOrder {
    /// Highest degree first, ties broken by old id
    #[default]
    DegreeDescending,
    /// Ascending old id
    Id,
}

/// Translation between the caller's vertex ids and the dense ids of the
/// constructed graph.
///
/// The map is distributed the same way as the graph: a rank stores the old
/// ids of the new ids it owns. `to_new`/`to_old` answer for that portion
/// only; the `translate_*` methods are collective and answer for any id.
#[derive(Debug, Clone)]
pub struct RenumberMap {
    partition: VertexPartitionScheme,
    rank: usize,
    /// old ids of this rank's new-id range in new-id order, `None` when the
    /// input ids were used as-is
    labels: Option<IndexSet<VertexID>>,
}

impl RenumberMap {
    /// The map of a graph built without renumbering
    pub fn identity(partition: VertexPartitionScheme, rank: usize) -> Self {
        Self {
            partition,
            rank,
            labels: None,
        }
    }

    fn from_labels(
        partition: VertexPartitionScheme,
        rank: usize,
        labels: IndexSet<VertexID>,
    ) -> Self {
        debug_assert_eq!(partition.count_of(rank), labels.len() as u64);
        Self {
            partition,
            rank,
            labels: Some(labels),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.labels.is_none()
    }

    pub fn partition(&self) -> &VertexPartitionScheme {
        &self.partition
    }

    /// Number of vertices in the whole graph
    pub fn vertex_count(&self) -> u64 {
        self.partition.vertex_count()
    }

    /// New ids whose old id is stored on this rank
    pub fn local_range(&self) -> Range<u64> {
        self.partition.range_of(self.rank)
    }

    pub fn local_len(&self) -> usize {
        (self.local_range().end - self.local_range().start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// New id of `old`, if this rank stores it
    pub fn to_new(&self, old: VertexID) -> Result<VertexID> {
        match &self.labels {
            None if old.0 < self.vertex_count() => Ok(old),
            None => Err(GraphError::InvalidId(old.0)),
            Some(labels) => labels
                .get_index_of(&old)
                .map(|i| VertexID(self.local_range().start + i as u64))
                .ok_or(GraphError::InvalidId(old.0)),
        }
    }

    /// Old id of `new`, if this rank stores it
    pub fn to_old(&self, new: VertexID) -> Result<VertexID> {
        match &self.labels {
            None if new.0 < self.vertex_count() => Ok(new),
            None => Err(GraphError::InvalidId(new.0)),
            Some(labels) => {
                let range = self.local_range();
                if !range.contains(&new.0) {
                    return Err(GraphError::InvalidId(new.0));
                }
                labels
                    .get_index((new.0 - range.start) as usize)
                    .copied()
                    .ok_or(GraphError::InvalidId(new.0))
            }
        }
    }

    /// (old, new) pairs stored on this rank, by ascending new id
    pub fn iter(&self) -> impl Iterator<Item = (VertexID, VertexID)> + '_ {
        let start = self.local_range().start;
        let explicit = self.labels.iter().flat_map(move |labels| {
            labels
                .iter()
                .enumerate()
                .map(move |(i, &old)| (old, VertexID(start + i as u64)))
        });
        let identity = self
            .labels
            .is_none()
            .then(|| self.local_range().map(|v| (VertexID(v), VertexID(v))))
            .into_iter()
            .flatten();
        explicit.chain(identity)
    }

    /// Collective: new id of each `old`, `None` for ids not in the graph.
    /// Every rank must call this, possibly with an empty slice.
    pub fn translate_to_new<C: CommBroker>(
        &self,
        handle: &Handle<C>,
        old: &[VertexID],
    ) -> Result<Vec<Option<VertexID>>> {
        if self.labels.is_none() {
            return Ok(old.iter().map(|&v| self.to_new(v).ok()).collect());
        }

        let size = handle.size();
        // the assigning rank is also the rank storing the old id
        self.translate(
            handle,
            old,
            |v| Ok(canonical_owner(*v, size)),
            |v| self.to_new(v).ok(),
        )
    }

    /// Collective: old id of each `new`, `None` for ids outside `[0, V)`.
    /// Every rank must call this, possibly with an empty slice.
    pub fn translate_to_old<C: CommBroker>(
        &self,
        handle: &Handle<C>,
        new: &[VertexID],
    ) -> Result<Vec<Option<VertexID>>> {
        if self.labels.is_none() {
            return Ok(new.iter().map(|&v| self.to_old(v).ok()).collect());
        }

        // out of range ids are asked of ourselves and come back missing
        let rank = self.rank;
        self.translate(
            handle,
            new,
            |v| Ok(self.partition.owner_of(*v).unwrap_or(rank)),
            |v| self.to_old(v).ok(),
        )
    }

    fn translate<C, R, A>(
        &self,
        handle: &Handle<C>,
        ids: &[VertexID],
        route: R,
        answer: A,
    ) -> Result<Vec<Option<VertexID>>>
    where
        C: CommBroker,
        R: Fn(&VertexID) -> Result<usize>,
        A: Fn(VertexID) -> Option<VertexID>,
    {
        // remember where each id went so answers can be put back in input order
        let positions: Vec<u64> = (0..ids.len() as u64).collect();
        let (order, send_counts) = partition_by_rank(&positions, handle.size(), |&i| {
            route(&ids[i as usize])
        })?;
        let send: Vec<VertexID> = order.iter().map(|&i| ids[i as usize]).collect();

        let requests = exchange_grouped(handle, &send, &send_counts)?;
        let answers: Vec<LookupReply> = requests
            .data
            .iter()
            .map(|&v| answer(v).map_or_else(LookupReply::missing, LookupReply::found))
            .collect();
        let replies = reply(handle, &answers, &requests.counts, &send_counts)?;

        let mut translated = vec![None; ids.len()];
        for (&i, r) in order.iter().zip(&replies) {
            translated[i as usize] = r.get();
        }
        Ok(translated)
    }

    /// Collective: a copy of the whole map on every rank
    pub fn replicate<C: CommBroker>(&self, handle: &Handle<C>) -> Result<RenumberMap> {
        let whole = VertexPartitionScheme::from_counts(&[self.vertex_count()]);

        let Some(labels) = &self.labels else {
            return Ok(RenumberMap::identity(whole, 0));
        };

        let size = handle.size();
        let local: Vec<VertexID> = labels.iter().copied().collect();
        let mut send = handle.reserve::<VertexID>(local.len() * size)?;
        for _ in 0..size {
            send.extend_from_slice(&local);
        }
        let send_counts = vec![local.len() as Count; size];

        // ranks are visited in order, so the concatenation is ordered by new id
        let received = exchange_grouped(handle, &send, &send_counts)?;
        let labels: IndexSet<VertexID> = received.data.into_iter().collect();

        Ok(RenumberMap::from_labels(whole, 0, labels))
    }
}

/// Sort by vertex and add up the degrees of equal vertices
fn merge_degrees<C: CommBroker>(
    handle: &Handle<C>,
    mut entries: Vec<VertexDegree>,
) -> Vec<VertexDegree> {
    handle.install(|| entries.par_sort_unstable_by_key(|e| e.vertex));

    entries
        .chunk_by(|a, b| a.vertex == b.vertex)
        .map(|group| VertexDegree {
            vertex: group[0].vertex,
            degree: group.iter().map(|e| e.degree).sum(),
        })
        .collect()
}

/// Distinct vertices referenced by `edges` or listed in `vertices`, with the
/// number of local edges each is the major endpoint of
fn local_vertex_degrees<C: CommBroker>(
    handle: &Handle<C>,
    edges: &[EdgeRecord],
    vertices: &[VertexID],
    transposed: bool,
) -> Result<Vec<VertexDegree>> {
    let mut entries = handle.reserve::<VertexDegree>(2 * edges.len() + vertices.len())?;
    for edge in edges {
        entries.push(VertexDegree {
            vertex: edge.major(transposed),
            degree: 1,
        });
        entries.push(VertexDegree {
            vertex: edge.minor(transposed),
            degree: 0,
        });
    }
    entries.extend(vertices.iter().map(|v| VertexDegree {
        vertex: v.0,
        degree: 0,
    }));

    Ok(merge_degrees(handle, entries))
}

/// Assign dense ids to every vertex of the distributed edge set and rewrite
/// `edges` in place.
///
/// Each distinct id is owned by `canonical_owner(id, R)`, which sums its
/// degree and assigns it a slot in a contiguous range. The ranges follow rank
/// order, their sizes being the number of ids each rank owns. Returns the
/// renumber map; its partition is the vertex partition of the graph.
pub fn renumber<C: CommBroker>(
    handle: &Handle<C>,
    edges: &mut [EdgeRecord],
    vertices: &[VertexID],
    order: VertexOrder,
    transposed: bool,
) -> Result<RenumberMap> {
    info!(
        "Renumbering {} local edges and {} listed vertices",
        edges.len(),
        vertices.len()
    );
    let comm = handle.comm();
    let size = handle.size();
    let rank = handle.rank();

    // 1. local distinct vertices with local degree
    let local = local_vertex_degrees(handle, edges, vertices, transposed)?;
    debug!("{} distinct local vertices", local.len());

    // 2. every distinct id meets its canonical owner
    let received = shuffle_values(handle, &local, |e| {
        Ok(canonical_owner(VertexID(e.vertex), size))
    })?;

    // 3. global degree per owned id, then the order of the new ids
    let mut owned = merge_degrees(handle, received.data);
    if order == VertexOrder::DegreeDescending {
        handle.install(|| {
            owned.par_sort_unstable_by_key(|e| (Reverse(e.degree), e.vertex))
        });
    }

    // 4. contiguous ranges in rank order
    let counts = comm.all_gather(&(owned.len() as u64))?;
    let partition = VertexPartitionScheme::from_counts(&counts);
    let base = partition.range_of(rank).start;
    info!(
        "Assigned ids {:?} of {} vertices",
        partition.range_of(rank),
        partition.vertex_count()
    );

    let labels: IndexSet<VertexID> = owned.iter().map(|e| VertexID(e.vertex)).collect();
    let map = RenumberMap::from_labels(partition, rank, labels);

    // 5. ask the owners for the new id of every referenced endpoint
    let referenced: Vec<VertexID> = local.iter().map(|e| VertexID(e.vertex)).collect();
    let (requested, send_counts) = partition_by_rank(&referenced, size, |v| {
        Ok(canonical_owner(*v, size))
    })?;
    let requests = exchange_grouped(handle, &requested, &send_counts)?;

    let answers = requests
        .data
        .iter()
        .map(|&old| {
            map.to_new(old)
                .map(|new| new.0)
                .map_err(|_| GraphError::divergent(format!("owner of vertex {}", old)))
        })
        .collect::<Result<Vec<u64>>>()?;
    let new_ids = reply(handle, &answers, &requests.counts, &send_counts)?;

    let lookup: IndexMap<u64, u64> = requested
        .iter()
        .zip(new_ids)
        .map(|(old, new)| (old.0, new))
        .collect();
    debug!("Resolved {} endpoints", lookup.len());

    for edge in edges.iter_mut() {
        edge.src = lookup[&edge.src];
        edge.dst = lookup[&edge.dst];
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, ThreadCluster};

    fn records(edges: &[(u64, u64)], rank: usize) -> Vec<EdgeRecord> {
        edges
            .iter()
            .enumerate()
            .map(|(seq, &e)| EdgeRecord::from_edge(&Edge::from(e), rank, seq as u64))
            .collect()
    }

    #[test]
    fn test_merge_degrees_sums_equal_vertices() {
        let merged = ThreadCluster::run(1, |comm| {
            let handle = Handle::new(&comm);
            let entries = vec![
                VertexDegree { vertex: 9, degree: 1 },
                VertexDegree { vertex: 4, degree: 0 },
                VertexDegree { vertex: 9, degree: 2 },
            ];
            merge_degrees(&handle, entries)
        })
        .remove(0);

        assert_eq!(
            merged,
            vec![
                VertexDegree { vertex: 4, degree: 0 },
                VertexDegree { vertex: 9, degree: 3 },
            ]
        );
    }

    #[test]
    fn test_single_rank_orders_by_degree() {
        let (edges, map) = ThreadCluster::run(1, |comm| {
            let handle = Handle::new(&comm);
            let mut edges = records(&[(100, 7), (100, 300), (300, 7), (100, 5)], 0);
            let listed = [VertexID(42)];
            let order = VertexOrder::DegreeDescending;
            let map = renumber(&handle, &mut edges, &listed, order, false).unwrap();
            (edges, map)
        })
        .remove(0);

        // 100 has three edges, 300 one, the rest none
        let olds: Vec<u64> = map.iter().map(|(old, _)| old.0).collect();
        assert_eq!(olds, vec![100, 300, 5, 7, 42]);

        let rewritten: Vec<(u64, u64)> = edges.iter().map(|e| (e.src, e.dst)).collect();
        assert_eq!(rewritten, vec![(0, 3), (0, 1), (1, 3), (0, 2)]);
    }

    #[test]
    fn test_ids_are_contiguous_per_rank() {
        let results = ThreadCluster::run(3, |comm| {
            let handle = Handle::new(&comm);
            let rank = comm.rank() as u64;
            let pairs = [(rank * 10, rank * 10 + 1), (rank * 10 + 1, 1000)];
            let mut edges = records(&pairs, comm.rank());
            let map = renumber(&handle, &mut edges, &[], VertexOrder::Id, false).unwrap();
            (map, edges)
        });

        let partition = results[0].0.partition().clone();
        assert_eq!(partition.vertex_count(), 7);

        for (rank, (map, edges)) in results.iter().enumerate() {
            assert_eq!(map.partition(), &partition);
            assert_eq!(map.local_range(), partition.range_of(rank));
            assert!(edges
                .iter()
                .all(|e| e.src < partition.vertex_count() && e.dst < partition.vertex_count()));
        }
    }
}
