use std::ops::Range;

use super::VertexID;

/// Assignment of a dense vertex id space `[0, V)` to ranks as contiguous ranges.
///
/// Stored as a prefix sum of per-rank counts, `boundaries[r]..boundaries[r + 1]`
/// being the range owned by rank r. Every rank computes the same table from the
/// same agreed input, so ownership queries never need communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexPartitionScheme {
    boundaries: Vec<u64>,
}

impl VertexPartitionScheme {
    /// Near-equal ranges: the first `vertex_count % ranks` ranks get one
    /// extra vertex.
    pub fn uniform(vertex_count: u64, ranks: usize) -> Self {
        assert!(ranks > 0, "a partition needs at least one rank");

        let size = ranks as u64;
        let per_rank = vertex_count / size;
        let leftover = vertex_count % size;

        let boundaries = (0..=size)
            .map(|rank| rank * per_rank + std::cmp::min(rank, leftover))
            .collect();

        Self { boundaries }
    }

    /// Ranges sized by an explicit per-rank vertex count
    pub fn from_counts(counts: &[u64]) -> Self {
        assert!(!counts.is_empty(), "a partition needs at least one rank");

        let mut boundaries = Vec::with_capacity(counts.len() + 1);
        boundaries.push(0);
        boundaries.extend(counts.iter().scan(0u64, |acc, &count| {
            *acc += count;
            Some(*acc)
        }));

        Self { boundaries }
    }

    /// Number of vertices in the whole graph
    pub fn vertex_count(&self) -> u64 {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn rank_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// Range of ids owned by `rank`
    pub fn range_of(&self, rank: usize) -> Range<u64> {
        self.boundaries[rank]..self.boundaries[rank + 1]
    }

    pub fn count_of(&self, rank: usize) -> u64 {
        self.boundaries[rank + 1] - self.boundaries[rank]
    }

    pub fn counts(&self) -> Vec<u64> {
        self.boundaries.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.boundaries.windows(2).map(|w| w[0]..w[1])
    }

    /// Owner of `vertex`, `None` if it lies outside `[0, V)`
    pub fn owner_of(&self, vertex: VertexID) -> Option<usize> {
        if vertex.0 >= self.vertex_count() {
            return None;
        }
        // last boundary <= vertex; empty ranks share a boundary with their successor
        Some(self.boundaries.partition_point(|&b| b <= vertex.0) - 1)
    }

    pub fn is_owned_by(&self, vertex: VertexID, rank: usize) -> bool {
        self.range_of(rank).contains(&vertex.0)
    }

    /// Owning rank and position of `vertex` inside that rank's range
    pub fn local_offset(&self, vertex: VertexID) -> Option<(usize, u64)> {
        self.owner_of(vertex)
            .map(|rank| (rank, vertex.0 - self.boundaries[rank]))
    }

    pub fn max_count(&self) -> u64 {
        self.boundaries
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }
}

/// Mixes the bits of a 64 bit key (splitmix64 finalizer)
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Rank responsible for assigning the new id of `vertex`.
///
/// A pure function of the id and the rank count, so that every rank routes a
/// given id to the same place.
#[inline]
pub fn canonical_owner(vertex: VertexID, size: usize) -> usize {
    (mix64(vertex.0) % size as u64) as usize
}
