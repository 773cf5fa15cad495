use super::partition::mix64;
use super::{DedupePolicy, VertexOrder};

/// What [`construct_graph`](crate::construct_graph) should do with the input.
///
/// Every rank must pass the same options.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOptions {
    /// Add the reverse of every edge whose reverse is missing
    pub symmetrize: bool,
    /// How parallel edges are combined
    pub dedupe_policy: DedupePolicy,
    /// Assign dense ids; when false, input ids must already be dense
    pub renumber: bool,
    /// Run the collective validation passes
    pub do_expensive_check: bool,
    pub remove_self_loops: bool,
    /// Order of new ids within a rank
    pub vertex_order: VertexOrder,
    /// Group adjacency by destination instead of source
    pub store_transposed: bool,
    /// Declared number of vertices; input ids must be smaller
    pub vertex_count: Option<u64>,
    /// Maximum number of edges per adjacency segment
    pub segment_edge_budget: Option<usize>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            symmetrize: false,
            dedupe_policy: DedupePolicy::None,
            renumber: true,
            do_expensive_check: false,
            remove_self_loops: false,
            vertex_order: VertexOrder::DegreeDescending,
            store_transposed: false,
            vertex_count: None,
            segment_edge_budget: None,
        }
    }
}

impl GraphOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symmetrize(mut self, symmetrize: bool) -> Self {
        self.symmetrize = symmetrize;
        self
    }

    pub fn dedupe_policy(mut self, policy: DedupePolicy) -> Self {
        self.dedupe_policy = policy;
        self
    }

    pub fn renumber(mut self, renumber: bool) -> Self {
        self.renumber = renumber;
        self
    }

    pub fn do_expensive_check(mut self, check: bool) -> Self {
        self.do_expensive_check = check;
        self
    }

    pub fn remove_self_loops(mut self, remove: bool) -> Self {
        self.remove_self_loops = remove;
        self
    }

    pub fn vertex_order(mut self, order: VertexOrder) -> Self {
        self.vertex_order = order;
        self
    }

    pub fn store_transposed(mut self, transposed: bool) -> Self {
        self.store_transposed = transposed;
        self
    }

    pub fn vertex_count(mut self, count: u64) -> Self {
        self.vertex_count = Some(count);
        self
    }

    pub fn segment_edge_budget(mut self, edges: usize) -> Self {
        self.segment_edge_budget = Some(edges);
        self
    }

    /// Digest of every field, compared across ranks by the expensive check
    pub fn fingerprint(&self) -> u64 {
        let fields = [
            self.symmetrize as u64,
            self.dedupe_policy as u64,
            self.renumber as u64,
            self.do_expensive_check as u64,
            self.remove_self_loops as u64,
            self.vertex_order as u64,
            self.store_transposed as u64,
            self.vertex_count.map_or(u64::MAX, |v| v),
            self.segment_edge_budget.map_or(u64::MAX, |b| b as u64),
        ];
        fields
            .iter()
            .fold(0x243f_6a88_85a3_08d3, |acc, &f| mix64(acc ^ f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = GraphOptions::default();
        assert!(options.renumber);
        assert!(!options.symmetrize);
        assert_eq!(options.dedupe_policy, DedupePolicy::None);
        assert_eq!(options.vertex_count, None);
    }

    #[test]
    fn test_builder_sets_fields() {
        let options = GraphOptions::new()
            .symmetrize(true)
            .dedupe_policy(DedupePolicy::Max)
            .vertex_count(12)
            .segment_edge_budget(100);
        assert!(options.symmetrize);
        assert_eq!(options.dedupe_policy, DedupePolicy::Max);
        assert_eq!(options.vertex_count, Some(12));
        assert_eq!(options.segment_edge_budget, Some(100));
    }

    #[test]
    fn test_fingerprint_tracks_every_change() {
        let base = GraphOptions::default();
        let variants = [
            base.clone().symmetrize(true),
            base.clone().dedupe_policy(DedupePolicy::Sum),
            base.clone().dedupe_policy(DedupePolicy::Min),
            base.clone().renumber(false),
            base.clone().remove_self_loops(true),
            base.clone().vertex_order(VertexOrder::Id),
            base.clone().store_transposed(true),
            base.clone().vertex_count(10),
            base.clone().segment_edge_budget(10),
        ];
        for variant in &variants {
            assert_ne!(variant.fingerprint(), base.fingerprint(), "{:?}", variant);
        }
        assert_eq!(base.fingerprint(), GraphOptions::default().fingerprint());
    }
}
