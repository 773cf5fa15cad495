use std::ops::Range;

use log::{debug, error, info, trace};
use petgraph::{csr::Csr, Directed};

use super::dedup::sort_edges;
use super::shuffle::{shuffle_edges, ShuffleKey};
use super::{
    CommBroker, Edge, EdgeRecord, GraphError, Handle, Result, VertexID, VertexPartitionScheme,
};

/// One stored edge: the minor endpoint and the optional attributes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoredEdge {
    pub target: VertexID,
    pub weight: Option<f64>,
    pub id: Option<u64>,
    pub kind: Option<i32>,
}

impl StoredEdge {
    fn from_record(edge: &EdgeRecord, transposed: bool) -> Self {
        Self {
            target: VertexID(edge.minor(transposed)),
            weight: edge.weight(),
            id: edge.edge_id(),
            kind: edge.edge_type(),
        }
    }
}

/// Rows are the segment's vertices. The column of an edge is its slot within
/// the row, so parallel edges stay distinct and the row array is bounded by
/// the local sizes instead of the global vertex count.
pub type SegmentCsr = Csr<(), StoredEdge, Directed, usize>;

/// Compressed adjacency of a consecutive run of a rank's vertices
#[derive(Debug, Clone)]
pub struct Segment {
    /// first (renumbered) vertex covered by this segment
    first_vertex: u64,
    vertex_count: usize,
    csr: SegmentCsr,
    has_weights: bool,
}

impl Segment {
    pub fn vertex_range(&self) -> Range<u64> {
        self.first_vertex..self.first_vertex + self.vertex_count as u64
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn edge_count(&self) -> usize {
        self.csr.edge_count()
    }

    /// Whether any edge of the segment carries a weight
    pub fn has_weights(&self) -> bool {
        self.has_weights
    }

    pub fn csr(&self) -> &SegmentCsr {
        &self.csr
    }

    /// Edges of the `row`-th vertex of the segment, ordered by minor endpoint
    pub fn row(&self, row: usize) -> &[StoredEdge] {
        if row < self.vertex_count {
            self.csr.edges_slice(row)
        } else {
            &[]
        }
    }

    /// Build from edges sorted by major endpoint, all inside `vertices`
    fn build<C: CommBroker>(
        handle: &Handle<C>,
        vertices: Range<u64>,
        edges: &[EdgeRecord],
        transposed: bool,
    ) -> Result<Self> {
        let vertex_count = (vertices.end - vertices.start) as usize;

        let mut sorted = handle.reserve::<(usize, usize, StoredEdge)>(edges.len())?;
        for run in edges.chunk_by(|a, b| a.major(transposed) == b.major(transposed)) {
            let row = (run[0].major(transposed) - vertices.start) as usize;
            sorted.extend(
                run.iter()
                    .enumerate()
                    .map(|(slot, e)| (row, slot, StoredEdge::from_record(e, transposed))),
            );
        }

        let mut csr = SegmentCsr::from_sorted_edges(&sorted).map_err(|e| {
            let err = GraphError::InvalidInput(format!(
                "edges of vertices {:?} are not sorted: {:?}",
                vertices, e
            ));
            error!("{}", err);
            err
        })?;
        drop(sorted);

        // vertices past the last one with an edge get empty rows
        while csr.node_count() < vertex_count {
            csr.add_node(());
        }
        trace!(
            "Built CSR with {} rows and {} edges",
            csr.node_count(),
            csr.edge_count()
        );

        Ok(Self {
            first_vertex: vertices.start,
            vertex_count,
            csr,
            has_weights: edges.iter().any(|e| e.weight().is_some()),
        })
    }
}

/// A rank's share of the constructed graph, in compressed adjacency form.
///
/// Holds the edges whose major endpoint (source, or destination when stored
/// transposed) falls in this rank's vertex range. Read-only once built;
/// transformations produce a new view.
#[derive(Debug, Clone)]
pub struct GraphView {
    rank: usize,
    partition: VertexPartitionScheme,
    transposed: bool,
    segments: Vec<Segment>,
    segment_edge_budget: Option<usize>,
    global_edge_count: u64,
}

impl GraphView {
    /// Build this rank's view from edges already shuffled to their owner.
    ///
    /// With `segment_edge_budget`, the local range is cut into segments of at
    /// most that many edges; the edges of one vertex are never split, so a
    /// vertex with more edges gets a segment of its own.
    pub(crate) fn build<C: CommBroker>(
        handle: &Handle<C>,
        mut edges: Vec<EdgeRecord>,
        partition: VertexPartitionScheme,
        transposed: bool,
        segment_edge_budget: Option<usize>,
    ) -> Result<Self> {
        let rank = handle.rank();
        let local = partition.range_of(rank);
        info!(
            "Building adjacency for vertices {:?} from {} edges",
            local,
            edges.len()
        );

        if let Some(stray) = edges
            .iter()
            .find(|e| !local.contains(&e.major(transposed)))
        {
            return Err(GraphError::divergent(format!(
                "ownership of vertex {}",
                stray.major(transposed)
            )));
        }

        sort_edges(handle, &mut edges, transposed);

        let global_edge_count = handle.comm().all_reduce_sum(edges.len() as u64)?;
        debug!("Global edge count: {}", global_edge_count);

        let segments = match segment_edge_budget {
            None => vec![Segment::build(handle, local, &edges, transposed)?],
            Some(budget) => Self::build_segments(handle, local, &edges, transposed, budget)?,
        };
        debug!("Built {} segments", segments.len());

        Ok(Self {
            rank,
            partition,
            transposed,
            segments,
            segment_edge_budget,
            global_edge_count,
        })
    }

    fn build_segments<C: CommBroker>(
        handle: &Handle<C>,
        local: Range<u64>,
        edges: &[EdgeRecord],
        transposed: bool,
        budget: usize,
    ) -> Result<Vec<Segment>> {
        let budget = budget.max(1);
        let mut segments = Vec::new();
        let mut seg_start_vertex = local.start;
        let mut seg_start_edge = 0;
        let mut pos = 0;

        for v in local.clone() {
            let degree = edges[pos..]
                .iter()
                .take_while(|e| e.major(transposed) == v)
                .count();
            let seg_edges = pos - seg_start_edge;

            if seg_start_vertex < v && seg_edges + degree > budget {
                trace!("Segment {}..{} holds {} edges", seg_start_vertex, v, seg_edges);
                segments.push(Segment::build(
                    handle,
                    seg_start_vertex..v,
                    &edges[seg_start_edge..pos],
                    transposed,
                )?);
                seg_start_vertex = v;
                seg_start_edge = pos;
            }
            pos += degree;
        }

        segments.push(Segment::build(
            handle,
            seg_start_vertex..local.end,
            &edges[seg_start_edge..],
            transposed,
        )?);
        Ok(segments)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn partition(&self) -> &VertexPartitionScheme {
        &self.partition
    }

    /// Whether adjacency is grouped by destination rather than source
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn vertex_range(&self) -> Range<u64> {
        self.partition.range_of(self.rank)
    }

    pub fn local_vertex_count(&self) -> usize {
        let range = self.vertex_range();
        (range.end - range.start) as usize
    }

    pub fn global_vertex_count(&self) -> u64 {
        self.partition.vertex_count()
    }

    pub fn local_edge_count(&self) -> usize {
        self.segments.iter().map(Segment::edge_count).sum()
    }

    pub fn global_edge_count(&self) -> u64 {
        self.global_edge_count
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_local_vertex(&self, vertex: VertexID) -> bool {
        self.vertex_range().contains(&vertex.0)
    }

    pub fn owner_of_vertex(&self, vertex: VertexID) -> Option<usize> {
        self.partition.owner_of(vertex)
    }

    /// Segment holding the `local`-th vertex of this rank, and its row there
    pub fn locate(&self, local: usize) -> Option<(&Segment, usize)> {
        let first = self.vertex_range().start + local as u64;
        let idx = self
            .segments
            .partition_point(|s| s.first_vertex <= first)
            .checked_sub(1)?;
        let segment = &self.segments[idx];
        let row = (first - segment.first_vertex) as usize;
        (row < segment.vertex_count()).then_some((segment, row))
    }

    /// Stored edges of the `local`-th vertex of this rank, together with the
    /// segment holding them
    pub fn neighbor_slice(&self, local: usize) -> Option<(&Segment, &[StoredEdge])> {
        self.locate(local)
            .map(|(segment, row)| (segment, segment.row(row)))
    }

    /// Neighbors of a local vertex with the weight of the connecting edge;
    /// empty for vertices owned by another rank
    pub fn neighbors(
        &self,
        vertex: VertexID,
    ) -> impl Iterator<Item = (VertexID, Option<f64>)> + '_ {
        trace!("Getting neighbors for vertex {:?}", vertex);
        self.adjacency(vertex).iter().map(|e| (e.target, e.weight))
    }

    /// Full edges (endpoints in original orientation) incident to a local vertex
    pub fn edges_of(&self, vertex: VertexID) -> impl Iterator<Item = Edge> + '_ {
        self.adjacency(vertex)
            .iter()
            .map(move |stored| self.to_edge(vertex, stored))
    }

    pub fn degree(&self, vertex: VertexID) -> usize {
        self.adjacency(vertex).len()
    }

    /// Every local edge, grouped by major endpoint
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.vertex_range()
            .flat_map(move |v| self.edges_of(VertexID(v)))
    }

    fn adjacency(&self, vertex: VertexID) -> &[StoredEdge] {
        if !self.is_local_vertex(vertex) {
            return &[];
        }
        let local = (vertex.0 - self.vertex_range().start) as usize;
        match self.neighbor_slice(local) {
            Some((_, edges)) => edges,
            None => &[],
        }
    }

    fn to_edge(&self, major: VertexID, stored: &StoredEdge) -> Edge {
        let (src, dst) = if self.transposed {
            (stored.target, major)
        } else {
            (major, stored.target)
        };
        Edge {
            src,
            dst,
            weight: stored.weight,
            id: stored.id,
            kind: stored.kind,
        }
    }

    /// Collective: the view of the graph with every edge reversed, partitioned
    /// and oriented like this one
    pub fn transpose<C: CommBroker>(&self, handle: &Handle<C>) -> Result<GraphView> {
        info!("Transposing {} local edges", self.local_edge_count());
        let rank = handle.rank();

        let reversed: Vec<EdgeRecord> = self
            .edges()
            .enumerate()
            .map(|(seq, edge)| EdgeRecord::from_edge(&edge.reversed(), rank, seq as u64))
            .collect();

        let key = ShuffleKey::Major {
            scheme: &self.partition,
            transposed: self.transposed,
        };
        let edges = shuffle_edges(handle, &reversed, key)?;

        GraphView::build(
            handle,
            edges,
            self.partition.clone(),
            self.transposed,
            self.segment_edge_budget,
        )
    }
}
