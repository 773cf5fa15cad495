use log::{debug, info, warn};
use rayon::slice::ParallelSliceMut;

use super::dedup::{process_local_edges, remove_self_loops};
use super::renumber::renumber;
use super::shuffle::{shuffle_edges, shuffle_values, ShuffleKey};
use super::{
    canonical_owner, CommBroker, Edge, EdgeRecord, GraphError, GraphOptions, GraphView, Handle,
    RenumberMap, Result, VertexID, VertexPartitionScheme,
};

/// Result of [`construct_graph`] on one rank
#[derive(Debug, Clone)]
pub struct ConstructedGraph {
    /// This rank's adjacency, in the new numbering
    pub view: GraphView,
    /// Old ids of this rank's vertices
    pub renumber_map: RenumberMap,
    /// Vertex ownership shared by `view` and `renumber_map`
    pub partition: VertexPartitionScheme,
}

/// Build one distributed graph out of the edges every rank holds.
///
/// Collective: every rank of `handle`'s communicator must call it with the
/// same `options`. `edges` and `vertices` are this rank's share of the
/// input and may be empty; listed vertices become part of the graph even
/// without edges.
///
/// Input ids out of the declared vertex count and non-finite weights are
/// rejected locally before any communication. Without
/// `do_expensive_check` the rejecting rank leaves the collective sequence,
/// which its peers observe as a [`GraphError::ProtocolViolation`].
pub fn construct_graph<C: CommBroker>(
    handle: &Handle<C>,
    edges: &[Edge],
    vertices: Option<&[VertexID]>,
    options: &GraphOptions,
) -> Result<ConstructedGraph> {
    let rank = handle.rank();
    let vertices = vertices.unwrap_or(&[]);
    info!(
        "Constructing graph from {} local edges and {} listed vertices",
        edges.len(),
        vertices.len()
    );
    debug!("{:?}", options);

    let validation = validate_local(edges, vertices, options);
    if options.do_expensive_check {
        check_options_agree(handle, options)?;
        agree(handle, validation)?;
        agree(handle, check_vertex_list(handle, edges, vertices)?)?;
    } else {
        validation?;
    }

    let mut records = handle.reserve::<EdgeRecord>(edges.len())?;
    records.extend(
        edges
            .iter()
            .enumerate()
            .map(|(seq, edge)| EdgeRecord::from_edge(edge, rank, seq as u64)),
    );
    if options.remove_self_loops {
        remove_self_loops(&mut records);
    }

    let transposed = options.store_transposed;
    let constructed = if options.renumber {
        build_renumbered(handle, records, vertices, options)?
    } else {
        build_identity(handle, records, vertices, options)?
    };

    if options.do_expensive_check {
        let counts = handle
            .comm()
            .all_gather(&constructed.partition.vertex_count())?;
        if counts.iter().any(|&c| c != counts[0]) {
            return Err(GraphError::divergent("the number of vertices"));
        }
    }

    info!(
        "Graph has {} vertices and {} edges ({} local edges{})",
        constructed.view.global_vertex_count(),
        constructed.view.global_edge_count(),
        constructed.view.local_edge_count(),
        if transposed { ", transposed" } else { "" }
    );
    Ok(constructed)
}

/// Dedupe and symmetrize on hashed placement, assign dense ids, then move
/// every edge to the owner of its new major endpoint
fn build_renumbered<C: CommBroker>(
    handle: &Handle<C>,
    records: Vec<EdgeRecord>,
    vertices: &[VertexID],
    options: &GraphOptions,
) -> Result<ConstructedGraph> {
    let transposed = options.store_transposed;
    let key = match options.symmetrize {
        true => ShuffleKey::UndirectedPair,
        false => ShuffleKey::Hashed { transposed },
    };

    let received = shuffle_edges(handle, &records, key)?;
    drop(records);
    let mut edges = process_local_edges(
        handle,
        received,
        options.dedupe_policy,
        false,
        options.symmetrize,
    );

    let renumber_map = renumber(handle, &mut edges, vertices, options.vertex_order, transposed)?;
    let partition = renumber_map.partition().clone();

    let key = ShuffleKey::Major {
        scheme: &partition,
        transposed,
    };
    let edges = shuffle_edges(handle, &edges, key)?;

    let view = GraphView::build(
        handle,
        edges,
        partition.clone(),
        transposed,
        options.segment_edge_budget,
    )?;
    Ok(ConstructedGraph {
        view,
        renumber_map,
        partition,
    })
}

/// Keep the input ids: the vertex space is `[0, V)` split uniformly
fn build_identity<C: CommBroker>(
    handle: &Handle<C>,
    records: Vec<EdgeRecord>,
    vertices: &[VertexID],
    options: &GraphOptions,
) -> Result<ConstructedGraph> {
    let transposed = options.store_transposed;

    let vertex_count = match options.vertex_count {
        Some(count) => count,
        None => {
            let local = local_vertex_bound(&records, vertices)?;
            handle.comm().all_reduce_max(local)?
        }
    };
    let partition = VertexPartitionScheme::uniform(vertex_count, handle.size());
    debug!("Vertex partition: {:?}", partition.boundaries());

    let owner = ShuffleKey::Major {
        scheme: &partition,
        transposed,
    };

    // parallel edges share their major endpoint, so without symmetrization
    // one shuffle to the final owner is enough
    let edges = if options.symmetrize {
        let received = shuffle_edges(handle, &records, ShuffleKey::UndirectedPair)?;
        drop(records);
        let edges = process_local_edges(handle, received, options.dedupe_policy, false, true);
        shuffle_edges(handle, &edges, owner)?
    } else {
        let received = shuffle_edges(handle, &records, owner)?;
        drop(records);
        process_local_edges(handle, received, options.dedupe_policy, false, false)
    };

    let view = GraphView::build(
        handle,
        edges,
        partition.clone(),
        transposed,
        options.segment_edge_budget,
    )?;
    Ok(ConstructedGraph {
        view,
        renumber_map: RenumberMap::identity(partition.clone(), handle.rank()),
        partition,
    })
}

/// One past the largest id referenced on this rank
fn local_vertex_bound(records: &[EdgeRecord], vertices: &[VertexID]) -> Result<u64> {
    let max = records
        .iter()
        .flat_map(|e| [e.src, e.dst])
        .chain(vertices.iter().map(|v| v.0))
        .max();

    match max {
        None => Ok(0),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| GraphError::InvalidInput(format!("vertex id {} is too large", max))),
    }
}

/// Checks that need no communication
fn validate_local(edges: &[Edge], vertices: &[VertexID], options: &GraphOptions) -> Result<()> {
    if let Some(edge) = edges
        .iter()
        .find(|e| e.weight.is_some_and(|w| !w.is_finite()))
    {
        return Err(GraphError::InvalidInput(format!(
            "edge ({}, {}) has weight {:?}",
            edge.src,
            edge.dst,
            edge.weight
        )));
    }

    if let Some(limit) = options.vertex_count {
        let out_of_range = edges
            .iter()
            .flat_map(|e| [e.src, e.dst])
            .chain(vertices.iter().copied())
            .find(|v| v.0 >= limit);
        if let Some(v) = out_of_range {
            return Err(GraphError::InvalidInput(format!(
                "vertex {} outside of [0, {})",
                v, limit
            )));
        }
    }

    Ok(())
}

/// Collective: fail on every rank if any rank failed.
///
/// A rank that failed returns its own error, the others report which rank
/// rejected its input.
fn agree<C: CommBroker>(handle: &Handle<C>, status: Result<()>) -> Result<()> {
    let failed = handle.comm().all_gather(&(status.is_err() as u8))?;
    status?;

    match failed.iter().position(|&f| f != 0) {
        Some(rank) => Err(GraphError::InvalidInput(format!(
            "rank {} rejected its input",
            rank
        ))),
        None => Ok(()),
    }
}

fn check_options_agree<C: CommBroker>(handle: &Handle<C>, options: &GraphOptions) -> Result<()> {
    let fingerprints = handle.comm().all_gather(&options.fingerprint())?;
    if fingerprints.iter().any(|&f| f != fingerprints[0]) {
        warn!("Construction options differ between ranks: {:x?}", fingerprints);
        return Err(GraphError::divergent("construction options"));
    }
    Ok(())
}

/// Collective: no vertex is listed twice across ranks, and every edge
/// endpoint is listed. Skipped, on every rank, when no rank lists vertices.
///
/// The outer `Result` carries communication failures, the inner one the
/// verdict for this rank's share.
fn check_vertex_list<C: CommBroker>(
    handle: &Handle<C>,
    edges: &[Edge],
    vertices: &[VertexID],
) -> Result<Result<()>> {
    let comm = handle.comm();
    let size = handle.size();

    let listed_anywhere = comm.all_reduce_max(!vertices.is_empty() as u64)? != 0;
    if !listed_anywhere {
        return Ok(Ok(()));
    }
    debug!("Checking the vertex list");

    let route = |v: &VertexID| -> Result<usize> { Ok(canonical_owner(*v, size)) };

    let mut listed = shuffle_values(handle, vertices, route)?.data;
    handle.install(|| listed.par_sort_unstable());

    let mut endpoints: Vec<VertexID> = edges.iter().flat_map(|e| [e.src, e.dst]).collect();
    handle.install(|| endpoints.par_sort_unstable());
    endpoints.dedup();
    let endpoints = shuffle_values(handle, &endpoints, route)?.data;

    if let Some(pair) = listed.windows(2).find(|w| w[0] == w[1]) {
        return Ok(Err(GraphError::InvalidInput(format!(
            "vertex {} is listed more than once",
            pair[0]
        ))));
    }

    if let Some(v) = endpoints.iter().find(|v| listed.binary_search(v).is_err()) {
        return Ok(Err(GraphError::InvalidInput(format!(
            "edge endpoint {} is not in the vertex list",
            v
        ))));
    }

    Ok(Ok(()))
}
