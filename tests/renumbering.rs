use std::collections::BTreeSet;

use distributed_construction::*;

/// Sparse, unordered ids: vertex i of a ring is called `sparse_id(i)`
fn sparse_id(i: u64) -> u64 {
    i.wrapping_mul(1_000_003).wrapping_add(17) ^ 0xdead_beef
}

/// A ring over `n` sparse ids plus a hub connected to every third vertex,
/// dealt round-robin over the ranks
fn ring_with_hub(n: u64, size: usize, rank: usize) -> Vec<Edge> {
    let hub = sparse_id(n);
    (0..n)
        .flat_map(|i| {
            let ring = Edge::new(sparse_id(i), sparse_id((i + 1) % n));
            let spoke = (i % 3 == 0).then(|| Edge::new(hub, sparse_id(i)));
            std::iter::once(ring).chain(spoke)
        })
        .enumerate()
        .filter(|(i, _)| i % size == rank)
        .map(|(_, e)| e)
        .collect()
}

fn all_ids(n: u64) -> BTreeSet<u64> {
    (0..=n).map(sparse_id).collect()
}

#[test]
fn test_renumbering_is_a_bijection() {
    let n = 40;

    let per_rank = ThreadCluster::run(3, |comm| {
        let handle = Handle::new(&comm);
        let edges = ring_with_hub(n, comm.size(), comm.rank());
        let graph = construct_graph(&handle, &edges, None, &GraphOptions::default()).unwrap();
        let map = &graph.renumber_map;

        assert!(!map.is_identity());
        assert_eq!(map.vertex_count(), n + 1);
        assert_eq!(map.local_range(), graph.view.vertex_range());
        assert_eq!(map.local_len(), graph.view.local_vertex_count());

        for (old, new) in map.iter() {
            assert_eq!(map.to_new(old).unwrap(), new);
            assert_eq!(map.to_old(new).unwrap(), old);
        }

        let whole = map.replicate(&handle).unwrap();
        (graph.partition.clone(), whole)
    });

    let partition = &per_rank[0].0;
    assert_eq!(partition.counts().iter().sum::<u64>(), n + 1);

    for (p, whole) in &per_rank {
        assert_eq!(p, partition);
        assert_eq!(whole.local_range(), 0..n + 1);

        let olds: BTreeSet<u64> = (0..n + 1)
            .map(|new| whole.to_old(VertexID(new)).unwrap().0)
            .collect();
        assert_eq!(olds, all_ids(n));

        for new in 0..n + 1 {
            let old = whole.to_old(VertexID(new)).unwrap();
            assert_eq!(whole.to_new(old).unwrap(), VertexID(new));
        }
    }
}

#[test]
fn test_lookup_of_unknown_ids() {
    ThreadCluster::run(2, |comm| {
        let handle = Handle::new(&comm);
        let edges = ring_with_hub(10, comm.size(), comm.rank());
        let graph = construct_graph(&handle, &edges, None, &GraphOptions::default()).unwrap();
        let map = &graph.renumber_map;
        let v = map.vertex_count();

        assert!(matches!(map.to_old(VertexID(v)), Err(GraphError::InvalidId(_))));
        assert!(matches!(map.to_new(VertexID(3)), Err(GraphError::InvalidId(3))));

        // ids of the other rank are not stored here
        let foreign = map.partition().range_of(1 - comm.rank());
        if !foreign.is_empty() {
            assert!(map.to_old(VertexID(foreign.start)).is_err());
        }

        let new = map
            .translate_to_new(&handle, &[VertexID(sparse_id(4)), VertexID(3)])
            .unwrap();
        assert!(new[0].is_some());
        assert_eq!(new[1], None);

        let old = map
            .translate_to_old(&handle, &[new[0].unwrap(), VertexID(v + 5)])
            .unwrap();
        assert_eq!(old, vec![Some(VertexID(sparse_id(4))), None]);
    });
}

#[test]
fn test_degree_descending_order_within_rank() {
    let options = GraphOptions::default().vertex_order(VertexOrder::DegreeDescending);

    ThreadCluster::run(3, |comm| {
        let handle = Handle::new(&comm);
        let edges = ring_with_hub(30, comm.size(), comm.rank());
        let graph = construct_graph(&handle, &edges, None, &options).unwrap();

        let order: Vec<(usize, VertexID)> = graph
            .view
            .vertex_range()
            .map(|new| {
                let new = VertexID(new);
                (graph.view.degree(new), graph.renumber_map.to_old(new).unwrap())
            })
            .collect();

        for pair in order.windows(2) {
            let ((d0, old0), (d1, old1)) = (pair[0], pair[1]);
            assert!(d0 > d1 || (d0 == d1 && old0 < old1), "{:?}", pair);
        }
    });
}

#[test]
fn test_id_order_within_rank() {
    let options = GraphOptions::default().vertex_order(VertexOrder::Id);

    ThreadCluster::run(3, |comm| {
        let handle = Handle::new(&comm);
        let edges = ring_with_hub(30, comm.size(), comm.rank());
        let graph = construct_graph(&handle, &edges, None, &options).unwrap();

        let olds: Vec<VertexID> = graph.renumber_map.iter().map(|(old, _)| old).collect();
        assert!(olds.windows(2).all(|w| w[0] < w[1]));
    });
}

#[test]
fn test_identity_map_without_renumbering() {
    let options = GraphOptions::default().renumber(false).vertex_count(12);

    ThreadCluster::run(2, |comm| {
        let handle = Handle::new(&comm);
        let edges = [Edge::new(0u64, 11u64), Edge::new(5u64, 6u64)];
        let edges: &[Edge] = if comm.rank() == 0 { &edges } else { &[] };
        let graph = construct_graph(&handle, edges, None, &options).unwrap();
        let map = &graph.renumber_map;

        assert!(map.is_identity());
        assert_eq!(map.vertex_count(), 12);
        assert_eq!(map.to_new(VertexID(11)).unwrap(), VertexID(11));
        assert!(map.to_new(VertexID(12)).is_err());
        assert_eq!(
            map.translate_to_old(&handle, &[VertexID(4), VertexID(40)])
                .unwrap(),
            vec![Some(VertexID(4)), None]
        );

        let whole = map.replicate(&handle).unwrap();
        assert_eq!(whole.local_range(), 0..12);
    });
}

#[test]
fn test_largest_id_round_trips() {
    let max = VertexID(u64::MAX);

    ThreadCluster::run(2, |comm| {
        let handle = Handle::new(&comm);
        let edges = [Edge::new(u64::MAX, 1u64)];
        let edges: &[Edge] = if comm.rank() == 0 { &edges } else { &[] };
        let graph = construct_graph(&handle, edges, None, &GraphOptions::default()).unwrap();
        let map = &graph.renumber_map;
        assert_eq!(map.vertex_count(), 2);

        let new = map.translate_to_new(&handle, &[max, VertexID(1)]).unwrap();
        let (Some(new_max), Some(new_one)) = (new[0], new[1]) else {
            panic!("both endpoints must be in the graph: {:?}", new);
        };
        assert_ne!(new_max, new_one);

        let old = map.translate_to_old(&handle, &[new_max, new_one]).unwrap();
        assert_eq!(old, vec![Some(max), Some(VertexID(1))]);

        let whole = map.replicate(&handle).unwrap();
        assert_eq!(whole.to_old(new_max).unwrap(), max);
    });
}
