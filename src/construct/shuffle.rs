use log::{debug, info, trace};

use super::{
    canonical_owner, mix64, CommBroker, Count, EdgeRecord, GraphError, Handle, Payload, Result,
    VertexID, VertexPartitionScheme,
};

/// How an edge is mapped to the rank that receives it
#[derive(Debug, Clone, Copy)]
pub enum ShuffleKey<'p> {
    /// Owner of the major endpoint under a vertex partition
    Major {
        scheme: &'p VertexPartitionScheme,
        transposed: bool,
    },
    /// Hash of the major endpoint, for ids that are not dense yet
    Hashed { transposed: bool },
    /// Hash of the smaller endpoint, so an edge and its reverse meet on one rank
    UndirectedPair,
}

impl ShuffleKey<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ShuffleKey::Major { .. } => "vertex owner",
            ShuffleKey::Hashed { .. } => "hashed major vertex",
            ShuffleKey::UndirectedPair => "undirected pair",
        }
    }

    pub fn destination(&self, edge: &EdgeRecord, size: usize) -> Result<usize> {
        match *self {
            ShuffleKey::Major { scheme, transposed } => {
                let major = VertexID(edge.major(transposed));
                scheme.owner_of(major).ok_or_else(|| {
                    GraphError::InvalidInput(format!(
                        "vertex {} outside of [0, {})",
                        major,
                        scheme.vertex_count()
                    ))
                })
            }
            ShuffleKey::Hashed { transposed } => {
                Ok(canonical_owner(VertexID(edge.major(transposed)), size))
            }
            ShuffleKey::UndirectedPair => {
                let key = std::cmp::min(edge.src, edge.dst);
                Ok((mix64(key ^ 0x5bd1_e995) % size as u64) as usize)
            }
        }
    }
}

/// Data received from a shuffle along with how much came from each rank
#[derive(Debug, Default)]
pub struct Shuffled<T> {
    pub data: Vec<T>,
    pub counts: Vec<Count>,
}

/// Group `items` by destination rank. Relative order within a destination is
/// preserved; returns the grouped buffer and the per-rank counts.
pub(crate) fn partition_by_rank<T, F>(
    items: &[T],
    size: usize,
    destination: F,
) -> Result<(Vec<T>, Vec<Count>)>
where
    T: Copy + Default,
    F: Fn(&T) -> Result<usize>,
{
    debug!("Partitioning {} items over {} ranks", items.len(), size);

    let dests = items
        .iter()
        .map(&destination)
        .collect::<Result<Vec<usize>>>()?;

    let mut counts = vec![0usize; size];
    for &dest in &dests {
        counts[dest] += 1;
    }

    // exclusive prefix sum gives each rank's first slot
    let mut cursor: Vec<usize> = counts
        .iter()
        .scan(0, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect();

    let mut buf = vec![T::default(); items.len()];
    for (item, &dest) in items.iter().zip(&dests) {
        buf[cursor[dest]] = *item;
        cursor[dest] += 1;
    }

    let counts = counts
        .into_iter()
        .map(to_count)
        .collect::<Result<Vec<Count>>>()?;
    trace!("Partition counts: {:?}", counts);

    Ok((buf, counts))
}

fn to_count(n: usize) -> Result<Count> {
    Count::try_from(n).map_err(|_| GraphError::ResourceExhaustion {
        requested: n,
        available: Count::MAX as usize,
    })
}

fn total(counts: &[Count]) -> usize {
    counts.iter().map(|&c| c as usize).sum()
}

/// Exchange an already rank-grouped buffer: one all-to-all for the counts,
/// one all-to-all-v for the data.
pub fn exchange_grouped<T: Payload, C: CommBroker>(
    handle: &Handle<C>,
    send: &[T],
    send_counts: &[Count],
) -> Result<Shuffled<T>> {
    let comm = handle.comm();

    let recv_counts = comm.all_to_all(send_counts)?;
    debug!("Received counts: {:?}", recv_counts);

    let mut recv = handle.allocate::<T>(total(&recv_counts))?;
    comm.all_to_all_v(send, send_counts, &mut recv, &recv_counts)?;

    Ok(Shuffled {
        data: recv,
        counts: recv_counts,
    })
}

/// Send every item to the rank chosen by `destination`
pub fn shuffle_values<T, C, F>(
    handle: &Handle<C>,
    items: &[T],
    destination: F,
) -> Result<Shuffled<T>>
where
    T: Payload,
    C: CommBroker,
    F: Fn(&T) -> Result<usize>,
{
    let (send, send_counts) = partition_by_rank(items, handle.size(), destination)?;
    exchange_grouped(handle, &send, &send_counts)
}

/// Return one answer per request to the rank the request came from.
///
/// `answers` is aligned with the data of a [`Shuffled`] request buffer and
/// `request_counts` are that buffer's counts. `expected` are the counts the
/// requesting rank originally sent, which is exactly what comes back.
pub fn reply<T: Payload, C: CommBroker>(
    handle: &Handle<C>,
    answers: &[T],
    request_counts: &[Count],
    expected: &[Count],
) -> Result<Vec<T>> {
    let mut recv = handle.allocate::<T>(total(expected))?;
    handle
        .comm()
        .all_to_all_v(answers, request_counts, &mut recv, expected)?;
    Ok(recv)
}

/// Redistribute edges so that every edge lands on the rank `key` maps it to.
///
/// Ordering is not preserved across ranks and duplicates are kept.
pub fn shuffle_edges<C: CommBroker>(
    handle: &Handle<C>,
    edges: &[EdgeRecord],
    key: ShuffleKey,
) -> Result<Vec<EdgeRecord>> {
    info!("Shuffling {} edges by {}", edges.len(), key.name());
    let size = handle.size();
    let shuffled = shuffle_values(handle, edges, |e| key.destination(e, size))?;
    debug!("Received {} edges", shuffled.data.len());
    Ok(shuffled.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, ThreadCluster};

    fn record(src: u64, dst: u64, seq: u64) -> EdgeRecord {
        EdgeRecord::from_edge(&Edge::from((src, dst, 1.0)), 0, seq)
    }

    #[test]
    fn test_partition_single_edge() {
        let scheme = VertexPartitionScheme::uniform(2, 2);
        let key = ShuffleKey::Major {
            scheme: &scheme,
            transposed: false,
        };
        let edges = vec![record(1, 0, 0)];

        let (buf, counts) = partition_by_rank(&edges, 2, |e| key.destination(e, 2)).unwrap();

        assert_eq!(buf, edges);
        assert_eq!(counts, vec![0, 1]);
    }

    #[test]
    fn test_partition_edges_different_ranks() {
        let scheme = VertexPartitionScheme::uniform(6, 3);
        let key = ShuffleKey::Major {
            scheme: &scheme,
            transposed: false,
        };
        let edges = vec![
            record(5, 2, 0),
            record(0, 3, 1),
            record(2, 5, 2),
            record(1, 4, 3),
            record(4, 1, 4),
        ];

        let (buf, counts) = partition_by_rank(&edges, 3, |e| key.destination(e, 3)).unwrap();

        // grouped by rank, arrival order kept inside a group
        let pairs: Vec<_> = buf.iter().map(|e| (e.src, e.dst)).collect();
        assert_eq!(pairs, vec![(0, 3), (1, 4), (2, 5), (5, 2), (4, 1)]);
        assert_eq!(counts, vec![2, 1, 2]);
    }

    #[test]
    fn test_partition_transposed_uses_destination() {
        let scheme = VertexPartitionScheme::uniform(4, 2);
        let key = ShuffleKey::Major {
            scheme: &scheme,
            transposed: true,
        };
        let edges = vec![record(0, 3, 0), record(3, 0, 1)];

        let (buf, counts) = partition_by_rank(&edges, 2, |e| key.destination(e, 2)).unwrap();
        assert_eq!(counts, vec![1, 1]);
        assert_eq!((buf[0].src, buf[0].dst), (3, 0));
    }

    #[test]
    fn test_partition_rejects_out_of_range() {
        let scheme = VertexPartitionScheme::uniform(4, 2);
        let key = ShuffleKey::Major {
            scheme: &scheme,
            transposed: false,
        };
        let result = partition_by_rank(&[record(9, 0, 0)], 2, |e| key.destination(e, 2));
        assert!(matches!(result, Err(GraphError::InvalidInput(_))));
    }

    #[test]
    fn test_partition_edges_empty_input() {
        let (buf, counts) =
            partition_by_rank::<EdgeRecord, _>(&[], 2, |_| unreachable!()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(counts, vec![0, 0]);
    }

    #[test]
    fn test_undirected_pair_colocates_reverse() {
        let key = ShuffleKey::UndirectedPair;
        for (u, v) in [(1, 2), (17, 4), (1000, 999_999)] {
            let forward = key.destination(&record(u, v, 0), 5).unwrap();
            let backward = key.destination(&record(v, u, 0), 5).unwrap();
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn test_shuffle_delivers_to_owner() {
        let results = ThreadCluster::run(3, |comm| {
            let handle = Handle::new(&comm);
            let scheme = VertexPartitionScheme::uniform(9, 3);
            let rank = comm.rank() as u64;
            // every rank holds one edge out of each vertex
            let edges: Vec<_> = (0..9).map(|v| record(v, rank, v)).collect();
            let key = ShuffleKey::Major {
                scheme: &scheme,
                transposed: false,
            };
            let received = shuffle_edges(&handle, &edges, key).unwrap();
            (comm.rank(), scheme, received)
        });

        for (rank, scheme, received) in results {
            assert_eq!(received.len(), 9);
            assert!(received
                .iter()
                .all(|e| scheme.is_owned_by(VertexID(e.src), rank)));
        }
    }

    #[test]
    fn test_reply_returns_answers_to_requester() {
        let results = ThreadCluster::run(2, |comm| {
            let handle = Handle::new(&comm);
            let requests: Vec<u64> = vec![10, 11, 12, 13];
            let (send, send_counts) =
                partition_by_rank(&requests, 2, |&v| Ok((v % 2) as usize)).unwrap();
            let received = exchange_grouped(&handle, &send, &send_counts).unwrap();

            let answers: Vec<u64> = received.data.iter().map(|v| v * 100).collect();
            let back = reply(&handle, &answers, &received.counts, &send_counts).unwrap();
            (send, back)
        });

        for (send, back) in results {
            let expected: Vec<u64> = send.iter().map(|v| v * 100).collect();
            assert_eq!(back, expected);
        }
    }
}
