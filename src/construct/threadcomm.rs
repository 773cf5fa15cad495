use std::any::Any;
use std::cell::Cell;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};

use super::{displs_from_counts, Collective, CommBroker, CommError, Count, Payload};

struct Envelope {
    seq: u64,
    kind: Collective,
    payload: Box<dyn Any + Send>,
}

/// In-process communicator: every rank is a thread and every ordered pair of
/// ranks has its own unbounded mailbox, so messages between two ranks arrive
/// in the order they were sent.
pub struct ThreadComm {
    rank: usize,
    /// `outbox[r]` delivers to rank r
    outbox: Vec<Sender<Envelope>>,
    /// `inbox[r]` receives from rank r
    inbox: Vec<Receiver<Envelope>>,
    /// number of collectives issued so far
    seq: Cell<u64>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.outbox.len())
            .field("seq", &self.seq.get())
            .finish()
    }
}

impl ThreadComm {
    fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    /// Send `outgoing[r]` to every rank r and collect what every rank sent to us
    fn exchange<T: Send + 'static>(
        &self,
        kind: Collective,
        outgoing: Vec<T>,
    ) -> Result<Vec<T>, CommError> {
        if outgoing.len() != self.size() {
            return Err(CommError::BufferShape {
                expected: self.size(),
                actual: outgoing.len(),
            });
        }

        let seq = self.next_seq();
        trace!("Collective #{} ({:?}) started", seq, kind);

        for (peer, item) in outgoing.into_iter().enumerate() {
            let envelope = Envelope {
                seq,
                kind,
                payload: Box::new(item),
            };
            self.outbox[peer]
                .send(envelope)
                .map_err(|_| CommError::PeerDisconnected { peer })?;
        }

        self.inbox
            .iter()
            .enumerate()
            .map(|(peer, rx)| {
                let envelope = rx
                    .recv()
                    .map_err(|_| CommError::PeerDisconnected { peer })?;

                if envelope.seq != seq || envelope.kind != kind {
                    return Err(CommError::CollectiveMismatch {
                        peer,
                        expected: kind,
                        expected_seq: seq,
                        found: envelope.kind,
                        found_seq: envelope.seq,
                    });
                }

                envelope
                    .payload
                    .downcast::<T>()
                    .map(|item| *item)
                    .map_err(|_| CommError::PayloadType { peer })
            })
            .collect()
    }
}

impl CommBroker for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbox.len()
    }

    fn all_to_all(&self, send_counts: &[Count]) -> Result<Vec<Count>, CommError> {
        self.exchange(Collective::AllToAll, send_counts.to_vec())
    }

    fn all_to_all_v<T: Payload>(
        &self,
        send: &[T],
        send_counts: &[Count],
        recv: &mut [T],
        recv_counts: &[Count],
    ) -> Result<(), CommError> {
        for counts in [send_counts, recv_counts] {
            if counts.len() != self.size() {
                return Err(CommError::BufferShape {
                    expected: self.size(),
                    actual: counts.len(),
                });
            }
        }

        let chunks = send_counts
            .iter()
            .zip(displs_from_counts(send_counts))
            .map(|(&count, displ)| send[displ as usize..(displ + count) as usize].to_vec())
            .collect();

        let received: Vec<Vec<T>> = self.exchange(Collective::AllToAllV, chunks)?;

        let recv_displs = displs_from_counts(recv_counts);
        for (peer, chunk) in received.into_iter().enumerate() {
            let expected = recv_counts[peer] as usize;
            if chunk.len() != expected {
                return Err(CommError::CountMismatch {
                    peer,
                    expected,
                    actual: chunk.len(),
                });
            }
            let start = recv_displs[peer] as usize;
            recv[start..start + expected].copy_from_slice(&chunk);
        }

        Ok(())
    }

    fn all_gather<T: Payload>(&self, value: &T) -> Result<Vec<T>, CommError> {
        self.exchange(Collective::AllGather, vec![*value; self.size()])
    }
}

/// A group of [`ThreadComm`]s forming one communicator
pub struct ThreadCluster;

impl ThreadCluster {
    /// Create `size` connected communicators, indexed by rank
    pub fn communicators(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a communicator needs at least one rank");

        let mut outboxes: Vec<Vec<Sender<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = unbounded();
                outboxes[src].push(tx);
                inboxes[dst].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| ThreadComm {
                rank,
                outbox,
                inbox,
                seq: Cell::new(0),
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own thread, and return the results
    /// in rank order. The communicator is dropped when `f` returns, so a rank
    /// that bails out early disconnects instead of leaving its peers blocked.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(ThreadComm) -> T + Sync,
    {
        debug!("Spawning {} ranks", size);
        let comms = Self::communicators(size);

        std::thread::scope(|scope| {
            let f = &f;
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        crate::bind_rank(comm.rank());
                        f(comm)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_gather_orders_by_rank() {
        let results = ThreadCluster::run(4, |comm| {
            let value = (comm.rank() * 10) as u64;
            comm.all_gather(&value).unwrap()
        });

        for gathered in results {
            assert_eq!(gathered, vec![0, 10, 20, 30]);
        }
    }

    #[test]
    fn test_all_to_all_transposes_counts() {
        let results = ThreadCluster::run(3, |comm| {
            let rank = comm.rank() as Count;
            let counts: Vec<Count> = (0..3).map(|dst| rank * 10 + dst).collect();
            comm.all_to_all(&counts).unwrap()
        });

        assert_eq!(results[0], vec![0, 10, 20]);
        assert_eq!(results[1], vec![1, 11, 21]);
        assert_eq!(results[2], vec![2, 12, 22]);
    }

    #[test]
    fn test_all_to_all_v_delivers_chunks() {
        let results = ThreadCluster::run(2, |comm| {
            // rank r sends r+1 copies of r to every rank
            let rank = comm.rank() as u64;
            let per_peer = comm.rank() + 1;
            let send = vec![rank; per_peer * 2];
            let send_counts = vec![per_peer as Count; 2];
            let recv_counts = comm.all_to_all(&send_counts).unwrap();
            let mut recv = vec![0u64; recv_counts.iter().sum::<Count>() as usize];
            comm.all_to_all_v(&send, &send_counts, &mut recv, &recv_counts)
                .unwrap();
            recv
        });

        assert_eq!(results[0], vec![0, 1, 1]);
        assert_eq!(results[1], vec![0, 1, 1]);
    }

    #[test]
    fn test_derived_reductions() {
        let results = ThreadCluster::run(3, |comm| {
            let v = comm.rank() as u64 + 1;
            (
                comm.all_reduce_sum(v).unwrap(),
                comm.all_reduce_max(v).unwrap(),
                comm.all_reduce_min(v).unwrap(),
                comm.exclusive_scan(v).unwrap(),
            )
        });

        assert_eq!(results[0], (6, 3, 1, (0, 6)));
        assert_eq!(results[1], (6, 3, 1, (1, 6)));
        assert_eq!(results[2], (6, 3, 1, (3, 6)));
    }

    #[test]
    fn test_mismatched_collectives_are_detected() {
        let results = ThreadCluster::run(2, |comm| {
            if comm.rank() == 0 {
                comm.all_gather(&1u64).map(|_| ())
            } else {
                comm.all_to_all(&[0, 0]).map(|_| ())
            }
        });

        for result in results {
            assert!(matches!(
                result,
                Err(CommError::CollectiveMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_departed_peer_disconnects() {
        let results = ThreadCluster::run(2, |comm| {
            if comm.rank() == 0 {
                return Ok(());
            }
            comm.barrier()
        });

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(CommError::PeerDisconnected { peer: 0 })
        ));
    }

    #[test]
    fn test_single_rank_is_its_own_peer() {
        let results = ThreadCluster::run(1, |comm| {
            let counts = comm.all_to_all(&[3]).unwrap();
            let mut recv = [0u64; 3];
            comm.all_to_all_v(&[7, 8, 9], &[3], &mut recv, &counts)
                .unwrap();
            recv
        });
        assert_eq!(results, vec![[7, 8, 9]]);
    }
}
