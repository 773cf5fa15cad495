use log::trace;
use mpi::{
    datatype::{Partition, PartitionMut},
    topology::SimpleCommunicator,
    traits::{Communicator, CommunicatorCollectives},
};

use super::{displs_from_counts, CommBroker, CommError, Count, Payload};

/// [`CommBroker`] over an MPI communicator.
///
/// MPI aborts the job on communication failures, so the only errors
/// reported from here are local buffer shape mistakes.
pub struct MpiComm<'mpi> {
    world: &'mpi SimpleCommunicator,
}

impl<'mpi> MpiComm<'mpi> {
    pub fn new(world: &'mpi SimpleCommunicator) -> Self {
        Self { world }
    }

    fn check_shape(&self, counts: &[Count]) -> Result<(), CommError> {
        if counts.len() != self.size() {
            return Err(CommError::BufferShape {
                expected: self.size(),
                actual: counts.len(),
            });
        }
        Ok(())
    }
}

impl CommBroker for MpiComm<'_> {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_to_all(&self, send_counts: &[Count]) -> Result<Vec<Count>, CommError> {
        self.check_shape(send_counts)?;
        let mut recv_counts = vec![0; self.size()];
        self.world.all_to_all_into(send_counts, &mut recv_counts[..]);
        trace!("all_to_all: {:?} -> {:?}", send_counts, recv_counts);
        Ok(recv_counts)
    }

    fn all_to_all_v<T: Payload>(
        &self,
        send: &[T],
        send_counts: &[Count],
        recv: &mut [T],
        recv_counts: &[Count],
    ) -> Result<(), CommError> {
        self.check_shape(send_counts)?;
        self.check_shape(recv_counts)?;

        let send_displs = displs_from_counts(send_counts);
        let recv_displs = displs_from_counts(recv_counts);

        let send_partition = Partition::new(send, send_counts, &send_displs[..]);
        let mut recv_partition = PartitionMut::new(recv, recv_counts, &recv_displs[..]);
        self.world
            .all_to_all_varcount_into(&send_partition, &mut recv_partition);

        Ok(())
    }

    fn all_gather<T: Payload>(&self, value: &T) -> Result<Vec<T>, CommError> {
        let mut gathered = vec![T::default(); self.size()];
        self.world.all_gather_into(value, &mut gathered[..]);
        Ok(gathered)
    }
}
