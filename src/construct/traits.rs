use super::error::CommError;

#[cfg(feature = "mpi")]
pub use mpi::Count;

/// Number of elements exchanged with one rank, matching MPI's count type
#[cfg(not(feature = "mpi"))]
pub type Count = i32;

/// Plain-old-data that can be moved through a collective
#[cfg(feature = "mpi")]
pub trait Payload: mpi::traits::Equivalence + Copy + Default + Send + 'static {}
#[cfg(feature = "mpi")]
impl<T: mpi::traits::Equivalence + Copy + Default + Send + 'static> Payload for T {}

/// Plain-old-data that can be moved through a collective
#[cfg(not(feature = "mpi"))]
pub trait Payload: Copy + Default + Send + 'static {}
#[cfg(not(feature = "mpi"))]
impl<T: Copy + Default + Send + 'static> Payload for T {}

/// The collective shapes a broker offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collective {
    AllToAll,
    AllToAllV,
    AllGather,
}

/// Collective communication used by every construction stage.
///
/// Every call is a blocking barrier from the caller's point of view: it does
/// not return before every rank has issued the matching call. Nothing in the
/// crate talks to a peer outside of these three shapes.
pub trait CommBroker {
    fn rank(&self) -> usize;

    /// number of ranks in the communicator
    fn size(&self) -> usize;

    /// Send `send_counts[r]` to rank `r`, returning the value every rank sent
    /// to us, indexed by source rank
    fn all_to_all(&self, send_counts: &[Count]) -> Result<Vec<Count>, CommError>;

    /// Variable-count exchange. `send` holds the data for rank 0, then rank 1, ...
    /// with `send_counts[r]` elements each; `recv` is filled the same way
    /// according to `recv_counts`.
    fn all_to_all_v<T: Payload>(
        &self,
        send: &[T],
        send_counts: &[Count],
        recv: &mut [T],
        recv_counts: &[Count],
    ) -> Result<(), CommError>;

    /// Every rank's `value`, ordered by rank
    fn all_gather<T: Payload>(&self, value: &T) -> Result<Vec<T>, CommError>;

    // Derived operations

    fn all_reduce<T: Payload, F: Fn(T, T) -> T>(&self, value: T, op: F) -> Result<T, CommError> {
        let values = self.all_gather(&value)?;
        Ok(values.into_iter().reduce(op).unwrap_or(value))
    }

    fn all_reduce_sum(&self, value: u64) -> Result<u64, CommError> {
        self.all_reduce(value, |a, b| a + b)
    }

    fn all_reduce_max(&self, value: u64) -> Result<u64, CommError> {
        self.all_reduce(value, u64::max)
    }

    fn all_reduce_min(&self, value: u64) -> Result<u64, CommError> {
        self.all_reduce(value, u64::min)
    }

    /// Returns (sum of the values of all lower ranks, global sum)
    fn exclusive_scan(&self, value: u64) -> Result<(u64, u64), CommError> {
        let values = self.all_gather(&value)?;
        let prefix = values[..self.rank()].iter().sum();
        let total = values.iter().sum();
        Ok((prefix, total))
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.all_gather(&0u8).map(|_| ())
    }
}
