use std::sync::Arc;

use log::{debug, error};

use super::{CommBroker, GraphError, Result};

/// Resources a rank brings to graph construction: the communicator, the pool
/// local data-parallel kernels run on, and the memory those kernels may use.
pub struct Handle<'c, C: CommBroker> {
    comm: &'c C,
    pool: Option<Arc<rayon::ThreadPool>>,
    memory_limit: Option<usize>,
}

impl<'c, C: CommBroker> Handle<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self {
            comm,
            pool: None,
            memory_limit: None,
        }
    }

    /// Run local kernels on `pool` instead of the global rayon pool
    pub fn with_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Cap, in bytes, for any single staging or adjacency buffer
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn comm(&self) -> &'c C {
        self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Execute a local kernel on this handle's pool
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Allocate a default-filled buffer of `len` elements within the budget
    pub fn allocate<T: Default + Clone>(&self, len: usize) -> Result<Vec<T>> {
        let mut buf = self.reserve::<T>(len)?;
        buf.resize(len, T::default());
        Ok(buf)
    }

    /// Allocate an empty buffer able to hold `len` elements within the budget
    pub fn reserve<T>(&self, len: usize) -> Result<Vec<T>> {
        let requested = len.saturating_mul(std::mem::size_of::<T>());
        let available = self.memory_limit.unwrap_or(usize::MAX);

        if requested > available {
            let err = GraphError::ResourceExhaustion {
                requested,
                available,
            };
            error!("{}", err);
            return Err(err);
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| {
            let err = GraphError::ResourceExhaustion {
                requested,
                available,
            };
            error!("{}", err);
            err
        })?;
        debug!("Allocated {} bytes", requested);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThreadCluster;

    #[test]
    fn test_allocation_within_budget() {
        let comm = ThreadCluster::communicators(1).remove(0);
        let handle = Handle::new(&comm).with_memory_limit(64);

        let buf: Vec<u64> = handle.allocate(8).unwrap();
        assert_eq!(buf, vec![0; 8]);
    }

    #[test]
    fn test_allocation_over_budget() {
        let comm = ThreadCluster::communicators(1).remove(0);
        let handle = Handle::new(&comm).with_memory_limit(64);

        let err = handle.allocate::<u64>(9).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ResourceExhaustion {
                requested: 72,
                available: 64
            }
        ));
    }

    #[test]
    fn test_install_on_private_pool() {
        let comm = ThreadCluster::communicators(1).remove(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let handle = Handle::new(&comm).with_pool(Arc::new(pool));

        let threads = handle.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
    }
}
