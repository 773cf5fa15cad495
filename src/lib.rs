mod construct;
pub use construct::*;

mod logger;
pub use logger::{bind_rank, set_log_level};

#[cfg(feature = "mpi")]
use mpi::{environment::Universe, topology::SimpleCommunicator, traits::Communicator};

/// Initializes MPI and Logging
#[cfg(feature = "mpi")]
pub fn init() -> anyhow::Result<(Universe, SimpleCommunicator)> {
    let universe = mpi::initialize().ok_or(anyhow::anyhow!("MPI Not Initialized"))?;
    let world = universe.world();

    logger::init(world.rank() as usize);

    Ok((universe, world))
}
