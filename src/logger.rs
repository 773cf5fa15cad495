use env_logger::Builder;
use log::LevelFilter;
use std::cell::Cell;
use std::io::Write;
use std::sync::Once;
use std::sync::OnceLock;

static INIT: Once = Once::new();

/// Rank of the whole process, set once under MPI
static RANK: OnceLock<usize> = OnceLock::new();

thread_local! {
    /// Rank of the current thread when ranks are threads of one process
    static THREAD_RANK: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Install the logger for a process that is a single rank
#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
pub fn init(rank: usize) {
    if RANK.set(rank).is_err() {
        log::warn!("Logger rank already set, keeping {:?}", RANK.get());
    }
    install();
}

/// Tag the log lines of the current thread with `rank`, installing the logger
/// if nobody did yet
pub fn bind_rank(rank: usize) {
    THREAD_RANK.with(|r| r.set(Some(rank)));
    install();
}

fn current_rank() -> Option<usize> {
    THREAD_RANK
        .with(|r| r.get())
        .or_else(|| RANK.get().copied())
}

fn install() {
    INIT.call_once(|| {
        let result = Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(|buf, record| {
                let rank = current_rank().map_or_else(|| "-".to_string(), |r| r.to_string());
                writeln!(
                    buf,
                    "[RANK {}] {} - {}: {}",
                    rank,
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .try_init();

        // a host application may have installed its own logger
        if result.is_err() {
            log::debug!("Logger already installed");
        }
    });
}

pub fn set_log_level(level: LevelFilter) {
    log::set_max_level(level);
}
