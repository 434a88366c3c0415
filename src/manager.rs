use std::thread;

/// Ceiling on embedding batches in flight; providers rate-limit well before
/// a large host runs out of cores.
const MAX_EMBED_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct SystemProfile {
    pub logical_cores: usize,
    pub worker_threads: usize,
    /// Embedding batches the index builder may have in flight at once.
    pub embed_concurrency: usize,
}

impl SystemProfile {
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::for_cores(cores)
    }

    pub fn for_cores(cores: usize) -> Self {
        let cores = cores.max(1);

        // CASE 1: Single core. One compute + one I/O thread, sequential batches.
        if cores <= 1 {
            Self {
                logical_cores: cores,
                worker_threads: 2,
                embed_concurrency: 1,
            }
        }
        // CASE 2: Desktop / Laptop
        else if cores < 6 {
            Self {
                logical_cores: cores,
                worker_threads: cores,
                embed_concurrency: 2,
            }
        }
        // CASE 3: Server
        else {
            Self {
                logical_cores: cores,
                worker_threads: cores,
                embed_concurrency: MAX_EMBED_CONCURRENCY,
            }
        }
    }
}
