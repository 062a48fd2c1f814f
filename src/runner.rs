use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::RunConfiguration;
use crate::error::RunError;
use crate::output::SimulationResult;
use crate::rng::RandomSource;
use crate::tally::Tally;
use crate::worker::SimulationCore;

/// Photons per dispatched batch; progress acks arrive at this granularity.
pub const BATCH_PHOTONS: u64 = 5_000;

type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

enum WorkerMessage {
    /// One batch finished; carries its photon count.
    Progress(u64),
    /// Worker drained its queue (or bailed out) and returns its tally.
    Done { worker: usize, tally: Tally },
}

/// Distributes photon launches over a pool of simulation cores.
///
/// The pool is created per run and torn down when the run completes or is
/// cancelled. Only one run is active at a time: starting a new run bumps a
/// monotonic generation token, which marks whatever was still in flight as
/// stale so its batch results are discarded rather than merged.
pub struct SimulationRunner {
    pool_size: usize,
    generation: Arc<AtomicU64>,
}

impl SimulationRunner {
    /// Pool sized to the available hardware parallelism.
    pub fn new() -> Self {
        let pool_size = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_pool_size(pool_size)
    }

    /// Pool with an explicit worker count. Tests pin this (together with the
    /// seed) to make runs reproducible.
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a run with a seed drawn from entropy.
    pub fn start(&mut self, config: RunConfiguration) -> Result<RunHandle, RunError> {
        self.start_inner(config, rand::random(), None)
    }

    /// Starts a run with a pinned seed. The same seed and pool size
    /// reproduce the result bit for bit.
    pub fn start_seeded(
        &mut self,
        config: RunConfiguration,
        seed: u64,
    ) -> Result<RunHandle, RunError> {
        self.start_inner(config, seed, None)
    }

    /// Starts a run that reports `(launched, total)` after every finished
    /// batch. Calls arrive from the collector thread, monotonically
    /// non-decreasing in the photon count.
    pub fn start_with_progress<F>(
        &mut self,
        config: RunConfiguration,
        seed: u64,
        progress: F,
    ) -> Result<RunHandle, RunError>
    where
        F: FnMut(u64, u64) + Send + 'static,
    {
        self.start_inner(config, seed, Some(Box::new(progress)))
    }

    fn start_inner(
        &mut self,
        config: RunConfiguration,
        seed: u64,
        progress: Option<ProgressFn>,
    ) -> Result<RunHandle, RunError> {
        // Validate before a single thread is spawned.
        let config = Arc::new(config.prepare()?);

        // A new run invalidates whatever was still in flight.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let total = config.photons;

        debug!(generation, photons = total, pool = self.pool_size, seed, "starting run");

        // Fixed-size batches, dealt round-robin so each worker's share is
        // fully determined by seed and pool size.
        let mut batch_txs = Vec::with_capacity(self.pool_size);
        let mut batch_rxs = Vec::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let (tx, rx) = mpsc::channel::<u64>();
            batch_txs.push(tx);
            batch_rxs.push(rx);
        }
        let mut queued = 0;
        let mut next = 0;
        while queued < total {
            let n = BATCH_PHOTONS.min(total - queued);
            if batch_txs[next % self.pool_size].send(n).is_err() {
                break;
            }
            queued += n;
            next += 1;
        }
        // Queues close once drained.
        drop(batch_txs);

        let (msg_tx, msg_rx) = mpsc::channel::<WorkerMessage>();
        let mut seeder = RandomSource::new(seed);
        let mut workers = Vec::with_capacity(self.pool_size);
        for (id, batches) in batch_rxs.into_iter().enumerate() {
            let worker_seed = seeder.next_seed();
            let cfg = Arc::clone(&config);
            let tx = msg_tx.clone();
            let live = Arc::clone(&self.generation);
            workers.push(thread::spawn(move || {
                worker_loop(id, generation, cfg, worker_seed, batches, tx, live);
            }));
        }
        drop(msg_tx);

        let (result_tx, result_rx) = mpsc::channel();
        let collector = {
            let live = Arc::clone(&self.generation);
            let cfg = Arc::clone(&config);
            thread::spawn(move || {
                collect(generation, live, cfg, workers, total, msg_rx, progress, result_tx);
            })
        };

        Ok(RunHandle {
            generation,
            counter: Arc::clone(&self.generation),
            result_rx,
            collector: Some(collector),
        })
    }
}

impl Default for SimulationRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an in-flight run.
pub struct RunHandle {
    generation: u64,
    counter: Arc<AtomicU64>,
    result_rx: Receiver<Result<SimulationResult, RunError>>,
    collector: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Cooperatively cancels the run. In-flight batches finish, their
    /// results are discarded, and `wait` reports the cancellation.
    pub fn cancel(&self) {
        // Bumping the shared token past this run's value marks it stale;
        // if another run already superseded it there is nothing to do.
        let _ = self.counter.compare_exchange(
            self.generation,
            self.generation + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Blocks until the merged, post-processed result is available, or
    /// until the run is cancelled or superseded.
    pub fn wait(mut self) -> Result<SimulationResult, RunError> {
        let result = self
            .result_rx
            .recv()
            .unwrap_or(Err(RunError::Cancelled));
        if let Some(collector) = self.collector.take() {
            let _ = collector.join();
        }
        result
    }
}

fn worker_loop(
    id: usize,
    generation: u64,
    config: Arc<RunConfiguration>,
    seed: u64,
    batches: Receiver<u64>,
    tx: Sender<WorkerMessage>,
    live: Arc<AtomicU64>,
) {
    let mut core = SimulationCore::new(config, seed);
    debug!(worker = id, seed, "worker started");

    loop {
        // Stop pulling work as soon as the run token goes stale.
        if live.load(Ordering::SeqCst) != generation {
            break;
        }
        let Ok(n) = batches.recv() else {
            break; // queue drained
        };
        core.run_photons(n);
        if tx.send(WorkerMessage::Progress(n)).is_err() {
            break;
        }
    }

    let _ = tx.send(WorkerMessage::Done {
        worker: id,
        tally: core.into_tally(),
    });
}

#[allow(clippy::too_many_arguments)]
fn collect(
    generation: u64,
    live: Arc<AtomicU64>,
    config: Arc<RunConfiguration>,
    workers: Vec<JoinHandle<()>>,
    total: u64,
    messages: Receiver<WorkerMessage>,
    mut progress: Option<ProgressFn>,
    result_tx: mpsc::Sender<Result<SimulationResult, RunError>>,
) {
    let started = Instant::now();
    let pool = workers.len();
    let mut tallies: Vec<Option<Tally>> = (0..pool).map(|_| None).collect();
    let mut launched = 0;
    let mut finished = 0;

    while finished < pool {
        let Ok(message) = messages.recv() else {
            break;
        };
        match message {
            WorkerMessage::Progress(n) => {
                launched += n;
                if live.load(Ordering::SeqCst) == generation {
                    if let Some(report) = progress.as_mut() {
                        report(launched, total);
                    }
                }
            }
            WorkerMessage::Done { worker, tally } => {
                tallies[worker] = Some(tally);
                finished += 1;
            }
        }
    }

    // Full join before anything is merged.
    for worker in workers {
        let _ = worker.join();
    }

    if live.load(Ordering::SeqCst) != generation || finished < pool || launched < total {
        debug!(generation, launched, "run abandoned before merge");
        let _ = result_tx.send(Err(RunError::Cancelled));
        return;
    }

    // Merge in worker order so a fixed seed and pool size reproduce the
    // same floating-point sums regardless of scheduling.
    let mut merged = Tally::new(&config);
    for tally in tallies.into_iter().flatten() {
        merged.merge(&tally);
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!(generation, photons = total, elapsed, "run complete");
    let result = SimulationResult::from_tally(&config, &merged, elapsed);
    let _ = result_tx.send(Ok(result));
}
