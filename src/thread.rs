//! Per-worker search state and the Lazy-SMP thread pool.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::moves::Move;
use crate::position::Position;
use crate::time_control::Limits;
use crate::tt::TranspositionTable;

/// Stack size for search worker threads; deep recursion with a full
/// `Position` clone per frame needs more than the default thread stack.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

/// State shared across every worker in a single `go` search. All threads
/// hold an `Arc` to the same instance; only atomics are mutated after
/// workers are spawned.
pub struct SharedSearchState {
    pub tt: Arc<TranspositionTable>,
    pub abort: Arc<AtomicBool>,
    pub total_nodes: AtomicU64,
    pub seldepth: AtomicUsize,
    pub limits: Limits,
}

impl SharedSearchState {
    #[must_use]
    pub fn new(tt: Arc<TranspositionTable>, abort: Arc<AtomicBool>, limits: Limits) -> Self {
        SharedSearchState {
            tt,
            abort,
            total_nodes: AtomicU64::new(0),
            seldepth: AtomicUsize::new(0),
            limits,
        }
    }

    pub fn update_seldepth(&self, seldepth: usize) {
        let mut current = self.seldepth.load(Ordering::Relaxed);
        while seldepth > current {
            match self.seldepth.compare_exchange_weak(
                current,
                seldepth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    pub fn add_nodes(&self, nodes: u64) {
        self.total_nodes.fetch_add(nodes, Ordering::Relaxed);
    }
}

/// Per-worker search tables and bookkeeping, analogous to the reference
/// engine's `Thread` struct. Each worker owns a private `Position` clone and
/// history table; only the transposition table is shared.
pub struct Thread {
    pub index: usize,
    pub position: Position,
    /// `history[color][from][to]`, incremented by `depth*depth` on a
    /// fail-high. Clone moves all bucket under `from = 0`, matching the
    /// reference engine's move encoding where a clone's `from` field is
    /// always zero.
    pub history: Box<[[[i32; 64]; 64]; 2]>,
    pub depth: u32,
    pub score: i32,
    pub best_move: Move,
    pub ponder_move: Move,
    pub do_pruning: bool,
    pub nodes: u64,
    pub seldepth: usize,
}

impl Thread {
    #[must_use]
    pub fn new(index: usize, position: Position) -> Self {
        Thread {
            index,
            position,
            history: Box::new([[[0; 64]; 64]; 2]),
            depth: 0,
            score: 0,
            best_move: Move::Null,
            ponder_move: Move::Null,
            do_pruning: true,
            nodes: 0,
            seldepth: 0,
        }
    }

    #[inline]
    pub fn history_index(mv: Move) -> (usize, usize) {
        match mv {
            Move::Clone { to } => (0, to.index()),
            Move::Jump { from, to } => (from.index(), to.index()),
            Move::Null => (0, 0),
        }
    }
}

pub struct WorkerResult {
    pub worker_id: usize,
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: i32,
    pub depth: u32,
    pub nodes: u64,
}

fn worker_depth_offset(worker_id: usize) -> i32 {
    match worker_id % 4 {
        1 | 3 => 1,
        _ => 0,
    }
}

/// Runs Lazy-SMP search: spawns `num_threads` workers (plus the calling
/// thread acting as worker 0) that each run iterative deepening
/// independently against the same transposition table, picking up whatever
/// depth/move-order diversity falls out of their different starting depths.
pub fn run_search(
    position: &Position,
    tt: Arc<TranspositionTable>,
    abort: Arc<AtomicBool>,
    limits: Limits,
    num_threads: usize,
    mut on_iteration: impl FnMut(&Thread) + Send + 'static,
) -> WorkerResult {
    let num_threads = num_threads.max(1);
    #[cfg(feature = "logging")]
    log::debug!("starting search pool with {num_threads} worker(s)");
    let shared = Arc::new(SharedSearchState::new(tt, abort, limits));
    let start = Instant::now();

    let mut handles: Vec<JoinHandle<WorkerResult>> = Vec::with_capacity(num_threads - 1);

    for worker_id in 1..num_threads {
        let pos_clone = position.clone();
        let shared_clone = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("search-{worker_id}"))
            .stack_size(SEARCH_STACK_SIZE)
            .spawn(move || run_worker(worker_id, pos_clone, shared_clone, None))
            .expect("failed to spawn search worker");
        handles.push(handle);
    }

    let main_position = position.clone();
    let main_result = run_worker(0, main_position, Arc::clone(&shared), Some(&mut on_iteration));

    // The main worker has returned, either because `max_depth` was reached
    // or its own time check fired; helper workers never sample the clock
    // themselves (only worker 0 calls `out_of_time`), so they must be told
    // explicitly to stop before we join them.
    shared.abort.store(true, Ordering::Relaxed);

    let mut results: Vec<WorkerResult> = vec![main_result];
    for handle in handles {
        if let Ok(result) = handle.join() {
            results.push(result);
        }
    }

    #[cfg(feature = "logging")]
    log::debug!("search pool joined after {:?}", start.elapsed());
    #[cfg(not(feature = "logging"))]
    let _ = start;

    let main = results.iter().find(|r| r.worker_id == 0).unwrap();
    WorkerResult {
        worker_id: 0,
        best_move: main.best_move,
        ponder_move: main.ponder_move,
        score: main.score,
        depth: main.depth,
        nodes: results.iter().map(|r| r.nodes).sum(),
    }
}

fn run_worker(
    worker_id: usize,
    position: Position,
    shared: Arc<SharedSearchState>,
    mut on_iteration: Option<&mut dyn FnMut(&Thread)>,
) -> WorkerResult {
    let mut thread = Thread::new(worker_id, position);
    let depth_offset = worker_depth_offset(worker_id);
    let max_depth = (shared.limits.depth_limit() as i32 + depth_offset).max(1) as u32;

    crate::search::iterative_deepening(&mut thread, &shared, max_depth, &mut on_iteration);

    shared.add_nodes(thread.nodes);
    shared.update_seldepth(thread.seldepth);

    WorkerResult {
        worker_id,
        best_move: thread.best_move,
        ponder_move: thread.ponder_move,
        score: thread.score,
        depth: thread.depth,
        nodes: thread.nodes,
    }
}
