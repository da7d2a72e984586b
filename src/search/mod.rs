//! Negamax alpha-beta search with aspiration windows and iterative deepening.
//!
//! The reference engine aborts a running search with `setjmp`/`longjmp`; this
//! uses a `Result`-based alternative instead, propagating a unit error up
//! through the call stack with `?`.

pub mod reductions;

use std::sync::atomic::Ordering;

use crate::eval::evaluate;
use crate::moves::Move;
use crate::picker::MovePicker;
use crate::position::Position;
use crate::thread::{SharedSearchState, Thread};
use crate::time_control::out_of_time;
use crate::tt::Bound;

pub const MAX_PLY: usize = 128;
pub const MATE: i32 = 31_000;
pub const MATE_IN_MAX: i32 = MATE - 999;
pub const INFINITE: i32 = MATE + 1;
const NO_SCORE: i32 = MATE + 2;
/// `PrintThinking`'s throttle: a non-final aspiration score still gets an
/// `info` line once this much wall-clock time has passed since search start,
/// so a long fail-high/fail-low ladder isn't silent until the whole
/// iteration finally settles inside its window.
const THINKING_THROTTLE_MS: u64 = 3000;

/// Raised when the search is cut short by the clock or an explicit `stop`.
/// Every recursive call propagates it with `?`; the iterative deepening loop
/// catches it and keeps the last completed iteration's result.
#[derive(Clone, Copy, Debug)]
pub struct SearchAborted;

pub type NodeResult<T> = Result<T, SearchAborted>;

/// One ply of search stack: the PV accumulated at this node and the static
/// eval, kept around so a node two plies up can read it for the `improving`
/// flag.
#[derive(Clone, Default)]
struct StackEntry {
    pv: Vec<Move>,
    eval: i32,
}

struct Stack {
    entries: Vec<StackEntry>,
}

impl Stack {
    fn new() -> Stack {
        Stack {
            entries: vec![StackEntry::default(); MAX_PLY + 8],
        }
    }

    fn eval_at(&self, ply: usize) -> Option<i32> {
        self.entries.get(ply).map(|e| e.eval)
    }
}

/// Shifts a mate score found at `ply` into a ply-independent form for
/// storage in the transposition table.
fn score_to_tt(score: i32, ply: usize) -> i32 {
    let ply = ply as i32;
    if score >= MATE_IN_MAX {
        score + ply
    } else if score <= -MATE_IN_MAX {
        score - ply
    } else {
        score
    }
}

/// Reverses `score_to_tt`, adjusting a stored mate score back to the
/// distance from the current node.
fn score_from_tt(score: i32, ply: usize) -> i32 {
    let ply = ply as i32;
    if score >= MATE_IN_MAX {
        score - ply
    } else if score <= -MATE_IN_MAX {
        score + ply
    } else {
        score
    }
}

fn history_bonus(thread: &mut Thread, mv: Move, depth: i32) {
    let (from, to) = Thread::history_index(mv);
    let stm = thread.position.side_to_move().index();
    thread.history[stm][from][to] += depth * depth;
}

fn history_score(thread: &Thread, mv: Move) -> i32 {
    let (from, to) = Thread::history_index(mv);
    let stm = thread.position.side_to_move().index();
    thread.history[stm][from][to]
}

/// Fail-soft negamax alpha-beta. `ply` is the distance from the search root;
/// `stack` holds per-ply PV and eval data reachable at `ply` and `ply - 2`.
fn alpha_beta(
    thread: &mut Thread,
    shared: &SharedSearchState,
    stack: &mut Stack,
    mut alpha: i32,
    mut beta: i32,
    depth: i32,
    ply: usize,
) -> NodeResult<i32> {
    stack.entries[ply].pv.clear();

    let pv_node = alpha != beta - 1;
    let root = ply == 0;

    if out_of_time(&shared.limits, thread.index, thread.nodes) || shared.abort.load(Ordering::Relaxed) {
        return Err(SearchAborted);
    }

    if !root {
        let pos = &thread.position;
        let stm = pos.side_to_move();

        if pos.color_bb(stm) == 0 {
            return Ok(-MATE + ply as i32);
        }

        if pos.is_full() {
            let mine = crate::bitboard::popcount(pos.color_bb(stm));
            let theirs = crate::bitboard::popcount(pos.color_bb(stm.flip()));
            return Ok(match mine.cmp(&theirs) {
                std::cmp::Ordering::Greater => MATE - ply as i32,
                std::cmp::Ordering::Less => -MATE + ply as i32,
                std::cmp::Ordering::Equal => 0,
            });
        }

        if pos.is_repetition() || pos.rule50() >= 100 {
            return Ok(0);
        }

        if ply >= MAX_PLY {
            return Ok(evaluate(pos));
        }

        alpha = alpha.max(-MATE + ply as i32);
        beta = beta.min(MATE - ply as i32 - 1);
        if alpha >= beta {
            return Ok(alpha);
        }
    }

    if depth <= 0 {
        return Ok(evaluate(&thread.position));
    }

    let key = thread.position.key();
    let tt_entry = shared.tt.probe(key);
    let tt_move = tt_entry.map(|e| e.mv);
    let tt_score = tt_entry.map(|e| score_from_tt(e.score, ply)).unwrap_or(NO_SCORE);

    if !pv_node {
        if let Some(entry) = tt_entry {
            if entry.depth as i32 >= depth {
                let cutoff = if tt_score >= beta {
                    entry.bound == Bound::Lower || entry.bound == Bound::Exact
                } else {
                    entry.bound == Bound::Upper || entry.bound == Bound::Exact
                };
                if cutoff {
                    return Ok(tt_score);
                }
            }
        }
    }

    // A forced pass is a real, reachable node (the mover has pieces but no
    // clone/jump is available), not the chess null-move-pruning technique —
    // this engine plays it, so the static eval after one must approximate
    // the symmetry the pass broke rather than re-evaluate the unchanged
    // board from the other side.
    let mut eval = if ply > 0 && thread.position.last_move() == Some(Move::Null) {
        -stack.entries[ply - 1].eval + 2 * crate::eval::TEMPO
    } else {
        evaluate(&thread.position)
    };
    if let Some(entry) = tt_entry {
        if tt_score != NO_SCORE {
            let informative = if tt_score > eval {
                entry.bound == Bound::Lower || entry.bound == Bound::Exact
            } else {
                entry.bound == Bound::Upper || entry.bound == Bound::Exact
            };
            if informative {
                eval = tt_score;
            }
        }
    }
    stack.entries[ply].eval = eval;

    let improving = ply >= 2
        && stack
            .eval_at(ply - 2)
            .map(|prev| eval > prev)
            .unwrap_or(false);

    let mut picker = MovePicker::new(tt_move);
    let old_alpha = alpha;
    let mut move_count = 0i32;
    let mut best_move = Move::Null;
    let mut best_score = -INFINITE;

    while let Some(mv) = picker.next(&thread.position, &|m| history_score(thread, m)) {
        thread.position.make_move(mv);
        thread.nodes += 1;
        move_count += 1;

        let new_depth = depth - 1;
        let do_lmr = depth > 2 && move_count > (2 + pv_node as i32) && thread.do_pruning;

        let mut score;
        if do_lmr {
            let mut r = reductions::reduction(depth, move_count);
            r -= pv_node as i32;
            r -= improving as i32;
            let r_depth = (new_depth - r).clamp(1, (new_depth - 1).max(1));
            score = -alpha_beta(thread, shared, stack, -alpha - 1, -alpha, r_depth, ply + 1)?;
        } else {
            score = -INFINITE - 1;
        }

        let need_full_zero_window = if do_lmr {
            score > alpha
        } else {
            !pv_node || move_count > 1
        };
        if need_full_zero_window {
            score = -alpha_beta(thread, shared, stack, -alpha - 1, -alpha, new_depth, ply + 1)?;
        }

        if pv_node && ((score > alpha && score < beta) || move_count == 1) {
            score = -alpha_beta(thread, shared, stack, -beta, -alpha, new_depth, ply + 1)?;
        }

        thread.position.unmake_move();

        if score > best_score {
            best_score = score;
            best_move = mv;

            if (score > alpha && pv_node) || (root && move_count == 1) {
                let (parent, child) = stack.entries.split_at_mut(ply + 1);
                let child_pv = &child[0].pv;
                let parent_pv = &mut parent[ply].pv;
                parent_pv.clear();
                parent_pv.push(mv);
                parent_pv.extend_from_slice(child_pv);
            }

            if score > alpha {
                alpha = score;
                if depth > 1 {
                    history_bonus(thread, mv, depth);
                }
                if score >= beta {
                    break;
                }
            }
        }
    }

    let bound = if best_score >= beta {
        Bound::Lower
    } else if alpha != old_alpha {
        Bound::Exact
    } else {
        Bound::Upper
    };
    shared.tt.store(
        key,
        best_move,
        score_to_tt(best_score, ply),
        depth.max(0) as u8,
        bound,
    );

    Ok(best_score)
}

fn stack_seldepth(stack: &Stack) -> usize {
    for ply in (1..MAX_PLY).rev() {
        if !stack.entries[ply].pv.is_empty() || stack.entries[ply].eval != 0 {
            return ply;
        }
    }
    0
}

/// Refreshes `thread.best_move`/`ponder_move` from the root PV accumulated
/// so far and invokes `on_iteration` (a no-op on worker threads, which are
/// never given a callback — only worker 0 is). Called both for a fully
/// completed iteration and, mid-iteration, for a `PrintThinking`-style
/// progress line on a long aspiration ladder.
fn report_iteration(
    thread: &mut Thread,
    stack: &Stack,
    on_iteration: &mut Option<&mut dyn FnMut(&Thread)>,
) {
    let pv = &stack.entries[0].pv;
    thread.best_move = pv.first().copied().unwrap_or(Move::Null);
    thread.ponder_move = pv.get(1).copied().unwrap_or(Move::Null);
    if let Some(callback) = on_iteration.as_mut() {
        callback(thread);
    }
}

fn aspiration_window(
    thread: &mut Thread,
    shared: &SharedSearchState,
    stack: &mut Stack,
    on_iteration: &mut Option<&mut dyn FnMut(&Thread)>,
) -> NodeResult<i32> {
    let mut score = thread.score;
    let depth_limit = thread.depth as i32;
    let mut depth = depth_limit;

    const INITIAL_WINDOW: i32 = 12;
    let mut delta = 16;

    let mut alpha = -INFINITE;
    let mut beta = INFINITE;

    let pruning_limit = if shared.limits.has_time_limit {
        (shared.limits.optimal_usage.as_millis() as i32 + 250) / 250
    } else {
        4
    };
    thread.do_pruning = depth > pruning_limit.min(4);

    if depth > 6 {
        alpha = (score - INITIAL_WINDOW).max(-INFINITE);
        beta = (score + INITIAL_WINDOW).min(INFINITE);
    }

    loop {
        if alpha < -3500 {
            alpha = -INFINITE;
        }
        if beta > 3500 {
            beta = INFINITE;
        }

        score = alpha_beta(thread, shared, stack, alpha, beta, depth, 0)?;

        let in_window = score > alpha && score < beta;
        let elapsed_ms = shared.limits.start.elapsed().as_millis() as u64;
        if in_window || elapsed_ms >= THINKING_THROTTLE_MS {
            report_iteration(thread, stack, on_iteration);
        }

        if in_window {
            return Ok(score);
        }

        if score <= alpha {
            alpha = (alpha - delta).max(-INFINITE);
            beta = (alpha + beta) / 2;
            depth = depth_limit;
        } else {
            beta = (beta + delta).min(INFINITE);
            depth -= (score.abs() < MATE_IN_MAX) as i32;
        }

        delta += delta * 2 / 3;
    }
}

/// Runs iterative deepening up to `max_depth`, updating `thread.best_move`
/// and `thread.ponder_move` after each completed iteration. `on_iteration`
/// is invoked on the main thread once per finished iteration, and also
/// mid-iteration on a long aspiration-window ladder once ~3s have elapsed
/// since search start (see `aspiration_window`), for UAI `info` reporting.
pub fn iterative_deepening(
    thread: &mut Thread,
    shared: &SharedSearchState,
    max_depth: u32,
    on_iteration: &mut Option<&mut dyn FnMut(&Thread)>,
) {
    let mut stack = Stack::new();
    let main_thread = thread.index == 0;

    // `alpha_beta` skips terminal detection at the root (spec: "terminal
    // tests, skip at root") since a search is never started from a position
    // that is already over in normal play. Guard both ways that assumption
    // can fail in practice: the mover already has no pieces, or the board is
    // already full. Either leaves `generate_moves` with nothing to offer the
    // move picker, so without this the loop below would never run and stale
    // `-INFINITE`/`Move::Null` initializers would leak out as the result.
    let root_pos = &thread.position;
    let root_stm = root_pos.side_to_move();
    let root_terminal_score = if root_pos.color_bb(root_stm) == 0 {
        Some(-MATE)
    } else if root_pos.is_full() {
        let mine = crate::bitboard::popcount(root_pos.color_bb(root_stm));
        let theirs = crate::bitboard::popcount(root_pos.color_bb(root_stm.flip()));
        Some(match mine.cmp(&theirs) {
            std::cmp::Ordering::Greater => MATE,
            std::cmp::Ordering::Less => -MATE,
            std::cmp::Ordering::Equal => 0,
        })
    } else {
        None
    };
    if let Some(score) = root_terminal_score {
        thread.score = score;
        thread.best_move = Move::Null;
        thread.ponder_move = Move::Null;
        if main_thread {
            if let Some(callback) = on_iteration.as_mut() {
                callback(thread);
            }
        }
        return;
    }

    for depth in 1..=max_depth {
        thread.depth = depth;
        let prev_best = thread.best_move;

        let result = aspiration_window(thread, shared, &mut stack, on_iteration);
        let score = match result {
            Ok(score) => score,
            Err(SearchAborted) => break,
        };
        thread.score = score;
        thread.seldepth = thread.seldepth.max(stack_seldepth(&stack));

        if !main_thread {
            continue;
        }

        // `aspiration_window` has already refreshed `best_move`/`ponder_move`
        // from this iteration's completed PV (and reported zero or more
        // interim lines along the way, per its own ~3s throttle); only the
        // "did the root move change" comparison is left to do here.
        let uncertain = thread.best_move != prev_best;

        if shared.limits.has_time_limit {
            let factor = if uncertain { 2 } else { 1 };
            if shared.limits.start.elapsed() > shared.limits.optimal_usage * factor {
                break;
            }
        }
    }
}

/// UAI `info` line for the supplied thread state, matching the reference
/// engine's field order: depth, seldepth, score, time, nodes, nps,
/// hashfull, pv. `nodes` and `hashfull` are passed in rather than read off
/// `SharedSearchState` directly so a caller can report a pool-wide node
/// count that spans every worker, not just this thread.
#[must_use]
pub fn format_info(
    thread: &Thread,
    nodes: u64,
    hashfull: u32,
    elapsed_ms: u64,
    pv: &[Move],
) -> String {
    let score = thread.score;
    let (kind, printed) = if score.abs() >= MATE_IN_MAX {
        ("mate", mate_distance(score))
    } else {
        ("cp", score)
    };

    let nps = 1000 * nodes / (elapsed_ms + 1);

    let mut line = format!(
        "info depth {} seldepth {} score {} {} time {} nodes {} nps {} hashfull {} pv",
        thread.depth, thread.seldepth, kind, printed, elapsed_ms, nodes, nps, hashfull
    );
    for mv in pv {
        line.push(' ');
        line.push_str(&mv.to_string());
    }
    line
}

/// Converts an internal mate score into a signed distance-to-mate count.
/// Clamped to a magnitude of at least 1 so a score of exactly `+-MATE` (mate
/// already delivered at the reporting node, distance 0) still prints with
/// its side's sign instead of collapsing to an unsigned `0`.
#[must_use]
pub fn mate_distance(score: i32) -> i32 {
    let d = ((MATE - score.abs() + 1) / 2).max(1);
    if score > 0 {
        d
    } else {
        -d
    }
}
