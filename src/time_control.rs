//! Search limits and time budget computation.

use std::time::{Duration, Instant};

use crate::types::Color;

#[derive(Clone, Debug)]
pub struct Limits {
    pub start: Instant,
    pub time: [u64; 2],
    pub inc: [u64; 2],
    pub movestogo: Option<u32>,
    pub movetime: Option<u64>,
    pub depth: u32,
    pub infinite: bool,
    pub has_time_limit: bool,
    pub optimal_usage: Duration,
    pub max_usage: Duration,
}

const OVERHEAD_MS: u64 = 5;
const DEFAULT_DEPTH: u32 = 100;

impl Default for Limits {
    fn default() -> Self {
        Limits {
            start: Instant::now(),
            time: [0, 0],
            inc: [0, 0],
            movestogo: None,
            movetime: None,
            depth: DEFAULT_DEPTH,
            infinite: false,
            has_time_limit: false,
            optimal_usage: Duration::ZERO,
            max_usage: Duration::ZERO,
        }
    }
}

impl Limits {
    /// Computes `optimal_usage`/`max_usage` from the parsed `go` parameters.
    /// With no `movetime`, both are simply `time / 30` — the reference
    /// engine never scales this by `movestogo` or the increment despite
    /// parsing them.
    pub fn init_time_management(&mut self, stm: Color) {
        if !self.has_time_limit {
            return;
        }

        if let Some(movetime) = self.movetime {
            let usage = Duration::from_millis(movetime.saturating_sub(OVERHEAD_MS));
            self.optimal_usage = usage;
            self.max_usage = usage;
            return;
        }

        let time = self.time[stm.index()];
        let usage = Duration::from_millis(time / 30);
        self.optimal_usage = usage;
        self.max_usage = usage;
    }

    #[must_use]
    pub fn depth_limit(&self) -> u32 {
        self.depth
    }
}

/// Only the main worker samples the clock, and only every 4096 nodes —
/// helper threads rely entirely on the shared abort flag.
#[inline]
#[must_use]
pub fn out_of_time(limits: &Limits, worker_index: usize, nodes: u64) -> bool {
    worker_index == 0
        && limits.has_time_limit
        && nodes & 4095 == 4095
        && limits.start.elapsed() >= limits.max_usage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movetime_overrides_time_division() {
        let mut limits = Limits {
            has_time_limit: true,
            movetime: Some(1000),
            ..Default::default()
        };
        limits.init_time_management(Color::White);
        assert_eq!(limits.optimal_usage, Duration::from_millis(995));
        assert_eq!(limits.max_usage, Duration::from_millis(995));
    }

    #[test]
    fn time_is_divided_by_thirty() {
        let mut limits = Limits {
            has_time_limit: true,
            time: [0, 30_000],
            ..Default::default()
        };
        limits.init_time_management(Color::White);
        assert_eq!(limits.optimal_usage, Duration::from_millis(1000));
    }

    #[test]
    fn no_time_limit_leaves_usage_zero() {
        let mut limits = Limits::default();
        limits.init_time_management(Color::White);
        assert_eq!(limits.max_usage, Duration::ZERO);
    }
}
