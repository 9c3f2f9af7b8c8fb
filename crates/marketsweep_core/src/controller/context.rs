use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::RunPhase;

/// Upper bound (exclusive) of randomly drawn run seeds
const SEED_RANGE: u64 = 10_000_000;

/// How each run obtains its seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicy {
    /// Fresh draw from the thread-local RNG for every run
    #[default]
    Random,
    /// Run `i` uses `base + i` (wrapping)
    Pinned(u64),
}

impl SeedPolicy {
    pub fn from_option(seed: Option<u64>) -> Self {
        seed.map_or(SeedPolicy::Random, SeedPolicy::Pinned)
    }

    pub fn draw(self, run_index: usize) -> u64 {
        match self {
            SeedPolicy::Random => rand::rng().random_range(0..SEED_RANGE),
            SeedPolicy::Pinned(base) => base.wrapping_add(run_index as u64),
        }
    }
}

/// Mutable state of one run, alive only while the run executes
#[derive(Debug, Clone)]
pub struct RunContext {
    seed: u64,
    phase: RunPhase,
    pub warmup_ticks: usize,
    pub measured_ticks: usize,
    pub logged_transactions: usize,
    /// Per-tick or per-transaction queries that failed and were skipped
    pub skipped_queries: usize,
}

impl RunContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            phase: RunPhase::Uninitialized,
            warmup_ticks: 0,
            measured_ticks: 0,
            logged_transactions: 0,
            skipped_queries: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to the next lifecycle phase.
    ///
    /// Terminal phases are sticky.
    pub fn advance(&mut self, next: RunPhase) {
        if self.phase.is_terminal() {
            return;
        }
        tracing::info!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}
