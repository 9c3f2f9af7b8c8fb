//! Batch dispatcher.
//!
//! Executes an ordered list of run specifications with bounded concurrency.
//! Two policies are offered:
//!
//! - [`DispatchPolicy::Batched`]: `M / P` full batches of `P` concurrent runs,
//!   each batch completing before the next starts, followed by the `M % P`
//!   leftover runs executed one at a time.
//! - [`DispatchPolicy::Pooled`]: one pool of `P` workers consuming all `M`
//!   specifications.
//!
//! Both execute every specification exactly once. Outcomes are collected in
//! completion-batch order; the aggregator restores builder order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::available_parallelism;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::controller::{RunStrategy, SeedPolicy, execute_run};
use crate::model::{RunOutcome, RunSpecification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    #[default]
    Batched,
    Pooled,
}

/// Number of hardware threads, the default parallelism
pub fn default_parallelism() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Executes a single run and always produces its outcome
pub trait RunExecutor: Sync {
    fn execute(&self, spec: &RunSpecification) -> RunOutcome;
}

/// Executes runs on the dispatching process's own worker threads
pub struct InProcessExecutor<'a, S: ?Sized> {
    strategy: &'a S,
    seeds: SeedPolicy,
}

impl<'a, S: RunStrategy + ?Sized> InProcessExecutor<'a, S> {
    pub fn new(strategy: &'a S, seeds: SeedPolicy) -> Self {
        Self { strategy, seeds }
    }
}

impl<S: RunStrategy + ?Sized> RunExecutor for InProcessExecutor<'_, S> {
    fn execute(&self, spec: &RunSpecification) -> RunOutcome {
        execute_run(self.strategy, spec, self.seeds)
    }
}

/// Shared counters of a running dispatch
#[derive(Debug, Clone)]
pub struct DispatchProgress {
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl DispatchProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
        }
    }

    /// Runs finished so far, successful or not
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &RunOutcome) {
        if outcome.is_error() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(done, total = self.total(), "run finished");
    }
}

impl Default for DispatchProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Result of dispatching a sweep
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub outcomes: Vec<RunOutcome>,
    /// Number of executions performed
    pub executed: usize,
    pub batches: usize,
    /// Runs executed sequentially after the full batches
    pub leftover: usize,
}

/// Executes specifications under a dispatch policy with at most
/// `parallelism` concurrent runs
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: DispatchPolicy,
    parallelism: usize,
    progress: DispatchProgress,
}

impl Dispatcher {
    /// A parallelism of zero is treated as one
    pub fn new(policy: DispatchPolicy, parallelism: usize) -> Self {
        Self {
            policy,
            parallelism: parallelism.max(1),
            progress: DispatchProgress::default(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    #[must_use]
    pub fn progress(&self) -> &DispatchProgress {
        &self.progress
    }

    fn run_one<E: RunExecutor + ?Sized>(&self, executor: &E, spec: &RunSpecification) -> RunOutcome {
        let outcome = executor.execute(spec);
        self.progress.record(&outcome);
        outcome
    }

    pub fn dispatch<E: RunExecutor + ?Sized>(
        &self,
        specs: &[RunSpecification],
        executor: &E,
    ) -> DispatchReport {
        self.progress.total.store(specs.len(), Ordering::Relaxed);
        let start = self.progress.completed();

        let report = match self.policy {
            DispatchPolicy::Batched => self.dispatch_batched(specs, executor),
            DispatchPolicy::Pooled => self.dispatch_pooled(specs, executor),
        };

        let executed = self.progress.completed() - start;
        tracing::info!(
            executed,
            failed = self.progress.failed(),
            batches = report.batches,
            leftover = report.leftover,
            "dispatch finished"
        );
        DispatchReport { executed, ..report }
    }

    fn dispatch_batched<E: RunExecutor + ?Sized>(
        &self,
        specs: &[RunSpecification],
        executor: &E,
    ) -> DispatchReport {
        let p = self.parallelism;
        let full = specs.len() / p;
        let (batched, rest) = specs.split_at(full * p);
        tracing::info!(
            runs = specs.len(),
            batch_size = p,
            batches = full,
            leftover = rest.len(),
            "dispatching in batches"
        );

        let pool = if full > 0 { self.build_pool() } else { None };
        let mut outcomes = Vec::with_capacity(specs.len());
        for (batch_index, batch) in batched.chunks(p).enumerate() {
            tracing::info!(batch = batch_index, "starting batch");
            outcomes.extend(self.run_concurrently(pool.as_ref(), batch, executor));
            tracing::info!(batch = batch_index, "batch finished");
        }

        for spec in rest {
            outcomes.push(self.run_one(executor, spec));
        }

        DispatchReport {
            outcomes,
            executed: 0,
            batches: full,
            leftover: rest.len(),
        }
    }

    fn dispatch_pooled<E: RunExecutor + ?Sized>(
        &self,
        specs: &[RunSpecification],
        executor: &E,
    ) -> DispatchReport {
        tracing::info!(runs = specs.len(), workers = self.parallelism, "dispatching to pool");
        let pool = self.build_pool();
        let outcomes = self.run_concurrently(pool.as_ref(), specs, executor);
        DispatchReport {
            outcomes,
            executed: 0,
            batches: usize::from(!specs.is_empty()),
            leftover: 0,
        }
    }

    #[cfg(feature = "parallel")]
    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!("worker pool unavailable, running sequentially: {e}");
                None
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn build_pool(&self) -> Option<()> {
        None
    }

    #[cfg(feature = "parallel")]
    fn run_concurrently<E: RunExecutor + ?Sized>(
        &self,
        pool: Option<&rayon::ThreadPool>,
        specs: &[RunSpecification],
        executor: &E,
    ) -> Vec<RunOutcome> {
        match pool {
            Some(pool) => pool.install(|| {
                specs
                    .par_iter()
                    .map(|spec| self.run_one(executor, spec))
                    .collect()
            }),
            None => specs.iter().map(|spec| self.run_one(executor, spec)).collect(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run_concurrently<E: RunExecutor + ?Sized>(
        &self,
        _pool: Option<&()>,
        specs: &[RunSpecification],
        executor: &E,
    ) -> Vec<RunOutcome> {
        specs.iter().map(|spec| self.run_one(executor, spec)).collect()
    }
}
