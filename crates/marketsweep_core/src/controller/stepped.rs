//! Run controller for step-based engines.
//!
//! Lifecycle of one run:
//!
//! 1. assign base variables, swept parameters and `SEED`, then `setup`
//! 2. warm up for `warmup_ticks` without observing anything
//! 3. optional state dump (debug log only)
//! 4. measure `measure_ticks` ticks; transactions of the last `tail_window`
//!    ticks are appended to the run's transaction log, which is flushed on
//!    every tick of the last `flush_window` ticks
//! 5. close the log, evaluate terminal reporters, close the engine

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{RunContext, RunStrategy, Stats, TransactionLog};
use crate::engine::{Engine, EngineFactory};
use crate::error::{EngineError, RunError};
use crate::model::{RunPhase, RunSpecification, TransactionRecord, Value};

/// Tick counts of the warm-up and measurement phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    pub warmup_ticks: usize,
    pub measure_ticks: usize,
    /// Trailing measured ticks whose transactions are logged
    pub tail_window: usize,
    /// Trailing measured ticks on which the log is flushed
    pub flush_window: usize,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            warmup_ticks: 100,
            measure_ticks: 500,
            tail_window: 10,
            flush_window: 21,
        }
    }
}

impl TimingPolicy {
    /// Whether measured tick `tick` (0-based) falls in the extraction tail.
    ///
    /// Exactly `min(tail_window, measure_ticks)` ticks qualify.
    pub fn in_tail(&self, tick: usize) -> bool {
        tick + self.tail_window >= self.measure_ticks
    }

    pub fn in_flush_window(&self, tick: usize) -> bool {
        tick + self.flush_window >= self.measure_ticks
    }
}

/// Settings shared by every run of a stepped sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteppedSettings {
    pub timing: TimingPolicy,
    /// Engine variables assigned before the swept parameters
    pub variables: BTreeMap<String, Value>,
    /// Expressions evaluated once at the end of the run
    pub reporters: Vec<String>,
    /// Expressions dumped to the debug log after warm-up; defaults to the
    /// pushed variables plus `ticks`
    pub state_check: Vec<String>,
    pub log_dir: PathBuf,
    pub log_prefix: String,
    pub log_suffix: String,
}

impl Default for SteppedSettings {
    fn default() -> Self {
        Self {
            timing: TimingPolicy::default(),
            variables: BTreeMap::new(),
            reporters: vec![
                "ticks".to_string(),
                "last-price".to_string(),
                "mean-price".to_string(),
                "total-volume".to_string(),
                "transaction-count".to_string(),
            ],
            state_check: Vec::new(),
            log_dir: PathBuf::from("transactions"),
            log_prefix: "LMtransact_".to_string(),
            log_suffix: "tsv".to_string(),
        }
    }
}

/// Drives step-based engines created by `F`
pub struct StepRunController<F> {
    factory: F,
    settings: SteppedSettings,
}

impl<F: EngineFactory> StepRunController<F> {
    pub fn new(factory: F, settings: SteppedSettings) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &SteppedSettings {
        &self.settings
    }

    fn configure(
        &self,
        engine: &mut dyn Engine,
        spec: &RunSpecification,
        seed: u64,
    ) -> Result<Vec<String>, EngineError> {
        let mut variables = self.settings.variables.clone();
        for param in &spec.params {
            variables.insert(param.name.clone(), param.value.clone());
        }
        variables.insert("SEED".to_string(), Value::from(seed));

        for (name, value) in &variables {
            tracing::debug!("setting {name} to {value}");
            engine.configure(name, value)?;
        }
        engine.setup()?;
        engine.configure(
            "endBurninTime",
            &Value::from(self.settings.timing.warmup_ticks),
        )?;
        Ok(variables.into_keys().collect())
    }

    /// Log the configured state expressions, or every pushed variable and
    /// `ticks` when none are configured
    fn dump_state(&self, engine: &mut dyn Engine, pushed: &[String]) {
        let defaults: Vec<String>;
        let expressions = if self.settings.state_check.is_empty() {
            defaults = pushed
                .iter()
                .cloned()
                .chain(std::iter::once("ticks".to_string()))
                .collect();
            &defaults
        } else {
            &self.settings.state_check
        };
        for expression in expressions {
            match engine.query(expression) {
                Ok(value) => tracing::debug!("state {expression} = {value}"),
                Err(e) => tracing::debug!("state {expression} unavailable: {e}"),
            }
        }
    }

    /// Append every transaction of the current tick to the log.
    ///
    /// Query failures skip the element; log write failures abort the run.
    fn extract_tick(
        &self,
        engine: &mut dyn Engine,
        log: &mut TransactionLog,
        ctx: &mut RunContext,
    ) -> Result<(), RunError> {
        let counts = engine
            .query("ticks")
            .and_then(|t| expect_int("ticks", &t))
            .and_then(|tick| {
                let n = engine.query("length list_transactions")?;
                Ok((tick, expect_int("length list_transactions", &n)?))
            });
        let (tick, count) = match counts {
            Ok(counts) => counts,
            Err(e) => {
                tracing::debug!("skipping tick: {e}");
                ctx.skipped_queries += 1;
                return Ok(());
            }
        };

        for index in 0..count.max(0) {
            match read_transaction(engine, tick, index) {
                Ok(record) => {
                    log.append(&record)?;
                    ctx.logged_transactions += 1;
                }
                Err(e) => {
                    tracing::debug!(tick, index, "skipping transaction: {e}");
                    ctx.skipped_queries += 1;
                }
            }
        }
        Ok(())
    }

    fn drive(
        &self,
        engine: &mut dyn Engine,
        spec: &RunSpecification,
        ctx: &mut RunContext,
    ) -> Result<Stats, RunError> {
        let timing = self.settings.timing;

        let pushed = self.configure(engine, spec, ctx.seed())?;
        ctx.advance(RunPhase::Configured);

        for _ in 0..timing.warmup_ticks {
            engine.step()?;
            ctx.warmup_ticks += 1;
        }
        ctx.advance(RunPhase::WarmedUp);
        self.dump_state(engine, &pushed);

        let name = TransactionLog::file_name(
            &self.settings.log_prefix,
            spec.run_index,
            ctx.seed(),
            &self.settings.log_suffix,
        );
        let mut log = TransactionLog::create(self.settings.log_dir.join(name))?;
        ctx.advance(RunPhase::Measuring);

        for tick in 0..timing.measure_ticks {
            engine.step()?;
            ctx.measured_ticks += 1;
            if timing.in_tail(tick) {
                self.extract_tick(engine, &mut log, ctx)?;
            }
            if timing.in_flush_window(tick)
                && let Err(e) = log.flush()
            {
                tracing::warn!("transaction log flush failed: {e}");
            }
        }
        let log_path = log.path().display().to_string();
        log.finish()?;

        let mut stats = Stats::new();
        for reporter in &self.settings.reporters {
            stats.insert(reporter.clone(), engine.query(reporter)?);
        }
        stats.insert("warmup_ticks".into(), Value::from(ctx.warmup_ticks));
        stats.insert("measured_ticks".into(), Value::from(ctx.measured_ticks));
        stats.insert(
            "logged_transactions".into(),
            Value::from(ctx.logged_transactions),
        );
        stats.insert("skipped_queries".into(), Value::from(ctx.skipped_queries));
        stats.insert("transaction_log".into(), Value::from(log_path));
        Ok(stats)
    }
}

fn expect_int(expression: &str, value: &Value) -> Result<i64, EngineError> {
    value
        .as_i64()
        .ok_or_else(|| EngineError::query(expression, format!("expected an integer, got {value}")))
}

fn expect_float(expression: &str, value: &Value) -> Result<f64, EngineError> {
    value
        .as_f64()
        .ok_or_else(|| EngineError::query(expression, format!("expected a number, got {value}")))
}

fn read_transaction(
    engine: &mut dyn Engine,
    tick: i64,
    index: i64,
) -> Result<TransactionRecord, EngineError> {
    let mut field = |name: &str| {
        let expression = format!("prop_list_transactions {index} \"{name}\"");
        engine.query(&expression).map(|value| (expression, value))
    };

    let (expr, id) = field("TrdID")?;
    let id = expect_int(&expr, &id)?;
    let (expr, price) = field("TrdPrice")?;
    let price = expect_float(&expr, &price)?;
    let (expr, time) = field("TrdTime")?;
    let time = expect_float(&expr, &time)?;
    let (expr, quantity) = field("TrdQuant")?;
    let quantity = expect_int(&expr, &quantity)?;
    let (expr, buyer) = field("TrdWhoBid")?;
    let buyer_id = expect_int(&expr, &buyer)?;
    let (expr, seller) = field("TrdWhoAsk")?;
    let seller_id = expect_int(&expr, &seller)?;
    let (_, buyer_type) = field("TrdWhoBidType")?;
    let (_, seller_type) = field("TrdWhoAskType")?;

    Ok(TransactionRecord {
        tick,
        id,
        price,
        time,
        quantity,
        buyer_id,
        seller_id,
        buyer_type: buyer_type.to_string(),
        seller_type: seller_type.to_string(),
    })
}

impl<F: EngineFactory> RunStrategy for StepRunController<F> {
    fn execute(&self, spec: &RunSpecification, ctx: &mut RunContext) -> Result<Stats, RunError> {
        let mut engine = self.factory.create(spec.variant)?;
        let result = self.drive(engine.as_mut(), spec, ctx);
        if let Err(e) = engine.close() {
            tracing::warn!("engine teardown failed: {e}");
        }
        result
    }

    fn describe(&self) -> BTreeMap<String, Value> {
        let timing = self.settings.timing;
        let mut settings = BTreeMap::from([
            ("warmup_ticks".to_string(), Value::from(timing.warmup_ticks)),
            ("measure_ticks".to_string(), Value::from(timing.measure_ticks)),
            ("tail_window".to_string(), Value::from(timing.tail_window)),
            ("flush_window".to_string(), Value::from(timing.flush_window)),
        ]);
        for (name, value) in &self.settings.variables {
            settings.insert(name.clone(), value.clone());
        }
        settings
    }
}
