//! Market backends for population sweeps.
//!
//! A market turns the broker's buy and sell limits for one quarter into a
//! realized gross return of the risky asset.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::finance::{FinanceModel, RiskyExpectations};
use crate::engine::Engine;
use crate::error::{EngineError, RunError};
use crate::model::Value;

pub trait Market {
    /// Run one quarter's trading session and return the realized gross
    /// risky return
    fn run_session(&mut self, buy_limit: u64, sell_limit: u64) -> Result<f64, RunError>;

    fn close(&mut self) -> Result<(), RunError> {
        Ok(())
    }
}

/// Lognormal price process with a small linear impact of net broker demand
pub struct MockMarket {
    rng: SmallRng,
    mu: f64,
    sigma: f64,
    impact: f64,
}

impl MockMarket {
    pub fn new(expectations: RiskyExpectations, seed: u64) -> Self {
        let (mu, sigma) = expectations.lognormal_params();
        Self {
            rng: SmallRng::seed_from_u64(seed),
            mu,
            sigma,
            impact: 0.001,
        }
    }

    pub fn with_impact(mut self, impact: f64) -> Self {
        self.impact = impact;
        self
    }
}

impl Market for MockMarket {
    fn run_session(&mut self, buy_limit: u64, sell_limit: u64) -> Result<f64, RunError> {
        let z: f64 = self.rng.sample(StandardNormal);
        let total = (buy_limit + sell_limit) as f64;
        let pressure = if total > 0.0 {
            (buy_limit as f64 - sell_limit as f64) / total
        } else {
            0.0
        };
        Ok((self.mu + self.sigma * z).exp() * (1.0 + self.impact * pressure))
    }
}

/// Market backed by a step-based engine; each session is a fresh setup
/// of the engine with the broker programme for the quarter
pub struct EngineMarket {
    engine: Box<dyn Engine>,
    seed: u64,
    session_ticks: usize,
    dividend_yield: f64,
    sessions: u64,
}

impl EngineMarket {
    pub fn new(
        engine: Box<dyn Engine>,
        seed: u64,
        session_ticks: usize,
        finance: &FinanceModel,
    ) -> Self {
        Self {
            engine,
            seed,
            session_ticks,
            dividend_yield: finance.quarterly_yield(),
            sessions: 0,
        }
    }

    fn price(&mut self) -> Result<f64, EngineError> {
        let value = self.engine.query("last-price")?;
        value
            .as_f64()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| {
                EngineError::query("last-price", format!("expected a positive price, got {value}"))
            })
    }
}

impl Market for EngineMarket {
    fn run_session(&mut self, buy_limit: u64, sell_limit: u64) -> Result<f64, RunError> {
        let seed = self.seed.wrapping_add(self.sessions);
        self.sessions += 1;

        let assignments = [
            ("SEED", Value::from(seed)),
            ("BkrBuy_Limit", Value::from(buy_limit)),
            ("BkrSel_Limit", Value::from(sell_limit)),
            ("PeriodtoEndExecution", Value::from(self.session_ticks)),
        ];
        for (name, value) in &assignments {
            self.engine.configure(name, value)?;
        }
        self.engine.setup()?;
        self.engine.configure("endBurninTime", &Value::Int(0))?;

        let opening = self.price()?;
        self.engine.repeat_step(self.session_ticks)?;
        let closing = self.price()?;
        tracing::debug!(buy_limit, sell_limit, opening, closing, "market session finished");

        Ok(closing / opening + self.dividend_yield)
    }

    fn close(&mut self) -> Result<(), RunError> {
        Ok(self.engine.close()?)
    }
}
