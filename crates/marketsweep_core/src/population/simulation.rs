use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::agents::{AgentParameters, AgentPopulation, DistributionParameters};
use super::finance::{FinanceModel, RiskyExpectations};
use super::market::Market;
use super::PopulationModel;
use crate::controller::Stats;
use crate::error::{EngineError, RunError};
use crate::model::Value;

/// Pseudo-observations given to the prior when agents update beliefs
const PRIOR_WEIGHT: f64 = 4.0;

/// Agents with limited attention trading through a market backend.
///
/// Each quarter, every agent pays attention with probability `attention`.
/// Attentive agents refresh their beliefs from the realized return history
/// and rebalance toward their optimal risky share; the aggregate rebalancing
/// becomes the broker's buy and sell limits for the quarter's session.
pub struct AttentionSimulation {
    finance: FinanceModel,
    attention: f64,
    q: usize,
    r: usize,
    /// Broker lots per unit of wealth
    lot_scale: f64,
    market: Box<dyn Market>,
    rng: SmallRng,
    population: Option<AgentPopulation>,
    prepared: bool,
    returns: Vec<f64>,
    buy_volume: u64,
    sell_volume: u64,
}

impl AttentionSimulation {
    pub fn new(
        finance: FinanceModel,
        attention: f64,
        q: usize,
        r: usize,
        market: Box<dyn Market>,
        seed: u64,
    ) -> Result<Self, RunError> {
        if !(0.0..=1.0).contains(&attention) {
            return Err(RunError::parameter(
                "attention",
                format!("must be a probability, got {attention}"),
            ));
        }
        Ok(Self {
            finance,
            attention,
            q,
            r,
            lot_scale: 100.0,
            market,
            rng: SmallRng::seed_from_u64(seed),
            population: None,
            prepared: false,
            returns: Vec::new(),
            buy_volume: 0,
            sell_volume: 0,
        })
    }

    pub fn with_lot_scale(mut self, lot_scale: f64) -> Self {
        self.lot_scale = lot_scale;
        self
    }

    pub fn quarters(&self) -> usize {
        self.q * self.r
    }

    pub fn population(&self) -> Option<&AgentPopulation> {
        self.population.as_ref()
    }

    /// Prior blended with the realized returns observed so far
    fn updated_beliefs(&self, prior: RiskyExpectations) -> RiskyExpectations {
        if self.returns.is_empty() {
            return prior;
        }
        let n = self.returns.len() as f64;
        let sum: f64 = self.returns.iter().sum();
        RiskyExpectations {
            risky_avg: (prior.risky_avg * PRIOR_WEIGHT + sum) / (PRIOR_WEIGHT + n),
            risky_std: prior.risky_std,
        }
    }

    /// Let attentive agents rebalance and return the broker limits in lots
    fn rebalance(&mut self) -> (u64, u64) {
        let beliefs = self.updated_beliefs(self.finance.risky_expectations());
        let Some(population) = self.population.as_mut() else {
            return (0, 0);
        };
        let rfree = population.parameters().rfree;

        let (mut buy, mut sell) = (0.0, 0.0);
        for agent in population.agents_mut() {
            if !self.rng.random_bool(self.attention) {
                continue;
            }
            agent.beliefs = beliefs;
            let target = beliefs.optimal_share(agent.crra, rfree);
            let delta = (target - agent.risky_share) * agent.wealth;
            if delta > 0.0 {
                buy += delta;
            } else {
                sell -= delta;
            }
            agent.risky_share = target;
        }
        (
            (buy * self.lot_scale).round() as u64,
            (sell * self.lot_scale).round() as u64,
        )
    }
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

impl PopulationModel for AttentionSimulation {
    fn initialize(
        &mut self,
        parameters: &AgentParameters,
        distributions: &DistributionParameters,
        per_class: usize,
    ) -> Result<(), RunError> {
        let population = AgentPopulation::new(
            *parameters,
            distributions,
            per_class,
            self.finance.risky_expectations(),
        )?;
        tracing::debug!(agents = population.len(), "population initialized");
        self.population = Some(population);
        self.prepared = false;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), RunError> {
        let population = self
            .population
            .as_mut()
            .ok_or_else(|| EngineError::Setup("population not initialized".to_string()))?;
        population.init_simulation(&mut self.rng);
        self.returns.clear();
        self.buy_volume = 0;
        self.sell_volume = 0;
        self.prepared = true;
        Ok(())
    }

    fn simulate_and_summarize(&mut self) -> Result<Stats, RunError> {
        if !self.prepared {
            return Err(EngineError::Step("simulation not prepared".to_string()).into());
        }

        for quarter in 0..self.quarters() {
            let (buy, sell) = self.rebalance();
            let ror = self.market.run_session(buy, sell)?;
            tracing::debug!(quarter, buy, sell, ror, "quarter finished");
            self.buy_volume += buy;
            self.sell_volume += sell;
            self.returns.push(ror);
            if let Some(population) = self.population.as_mut() {
                population.apply_return(ror);
                population.end_quarter(&mut self.rng);
            }
        }
        self.market.close()?;

        let (ror_mean, ror_std) = mean_and_std(&self.returns);
        let population = self
            .population
            .as_ref()
            .ok_or_else(|| EngineError::Step("population not initialized".to_string()))?;
        let total_wealth = population.total_wealth();
        let mean_wealth = if population.is_empty() {
            0.0
        } else {
            total_wealth / population.len() as f64
        };

        Ok(Stats::from([
            ("attention".to_string(), Value::from(self.attention)),
            ("dividend_ror".to_string(), Value::from(self.finance.dividend_ror)),
            ("dividend_std".to_string(), Value::from(self.finance.dividend_std)),
            ("q".to_string(), Value::from(self.q)),
            ("r".to_string(), Value::from(self.r)),
            ("agents".to_string(), Value::from(population.len())),
            ("quarters".to_string(), Value::from(self.returns.len())),
            ("total_wealth".to_string(), Value::from(total_wealth)),
            ("mean_wealth".to_string(), Value::from(mean_wealth)),
            (
                "mean_risky_share".to_string(),
                Value::from(population.mean_risky_share()),
            ),
            ("buy_volume".to_string(), Value::from(self.buy_volume)),
            ("sell_volume".to_string(), Value::from(self.sell_volume)),
            ("ror_mean".to_string(), Value::from(ror_mean)),
            ("ror_std".to_string(), Value::from(ror_std)),
        ]))
    }
}
