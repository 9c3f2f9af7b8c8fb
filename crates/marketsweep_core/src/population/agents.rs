//! Heterogeneous consumer population holding a risky and a safe asset

use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::finance::RiskyExpectations;
use crate::builder::GridIndices;
use crate::error::RunError;

/// Equispaced grid `bot..=top` with `n` points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub bot: f64,
    pub top: f64,
    pub n: usize,
}

impl DistributionSpec {
    pub fn values(&self) -> Vec<f64> {
        match self.n {
            0 => Vec::new(),
            1 => vec![self.bot],
            n => (0..n)
                .map(|i| self.bot + (self.top - self.bot) * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
}

/// Distributed preference parameters, keyed by `CRRA` and `DiscFac`
pub type DistributionParameters = BTreeMap<String, DistributionSpec>;

pub fn default_distributions() -> DistributionParameters {
    BTreeMap::from([
        (
            "CRRA".to_string(),
            DistributionSpec {
                bot: 2.0,
                top: 10.0,
                n: 3,
            },
        ),
        (
            "DiscFac".to_string(),
            DistributionSpec {
                bot: 0.936,
                top: 0.978,
                n: 2,
            },
        ),
    ])
}

/// Parameters shared by every agent (quarterly)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParameters {
    pub a_nrm_init_mean: f64,
    pub a_nrm_init_std: f64,
    pub liv_prb: f64,
    pub perm_gro_fac: f64,
    pub p_lvl_init_mean: f64,
    pub rfree: f64,
    pub tran_shk_std: f64,
    pub perm_shk_std: f64,
}

impl Default for AgentParameters {
    fn default() -> Self {
        Self {
            a_nrm_init_mean: 1.0,
            a_nrm_init_std: 0.0,
            liv_prb: 0.98_f64.powf(0.25),
            perm_gro_fac: 1.01_f64.powf(0.25),
            p_lvl_init_mean: 1.0,
            rfree: 1.0,
            tran_shk_std: 0.1,
            perm_shk_std: 0.05,
        }
    }
}

/// One consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub crra: f64,
    pub disc_fac: f64,
    /// Permanent income level
    pub p_lvl: f64,
    /// End-of-period assets
    pub wealth: f64,
    pub risky_share: f64,
    /// The agent's current belief about the quarterly risky return
    pub beliefs: RiskyExpectations,
}

impl Agent {
    /// Quarterly marginal propensity to consume out of resources
    pub fn mpc(&self) -> f64 {
        (1.0 - self.disc_fac.powf(1.0 / self.crra)).clamp(0.0, 1.0)
    }
}

/// Draw `exp(N(-sigma^2/2, sigma))`, a mean-one lognormal shock
fn mean_one_shock<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 1.0;
    }
    let z: f64 = rng.sample(StandardNormal);
    (z * sigma - sigma * sigma / 2.0).exp()
}

/// Agents crossed over the distributed preference grids
#[derive(Debug, Clone)]
pub struct AgentPopulation {
    parameters: AgentParameters,
    agents: Vec<Agent>,
}

impl AgentPopulation {
    /// Build `per_class` agents for every (CRRA, DiscFac) class.
    ///
    /// Unknown distribution names are rejected; a missing one falls back to
    /// its default grid.
    pub fn new(
        parameters: AgentParameters,
        distributions: &DistributionParameters,
        per_class: usize,
        beliefs: RiskyExpectations,
    ) -> Result<Self, RunError> {
        if let Some(name) = distributions
            .keys()
            .find(|name| !matches!(name.as_str(), "CRRA" | "DiscFac"))
        {
            return Err(RunError::parameter(name.as_str(), "unknown distributed parameter"));
        }
        let defaults = default_distributions();
        let grid = |name: &str| {
            distributions
                .get(name)
                .or_else(|| defaults.get(name))
                .map(DistributionSpec::values)
                .unwrap_or_default()
        };
        let crra = grid("CRRA");
        let disc_fac = grid("DiscFac");

        if let Some(bad) = crra.iter().find(|&&c| c <= 0.0) {
            return Err(RunError::parameter("CRRA", format!("must be positive, got {bad}")));
        }
        if let Some(bad) = disc_fac.iter().find(|&&d| !(0.0..1.0).contains(&d)) {
            return Err(RunError::parameter("DiscFac", format!("must lie in [0, 1), got {bad}")));
        }

        let mut agents = Vec::with_capacity(crra.len() * disc_fac.len() * per_class);
        for idx in GridIndices::new(vec![crra.len(), disc_fac.len(), per_class]) {
            agents.push(Agent {
                crra: crra[idx[0]],
                disc_fac: disc_fac[idx[1]],
                p_lvl: parameters.p_lvl_init_mean,
                wealth: 0.0,
                risky_share: 0.0,
                beliefs,
            });
        }

        Ok(Self { parameters, agents })
    }

    pub fn parameters(&self) -> &AgentParameters {
        &self.parameters
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn newborn<R: Rng>(parameters: &AgentParameters, agent: &mut Agent, rng: &mut R) {
        agent.p_lvl = parameters.p_lvl_init_mean;
        agent.wealth = parameters.a_nrm_init_mean
            * mean_one_shock(rng, parameters.a_nrm_init_std)
            * agent.p_lvl;
        agent.risky_share = agent.beliefs.optimal_share(agent.crra, parameters.rfree);
    }

    /// Draw initial wealth and set each agent's risky share from its beliefs
    pub fn init_simulation<R: Rng>(&mut self, rng: &mut R) {
        let parameters = self.parameters;
        for agent in &mut self.agents {
            Self::newborn(&parameters, agent, rng);
        }
    }

    /// Apply one quarter's portfolio return to every agent
    pub fn apply_return(&mut self, risky_return: f64) {
        let rfree = self.parameters.rfree;
        for agent in &mut self.agents {
            let gross = agent.risky_share * risky_return + (1.0 - agent.risky_share) * rfree;
            agent.wealth *= gross;
        }
    }

    /// Income, consumption and mortality at the end of a quarter
    pub fn end_quarter<R: Rng>(&mut self, rng: &mut R) {
        let parameters = self.parameters;
        for agent in &mut self.agents {
            if !rng.random_bool(parameters.liv_prb.clamp(0.0, 1.0)) {
                Self::newborn(&parameters, agent, rng);
                continue;
            }
            agent.p_lvl *= parameters.perm_gro_fac * mean_one_shock(rng, parameters.perm_shk_std);
            let income = agent.p_lvl * mean_one_shock(rng, parameters.tran_shk_std);
            let resources = agent.wealth + income;
            agent.wealth = resources - agent.mpc() * resources;
        }
    }

    pub fn total_wealth(&self) -> f64 {
        self.agents.iter().map(|a| a.wealth).sum()
    }

    pub fn mean_risky_share(&self) -> f64 {
        if self.agents.is_empty() {
            return 0.0;
        }
        self.agents.iter().map(|a| a.risky_share).sum::<f64>() / self.agents.len() as f64
    }
}
