//! Consumer-population model coupled to a market backend.
//!
//! The model is driven through three calls, in order: [`PopulationModel::initialize`],
//! [`PopulationModel::prepare`] and [`PopulationModel::simulate_and_summarize`].

mod agents;
mod finance;
mod market;
mod simulation;

pub use agents::{
    Agent, AgentParameters, AgentPopulation, DistributionParameters, DistributionSpec,
    default_distributions,
};
pub use finance::{FinanceModel, RiskyExpectations};
pub use market::{EngineMarket, Market, MockMarket};
pub use simulation::AttentionSimulation;

use crate::controller::Stats;
use crate::error::RunError;

/// Population-level simulation contract
pub trait PopulationModel {
    /// Build the population from shared and distributed parameters
    fn initialize(
        &mut self,
        parameters: &AgentParameters,
        distributions: &DistributionParameters,
        per_class: usize,
    ) -> Result<(), RunError>;

    /// Draw initial states; the population analogue of warm-up
    fn prepare(&mut self) -> Result<(), RunError>;

    fn simulate_and_summarize(&mut self) -> Result<Stats, RunError>;
}
