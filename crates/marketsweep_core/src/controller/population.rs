//! Run controller for population sweeps

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RunContext, RunStrategy, Stats};
use crate::engine::EngineFactory;
use crate::error::RunError;
use crate::model::{EngineVariant, RunPhase, RunSpecification, Value};
use crate::population::{
    AgentParameters, AttentionSimulation, DistributionParameters, EngineMarket, FinanceModel,
    Market, MockMarket, PopulationModel, default_distributions,
};

/// Swept parameter names a population run understands
pub const POPULATION_PARAMETERS: [&str; 3] = ["attention", "dividend_ror", "dividend_std"];

/// Settings shared by every run of a population sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationSettings {
    /// Agents per (CRRA, DiscFac) class
    pub pop_n: usize,
    pub q: usize,
    pub r: usize,
    pub agent: AgentParameters,
    pub distributions: DistributionParameters,
    /// Attention probability when not swept
    pub attention: f64,
    /// Dividend process when not swept
    pub finance: FinanceModel,
    /// Ticks per engine-backed market session
    pub session_ticks: usize,
    /// Drive the `mock` variant through the in-process market engine
    /// instead of the lognormal price process
    pub engine_market: bool,
    pub lot_scale: f64,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            pop_n: 25,
            q: 2,
            r: 2,
            agent: AgentParameters::default(),
            distributions: default_distributions(),
            attention: 0.05,
            finance: FinanceModel::default(),
            session_ticks: 50,
            engine_market: false,
            lot_scale: 100.0,
        }
    }
}

/// Drives one [`AttentionSimulation`] per run
pub struct PopulationRunController<F> {
    factory: F,
    settings: PopulationSettings,
}

impl<F: EngineFactory> PopulationRunController<F> {
    pub fn new(factory: F, settings: PopulationSettings) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &PopulationSettings {
        &self.settings
    }

    fn number(spec: &RunSpecification, name: &str, default: f64) -> Result<f64, RunError> {
        match spec.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| RunError::parameter(name, format!("expected a number, got {value}"))),
        }
    }

    fn market(
        &self,
        variant: EngineVariant,
        finance: &FinanceModel,
        seed: u64,
    ) -> Result<Box<dyn Market>, RunError> {
        if variant.is_mock() && !self.settings.engine_market {
            return Ok(Box::new(MockMarket::new(finance.risky_expectations(), seed)));
        }
        let engine = self.factory.create(variant)?;
        Ok(Box::new(EngineMarket::new(
            engine,
            seed,
            self.settings.session_ticks,
            finance,
        )))
    }
}

impl<F: EngineFactory> RunStrategy for PopulationRunController<F> {
    fn execute(&self, spec: &RunSpecification, ctx: &mut RunContext) -> Result<Stats, RunError> {
        if let Some(param) = spec
            .params
            .iter()
            .find(|p| !POPULATION_PARAMETERS.contains(&p.name.as_str()))
        {
            return Err(RunError::parameter(
                param.name.as_str(),
                "not a population model parameter",
            ));
        }

        let defaults = &self.settings;
        let finance = FinanceModel::new(
            Self::number(spec, "dividend_ror", defaults.finance.dividend_ror)?,
            Self::number(spec, "dividend_std", defaults.finance.dividend_std)?,
        )?;
        let attention = Self::number(spec, "attention", defaults.attention)?;
        let market = self.market(spec.variant, &finance, ctx.seed())?;

        let mut model = AttentionSimulation::new(
            finance,
            attention,
            defaults.q,
            defaults.r,
            market,
            ctx.seed(),
        )?
        .with_lot_scale(defaults.lot_scale);

        model.initialize(&defaults.agent, &defaults.distributions, defaults.pop_n)?;
        ctx.advance(RunPhase::Configured);
        model.prepare()?;
        ctx.advance(RunPhase::WarmedUp);
        ctx.advance(RunPhase::Measuring);
        let stats = model.simulate_and_summarize()?;
        ctx.measured_ticks = model.quarters();
        Ok(stats)
    }

    fn describe(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("pop_n".to_string(), Value::from(self.settings.pop_n)),
            ("q".to_string(), Value::from(self.settings.q)),
            ("r".to_string(), Value::from(self.settings.r)),
            (
                "session_ticks".to_string(),
                Value::from(self.settings.session_ticks),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSelector;
    use crate::model::Param;

    fn spec(params: Vec<(&str, Value)>, variant: EngineVariant) -> RunSpecification {
        RunSpecification {
            run_index: 0,
            params: params
                .into_iter()
                .map(|(name, value)| Param {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            variant,
            replicate: 0,
        }
    }

    fn controller() -> PopulationRunController<EngineSelector> {
        let settings = PopulationSettings {
            pop_n: 2,
            ..PopulationSettings::default()
        };
        PopulationRunController::new(EngineSelector::default(), settings)
    }

    #[test]
    fn test_mock_run_summary() {
        let spec = spec(
            vec![
                ("attention", Value::Float(0.08)),
                ("dividend_ror", Value::Float(0.1)),
                ("dividend_std", Value::Float(0.01)),
            ],
            EngineVariant::Mock,
        );
        let mut ctx = RunContext::new(42);
        let stats = controller().execute(&spec, &mut ctx).unwrap();
        assert_eq!(stats["dividend_ror"], Value::Float(0.1));
        assert_eq!(stats["attention"], Value::Float(0.08));
        assert_eq!(stats["agents"], Value::Int(12));
        assert_eq!(ctx.phase(), RunPhase::Measuring);
    }

    #[test]
    fn test_unknown_parameter_is_configuration_error() {
        let spec = spec(vec![("bogus", Value::Int(1))], EngineVariant::Mock);
        let mut ctx = RunContext::new(1);
        let err = controller().execute(&spec, &mut ctx).err().unwrap();
        assert_eq!(err.kind(), crate::model::ErrorKind::Configuration);
        assert_eq!(ctx.phase(), RunPhase::Uninitialized);
    }

    #[test]
    fn test_engine_backed_market() {
        let settings = PopulationSettings {
            pop_n: 1,
            q: 1,
            r: 1,
            session_ticks: 10,
            engine_market: true,
            ..PopulationSettings::default()
        };
        let controller = PopulationRunController::new(EngineSelector::default(), settings);
        let spec = spec(vec![], EngineVariant::Mock);
        let stats = controller.execute(&spec, &mut RunContext::new(3)).unwrap();
        assert_eq!(stats["quarters"], Value::Int(1));
    }

    #[test]
    fn test_external_market_without_program() {
        let spec = spec(vec![], EngineVariant::External);
        let err = controller()
            .execute(&spec, &mut RunContext::new(3))
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::model::ErrorKind::Configuration);
    }
}
