//! Step-based simulation engines.
//!
//! An [`Engine`] is a black-box stateful model driven through a uniform
//! "set variable / advance one tick / report expression" surface. One engine
//! instance is created per run and is owned by the worker executing that run;
//! engines are never shared between runs, so implementations need not be
//! `Sync`.

mod mock;
mod process;

pub use mock::{MockMarketEngine, TraderKind};
pub use process::{ExternalCommand, ProcessEngine, parse_reply};

use crate::error::EngineError;
use crate::model::{EngineVariant, Value};

/// Uniform control surface of a step-based engine
pub trait Engine {
    /// Assign a model variable. Must complete before the first `step`.
    fn configure(&mut self, name: &str, value: &Value) -> Result<(), EngineError>;

    /// Run the model's setup routine after variables are assigned
    fn setup(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Advance the model by one discrete tick
    fn step(&mut self) -> Result<(), EngineError>;

    /// Evaluate a report expression against the current model state.
    ///
    /// Must tolerate being called immediately after `step`.
    fn query(&mut self, expression: &str) -> Result<Value, EngineError>;

    /// Release engine resources. Called once at the end of a run.
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Advance the model by `n` ticks
    fn repeat_step(&mut self, n: usize) -> Result<(), EngineError> {
        for _ in 0..n {
            self.step()?;
        }
        Ok(())
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn configure(&mut self, name: &str, value: &Value) -> Result<(), EngineError> {
        (**self).configure(name, value)
    }

    fn setup(&mut self) -> Result<(), EngineError> {
        (**self).setup()
    }

    fn step(&mut self) -> Result<(), EngineError> {
        (**self).step()
    }

    fn query(&mut self, expression: &str) -> Result<Value, EngineError> {
        (**self).query(expression)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        (**self).close()
    }
}

/// Creates a fresh engine for each run.
///
/// Factories are shared by all workers of a sweep, the engines they create
/// are not.
pub trait EngineFactory: Send + Sync {
    fn create(&self, variant: EngineVariant) -> Result<Box<dyn Engine>, EngineError>;
}

/// Default factory: in-process mock market, or an external engine process
#[derive(Debug, Clone, Default)]
pub struct EngineSelector {
    pub external: Option<ExternalCommand>,
}

impl EngineSelector {
    pub fn new(external: Option<ExternalCommand>) -> Self {
        Self { external }
    }
}

impl EngineFactory for EngineSelector {
    fn create(&self, variant: EngineVariant) -> Result<Box<dyn Engine>, EngineError> {
        match variant {
            EngineVariant::Mock => Ok(Box::new(MockMarketEngine::new())),
            EngineVariant::External => {
                let command = self.external.as_ref().ok_or_else(|| {
                    EngineError::Unavailable("no external engine program configured".to_string())
                })?;
                Ok(Box::new(ProcessEngine::spawn(command)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_without_external_program() {
        let selector = EngineSelector::default();
        assert!(selector.create(EngineVariant::Mock).is_ok());
        let err = selector.create(EngineVariant::External).err().unwrap();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}
