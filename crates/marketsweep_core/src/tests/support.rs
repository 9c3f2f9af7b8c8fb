//! Deterministic engine used to exercise controller and sweep behavior.
//!
//! The engine produces `per_tick` transactions every tick. Faults are keyed
//! by the run seed, so with pinned seeds starting at zero they are keyed by
//! run index.

use std::collections::BTreeMap;
use std::path::Path;

use crate::controller::{SteppedSettings, TimingPolicy};
use crate::engine::{Engine, EngineFactory};
use crate::error::EngineError;
use crate::model::{EngineVariant, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Rejects the `SEED` assignment
    Configure,
    Setup,
    /// Step fails once the engine reaches this tick
    StepAt(i64),
    /// The terminal reporter `final-price` fails
    TerminalQuery,
    /// `length list_transactions` fails on this tick
    TickQueryAt(i64),
    /// The price field of the first transaction of this tick is malformed
    FieldAt(i64),
    /// Step panics once the engine reaches this tick
    PanicAt(i64),
}

pub struct ScriptedEngine {
    faults: BTreeMap<u64, Fault>,
    fault: Option<Fault>,
    per_tick: i64,
    variables: BTreeMap<String, Value>,
    ready: bool,
    ticks: i64,
}

impl ScriptedEngine {
    pub fn new(faults: BTreeMap<u64, Fault>, per_tick: i64) -> Self {
        Self {
            faults,
            fault: None,
            per_tick,
            variables: BTreeMap::new(),
            ready: false,
            ticks: 0,
        }
    }

    fn field(&self, index: i64, name: &str) -> Option<Value> {
        let id = self.ticks * 100 + index;
        let value = match name {
            "TrdID" => Value::Int(id),
            "TrdPrice" if self.fault == Some(Fault::FieldAt(self.ticks)) && index == 0 => {
                Value::Text("n/a".to_string())
            }
            "TrdPrice" => Value::Float(100.0 + index as f64),
            "TrdTime" => Value::Float(self.ticks as f64),
            "TrdQuant" => Value::Int(1),
            "TrdWhoBid" => Value::Int(1),
            "TrdWhoAsk" => Value::Int(2),
            "TrdWhoBidType" => Value::Text("LiqDem".to_string()),
            "TrdWhoAskType" => Value::Text("LiqSup".to_string()),
            _ => return None,
        };
        Some(value)
    }
}

impl Engine for ScriptedEngine {
    fn configure(&mut self, name: &str, value: &Value) -> Result<(), EngineError> {
        if name == "SEED" {
            let seed = value.as_i64().unwrap_or_default() as u64;
            self.fault = self.faults.get(&seed).cloned();
            if self.fault == Some(Fault::Configure) {
                return Err(EngineError::configuration(name, "rejected by script"));
            }
        }
        self.variables.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn setup(&mut self) -> Result<(), EngineError> {
        if self.fault == Some(Fault::Setup) {
            return Err(EngineError::Setup("scripted setup failure".to_string()));
        }
        self.ready = true;
        self.ticks = 0;
        Ok(())
    }

    fn step(&mut self) -> Result<(), EngineError> {
        if !self.ready {
            return Err(EngineError::Step("setup has not been run".to_string()));
        }
        self.ticks += 1;
        match self.fault {
            Some(Fault::StepAt(t)) if t == self.ticks => {
                Err(EngineError::Step(format!("scripted failure at tick {t}")))
            }
            Some(Fault::PanicAt(t)) if t == self.ticks => panic!("scripted panic at tick {t}"),
            _ => Ok(()),
        }
    }

    fn query(&mut self, expression: &str) -> Result<Value, EngineError> {
        if let Some(args) = expression.strip_prefix("prop_list_transactions ") {
            let (index, field) = args
                .split_once(' ')
                .ok_or_else(|| EngineError::query(expression, "malformed"))?;
            let index: i64 = index
                .parse()
                .map_err(|_| EngineError::query(expression, "bad index"))?;
            if index >= self.per_tick {
                return Err(EngineError::query(expression, "index out of range"));
            }
            return self
                .field(index, field.trim_matches('"'))
                .ok_or_else(|| EngineError::query(expression, "unknown field"));
        }
        match expression {
            "ticks" => Ok(Value::Int(self.ticks)),
            "length list_transactions" if self.fault == Some(Fault::TickQueryAt(self.ticks)) => {
                Err(EngineError::query(expression, "scripted tick failure"))
            }
            "length list_transactions" => Ok(Value::Int(self.per_tick)),
            "final-price" if self.fault == Some(Fault::TerminalQuery) => {
                Err(EngineError::query(expression, "scripted terminal failure"))
            }
            "final-price" => Ok(Value::Float(101.5)),
            name => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::query(expression, "unknown reporter")),
        }
    }
}

/// Creates scripted engines sharing one fault table
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub faults: BTreeMap<u64, Fault>,
    pub per_tick: i64,
}

impl ScriptedFactory {
    pub fn new(per_tick: i64) -> Self {
        Self {
            faults: BTreeMap::new(),
            per_tick,
        }
    }

    pub fn fault(mut self, seed: u64, fault: Fault) -> Self {
        self.faults.insert(seed, fault);
        self
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, _variant: EngineVariant) -> Result<Box<dyn Engine>, EngineError> {
        Ok(Box::new(ScriptedEngine::new(self.faults.clone(), self.per_tick)))
    }
}

/// Stepped settings writing transaction logs under `log_dir`
pub fn stepped_settings(log_dir: &Path, warmup: usize, measure: usize) -> SteppedSettings {
    SteppedSettings {
        timing: TimingPolicy {
            warmup_ticks: warmup,
            measure_ticks: measure,
            tail_window: 10,
            flush_window: 21,
        },
        reporters: vec![
            "ticks".to_string(),
            "final-price".to_string(),
            "endBurninTime".to_string(),
            "SEED".to_string(),
        ],
        log_dir: log_dir.to_path_buf(),
        ..SteppedSettings::default()
    }
}
