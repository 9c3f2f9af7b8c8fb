//! Sweep axes and the resolved run specifications built from them

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// Which market backend a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// In-process stochastic market
    #[default]
    Mock,
    /// External step-based engine process
    External,
}

impl EngineVariant {
    pub fn is_mock(self) -> bool {
        matches!(self, EngineVariant::Mock)
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineVariant::Mock => write!(f, "mock"),
            EngineVariant::External => write!(f, "external"),
        }
    }
}

/// A named sweep dimension with an explicit ordered list of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<Value>,
}

impl ParameterAxis {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The full configuration space of a sweep.
///
/// Nesting order of the product: `axes` in declaration order, then
/// `variants`, then the replicate index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpace {
    pub axes: Vec<ParameterAxis>,
    pub variants: Vec<EngineVariant>,
    pub replicates: usize,
}

impl Default for SweepSpace {
    fn default() -> Self {
        Self {
            axes: Vec::new(),
            variants: vec![EngineVariant::Mock],
            replicates: 1,
        }
    }
}

impl SweepSpace {
    /// Sizes of every dimension, including variant and replicate
    pub fn shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(ParameterAxis::len)
            .chain([self.variants.len(), self.replicates])
            .collect()
    }

    /// Number of runs in the sweep (product of all dimension sizes)
    pub fn total_runs(&self) -> usize {
        self.shape().iter().product()
    }

    /// True when at least one dimension is empty
    pub fn is_empty(&self) -> bool {
        self.total_runs() == 0
    }

    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }
}

/// One named parameter value of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

/// One fully resolved element of the sweep product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpecification {
    /// Position in builder order (0-based)
    pub run_index: usize,
    /// Swept parameter values, in axis order
    pub params: Vec<Param>,
    pub variant: EngineVariant,
    /// Replicate (sample) index within the parameter point
    pub replicate: usize,
}

impl RunSpecification {
    /// Look up a swept parameter by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Short human-readable label used in log lines
    pub fn label(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "#{} [{}] variant={} replicate={}",
            self.run_index, params, self.variant, self.replicate
        )
    }
}
