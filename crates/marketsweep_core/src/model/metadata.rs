//! Sweep-level metadata written once at the end of a sweep

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineVariant, ParameterAxis, Value};

/// Which run strategy a sweep drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    /// Step-based market engine with warm-up and tail-windowed measurement
    #[default]
    Stepped,
    /// Agent population simulated against a market backend
    Population,
}

/// Description of one completed sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepMetadata {
    pub kind: SweepKind,
    /// Timestamp label shared by every artifact of the sweep
    pub label: String,
    pub start: jiff::Timestamp,
    pub end: jiff::Timestamp,
    pub axes: Vec<ParameterAxis>,
    pub variants: Vec<EngineVariant>,
    pub replicates: usize,
    pub run_count: usize,
    pub good_count: usize,
    pub bad_count: usize,
    /// Model and timing parameters shared by every run
    pub settings: BTreeMap<String, Value>,
}
