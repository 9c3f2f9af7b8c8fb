//! Sweep configuration file.
//!
//! A sweep is described by one YAML document. Every field is optional; an
//! empty file runs a single mock stepped run with default timing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use marketsweep_core::aggregate::RESERVED_COLUMNS;
use marketsweep_core::controller::{PopulationSettings, SeedPolicy, SteppedSettings};
use marketsweep_core::dispatch::{DispatchPolicy, default_parallelism};
use marketsweep_core::engine::ExternalCommand;
use marketsweep_core::model::{EngineVariant, ParameterAxis, SweepKind, SweepSpace};
use marketsweep_core::sweep::SweepPlan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where each run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Worker threads of this process
    #[default]
    Thread,
    /// One child process per run
    Process,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(String),
    #[error("the external engine variant requires an `external.program`")]
    MissingExternalProgram,
    #[error("axis `{0}` is declared more than once")]
    DuplicateAxis(String),
    #[error("axis `{0}` clashes with a fixed result column")]
    ReservedAxisName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub kind: SweepKind,
    /// Directory receiving the study, errors and metadata artifacts
    pub output_dir: PathBuf,
    /// Directory of `marketsweep.log`; relative transaction log directories
    /// are resolved against it
    pub log_dir: PathBuf,
    pub dispatch: DispatchPolicy,
    pub isolation: Isolation,
    /// Concurrent runs; defaults to the number of hardware threads
    pub parallelism: Option<usize>,
    /// Base seed; runs draw random seeds when unset
    pub seed: Option<u64>,
    pub axes: Vec<ParameterAxis>,
    pub variants: Vec<EngineVariant>,
    pub replicates: usize,
    pub stepped: SteppedSettings,
    pub population: PopulationSettings,
    pub external: Option<ExternalCommand>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            kind: SweepKind::default(),
            output_dir: PathBuf::from("results"),
            log_dir: PathBuf::from("logs"),
            dispatch: DispatchPolicy::default(),
            isolation: Isolation::default(),
            parallelism: None,
            seed: None,
            axes: Vec::new(),
            variants: vec![EngineVariant::Mock],
            replicates: 1,
            stepped: SteppedSettings::default(),
            population: PopulationSettings::default(),
            external: None,
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl SweepSettings {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
    }

    /// Check the settings before any run starts.
    ///
    /// Windows longer than the measurement phase are clamped to it. Sweeps
    /// that resolve to zero runs are allowed but warned about.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for axis in &self.axes {
            if RESERVED_COLUMNS.contains(&axis.name.as_str()) {
                return Err(ConfigError::ReservedAxisName(axis.name.clone()));
            }
            if !seen.insert(axis.name.as_str()) {
                return Err(ConfigError::DuplicateAxis(axis.name.clone()));
            }
        }

        let needs_external = self.variants.contains(&EngineVariant::External);
        let has_program = self
            .external
            .as_ref()
            .is_some_and(|command| !command.program.as_os_str().is_empty());
        if needs_external && !has_program {
            return Err(ConfigError::MissingExternalProgram);
        }

        let timing = &mut self.stepped.timing;
        if timing.tail_window > timing.measure_ticks {
            tracing::warn!(
                tail_window = timing.tail_window,
                measure_ticks = timing.measure_ticks,
                "tail window clamped to the measurement phase"
            );
            timing.tail_window = timing.measure_ticks;
        }
        timing.flush_window = timing.flush_window.min(timing.measure_ticks);

        if self.replicates == 0 {
            tracing::warn!("replicates is 0; the sweep has no runs");
        }
        if self.variants.is_empty() {
            tracing::warn!("no engine variants configured; the sweep has no runs");
        }
        for axis in self.axes.iter().filter(|axis| axis.is_empty()) {
            tracing::warn!("axis `{}` has no values; the sweep has no runs", axis.name);
        }
        Ok(())
    }

    pub fn space(&self) -> SweepSpace {
        SweepSpace {
            axes: self.axes.clone(),
            variants: self.variants.clone(),
            replicates: self.replicates,
        }
    }

    #[must_use]
    pub fn seeds(&self) -> SeedPolicy {
        SeedPolicy::from_option(self.seed)
    }

    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(default_parallelism).max(1)
    }

    /// Directory of the per-run transaction logs
    pub fn transaction_dir(&self) -> PathBuf {
        if self.stepped.log_dir.is_absolute() {
            self.stepped.log_dir.clone()
        } else {
            self.log_dir.join(&self.stepped.log_dir)
        }
    }

    pub fn plan(&self) -> SweepPlan {
        SweepPlan {
            policy: self.dispatch,
            parallelism: self.parallelism(),
            seeds: self.seeds(),
            ..SweepPlan::new(self.kind, self.space(), &self.output_dir)
        }
    }
}
