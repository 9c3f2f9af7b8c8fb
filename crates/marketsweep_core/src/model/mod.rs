mod metadata;
mod records;
mod spec;
mod value;

pub use metadata::{SweepKind, SweepMetadata};
pub use records::{
    ErrorKind, ErrorRecord, RunOutcome, RunPhase, StatsRecord, TransactionRecord,
};
pub use spec::{EngineVariant, Param, ParameterAxis, RunSpecification, SweepSpace};
pub use value::Value;
