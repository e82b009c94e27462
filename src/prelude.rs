pub use crate::{
    abcd::{Abcd, AbcdDefinition, Region},
    analysis::{Analysis, Summary},
    candidates::{Role, Selection},
    cluster::{cluster, Jet, JetAlgorithm, JetDefinition},
    compression::Compression,
    config::{AnalysisConfig, AnalysisConfigBuilder},
    event::{Event, EventBuilder, EventConverter, RawEvent},
    four_vector::FourVector,
    io::{read_events, read_records, write_records},
    record::{Outcome, Record, Variable},
    shape::{EventShape, JetObservables, TensorKind},
    traits::TryConvert,
};
