use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::compression::{auto_decompress, compress_writer, Compression};
use crate::event::{EventError, ParsedEvent, RawEvent};
use crate::record::Record;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("Failed to open {0}")]
    Open(PathBuf, #[source] std::io::Error),
    #[error("Failed to create {0}")]
    Create(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse {0}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("Failed to write to {0}")]
    Write(PathBuf, #[source] std::io::Error),
    #[error("Failed to serialise records to {0}")]
    Serialise(PathBuf, #[source] serde_yaml::Error),
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    debug!("Reading from {path:?}");
    let file = File::open(path).map_err(|err| IoError::Open(path.to_owned(), err))?;
    let reader = auto_decompress(BufReader::new(file))
        .map_err(|err| IoError::Open(path.to_owned(), err))?;
    serde_yaml::from_reader(reader).map_err(|err| IoError::Parse(path.to_owned(), err))
}

/// Read events from a (possibly compressed) YAML file
///
/// The file has to contain a sequence of event records. Records that
/// do not describe an event are returned as errors, so that they can be
/// skipped without losing the rest of the file.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<ParsedEvent>, IoError> {
    let path = path.as_ref();
    let records: Vec<serde_yaml::Value> = read_yaml(path)?;
    let events: Vec<ParsedEvent> = records
        .into_iter()
        .map(|record| {
            serde_yaml::from_value::<RawEvent>(record)
                .map_err(|err| EventError::Parse(err.to_string()))
        })
        .collect();
    let nbad = events.iter().filter(|e| e.is_err()).count();
    info!("Read {} events from {path:?}", events.len());
    if nbad > 0 {
        warn!("{nbad} records in {path:?} could not be parsed");
    }
    Ok(events)
}

/// Read analysis records from a (possibly compressed) YAML file
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, IoError> {
    let path = path.as_ref();
    let records: Vec<Record> = read_yaml(path)?;
    info!("Read {} records from {path:?}", records.len());
    Ok(records)
}

/// Write analysis records to a YAML file
pub fn write_records<P: AsRef<Path>>(
    path: P,
    records: &[Record],
    compression: Option<Compression>,
) -> Result<(), IoError> {
    let path = path.as_ref();
    info!("Writing {} records to {path:?}", records.len());
    let file = File::create(path).map_err(|err| IoError::Create(path.to_owned(), err))?;
    let mut writer = compress_writer(BufWriter::new(file), compression)
        .map_err(|err| IoError::Create(path.to_owned(), err))?;
    serde_yaml::to_writer(&mut writer, records)
        .map_err(|err| IoError::Serialise(path.to_owned(), err))?;
    writer.flush().map_err(|err| IoError::Write(path.to_owned(), err))
}
