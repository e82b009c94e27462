//! `suep` is a crate for the analysis of events with soft unclustered
//! energy patterns (SUEPs).
//!
//! Tracks are reclustered into large-radius jets with a generalised kt
//! algorithm. Out of the two hardest jets, the one with more
//! constituents is taken as the SUEP candidate and the other one as
//! initial-state radiation (ISR). The shape of the SUEP candidate is
//! then characterised in its rest frame.
//!
//! # How to use
//!
//! ```no_run
//! use suep::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let analysis = Analysis::new(AnalysisConfig::default())?;
//! let events = read_events("events.yml.zst")?;
//! let (records, summary) = analysis.run(events);
//! println!("{summary}");
//! write_records("records.yml", &records, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Most relevant modules
//!
//! - [prelude] exports a list of the most relevant classes and objects
//! - [analysis] runs the per-event analysis
//! - [cluster] for the jet clustering
//! - [shape] for event shape observables
//! - [abcd] for the ABCD background estimate
//!

/// ABCD background estimate
pub mod abcd;
/// Per-event analysis
pub mod analysis;
/// SUEP and ISR candidate selection
pub mod candidates;
/// Jet clustering
pub mod cluster;
/// Input and output compression
pub mod compression;
/// Analysis configuration
pub mod config;
/// Collision event class
pub mod event;
/// Four-vector class
pub mod four_vector;
/// Reading events and writing records
pub mod io;
/// Most important exports
pub mod prelude;
/// Progress bar
pub mod progress_bar;
/// Analysis output
pub mod record;
/// Event shape observables
pub mod shape;
/// Common traits
pub mod traits;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_REV: Option<&str> = option_env!("VERGEN_GIT_SHA");
pub const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
