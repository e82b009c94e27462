use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use suep::cluster::JetAlgorithm;
use suep::compression::Compression;
use suep::config::AnalysisConfig;
use suep::shape::TensorKind;

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

/// Jet settings overriding the configuration file
#[derive(Debug, Copy, Clone, Parser)]
pub(crate) struct JetDefinition {
    #[clap(
        short = 'a',
        long,
        help = "Jet algorithm.
Possible settings are 'anti-kt', 'kt', 'Cambridge-Aachen',
or the exponent of a generalised kt algorithm."
    )]
    pub jetalgorithm: Option<JetAlgorithm>,
    /// Jet radius parameter.
    #[clap(short = 'R', long)]
    pub jetradius: Option<f64>,
    /// Minimum jet transverse momentum in GeV.
    #[clap(short = 'p', long)]
    pub jetpt: Option<f64>,
}

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Output file for the analysis records.
    #[clap(long, short, value_parser)]
    pub(crate) outfile: PathBuf,

    /// Analysis configuration in YAML format.
    ///
    /// Settings that are not given in the file take their default
    /// values. Command line options take precedence.
    #[clap(long, short, value_parser)]
    pub(crate) config: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) jet_def: JetDefinition,

    /// Label attached to each record.
    #[clap(long)]
    pub(crate) label: Option<String>,

    /// Compute shape variables in the laboratory frame.
    #[clap(long, default_value_t)]
    pub(crate) no_boost: bool,

    /// Momentum tensor, either 'spatial' or 'transverse'.
    #[clap(long)]
    pub(crate) tensor: Option<TensorKind>,

    /// Trigger that has to be fired, e.g. 'HLT_PFHT1050'.
    #[clap(long, conflicts_with = "no_trigger")]
    pub(crate) trigger: Option<String>,

    /// Do not require any trigger, even if one is set in the
    /// configuration file.
    #[clap(long, default_value_t)]
    pub(crate) no_trigger: bool,

    /// Maximum number of primary vertices.
    #[clap(long)]
    pub(crate) max_pv: Option<u32>,

    /// Keep all tracks, regardless of their quality.
    #[clap(long, default_value_t)]
    pub(crate) no_track_selection: bool,

    #[clap(long, help = COMPRESSION_HELP)]
    pub(crate) compression: Option<Compression>,

    #[clap(short, long, default_value = "Info", help = LOGLEVEL_HELP)]
    pub(crate) loglevel: String,

    #[clap(
        short,
        long,
        default_value_t,
        help = "Number of threads.

If set to 0, a default number of threads is chosen.
The default can be set with the `RAYON_NUM_THREADS` environment
variable."
    )]
    pub(crate) threads: usize,

    /// Input event files in YAML format, optionally compressed.
    #[clap(name = "INFILES", value_parser, required = true)]
    pub(crate) infiles: Vec<PathBuf>,
}

impl Opt {
    /// The analysis configuration with command line overrides applied
    pub(crate) fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open {path:?}"))?;
                AnalysisConfig::from_yaml_reader(BufReader::new(file))
                    .with_context(|| format!("Failed to read configuration from {path:?}"))?
            }
            None => AnalysisConfig::default(),
        };
        let JetDefinition {
            jetalgorithm,
            jetradius,
            jetpt,
        } = self.jet_def;
        if let Some(algorithm) = jetalgorithm {
            config.algorithm_exponent = algorithm.exponent();
        }
        if let Some(radius) = jetradius {
            config.radius = radius;
        }
        if let Some(pt) = jetpt {
            config.min_jet_pt = pt;
        }
        if let Some(label) = &self.label {
            config.label = label.clone();
        }
        if self.no_boost {
            config.boost_to_candidate_frame = false;
        }
        if let Some(tensor) = self.tensor {
            config.tensor = tensor;
        }
        if self.no_trigger {
            config.required_trigger = None;
        } else if let Some(trigger) = &self.trigger {
            config.required_trigger = Some(trigger.clone());
        }
        if self.max_pv.is_some() {
            config.max_pv_npvs = self.max_pv;
        }
        if self.no_track_selection {
            config.track_selection = None;
        }
        Ok(config)
    }
}
