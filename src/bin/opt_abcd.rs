use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use suep::abcd::AbcdDefinition;
use suep::compression::Compression;
use suep::record::Variable;

use crate::opt_common::{COMPRESSION_HELP, LOGLEVEL_HELP};

#[derive(Debug, Parser)]
#[clap(about, author, version)]
pub(crate) struct Opt {
    /// Output file for the ABCD summary in YAML format.
    ///
    /// If not given, only a short summary is logged.
    #[clap(long, short, value_parser)]
    pub(crate) outfile: Option<PathBuf>,

    /// ABCD definition in YAML format.
    #[clap(long, short, value_parser)]
    pub(crate) config: Option<PathBuf>,

    /// Variable on the first axis, e.g. 'spher'.
    #[clap(long)]
    pub(crate) var1: Option<Variable>,

    /// Threshold for the first variable.
    #[clap(long)]
    pub(crate) var1_cut: Option<f64>,

    /// Variable on the second axis, e.g. 'nconst'.
    #[clap(long)]
    pub(crate) var2: Option<Variable>,

    /// Threshold for the second variable.
    #[clap(long)]
    pub(crate) var2_cut: Option<f64>,

    /// Include the signal region.
    ///
    /// Should only be used for simulated events.
    #[clap(long, default_value_t)]
    pub(crate) unblind: bool,

    /// Only consider records with this label.
    #[clap(long)]
    pub(crate) label: Option<String>,

    /// Factor applied to all histograms, e.g. cross section over
    /// sum of generated weights.
    #[clap(long, default_value = "1.")]
    pub(crate) scale: f64,

    #[clap(long, help = COMPRESSION_HELP)]
    pub(crate) compression: Option<Compression>,

    #[clap(short, long, default_value = "Info", help = LOGLEVEL_HELP)]
    pub(crate) loglevel: String,

    /// Input record files.
    #[clap(name = "INFILES", value_parser, required = true)]
    pub(crate) infiles: Vec<PathBuf>,
}

impl Opt {
    /// The ABCD definition with command line overrides applied
    pub(crate) fn definition(&self) -> Result<AbcdDefinition> {
        let mut def: AbcdDefinition = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open {path:?}"))?;
                serde_yaml::from_reader(BufReader::new(file)).with_context(
                    || format!("Failed to read ABCD definition from {path:?}"),
                )?
            }
            None => AbcdDefinition::default(),
        };
        if let Some(var) = self.var1 {
            def.var1 = var;
        }
        if let Some(cut) = self.var1_cut {
            def.var1_cut = cut;
        }
        if let Some(var) = self.var2 {
            def.var2 = var;
        }
        if let Some(cut) = self.var2_cut {
            def.var2_cut = cut;
        }
        if self.unblind {
            def.blind = false;
        }
        Ok(def)
    }
}
