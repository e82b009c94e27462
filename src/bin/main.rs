mod opt;
mod opt_common;

use crate::opt::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use suep::prelude::*;

fn main() -> Result<()> {
    let args = opt_common::args()?;
    let opt = Opt::parse_from(args);
    opt_common::init_logging(&opt.loglevel);

    rayon::ThreadPoolBuilder::new()
        .num_threads(opt.threads)
        .build_global()?;

    opt_common::log_version("suep");
    debug!("settings: {:#?}", opt);

    let config = opt.analysis_config()?;
    debug!("analysis configuration: {:#?}", config);
    let analysis =
        Analysis::new(config).context("Invalid analysis configuration")?;

    let mut records = Vec::new();
    let mut summary = Summary::default();
    for infile in &opt.infiles {
        let events = read_events(infile)?;
        let (file_records, file_summary) = analysis.run(events);
        records.extend(file_records);
        summary += file_summary;
    }
    if opt.infiles.len() > 1 {
        info!("Total: {summary}");
    }
    write_records(&opt.outfile, &records, opt.compression)?;
    info!("done");
    Ok(())
}
