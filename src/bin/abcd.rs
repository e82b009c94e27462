mod opt_abcd;
mod opt_common;

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::opt_abcd::Opt;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use serde::Serialize;
use suep::abcd::{Abcd, Histogram};
use suep::compression::compress_writer;
use suep::prelude::*;

#[derive(Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    abcd: &'a Abcd,
    d_expected_total: f64,
    d_expected: Histogram,
    d_expected_var2: Histogram,
}

fn main() -> Result<()> {
    let args = opt_common::args()?;
    let opt = Opt::parse_from(args);
    opt_common::init_logging(&opt.loglevel);

    opt_common::log_version("suep-abcd");
    debug!("settings: {:#?}", opt);

    let def = opt.definition()?;
    let mut abcd = Abcd::new(def).context("Invalid ABCD definition")?;
    for infile in &opt.infiles {
        for record in read_records(infile)? {
            if opt.label.as_ref().map_or(true, |l| *l == record.label) {
                abcd.fill(&record);
            }
        }
    }
    abcd.normalise(opt.scale);
    info!("{abcd}");
    if abcd.undefined() > 0 {
        info!("{} records without ABCD variables", abcd.undefined());
    }
    info!("{} records failed the preselection", abcd.failed_preselection());

    if let Some(outfile) = &opt.outfile {
        let output = Output {
            abcd: &abcd,
            d_expected_total: abcd.d_expected_total(),
            d_expected: abcd.d_expected(),
            d_expected_var2: abcd.d_expected_var2(),
        };
        let file = File::create(outfile)
            .with_context(|| format!("Failed to create {outfile:?}"))?;
        let mut writer = compress_writer(BufWriter::new(file), opt.compression)
            .with_context(|| format!("Failed to create {outfile:?}"))?;
        serde_yaml::to_writer(&mut writer, &output)
            .with_context(|| format!("Failed to write to {outfile:?}"))?;
        writer.flush()?;
    }
    info!("done");
    Ok(())
}
