use std::ffi::OsString;

use anyhow::{Context, Result};
use env_logger::Env;
use log::info;
use suep::{GIT_BRANCH, GIT_REV, VERSION};

pub(crate) const LOGLEVEL_HELP: &str = "Verbosity level.
Possible values with increasing amount of output are
'off', 'error', 'warn', 'info', 'debug', 'trace'.
The default can be overridden with the `SUEP_LOG` environment variable.\n";

pub(crate) const COMPRESSION_HELP: &str = "Compress output file.
Possible settings are 'bzip2', 'gzip', 'zstd', 'lz4'.
Compression levels can be set with algorithm_level e.g. 'zstd_5'.
Maximum levels are 'gzip_9', 'zstd_19', 'lz4_16'.";

/// Command line arguments with `@file` arguments expanded
pub(crate) fn args() -> Result<Vec<OsString>> {
    argfile::expand_args_from(
        std::env::args_os(),
        argfile::parse_fromfile,
        argfile::PREFIX,
    )
    .with_context(|| "Failed to read argument file")
}

pub(crate) fn init_logging(loglevel: &str) {
    let env = Env::default().filter_or("SUEP_LOG", loglevel);
    env_logger::init_from_env(env);
}

pub(crate) fn log_version(name: &str) {
    if let (Some(rev), Some(branch)) = (GIT_REV, GIT_BRANCH) {
        info!("{name} {VERSION} rev {rev} ({branch})");
    } else {
        info!("{name} {VERSION}");
    }
}
