use std::path::PathBuf;

use clap::Args;
use miette::{Context, Result};
use tracing::info;
use xray_db::{DbVersion, PackOptions, Packer};

use super::format::FormatArgs;

#[derive(Args)]
pub struct PackArgs {
    /// An input directory
    #[arg(value_name = "DIR")]
    directory: PathBuf,

    /// A target DB archive
    #[arg(short, long, value_name = "FILE")]
    out: PathBuf,

    #[command(flatten)]
    format: FormatArgs,

    /// File stored verbatim as the archive's user data (xdb only)
    #[arg(long = "xdb-ud", value_name = "FILE")]
    xdb_ud: Option<PathBuf>,

    /// Build the archive without writing it
    #[arg(long, default_value_t = false)]
    ro: bool,

    /// Leave folder records out of the directory table
    #[arg(long, default_value_t = false)]
    no_folders: bool,
}

impl PackArgs {
    pub fn handle(&self, debug: bool) -> Result<()> {
        let version = DbVersion::resolve(self.format.version(), &self.out)?;

        let packer = Packer::new(
            PackOptions::builder()
                .version(version)
                .maybe_userdata(self.xdb_ud.clone())
                .read_only(self.ro)
                .emit_folders(!self.no_folders)
                .debug(debug)
                .build(),
        );

        let report = packer
            .process(&self.directory, &self.out)
            .context(format!("packing {}", self.directory.display()))?;
        info!(
            "{} folders, {} files, {} bytes of payload, {} bytes written",
            report.folders, report.files, report.payload_bytes, report.archive_size
        );
        Ok(())
    }
}
