use std::path::PathBuf;

use clap::Args;
use miette::{Context, Result};
use tracing::info;
use xray_db::{UnpackOptions, Unpacker};

use super::format::FormatArgs;

#[derive(Args)]
pub struct UnpackArgs {
    /// An input DB archive
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// A target directory, defaults to the folder holding the archive
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    #[command(flatten)]
    format: FormatArgs,

    /// Only extract files whose path contains this text
    #[arg(long, value_name = "MASK")]
    flt: Option<String>,

    /// Walk the archive without writing anything
    #[arg(long, default_value_t = false)]
    ro: bool,
}

impl UnpackArgs {
    pub fn handle(&self, debug: bool) -> Result<()> {
        let destination = match &self.out {
            Some(out) => out.clone(),
            None => self
                .file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_default(),
        };

        let unpacker = Unpacker::new(
            UnpackOptions::builder()
                .maybe_version(self.format.version())
                .maybe_filter(self.flt.clone())
                .read_only(self.ro)
                .debug(debug)
                .build(),
        );

        let report = unpacker
            .process(&self.file, &destination)
            .context(format!("unpacking {}", self.file.display()))?;
        info!(
            "{} folders, {} files, {} filtered, {} failed",
            report.folders, report.files, report.filtered, report.failed
        );
        Ok(())
    }
}
