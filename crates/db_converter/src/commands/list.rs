use std::path::PathBuf;

use clap::Args;
use miette::{Context, Result};
use xray_db::DbArchive;

use super::format::FormatArgs;

#[derive(Args)]
pub struct ListArgs {
    /// An input DB archive
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[command(flatten)]
    format: FormatArgs,

    /// Only list files whose path contains this text
    #[arg(long, value_name = "MASK")]
    flt: Option<String>,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let db = DbArchive::open(&self.file, self.format.version())
            .context(format!("reading {}", self.file.display()))?;

        println!("{:>10} {:>10} {:>10} {:>8}  name", "offset", "size", "stored", "crc");
        let mask = self.flt.as_deref().filter(|m| !m.is_empty());
        for entry in db.entries() {
            if let Some(mask) = mask {
                if !entry.is_folder() && !entry.path.contains(mask) {
                    continue;
                }
            }

            let crc = entry
                .crc
                .map(|crc| format!("{crc:08x}"))
                .unwrap_or_else(|| "-".into());
            println!(
                "{:>10} {:>10} {:>10} {:>8}  {}",
                entry.offset, entry.size_real, entry.size_compressed, crc, entry.path
            );
        }

        if let Some(userdata) = db.userdata() {
            println!("user data: {} bytes", userdata.len());
        }
        Ok(())
    }
}
