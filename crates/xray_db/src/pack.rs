//! Building a DB archive from a directory tree

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use bon::Builder;
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::version::DbVersion;
use crate::write::{DbWriter, DbWriterOptions};

/// Options controlling a pack run
#[derive(Debug, Clone, Builder)]
pub struct PackOptions {
    /// Target archive version, one of the writable ones
    pub version: DbVersion,

    /// File whose bytes are stored verbatim in the USERDATA chunk (XDB only)
    #[builder(into)]
    pub userdata: Option<PathBuf>,

    /// Build the archive in memory and write nothing to the destination
    #[builder(default)]
    pub read_only: bool,

    /// Write explicit folder records into the directory table
    #[builder(default = true)]
    pub emit_folders: bool,

    /// Log per entry details at `INFO` instead of `DEBUG`
    #[builder(default)]
    pub debug: bool,
}

/// What a pack run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackReport {
    /// Folders found below the source
    pub folders: usize,
    /// Files stored
    pub files: usize,
    /// Sum of the stored file sizes
    pub payload_bytes: u64,
    /// Size of the finished archive
    pub archive_size: u64,
}

/// Builds archives according to [`PackOptions`]
#[derive(Debug, Clone)]
pub struct Packer {
    options: PackOptions,
}

impl Packer {
    /// Create a packer
    pub fn new(options: PackOptions) -> Self {
        Self { options }
    }

    /// Pack the tree below `source` into the archive `destination`
    #[instrument(skip_all, err, fields(source = %source.as_ref().display()))]
    pub fn process(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<PackReport> {
        let (source, destination) = (source.as_ref(), destination.as_ref());
        let version = self.options.version;
        if !version.is_writable() {
            return Err(Error::UnsupportedVersion(version));
        }
        if self.options.userdata.is_some() && !version.has_userdata() {
            return Err(Error::UserdataNotSupported(version));
        }
        if !source.is_dir() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }

        info!(%version, destination = %destination.display(), "packing");
        if self.options.read_only {
            let (_, report) = self.pack_to(source, Cursor::new(Vec::new()))?;
            return Ok(report);
        }

        if let Some(folder) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !folder.is_dir() {
                info!(folder = %folder.display(), "destination folder doesn't exist, creating");
                fs::create_dir_all(folder)?;
            }
        }

        let (_, report) = self.pack_to(source, BufWriter::new(File::create(destination)?))?;
        Ok(report)
    }

    /// Pack the tree below `source` into `sink`, returning the sink once the archive is finished
    pub fn pack_to<W: Write + Seek>(&self, source: &Path, sink: W) -> Result<(W, PackReport)> {
        let mut writer = DbWriter::new(
            sink,
            DbWriterOptions::builder()
                .version(self.options.version)
                .emit_folders(self.options.emit_folders)
                .build(),
        )?;
        let mut report = PackReport::default();

        if let Some(path) = &self.options.userdata {
            match fs::read(path) {
                Ok(data) => writer.write_userdata(&data)?,
                Err(e) => error!(path = %path.display(), "failed to load user data: {e}"),
            }
        }

        let (folders, files) = collect_tree(source)?;

        for folder in &folders {
            self.log_entry("folder", &String::from_utf8_lossy(folder), 0);
            writer.add_folder(folder)?;
            report.folders += 1;
        }

        for (name, path) in &files {
            let data = match fs::read(path) {
                Ok(data) => data,
                Err(e) => {
                    error!(path = %path.display(), "failed to load: {e}");
                    continue;
                }
            };
            self.log_entry("file", &String::from_utf8_lossy(name), data.len());

            writer.start_file(name)?;
            writer.write_all(&data)?;
            report.files += 1;
            report.payload_bytes += data.len() as u64;
        }

        let mut sink = writer.finish()?;
        report.archive_size = sink.stream_position()?;
        info!(
            folders = report.folders,
            files = report.files,
            size = report.archive_size,
            "packed"
        );

        Ok((sink, report))
    }

    fn log_entry(&self, kind: &str, name: &str, size: usize) {
        if self.options.debug {
            info!(kind, name, size);
        } else {
            debug!(kind, name, size);
        }
    }
}

/// Folders and files below `root` as `/` separated relative names, each list sorted by lower
/// case path component
///
/// Names are the file system's bytes, so names in legacy encodings survive a round trip.
fn collect_tree(root: &Path) -> Result<(Vec<Vec<u8>>, Vec<(Vec<u8>, PathBuf)>)> {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IOError(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(parts) = relative
            .components()
            .map(|c| name_bytes(c.as_os_str()))
            .collect::<Option<Vec<_>>>()
        else {
            error!(
                path = %entry.path().display(),
                "{}",
                Error::UndecodableName(relative.display().to_string())
            );
            continue;
        };
        let name = parts.join(&b'/').to_ascii_lowercase();

        if entry.file_type().is_dir() {
            folders.push(name);
        } else if entry.file_type().is_file() {
            files.push((name, entry.into_path()));
        }
    }

    folders.sort_by(|a, b| components(a).cmp(components(b)));
    files.sort_by(|(a, _), (b, _)| components(a).cmp(components(b)));
    Ok((folders, files))
}

fn components(name: &[u8]) -> impl Iterator<Item = &[u8]> {
    name.split(|&b| b == b'/')
}

#[cfg(unix)]
fn name_bytes(part: &OsStr) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;

    Some(part.as_bytes())
}

#[cfg(not(unix))]
fn name_bytes(part: &OsStr) -> Option<&[u8]> {
    part.to_str().map(str::as_bytes)
}
