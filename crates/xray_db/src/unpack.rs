//! Extracting a DB archive into a directory tree

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf};

use bon::Builder;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::read::{DbArchive, DbFile};
use crate::version::DbVersion;

/// Options controlling an unpack run
#[derive(Debug, Clone, Default, Builder)]
pub struct UnpackOptions {
    /// Archive version, detected from the extension when absent
    pub version: Option<DbVersion>,

    /// Only extract files whose path contains this substring. Folders are always created.
    #[builder(into)]
    pub filter: Option<String>,

    /// Walk and log every entry without touching the file system
    #[builder(default)]
    pub read_only: bool,

    /// Log per entry details at `INFO` instead of `DEBUG`
    #[builder(default)]
    pub debug: bool,
}

/// What an unpack run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackReport {
    /// Folder entries processed
    pub folders: usize,
    /// File entries processed
    pub files: usize,
    /// File entries skipped by the filter
    pub filtered: usize,
    /// Entries that could not be extracted
    pub failed: usize,
    /// Whether the archive carried user data
    pub userdata: bool,
}

/// Extracts archives according to [`UnpackOptions`]
#[derive(Debug, Clone)]
pub struct Unpacker {
    options: UnpackOptions,
}

impl Unpacker {
    /// Create an unpacker
    pub fn new(options: UnpackOptions) -> Self {
        Self { options }
    }

    /// Read `source` and extract it below `destination`
    ///
    /// User data, if any, is written next to the destination folder as
    /// `<destination>_userdata.ltx`.
    #[instrument(skip_all, err, fields(source = %source.as_ref().display()))]
    pub fn process(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<UnpackReport> {
        let (source, destination) = (source.as_ref(), destination.as_ref());
        let version = match self.options.version {
            Some(version) => version,
            None => DbVersion::from_path(source).ok_or(Error::UnspecifiedVersion)?,
        };
        if !source.is_file() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }

        let archive = DbArchive::open(source, Some(version))?;
        info!(
            %version,
            entries = archive.len(),
            destination = %destination.display(),
            "unpacking"
        );

        if !self.options.read_only {
            fs::create_dir_all(destination)?;
        }
        self.extract(&archive, destination)
    }

    /// Extract an already parsed archive below `destination`
    pub fn extract<D: AsRef<[u8]>>(
        &self,
        archive: &DbArchive<D>,
        destination: &Path,
    ) -> Result<UnpackReport> {
        let mut report = UnpackReport::default();

        if let Some(userdata) = archive.userdata() {
            report.userdata = true;
            let path = userdata_path(destination);
            info!(path = %path.display(), size = userdata.len(), "user data");
            if !self.options.read_only {
                if let Err(e) = fs::write(&path, userdata) {
                    error!(path = %path.display(), "failed to write user data: {e}");
                }
            }
        }

        let mask = self.options.filter.as_deref().filter(|m| !m.is_empty());
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if let Some(mask) = mask {
                if !file.is_dir() && !file.name().contains(mask) {
                    report.filtered += 1;
                    continue;
                }
            }

            self.log_entry(&file);

            let Some(native) = native_path(file.name_raw()) else {
                error!(name = file.name(), "{}", Error::UndecodableName(file.name().to_owned()));
                report.failed += 1;
                continue;
            };
            let Some(relative) = safe_relative_path(&native) else {
                error!(name = file.name(), "{}", Error::UnsafePath(file.name().to_owned()));
                report.failed += 1;
                continue;
            };

            if file.is_dir() {
                report.folders += 1;
                if self.options.read_only {
                    continue;
                }
                let path = destination.join(relative);
                if let Err(e) = fs::create_dir_all(&path) {
                    error!(path = %path.display(), "failed to create folder: {e}");
                    report.failed += 1;
                }
            } else {
                report.files += 1;
                if !self.extract_file(&file, &destination.join(relative))? {
                    report.failed += 1;
                }
            }
        }

        info!(
            folders = report.folders,
            files = report.files,
            filtered = report.filtered,
            failed = report.failed,
            "unpacked"
        );
        Ok(report)
    }

    /// Decode one file and write it out. Returns `Ok(false)` when the entry was skipped.
    fn extract_file(&self, file: &DbFile, path: &Path) -> Result<bool> {
        let contents = match file.contents() {
            Ok(contents) => contents,
            Err(e @ Error::EntryOutOfBounds { .. }) => return Err(e),
            Err(e) => {
                error!(name = file.name(), "failed to decode: {e}");
                return Ok(false);
            }
        };

        if let Ok(Some(false)) = file.verify_crc() {
            warn!(name = file.name(), expected = ?file.crc(), "crc mismatch");
        }

        if self.options.read_only {
            return Ok(true);
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!(path = %parent.display(), "failed to create folder: {e}");
                return Ok(false);
            }
        }
        if let Err(e) = fs::write(path, &contents) {
            error!(path = %path.display(), "failed to write file: {e}");
            return Ok(false);
        }

        Ok(true)
    }

    fn log_entry(&self, file: &DbFile) {
        let (name, offset, size, compressed, crc) = (
            file.name(),
            file.offset(),
            file.size(),
            file.compressed_size(),
            file.crc(),
        );
        if self.options.debug {
            info!(name, offset, size, compressed, ?crc, "entry");
        } else {
            debug!(name, offset, size, compressed, ?crc, "entry");
        }
    }
}

/// Sidecar file receiving the USERDATA chunk of an archive unpacked to `destination`
pub fn userdata_path(destination: &Path) -> PathBuf {
    let mut path = OsString::from(destination.as_os_str());
    path.push("_userdata.ltx");
    PathBuf::from(path)
}

/// Stored name bytes as a `/` separated native path
///
/// Unix paths are plain bytes, so every name converts. Elsewhere the name has to be UTF-8.
#[cfg(unix)]
pub fn native_path(raw: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;

    let bytes = raw
        .iter()
        .map(|&b| if b == b'\\' { b'/' } else { b })
        .collect::<Vec<u8>>();
    Some(PathBuf::from(OsStr::from_bytes(&bytes)))
}

/// Stored name bytes as a `/` separated native path
///
/// Unix paths are plain bytes, so every name converts. Elsewhere the name has to be UTF-8.
#[cfg(not(unix))]
pub fn native_path(raw: &[u8]) -> Option<PathBuf> {
    let name = std::str::from_utf8(raw).ok()?;
    Some(PathBuf::from(OsStr::new(&name.replace('\\', "/"))))
}

/// Turn a stored entry name into a relative path that stays below the destination
///
/// Returns `None` for absolute paths and names containing `..`.
pub fn safe_relative_path(name: impl AsRef<Path>) -> Option<PathBuf> {
    let path = name.as_ref();
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Write};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::write::{DbWriter, DbWriterOptions};

    fn sample() -> Result<DbArchive<Vec<u8>>> {
        let mut db = DbWriter::new(
            Cursor::new(Vec::new()),
            DbWriterOptions::builder().version(DbVersion::Xdb).build(),
        )?;
        db.write_userdata(b"[user]\n")?;
        db.add_folder("config")?;
        db.add_folder("scripts")?;
        db.start_file("config/system.ltx")?;
        db.write_all(b"[system]\n")?;
        db.start_file("scripts/main.script")?;
        db.write_all(b"function main() end\n")?;
        DbArchive::new(db.finish()?.into_inner(), DbVersion::Xdb)
    }

    fn scratch(name: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("xray_db_unpack_{}_{name}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        path
    }

    #[traced_test]
    #[test]
    fn extract_everything() -> Result<()> {
        let destination = scratch("all");
        let unpacker = Unpacker::new(UnpackOptions::builder().build());

        let report = unpacker.extract(&sample()?, &destination)?;
        assert_eq!(
            report,
            UnpackReport {
                folders: 2,
                files: 2,
                filtered: 0,
                failed: 0,
                userdata: true,
            }
        );
        assert_eq!(
            fs::read(destination.join("scripts/main.script"))?,
            b"function main() end\n"
        );
        assert_eq!(fs::read(userdata_path(&destination))?, b"[user]\n");

        fs::remove_dir_all(&destination)?;
        fs::remove_file(userdata_path(&destination))?;
        Ok(())
    }

    #[test]
    fn filter_keeps_folders() -> Result<()> {
        let destination = scratch("filter");
        let unpacker = Unpacker::new(UnpackOptions::builder().filter("config").build());

        let report = unpacker.extract(&sample()?, &destination)?;
        assert_eq!(report.folders, 2);
        assert_eq!(report.files, 1);
        assert_eq!(report.filtered, 1);
        assert!(destination.join("scripts").is_dir());
        assert!(!destination.join("scripts/main.script").exists());
        assert!(destination.join("config/system.ltx").is_file());

        fs::remove_dir_all(&destination)?;
        fs::remove_file(userdata_path(&destination))?;
        Ok(())
    }

    #[test]
    fn read_only_touches_nothing() -> Result<()> {
        let destination = scratch("ro");
        let unpacker = Unpacker::new(UnpackOptions::builder().read_only(true).build());

        let report = unpacker.extract(&sample()?, &destination)?;
        assert_eq!(report.files, 2);
        assert!(!destination.exists());
        assert!(!userdata_path(&destination).exists());

        Ok(())
    }

    #[test]
    fn unsafe_names_are_refused() {
        assert_eq!(
            safe_relative_path("levels/l01/level.ltx"),
            Some(PathBuf::from("levels/l01/level.ltx"))
        );
        assert_eq!(safe_relative_path("./a"), Some(PathBuf::from("a")));
        assert_eq!(safe_relative_path("../evil"), None);
        assert_eq!(safe_relative_path("a/../../evil"), None);
        assert_eq!(safe_relative_path("/etc/shadow"), None);
    }

    #[cfg(target_os = "linux")]
    #[traced_test]
    #[test]
    fn legacy_encoded_names_are_written_verbatim() -> Result<()> {
        use std::os::unix::ffi::OsStrExt;

        let mut db = DbWriter::new(
            Cursor::new(Vec::new()),
            DbWriterOptions::builder().version(DbVersion::Xdb).build(),
        )?;
        db.start_file(b"\xC0.ltx")?;
        db.write_all(b"first")?;
        db.start_file(b"\xC1.ltx")?;
        db.write_all(b"second")?;
        let archive = DbArchive::new(db.finish()?.into_inner(), DbVersion::Xdb)?;

        let destination = scratch("raw_names");
        let report = Unpacker::new(UnpackOptions::default()).extract(&archive, &destination)?;
        assert_eq!(report.files, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(
            fs::read(destination.join(OsStr::from_bytes(b"\xC0.ltx")))?,
            b"first"
        );
        assert_eq!(
            fs::read(destination.join(OsStr::from_bytes(b"\xC1.ltx")))?,
            b"second"
        );

        fs::remove_dir_all(&destination)?;
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn stored_names_use_native_separators() {
        assert_eq!(
            native_path(b"levels\\l01\\level.ltx"),
            Some(PathBuf::from("levels/l01/level.ltx"))
        );
        assert!(native_path(b"\xC0.ltx").is_some());
    }

    #[cfg(not(unix))]
    #[test]
    fn undecodable_names_have_no_path() {
        assert_eq!(
            native_path(b"levels\\level.ltx"),
            Some(PathBuf::from("levels/level.ltx"))
        );
        assert_eq!(native_path(b"\xC0.ltx"), None);
    }

    #[test]
    fn sidecar_is_a_sibling() {
        assert_eq!(
            userdata_path(Path::new("out/gamedata")),
            PathBuf::from("out/gamedata_userdata.ltx")
        );
    }

    #[test]
    fn missing_source_is_reported() {
        let unpacker = Unpacker::new(UnpackOptions::builder().build());
        assert!(matches!(
            unpacker.process("does/not/exist.db0", "out"),
            Err(Error::SourceNotFound(_))
        ));
        assert!(matches!(
            unpacker.process("does/not/exist.bin", "out"),
            Err(Error::UnspecifiedVersion)
        ));
    }
}
