//! Types for writing DB archives
//!

use std::fmt::Debug;
use std::io::{self, Seek, Write};

use bon::Builder;
use crc::Digest;
use tracing::{debug, instrument, Level};

use crate::chunk::{
    ChunkWriter, CHUNK_COMPRESSED, DB_CHUNK_DATA, DB_CHUNK_HEADER, DB_CHUNK_USERDATA,
};
use crate::error::{Error, Result};
use crate::scrambler::Scrambler;
use crate::types::{FileEntry, PayloadCompression};
use crate::version::DbVersion;
use crate::{lzhuf, table, CRC32};

/// Options for how the DB file should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct DbWriterOptions {
    /// Target archive version, one of the writable ones
    pub version: DbVersion,

    /// Write explicit folder records ahead of the file records
    #[builder(default = true)]
    pub emit_folders: bool,
}

struct PendingFile {
    entry: FileEntry,
    digest: Digest<'static, u32>,
    written: u64,
}

/// DB archive generator
///
/// Payloads are stored uncompressed. The directory table is sorted by path component when the
/// archive is finished, folders first.
///
/// ```
/// # fn doit() -> xray_db::error::Result<()>
/// # {
/// use std::io::Write;
/// use xray_db::{DbVersion, DbWriter};
/// use xray_db::write::DbWriterOptions;
///
/// let mut db = DbWriter::new(
///     std::io::Cursor::new(Vec::new()),
///     DbWriterOptions::builder().version(DbVersion::Xdb).build(),
/// )?;
///
/// db.add_folder("config")?;
/// db.start_file("config/system.ltx")?;
/// db.write_all(b"Hello World")?;
///
/// // Apply the changes you've made.
/// let archive = db.finish()?.into_inner();
/// assert_eq!(archive.len(), 74);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct DbWriter<W: Write + Seek> {
    inner: ChunkWriter<W>,
    options: DbWriterOptions,
    data_open: bool,
    current: Option<PendingFile>,
    folders: Vec<FileEntry>,
    files: Vec<FileEntry>,
}

impl<W: Write + Seek> Debug for DbWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWriter")
            .field("options", &self.options)
            .field("folders", &self.folders.len())
            .field("files", &self.files.len())
            .field("writing_file", &self.is_writing_file())
            .finish()
    }
}

impl<W: Write + Seek> DbWriter<W> {
    /// Initializes the archive.
    ///
    /// Before writing to this object, the [`DbWriter::start_file`] function should be called.
    pub fn new(inner: W, options: DbWriterOptions) -> Result<DbWriter<W>> {
        if !options.version.is_writable() {
            return Err(Error::UnsupportedVersion(options.version));
        }

        Ok(DbWriter {
            inner: ChunkWriter::new(inner),
            options,
            data_open: false,
            current: None,
            folders: Vec::new(),
            files: Vec::new(),
        })
    }

    /// Returns true if a file is currently open for writing.
    pub const fn is_writing_file(&self) -> bool {
        self.current.is_some()
    }

    /// Store an opaque user data blob. Only XDB archives carry one and it must precede every file.
    #[instrument(skip(self, data), err, fields(size = data.len()))]
    pub fn write_userdata(&mut self, data: &[u8]) -> Result<()> {
        if !self.options.version.has_userdata() {
            return Err(Error::UserdataNotSupported(self.options.version));
        }
        if self.data_open {
            return Err(Error::UserdataAfterData);
        }
        self.inner.write_chunk(DB_CHUNK_USERDATA, data)
    }

    /// Record a folder. Folders carry no payload and are only listed when
    /// [`DbWriterOptions::emit_folders`] is set.
    ///
    /// Names are bytes so that names in legacy encodings are stored untouched.
    pub fn add_folder(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        let mut name = normalize(name.as_ref());
        if name.last() != Some(&b'\\') {
            name.push(b'\\');
        }
        let entry = FileEntry {
            crc: Some(0),
            ..FileEntry::from_raw_name(name)
        };
        debug!(path = %entry.path, "folder");
        self.folders.push(entry);
        Ok(())
    }

    /// Start a new file, finishing the previous one.
    #[instrument(skip(self, name), err, fields(name = %String::from_utf8_lossy(name.as_ref())))]
    pub fn start_file(&mut self, name: impl AsRef<[u8]>) -> Result<()> {
        self.finish_file()?;
        self.open_data()?;

        let offset = u32::try_from(self.inner.position()?).map_err(|_| too_large())?;
        self.current = Some(PendingFile {
            entry: FileEntry {
                offset,
                ..FileEntry::from_raw_name(normalize(name.as_ref()))
            },
            digest: CRC32.digest(),
            written: 0,
        });

        Ok(())
    }

    fn open_data(&mut self) -> Result<()> {
        if !self.data_open {
            self.inner.open_chunk(DB_CHUNK_DATA)?;
            self.data_open = true;
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self), err)]
    fn finish_file(&mut self) -> Result<()> {
        let Some(PendingFile {
            mut entry,
            digest,
            written,
        }) = self.current.take()
        else {
            return Ok(());
        };

        let size = u32::try_from(written).map_err(|_| too_large())?;
        entry.size_real = size;
        entry.size_compressed = size;
        entry.crc = Some(digest.finalize());
        entry.compression = PayloadCompression::None;
        debug!(path = %entry.path, offset = entry.offset, size, crc = ?entry.crc, "file");

        self.files.push(entry);
        Ok(())
    }

    /// Entries in the order they will be written to the directory table
    fn table_entries(&mut self) -> Vec<FileEntry> {
        self.files.sort_by(|a, b| components(a).cmp(components(b)));

        if self.options.emit_folders {
            self.folders.sort_by(|a, b| components(a).cmp(components(b)));
            self.folders.dedup_by(|a, b| a.name_raw == b.name_raw);
            self.folders.iter().chain(&self.files).cloned().collect()
        } else {
            self.files.clone()
        }
    }

    /// Finish the last file and write the directory table
    ///
    /// This will return the writer, but one should normally not append any data to the end of the file.
    #[instrument(skip(self), err)]
    pub fn finish(mut self) -> Result<W> {
        self.finish_file()?;
        self.open_data()?;
        self.inner.close_chunk()?;

        let entries = self.table_entries();
        let table = table::serialize(self.options.version, &entries)?;
        let mut header = lzhuf::compress(&table)?;
        if let Some(config) = self.options.version.cipher() {
            header = Scrambler::new(config).encrypt(&header);
        }
        debug!(
            entries = entries.len(),
            table = table.len(),
            compressed = header.len(),
            "directory table"
        );

        self.inner
            .write_chunk(DB_CHUNK_HEADER | CHUNK_COMPRESSED, &header)?;
        self.inner.finish()
    }
}

impl<W: Write + Seek> Write for DbWriter<W> {
    #[instrument(skip_all, err, ret(level = Level::TRACE), fields(size = buf.len()))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(current) = self.current.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                Error::NoFileStarted.to_string(),
            ));
        };

        let written = self.inner.write(buf)?;
        current.digest.update(&buf[..written]);
        current.written += written as u64;
        Ok(written)
    }

    #[instrument(skip(self), err)]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Stored names are ASCII lower case with `\\` separators and no leading separator. Other
/// bytes pass through unchanged.
fn normalize(name: &[u8]) -> Vec<u8> {
    let start = name
        .iter()
        .position(|&b| b != b'/' && b != b'\\')
        .unwrap_or(name.len());
    name[start..]
        .iter()
        .map(|&b| match b {
            b'/' => b'\\',
            b => b.to_ascii_lowercase(),
        })
        .collect()
}

/// Path components of a stored name, for ordering the table
fn components(entry: &FileEntry) -> impl Iterator<Item = &[u8]> {
    entry.name_raw.split(|&b| b == b'\\')
}

fn too_large() -> Error {
    Error::IOError(io::Error::new(
        io::ErrorKind::InvalidData,
        "archive exceeds 4 GiB",
    ))
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Write};

    use pretty_assertions::{assert_eq, assert_str_eq};
    use tracing_test::traced_test;

    use super::*;
    use crate::read::DbArchive;

    fn writer(version: DbVersion, emit_folders: bool) -> Result<DbWriter<Cursor<Vec<u8>>>> {
        DbWriter::new(
            Cursor::new(Vec::new()),
            DbWriterOptions::builder()
                .version(version)
                .emit_folders(emit_folders)
                .build(),
        )
    }

    #[traced_test]
    #[test]
    fn write_xdb_with_folder() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            // DATA
            0x00, 0x00, 0x00, 0x00, 0x0B, 0x00, 0x00, 0x00,
            0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x20, 0x57, 0x6F, 0x72, 0x6C, 0x64,
            // HEADER
            0x01, 0x00, 0x00, 0x80, 0x2F, 0x00, 0x00, 0x00,
            0x3C, 0x00, 0x00, 0x00, 0xD1, 0xE3, 0x25, 0x40, 0x1E, 0xFF, 0xDF, 0xEB,
            0xE5, 0xF5, 0xF9, 0xFA, 0x23, 0x41, 0x5A, 0xDC, 0x4C, 0xBC, 0x60, 0x16,
            0xEC, 0x07, 0xE2, 0x3D, 0xC5, 0xEB, 0x48, 0x06, 0x3F, 0xE0, 0xB6, 0x60,
            0x1F, 0x1F, 0xCE, 0xEB, 0xF1, 0x62, 0x09, 0x94, 0xB8, 0x1B, 0x80,
        ];

        let mut db = writer(DbVersion::Xdb, true)?;
        db.start_file("Config\\System.ltx")?;
        db.write_all(b"Hello World")?;
        db.add_folder("config")?;
        let result = db.finish()?.into_inner();

        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", expected));

        Ok(())
    }

    #[test]
    fn write_encrypted_without_folders() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            // DATA
            0x00, 0x00, 0x00, 0x00, 0x0B, 0x00, 0x00, 0x00,
            0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x20, 0x57, 0x6F, 0x72, 0x6C, 0x64,
            // HEADER
            0x01, 0x00, 0x00, 0x80, 0x26, 0x00, 0x00, 0x00,
            0x93, 0x1A, 0xC3, 0x49, 0x26, 0x6A, 0x1F, 0xE5, 0xB3, 0x94, 0xD7, 0xD0,
            0x84, 0x7F, 0x76, 0xDE, 0x83, 0xED, 0x8E, 0xBB, 0x3F, 0xD7, 0x22, 0x2C,
            0x3F, 0xC8, 0x00, 0x16, 0xB3, 0x65, 0x83, 0xFD, 0x28, 0xB1, 0x22, 0x45,
            0xD6, 0x35,
        ];

        let mut db = writer(DbVersion::V2947Ru, false)?;
        db.add_folder("config")?;
        db.start_file("config/system.ltx")?;
        db.write_all(b"Hello ")?;
        db.write_all(b"World")?;
        let result = db.finish()?.into_inner();

        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", expected));

        Ok(())
    }

    #[test]
    fn written_archive_reads_back() -> Result<()> {
        let mut db = writer(DbVersion::Xdb, true)?;
        db.write_userdata(b"[header]\nlink = gamedata\n")?;
        db.add_folder("textures/")?;
        db.add_folder("scripts")?;
        db.start_file("scripts/b.script")?;
        db.write_all(b"second")?;
        db.start_file("scripts/a.script")?;
        db.write_all(b"first")?;
        db.start_file("textures/empty.dds")?;
        let archive = DbArchive::new(db.finish()?.into_inner(), DbVersion::Xdb)?;

        assert_eq!(
            archive.file_names().collect::<Vec<_>>(),
            vec![
                "scripts/",
                "textures/",
                "scripts/a.script",
                "scripts/b.script",
                "textures/empty.dds",
            ]
        );
        assert_eq!(archive.userdata(), Some(&b"[header]\nlink = gamedata\n"[..]));
        assert_eq!(&*archive.by_name("scripts/a.script")?.contents()?, b"first");
        assert_eq!(&*archive.by_name("scripts/b.script")?.contents()?, b"second");

        let empty = archive.by_name("textures/empty.dds")?;
        assert!(!empty.is_dir());
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.verify_crc()?, Some(true));

        Ok(())
    }

    #[test]
    fn empty_archive() -> Result<()> {
        let db = writer(DbVersion::V2947Ww, true)?;
        let archive = DbArchive::new(db.finish()?.into_inner(), DbVersion::V2947Ww)?;
        assert!(archive.is_empty());

        Ok(())
    }

    #[test]
    fn legacy_versions_are_rejected() {
        for version in [DbVersion::V1114, DbVersion::V2215, DbVersion::V2945] {
            assert!(matches!(
                writer(version, true),
                Err(Error::UnsupportedVersion(v)) if v == version
            ));
        }
    }

    #[test]
    fn userdata_rules() -> Result<()> {
        let mut db = writer(DbVersion::V2947Ru, true)?;
        assert!(matches!(
            db.write_userdata(b"x"),
            Err(Error::UserdataNotSupported(DbVersion::V2947Ru))
        ));

        let mut db = writer(DbVersion::Xdb, true)?;
        db.start_file("a")?;
        assert!(matches!(
            db.write_userdata(b"x"),
            Err(Error::UserdataAfterData)
        ));

        Ok(())
    }

    #[test]
    fn legacy_encoded_names_are_stored_verbatim() -> Result<()> {
        let mut db = writer(DbVersion::Xdb, true)?;
        db.add_folder(b"\xCA\xEE\xED\xF4\xE8\xE3")?;
        db.start_file(b"\xCA\xEE\xED\xF4\xE8\xE3/System.LTX")?;
        db.write_all(b"[system]\n")?;
        let archive = DbArchive::new(db.finish()?.into_inner(), DbVersion::Xdb)?;

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0)?.name_raw(), b"\xCA\xEE\xED\xF4\xE8\xE3\\");
        assert_eq!(
            archive.by_index(1)?.name_raw(),
            b"\xCA\xEE\xED\xF4\xE8\xE3\\system.ltx"
        );
        assert_eq!(&*archive.by_index(1)?.contents()?, b"[system]\n");

        Ok(())
    }

    #[test]
    fn write_before_start_fails() -> Result<()> {
        let mut db = writer(DbVersion::Xdb, true)?;
        assert!(db.write_all(b"orphan").is_err());

        Ok(())
    }
}
