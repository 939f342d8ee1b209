//! Types for reading DB archives
//!

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use indexmap::map::Entry;
use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::chunk::{ChunkReader, CHUNK_HEADER_SIZE, DB_CHUNK_HEADER, DB_CHUNK_USERDATA};
use crate::error::{Error, FileNotFoundError, Result};
use crate::scrambler::Scrambler;
use crate::types::{FileEntry, PayloadCompression};
use crate::version::DbVersion;
use crate::{lzhuf, lzo, CRC32};

/// A borrowed view of one entry of a [`DbArchive`]
pub struct DbFile<'a> {
    entry: &'a FileEntry,
    archive: &'a [u8],
}

impl Debug for DbFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DbFile({:#?})", self.entry)
    }
}

impl<'a> DbFile<'a> {
    /// Get the name of the file
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain an absolute path (`/etc/shadow`), or break out of the
    /// current directory (`../runtime`). See [`crate::unpack::safe_relative_path`].
    ///
    /// Names that are not UTF-8 are decoded lossily; see [`DbFile::name_raw`].
    pub fn name(&self) -> &'a str {
        &self.entry.path
    }

    /// Get the name of the file, in the raw (internal) byte representation.
    ///
    /// The encoding of this data is unspecified; legacy archives often use cp1251.
    pub fn name_raw(&self) -> &'a [u8] {
        if self.entry.name_raw.is_empty() {
            self.entry.path.as_bytes()
        } else {
            &self.entry.name_raw
        }
    }

    /// Whether this entry is a folder rather than a file
    pub fn is_dir(&self) -> bool {
        self.entry.is_folder()
    }

    /// Get the size of the file, in bytes, when decompressed
    pub fn size(&self) -> u64 {
        self.entry.size_real as u64
    }

    /// Get the size of the file, in bytes, in the archive
    pub fn compressed_size(&self) -> u64 {
        self.entry.size_compressed as u64
    }

    /// Recorded CRC-32 of the stored bytes, if the archive version has one
    pub fn crc(&self) -> Option<u32> {
        self.entry.crc
    }

    /// Absolute offset of the payload in the archive
    pub fn offset(&self) -> u64 {
        self.entry.offset as u64
    }

    /// Storage method of the payload
    pub fn compression(&self) -> PayloadCompression {
        self.entry.compression
    }

    /// Stored payload bytes, still compressed
    pub fn raw(&self) -> Result<&'a [u8]> {
        if self.is_dir() {
            return Ok(&[]);
        }

        let (start, end) = (self.entry.offset as u64, self.entry.end());
        if end > self.archive.len() as u64 {
            return Err(Error::EntryOutOfBounds {
                name: self.entry.path.clone(),
                offset: start,
                end,
                len: self.archive.len(),
            });
        }

        Ok(&self.archive[start as usize..end as usize])
    }

    /// Decompressed contents of the file
    #[instrument(level = "trace", skip(self), err, fields(name = %self.entry.path))]
    pub fn contents(&self) -> Result<Cow<'a, [u8]>> {
        let raw = self.raw()?;

        let data = match self.entry.compression {
            PayloadCompression::None => Cow::Borrowed(raw),
            PayloadCompression::Lzo => {
                Cow::Owned(lzo::decompress(raw, self.entry.size_real as usize)?)
            }
            PayloadCompression::Lzhuf => Cow::Owned(lzhuf::decompress(raw)?),
        };

        if data.len() as u64 != self.size() {
            return Err(Error::SizeMismatch {
                expected: self.size(),
                actual: data.len() as u64,
            });
        }

        Ok(data)
    }

    /// Compare the stored bytes with the recorded CRC-32
    ///
    /// Returns `Ok(None)` when the version does not record checksums.
    pub fn verify_crc(&self) -> Result<Option<bool>> {
        let Some(expected) = self.entry.crc else {
            return Ok(None);
        };
        if self.is_dir() {
            return Ok(Some(true));
        }
        Ok(Some(CRC32.checksum(self.raw()?) == expected))
    }
}

/// DB archive reader
///
/// The whole archive is kept in memory. Entries keep table order, duplicates included; name
/// lookups resolve to the first record carrying that name.
///
/// ```no_run
/// fn list_db_contents(path: &str) -> xray_db::error::Result<()> {
///     let db = xray_db::DbArchive::open(path, None)?;
///
///     for i in 0..db.len() {
///         let file = db.by_index(i)?;
///         println!("{} ({} bytes)", file.name(), file.size());
///     }
///
///     Ok(())
/// }
/// ```
pub struct DbArchive<D> {
    data: D,
    version: DbVersion,
    files: Vec<FileEntry>,
    names: IndexMap<Box<str>, usize>,
    userdata: Option<(usize, usize)>,
}

impl<D> Debug for DbArchive<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DbArchive")
            .field("version", &self.version)
            .field("files", &self.files.len())
            .field("userdata", &self.userdata.map(|(_, len)| len))
            .finish()
    }
}

impl DbArchive<Vec<u8>> {
    /// Read an archive from disk, detecting the version from the extension when not given
    #[instrument(skip(path), err, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, version: Option<DbVersion>) -> Result<Self> {
        let path = path.as_ref();
        let version = DbVersion::resolve(version, path)?;
        if !path.is_file() {
            return Err(Error::SourceNotFound(path.to_path_buf()));
        }
        DbArchive::new(fs::read(path)?, version)
    }
}

impl<D: AsRef<[u8]>> DbArchive<D> {
    /// Parse the directory table of an in-memory archive
    #[instrument(level = "debug", skip(data), err)]
    pub fn new(data: D, version: DbVersion) -> Result<Self> {
        let bytes = data.as_ref();
        let reader = ChunkReader::new(bytes);

        let userdata = reader.find_chunk(DB_CHUNK_USERDATA)?.map(|chunk| {
            let start = chunk.offset + CHUNK_HEADER_SIZE;
            (start, chunk.data.len())
        });

        let table = match version.cipher() {
            Some(config) => {
                reader.open_chunk_scrambled(DB_CHUNK_HEADER, &Scrambler::new(config))?
            }
            None => reader.open_chunk(DB_CHUNK_HEADER)?,
        }
        .ok_or(Error::ChunkNotFound {
            id: DB_CHUNK_HEADER,
        })?;

        let mut files = crate::table::parse(version, &table)?;
        let mut names = IndexMap::with_capacity(files.len());
        for (index, entry) in files.iter_mut().enumerate() {
            if entry.compression == PayloadCompression::Lzhuf && !entry.is_folder() {
                entry.size_real = lzhuf_declared_size(bytes, entry)?;
            }
            if !entry.has_exact_path() {
                warn!(
                    index,
                    name = %entry.path,
                    raw = ?entry.name_raw,
                    "name is not valid UTF-8"
                );
            }
            match names.entry(entry.path.clone().into_boxed_str()) {
                Entry::Occupied(first) => {
                    warn!(index, first = *first.get(), name = %entry.path, "duplicate name");
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }
        }
        debug!(entries = files.len(), %version, "directory table");

        Ok(DbArchive {
            data,
            version,
            files,
            names,
            userdata,
        })
    }

    /// Version the archive was read as
    pub fn version(&self) -> DbVersion {
        self.version
    }

    /// Number of entries in the directory table
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the directory table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in table order
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter()
    }

    /// Returns an iterator over all the file and folder names in this archive, in table order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|entry| entry.path.as_str())
    }

    /// Get the index of the first file entry with this name, if it's present.
    #[inline(always)]
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Get the name of a file entry, if it's present.
    #[inline(always)]
    pub fn name_for_index(&self, index: usize) -> Option<&str> {
        self.files.get(index).map(|entry| entry.path.as_str())
    }

    /// Search for a file entry by name
    pub fn by_name(&self, name: &str) -> Result<DbFile<'_>> {
        let Some(index) = self.index_for_name(name) else {
            return Err(Error::FileNotFound(FileNotFoundError::Name(
                name.to_owned(),
            )));
        };
        self.by_index(index)
    }

    /// Get a contained file by index
    pub fn by_index(&self, index: usize) -> Result<DbFile<'_>> {
        let entry = self
            .files
            .get(index)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(index)))?;

        Ok(DbFile {
            entry,
            archive: self.data.as_ref(),
        })
    }

    /// Contents of the USERDATA chunk, if present
    pub fn userdata(&self) -> Option<&[u8]> {
        self.userdata
            .map(|(start, len)| &self.data.as_ref()[start..start + len])
    }

    /// Total size of the files in the archive, if it can be known. Doesn't include folders or
    /// metadata.
    pub fn decompressed_size(&self) -> Option<u128> {
        let mut total = 0u128;
        for file in &self.files {
            total = total.checked_add(file.size_real as u128)?;
        }
        Some(total)
    }

    /// Unwrap and return the archive bytes
    pub fn into_inner(self) -> D {
        self.data
    }
}

/// Real size of a 1114 LZHUF payload, read from its length prefix
fn lzhuf_declared_size(archive: &[u8], entry: &FileEntry) -> Result<u32> {
    let start = entry.offset as usize;
    archive
        .get(start..start + 4)
        .filter(|_| entry.size_compressed >= 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| Error::EntryOutOfBounds {
            name: entry.path.clone(),
            offset: entry.offset as u64,
            end: entry.end(),
            len: archive.len(),
        })
}
