//! Directory table records and the entry model shared by every archive version.

use std::borrow::Cow;

use binrw::{BinRead, BinWrite, NullString};

/// How an entry's payload is stored in the data chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadCompression {
    /// Stored verbatim
    #[default]
    None,
    /// LZO1X, `size_compressed` bytes expanding to `size_real`
    Lzo,
    /// LZHUF with its own length prefix (1114 only)
    Lzhuf,
}

/// One file or folder listed in a directory table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path using `/` separators, lossily decoded for display and lookups
    pub path: String,
    /// Name exactly as stored in the table, `\` separated
    ///
    /// Empty for entries built in memory, in which case `path` is what gets stored.
    pub name_raw: Box<[u8]>,
    /// Absolute offset of the payload in the archive, `0` for folders
    pub offset: u32,
    /// Size once decompressed
    pub size_real: u32,
    /// Size stored in the archive
    pub size_compressed: u32,
    /// CRC-32 of the stored bytes, when the version records one
    pub crc: Option<u32>,
    /// Storage method of the payload
    pub compression: PayloadCompression,
}

impl FileEntry {
    /// A folder entry
    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            crc: Some(0),
            ..Default::default()
        }
    }

    /// An entry named by stored bytes, keeping them verbatim
    pub fn from_raw_name(raw: impl Into<Box<[u8]>>) -> Self {
        let name_raw = raw.into();
        Self {
            path: path_from_raw(&name_raw),
            name_raw,
            ..Default::default()
        }
    }

    /// The bytes written to the directory table for this entry
    pub fn stored_name(&self) -> Cow<'_, [u8]> {
        if self.name_raw.is_empty() {
            Cow::Owned(path_to_raw(&self.path))
        } else {
            Cow::Borrowed(&self.name_raw)
        }
    }

    /// Whether the stored name is valid UTF-8, so that `path` is exact
    pub fn has_exact_path(&self) -> bool {
        std::str::from_utf8(&self.stored_name()).is_ok()
    }

    /// Folders are marked by a zero offset in every version
    pub const fn is_folder(&self) -> bool {
        self.offset == 0
    }

    /// Offset one past the end of the stored payload
    pub const fn end(&self) -> u64 {
        self.offset as u64 + self.size_compressed as u64
    }
}

/// Convert a stored name to the `/` separated form
///
/// Bytes that are not UTF-8 (cp1251 names, mostly) become U+FFFD; `FileEntry::name_raw` keeps
/// the original.
pub(crate) fn path_from_raw(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\\', "/")
}

/// Convert a `/` separated path to the stored form
pub(crate) fn path_to_raw(path: &str) -> Vec<u8> {
    path.replace('/', "\\").into_bytes()
}

/// Build 1114 directory record
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(little)]
pub struct Record1114 {
    /// Zero terminated name
    pub name: NullString,
    /// Non-zero when `size` is the plain size, zero for LZHUF payloads
    pub uncompressed: u32,
    /// Absolute offset of the payload
    pub offset: u32,
    /// Stored size
    pub size: u32,
}

impl From<Record1114> for FileEntry {
    fn from(r: Record1114) -> Self {
        FileEntry {
            path: path_from_raw(&r.name),
            name_raw: r.name.0.into_boxed_slice(),
            offset: r.offset,
            size_real: r.size,
            size_compressed: r.size,
            crc: None,
            compression: if r.uncompressed != 0 {
                PayloadCompression::None
            } else {
                PayloadCompression::Lzhuf
            },
        }
    }
}

/// Build 2215 directory record
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(little)]
pub struct Record2215 {
    /// Zero terminated name
    pub name: NullString,
    /// Absolute offset of the payload, `0` for folders
    pub offset: u32,
    /// Size once decompressed
    pub size_real: u32,
    /// Stored size
    pub size_compressed: u32,
}

impl From<Record2215> for FileEntry {
    fn from(r: Record2215) -> Self {
        FileEntry {
            path: path_from_raw(&r.name),
            name_raw: r.name.0.into_boxed_slice(),
            offset: r.offset,
            size_real: r.size_real,
            size_compressed: r.size_compressed,
            crc: None,
            compression: lzo_when_sizes_differ(r.size_real, r.size_compressed),
        }
    }
}

/// Build 2945 directory record
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(little)]
pub struct Record2945 {
    /// Zero terminated name
    pub name: NullString,
    /// CRC-32 of the stored bytes
    pub crc: u32,
    /// Absolute offset of the payload, `0` for folders
    pub offset: u32,
    /// Size once decompressed
    pub size_real: u32,
    /// Stored size
    pub size_compressed: u32,
}

impl From<Record2945> for FileEntry {
    fn from(r: Record2945) -> Self {
        FileEntry {
            path: path_from_raw(&r.name),
            name_raw: r.name.0.into_boxed_slice(),
            offset: r.offset,
            size_real: r.size_real,
            size_compressed: r.size_compressed,
            crc: Some(r.crc),
            compression: lzo_when_sizes_differ(r.size_real, r.size_compressed),
        }
    }
}

/// Build 2947 / XDB directory record
///
/// | Offset | Field           | Description                                   |
/// |--------|-----------------|-----------------------------------------------|
/// | 0x00   | record size     | 2 bytes: name length + 16                     |
/// | 0x02   | size real       | 4 bytes: size once decompressed               |
/// | 0x06   | size compressed | 4 bytes: stored size                          |
/// | 0x0A   | crc             | 4 bytes: CRC-32 of the stored bytes           |
/// | 0x0E   | name            | record size - 16 bytes, `\` separated         |
/// | ...    | offset          | 4 bytes: absolute payload offset, `0` = folder |
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
#[brw(little)]
pub struct Record2947 {
    /// Name length plus the 16 bytes of fixed fields
    #[br(assert(record_size >= 16, "record size {} is smaller than its fixed fields", record_size))]
    pub record_size: u16,
    /// Size once decompressed
    pub size_real: u32,
    /// Stored size
    pub size_compressed: u32,
    /// CRC-32 of the stored bytes
    pub crc: u32,
    /// Stored name, without terminator
    #[br(count = record_size - 16)]
    pub name: Vec<u8>,
    /// Absolute offset of the payload, `0` for folders
    pub offset: u32,
}

impl From<Record2947> for FileEntry {
    fn from(r: Record2947) -> Self {
        FileEntry {
            path: path_from_raw(&r.name),
            name_raw: r.name.into_boxed_slice(),
            offset: r.offset,
            size_real: r.size_real,
            size_compressed: r.size_compressed,
            crc: Some(r.crc),
            compression: lzo_when_sizes_differ(r.size_real, r.size_compressed),
        }
    }
}

impl TryFrom<&FileEntry> for Record2947 {
    type Error = crate::error::Error;

    fn try_from(entry: &FileEntry) -> Result<Self, Self::Error> {
        let name = entry.stored_name().into_owned();
        let record_size = name
            .len()
            .checked_add(16)
            .and_then(|size| u16::try_from(size).ok())
            .ok_or_else(|| crate::error::Error::NameTooLong(entry.path.clone()))?;

        Ok(Record2947 {
            record_size,
            size_real: entry.size_real,
            size_compressed: entry.size_compressed,
            crc: entry.crc.unwrap_or(0),
            name,
            offset: entry.offset,
        })
    }
}

fn lzo_when_sizes_differ(size_real: u32, size_compressed: u32) -> PayloadCompression {
    if size_real != size_compressed {
        PayloadCompression::Lzo
    } else {
        PayloadCompression::None
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::{BinRead, BinWrite};
    use pretty_assertions::{assert_eq, assert_str_eq};

    use super::*;
    use crate::error::{Error, Result};

    #[test]
    fn read_2947_record() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x15, 0x00,
            0x0B, 0x00, 0x00, 0x00,
            0x0B, 0x00, 0x00, 0x00,
            0x85, 0x11, 0x4A, 0x0D,
            0x61, 0x5C, 0x62, 0x2E, 0x63,
            0x08, 0x00, 0x00, 0x00,
        ]);

        let record = Record2947::read(&mut input)?;
        assert_eq!(record.record_size, 21);
        assert_eq!(record.name, b"a\\b.c");

        let entry = FileEntry::from(record);
        assert_eq!(
            entry,
            FileEntry {
                path: "a/b.c".into(),
                name_raw: b"a\\b.c".to_vec().into_boxed_slice(),
                offset: 8,
                size_real: 11,
                size_compressed: 11,
                crc: Some(0x0D4A_1185),
                compression: PayloadCompression::None,
            }
        );

        Ok(())
    }

    #[test]
    fn write_2947_record_uses_backslashes() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            0x1A, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x63, 0x6F, 0x6E, 0x66, 0x69, 0x67, 0x5C, 0x61, 0x69, 0x5C,
            0x00, 0x00, 0x00, 0x00,
        ];

        let record = Record2947::try_from(&FileEntry::folder("config/ai/"))?;
        let mut output = Cursor::new(Vec::new());
        record.write(&mut output)?;

        assert_str_eq!(
            format!("{:02X?}", output.into_inner()),
            format!("{:02X?}", expected)
        );

        Ok(())
    }

    #[test]
    fn short_2947_record_is_rejected() {
        let mut input = Cursor::new(vec![0x0F, 0x00, 0x00, 0x00]);
        assert!(Record2947::read(&mut input).is_err());
    }

    #[test]
    fn overlong_name_is_rejected() {
        let entry = FileEntry::folder("x".repeat(u16::MAX as usize));
        assert!(matches!(
            Record2947::try_from(&entry),
            Err(Error::NameTooLong(_))
        ));
    }

    #[test]
    fn cp1251_name_is_kept_verbatim() -> Result<()> {
        // "Конфиг" in cp1251
        let name = b"\xCA\xEE\xED\xF4\xE8\xE3\\a.ltx";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(name.len() as u16 + 16).to_le_bytes());
        bytes.extend_from_slice(&[0; 12]);
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(&8u32.to_le_bytes());

        let entry = FileEntry::from(Record2947::read(&mut Cursor::new(&bytes))?);
        assert!(!entry.has_exact_path());
        assert_eq!(&*entry.name_raw, name);
        assert_eq!(entry.path, "\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}/a.ltx");

        let mut output = Cursor::new(Vec::new());
        Record2947::try_from(&entry)?.write(&mut output)?;
        assert_eq!(output.into_inner(), bytes);

        Ok(())
    }

    #[test]
    fn read_legacy_records() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x61, 0x5C, 0x62, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
        ]);
        let entry = FileEntry::from(Record1114::read(&mut input)?);
        assert_eq!(entry.path, "a/b");
        assert_eq!(entry.compression, PayloadCompression::Lzhuf);
        assert_eq!(entry.size_compressed, 32);
        assert_eq!(entry.crc, None);

        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x61, 0x00,
            0x10, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
        ]);
        let entry = FileEntry::from(Record2215::read(&mut input)?);
        assert_eq!(entry.offset, 16);
        assert_eq!(entry.size_real, 64);
        assert_eq!(entry.compression, PayloadCompression::Lzo);

        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x61, 0x00,
            0xEF, 0xBE, 0xAD, 0xDE,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ]);
        let entry = FileEntry::from(Record2945::read(&mut input)?);
        assert!(entry.is_folder());
        assert_eq!(entry.crc, Some(0xDEAD_BEEF));

        Ok(())
    }
}
