//! Directory table codec
//!
//! The decompressed HEADER chunk is a flat run of records with no count or terminator; parsing
//! stops when the buffer is exhausted. Only the 2947 layout is ever written.

use std::io::{Cursor, Seek};

use binrw::{BinRead, BinWrite};
use tracing::{instrument, trace};

use crate::error::{Error, Result};
use crate::types::{FileEntry, Record1114, Record2215, Record2945, Record2947};
use crate::version::DbVersion;

/// Decode a directory table into its entries, in stored order
#[instrument(level = "debug", skip(data), err, fields(size = data.len()))]
pub fn parse(version: DbVersion, data: &[u8]) -> Result<Vec<FileEntry>> {
    let mut cursor = Cursor::new(data);
    let mut entries = Vec::new();

    while (cursor.position() as usize) < data.len() {
        let offset = cursor.stream_position()?;
        let entry = match version {
            DbVersion::V1114 => Record1114::read(&mut cursor).map(FileEntry::from),
            DbVersion::V2215 => Record2215::read(&mut cursor).map(FileEntry::from),
            DbVersion::V2945 => Record2945::read(&mut cursor).map(FileEntry::from),
            DbVersion::V2947Ru | DbVersion::V2947Ww | DbVersion::Xdb => {
                Record2947::read(&mut cursor).map(FileEntry::from)
            }
        }
        .map_err(|source| Error::InvalidTable { offset, source })?;

        trace!(path = %entry.path, offset = entry.offset, "record");
        entries.push(entry);
    }

    Ok(entries)
}

/// Encode entries as a 2947 / XDB directory table, in the given order
#[instrument(level = "debug", skip(entries), err, fields(entries = entries.len()))]
pub fn serialize(version: DbVersion, entries: &[FileEntry]) -> Result<Vec<u8>> {
    if !version.is_writable() {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut cursor = Cursor::new(Vec::new());
    for entry in entries {
        Record2947::try_from(entry)?.write(&mut cursor)?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod test {
    use pretty_assertions::{assert_eq, assert_str_eq};
    use tracing_test::traced_test;

    use super::*;
    use crate::types::PayloadCompression;

    fn entries() -> Vec<FileEntry> {
        vec![
            FileEntry {
                crc: Some(0),
                ..FileEntry::from_raw_name(*b"scripts\\")
            },
            FileEntry {
                offset: 8,
                size_real: 3,
                size_compressed: 3,
                crc: Some(0x352441C2),
                compression: PayloadCompression::None,
                ..FileEntry::from_raw_name(*b"scripts\\a.script")
            },
        ]
    }

    #[traced_test]
    #[test]
    fn serialize_2947_table() -> Result<()> {
        #[rustfmt::skip]
        let expected = [
            // scripts\ folder
            0x18, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x73, 0x63, 0x72, 0x69, 0x70, 0x74, 0x73, 0x5C,
            0x00, 0x00, 0x00, 0x00,
            // scripts\a.script
            0x20, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0xC2, 0x41, 0x24, 0x35,
            0x73, 0x63, 0x72, 0x69, 0x70, 0x74, 0x73, 0x5C,
            0x61, 0x2E, 0x73, 0x63, 0x72, 0x69, 0x70, 0x74,
            0x08, 0x00, 0x00, 0x00,
        ];

        let result = serialize(DbVersion::Xdb, &entries())?;
        assert_str_eq!(format!("{:02X?}", result), format!("{:02X?}", expected));

        Ok(())
    }

    #[test]
    fn parse_what_was_serialized() -> Result<()> {
        for version in [DbVersion::V2947Ru, DbVersion::V2947Ww, DbVersion::Xdb] {
            let table = serialize(version, &entries())?;
            assert_eq!(parse(version, &table)?, entries());
        }

        Ok(())
    }

    #[test]
    fn legacy_versions_cannot_be_written() {
        for version in [DbVersion::V1114, DbVersion::V2215, DbVersion::V2945] {
            assert!(matches!(
                serialize(version, &entries()),
                Err(Error::UnsupportedVersion(v)) if v == version
            ));
        }
    }

    #[test]
    fn parse_2945_table() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x6C, 0x65, 0x76, 0x65, 0x6C, 0x73, 0x5C, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x6C, 0x65, 0x76, 0x65, 0x6C, 0x73, 0x5C, 0x61, 0x00,
            0x78, 0x56, 0x34, 0x12,
            0x10, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
        ];

        let entries = parse(DbVersion::V2945, &input)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "levels/");
        assert!(entries[0].is_folder());
        assert_eq!(entries[1].path, "levels/a");
        assert_eq!(entries[1].crc, Some(0x12345678));
        assert_eq!(entries[1].compression, PayloadCompression::Lzo);

        Ok(())
    }

    #[test]
    fn empty_table_has_no_entries() -> Result<()> {
        assert!(parse(DbVersion::V2215, &[])?.is_empty());

        Ok(())
    }

    #[test]
    fn truncated_record_reports_its_offset() -> Result<()> {
        let mut table = serialize(DbVersion::Xdb, &entries())?;
        table.truncate(table.len() - 2);

        assert!(matches!(
            parse(DbVersion::Xdb, &table),
            Err(Error::InvalidTable { offset: 26, .. })
        ));

        Ok(())
    }

    #[test]
    fn unterminated_name_is_rejected() {
        let input = [0x61, 0x62, 0x63];
        assert!(matches!(
            parse(DbVersion::V1114, &input),
            Err(Error::InvalidTable { offset: 0, .. })
        ));
    }
}
