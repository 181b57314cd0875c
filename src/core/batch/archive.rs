//! Single-entry stored archive and base64 wire encoding

use crate::core::xml::names::ARCHIVE_ENTRY;
use crate::domain::{EkuatiaError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Stores `batch_xml` as the sole `lote.xml` entry of an uncompressed archive
///
/// The entry timestamp is fixed, so equal input gives equal archive bytes.
pub fn compress(batch_xml: &[u8]) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(batch_xml.len() + 256)));
    writer
        .start_file(ARCHIVE_ENTRY, options)
        .map_err(|e| EkuatiaError::PackagingInvariant(format!("cannot start archive entry: {e}")))?;
    writer.write_all(batch_xml)?;
    let cursor = writer
        .finish()
        .map_err(|e| EkuatiaError::PackagingInvariant(format!("cannot finish archive: {e}")))?;
    let bytes = cursor.into_inner();

    let entries = entry_names(&bytes)?;
    if entries != [ARCHIVE_ENTRY] {
        return Err(EkuatiaError::PackagingInvariant(format!(
            "archive holds [{}] instead of exactly [{ARCHIVE_ENTRY}]",
            entries.join(", ")
        )));
    }
    Ok(bytes)
}

/// Base64 without line wrapping
pub fn encode(archive: &[u8]) -> String {
    STANDARD.encode(archive)
}

/// Inverse of [`encode`]
pub fn decode(payload: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| EkuatiaError::Validation(format!("payload is not valid base64: {e}")))
}

/// One archive entry as read back from bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub stored: bool,
    pub contents: Vec<u8>,
}

/// Names of all entries, in archive order
pub fn entry_names(archive: &[u8]) -> Result<Vec<String>> {
    let zip = open(archive)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

/// Reads every entry with its compression method
pub fn read_entries(archive: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut zip = open(archive)?;
    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let stored = zip
            .by_index_raw(index)
            .map_err(|e| EkuatiaError::Validation(format!("unreadable archive entry: {e}")))?
            .compression()
            == CompressionMethod::Stored;

        let mut file = zip
            .by_index(index)
            .map_err(|e| EkuatiaError::Validation(format!("unreadable archive entry: {e}")))?;
        // Header sizes are untrusted
        let declared = usize::try_from(file.size()).unwrap_or(usize::MAX);
        let mut contents = Vec::with_capacity(declared.min(archive.len()));
        file.read_to_end(&mut contents)?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            stored,
            contents,
        });
    }
    Ok(entries)
}

fn open(archive: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(archive))
        .map_err(|e| EkuatiaError::Validation(format!("not a valid archive: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &[u8] = br#"<rLoteDE xmlns="http://ekuatia.set.gov.py/sifen/xsd"/>"#;

    #[test]
    fn test_single_stored_entry() {
        let archive = compress(XML).unwrap();
        let entries = read_entries(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "lote.xml");
        assert!(entries[0].stored);
        assert_eq!(entries[0].contents, XML);
    }

    #[test]
    fn test_compress_is_deterministic() {
        assert_eq!(compress(XML).unwrap(), compress(XML).unwrap());
    }

    #[test]
    fn test_payload_round_trip_without_wrapping() {
        let archive = compress(&XML.repeat(40)).unwrap();
        let payload = encode(&archive);
        assert!(!payload.contains('\n'));
        assert_eq!(decode(&payload).unwrap(), archive);
    }

    #[test]
    fn test_garbage_is_not_an_archive() {
        assert!(matches!(
            read_entries(b"definitely not zip").unwrap_err(),
            EkuatiaError::Validation(_)
        ));
    }

    #[test]
    fn test_oversized_header_does_not_reserve_declared_size() {
        let mut archive = compress(XML).unwrap();
        let central = archive
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        // Uncompressed size field of the central directory entry
        archive[central + 24..central + 28].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());

        match read_entries(&archive) {
            Ok(entries) => assert_eq!(entries[0].contents, XML),
            Err(e) => assert!(matches!(e, EkuatiaError::Validation(_) | EkuatiaError::Io(_))),
        }
    }
}
