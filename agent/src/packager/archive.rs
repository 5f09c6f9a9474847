//! Deterministic ZIP archives of embedded scripts.
use super::{error, Result};
use crate::encoding::base64_encode;
use snafu::ResultExt;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Deflates `files` into a ZIP archive, in the given order. Every entry carries the same fixed
/// timestamp so that equal input always yields an equal archive.
pub fn zip_files(files: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        let entry = file_name(name);
        writer
            .start_file(entry, options)
            .context(error::ArchiveSnafu { name: *name })?;
        writer
            .write_all(content)
            .context(error::ArchiveWriteSnafu { name: *name })?;
    }
    let cursor = writer
        .finish()
        .context(error::ArchiveSnafu { name: "<archive>" })?;
    Ok(cursor.into_inner())
}

/// `base64(zip(files))`.
pub fn zip_base64(files: &[(&str, Vec<u8>)]) -> Result<String> {
    Ok(base64_encode(zip_files(files)?))
}

/// Entries are stored flat, by file name.
fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_zip_files() {
        let files = vec![
            ("windows/windowscsehelper.ps1", b"function Write-Log {}".to_vec()),
            ("windows/sendlogs.ps1", b"param($Path)".to_vec()),
        ];
        let bytes = zip_files(&files).unwrap();
        assert_eq!(bytes, zip_files(&files).unwrap());

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("sendlogs.ps1")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "param($Path)");
    }
}
