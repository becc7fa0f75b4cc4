use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

/// `<db>.tar.gz` next to the database.
pub fn backup_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".tar.gz");
    PathBuf::from(name)
}

/// Packs the current database into `<db>.tar.gz`, replacing any previous
/// backup. Returns `None` when there is no database yet.
pub fn backup_database(db_path: &Path) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }

    let target = backup_path(db_path);
    let file_name = db_path
        .file_name()
        .context("database path has no file name")?;

    let file = File::create(&target)
        .with_context(|| format!("Failed to create archive at {}", target.display()))?;

    let mut archive = Builder::new(GzEncoder::new(file, Compression::default()));
    archive
        .append_path_with_name(db_path, file_name)
        .with_context(|| format!("Failed to add {} to archive", db_path.display()))?;

    let encoder = archive
        .into_inner()
        .context("Failed to finalize tar archive")?;
    encoder.finish().context("Failed to finalize gzip stream")?;

    let size_kb = std::fs::metadata(&target)?.len() / 1024;
    log::info!("backup created: {} ({size_kb} KB)", target.display());

    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;

    #[test]
    fn test_backup_contains_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("bmbase.sqlite");
        std::fs::write(&db, b"not really sqlite").unwrap();

        let target = backup_database(&db).unwrap().unwrap();
        assert_eq!(target, dir.path().join("bmbase.sqlite.tar.gz"));

        let mut archive = Archive::new(GzDecoder::new(File::open(&target).unwrap()));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("bmbase.sqlite"));

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"not really sqlite");
    }

    #[test]
    fn test_missing_database_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(backup_database(&dir.path().join("none.sqlite"))
            .unwrap()
            .is_none());
    }
}
