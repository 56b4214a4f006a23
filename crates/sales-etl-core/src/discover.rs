//! Source file discovery.
//!
//! Lists the `.csv` files directly inside a directory. Sub-directories are
//! never entered, and a directory entry only counts when it is a regular
//! file (a folder called `old.csv` is skipped).

use std::path::{Path, PathBuf};

use snafu::prelude::*;
use tokio::fs;

/// Suffix a file name must end with to be picked up.
pub const CSV_SUFFIX: &str = ".csv";

/// Result alias for discovery.
pub type DiscoverResult<T> = Result<T, DiscoverError>;

/// Errors raised while listing a source directory.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DiscoverError {
    /// The directory does not exist or cannot be opened.
    #[snafu(display("Cannot read source directory {path}: {source}"))]
    ReadDir {
        /// Directory that was scanned.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An entry of the directory could not be inspected.
    #[snafu(display("Cannot inspect entry in {path}: {source}"))]
    ReadEntry {
        /// Directory that was scanned.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Return the full paths of the `.csv` files in `dir`, ordered by file name.
pub async fn list_csv_files(dir: &Path) -> DiscoverResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.context(ReadDirSnafu {
        path: dir.display().to_string(),
    })?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.context(ReadEntrySnafu {
        path: dir.display().to_string(),
    })? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(CSV_SUFFIX) {
            continue;
        }

        let file_type = entry.file_type().await.context(ReadEntrySnafu {
            path: dir.display().to_string(),
        })?;
        // Follow symlinks so a linked CSV still counts.
        let is_file = if file_type.is_symlink() {
            fs::metadata(entry.path())
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
        } else {
            file_type.is_file()
        };

        if is_file {
            found.push(entry.path());
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    log::info!("discovered {} csv file(s) in {}", found.len(), dir.display());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn keeps_only_csv_files() -> TestResult {
        let tmp = TempDir::new()?;
        for name in ["c.csv", "b.txt", "a.csv"] {
            std::fs::write(tmp.path().join(name), "quantidade,valor\n1,2\n")?;
        }

        let found = list_csv_files(tmp.path()).await?;

        assert_eq!(names(&found), vec!["a.csv", "c.csv"]);
        assert!(found.iter().all(|p| p.starts_with(tmp.path())));
        Ok(())
    }

    #[tokio::test]
    async fn skips_directories_and_does_not_recurse() -> TestResult {
        let tmp = TempDir::new()?;
        std::fs::create_dir(tmp.path().join("archive.csv"))?;
        std::fs::create_dir(tmp.path().join("nested"))?;
        std::fs::write(tmp.path().join("nested").join("inner.csv"), "x\n")?;
        std::fs::write(tmp.path().join("top.csv"), "x\n")?;

        let found = list_csv_files(tmp.path()).await?;

        assert_eq!(names(&found), vec!["top.csv"]);
        Ok(())
    }

    #[tokio::test]
    async fn suffix_is_case_sensitive() -> TestResult {
        let tmp = TempDir::new()?;
        std::fs::write(tmp.path().join("UPPER.CSV"), "x\n")?;
        std::fs::write(tmp.path().join("data.csv.bak"), "x\n")?;

        let found = list_csv_files(tmp.path()).await?;

        assert!(found.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_directory_yields_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let found = list_csv_files(tmp.path()).await?;
        assert!(found.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() -> TestResult {
        let tmp = TempDir::new()?;
        let missing = tmp.path().join("does-not-exist");

        let err = list_csv_files(&missing).await.unwrap_err();

        assert!(matches!(err, DiscoverError::ReadDir { .. }));
        assert!(err.to_string().contains("does-not-exist"));
        Ok(())
    }
}
