//! Mirroring a remote shared folder into a local directory.
//!
//! The remote host is abstracted by [`RemoteFolder`]; [`fetch_folder`] only
//! walks the listing and writes bytes, so it can be driven by the Google
//! Drive client in [`drive`] or by an in-process fake.
//!
//! Files already present locally under the same name are overwritten.
//! Sub-folders are mirrored into sub-directories.

pub mod drive;

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::prelude::*;
use tokio::fs;

pub use drive::GoogleDriveFolder;

/// Result alias for the fetch stage.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised while fetching a remote folder.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    /// The folder URL does not name a folder we know how to fetch.
    #[snafu(display("Not a shared folder URL or id: '{url}'"))]
    InvalidFolderUrl {
        /// The rejected input.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// A request to the remote host failed or returned a non-success status.
    #[snafu(display("Request to {url} failed: {source}"))]
    Http {
        /// Requested URL (without credentials).
        url: String,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// A local directory could not be created.
    #[snafu(display("Failed to create directory {}: {source}", path.display()))]
    CreateDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A downloaded file could not be written.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    WriteFile {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Kind of an entry in a remote folder listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A downloadable file.
    File,
    /// A nested folder that is listed in turn.
    Folder,
}

/// One entry of a remote folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Host-specific identifier used to list or download the entry.
    pub id: String,
    /// Display name; becomes the local file name.
    pub name: String,
    /// File or folder.
    pub kind: EntryKind,
}

/// A remote file host that can list a folder and download its files.
#[async_trait::async_trait]
pub trait RemoteFolder: Send + Sync {
    /// List the direct children of `folder_id`.
    async fn list(&self, folder_id: &str) -> FetchResult<Vec<RemoteEntry>>;

    /// Download the full contents of `file`.
    async fn download(&self, file: &RemoteEntry) -> FetchResult<Bytes>;
}

/// What a fetch left on disk.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Local path of every downloaded file, once each, in first-download
    /// order.
    pub files: Vec<PathBuf>,
    /// Total size of those files.
    pub bytes: u64,
}

/// Local name for a remote entry. Path separators are replaced so a remote
/// name cannot point outside the destination directory.
fn local_name(entry: &RemoteEntry) -> String {
    let name: String = entry
        .name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match name.trim() {
        "" | "." | ".." => entry.id.clone(),
        _ => name,
    }
}

async fn create_dir(path: &Path) -> FetchResult<()> {
    fs::create_dir_all(path)
        .await
        .context(CreateDirSnafu { path })
}

/// Copy every file of the remote folder `folder_id` into `dest`.
///
/// `dest` (and any missing parents) is created first. The first failing
/// request or write aborts the fetch; files written before it stay on disk.
/// Two remote files with the same name in one folder land on the same local
/// path: the later download wins and a warning is logged.
pub async fn fetch_folder<R>(remote: &R, folder_id: &str, dest: &Path) -> FetchResult<FetchReport>
where
    R: RemoteFolder + ?Sized,
{
    create_dir(dest).await?;

    let mut report = FetchReport::default();
    let mut seen = HashSet::new();
    let mut written: HashMap<PathBuf, u64> = HashMap::new();
    let mut pending = vec![(folder_id.to_string(), dest.to_path_buf())];

    while let Some((id, dir)) = pending.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }

        for entry in remote.list(&id).await? {
            let target = dir.join(local_name(&entry));
            match entry.kind {
                EntryKind::Folder => {
                    create_dir(&target).await?;
                    pending.push((entry.id, target));
                }
                EntryKind::File => {
                    let body = remote.download(&entry).await?;
                    fs::write(&target, &body)
                        .await
                        .context(WriteFileSnafu { path: &target })?;
                    log::info!("fetched {} ({} bytes)", target.display(), body.len());
                    let size = body.len() as u64;
                    report.bytes += size;
                    match written.insert(target.clone(), size) {
                        Some(previous) => {
                            log::warn!(
                                "{} fetched twice; keeping the later copy",
                                target.display()
                            );
                            report.bytes -= previous;
                        }
                        None => report.files.push(target),
                    }
                }
            }
        }
    }

    Ok(report)
}
