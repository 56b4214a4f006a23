//! Run driver: fetch → discover → transform → load.
//!
//! Stages run one after another and files are processed one at a time in
//! discovery order. The first error stops the run; appends that committed
//! before it are kept.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use snafu::prelude::*;

use crate::{
    discover::{DiscoverError, list_csv_files},
    fetch::{FetchError, RemoteFolder, fetch_folder},
    load::{LoadError, Sink, TargetTable},
    report::{RunReport, RunReportBuilder},
    transform::{TransformError, transform_file},
};

/// Directory the job reads from when none is configured.
pub const DEFAULT_SOURCE_DIR: &str = "./pasta_gdown";

/// Result alias for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The stage that stopped a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// Mirroring the remote folder failed.
    #[snafu(display("Fetch failed: {source}"))]
    Fetch {
        /// Underlying fetch error.
        source: FetchError,
    },

    /// Listing the source directory failed.
    #[snafu(display("Discovery failed: {source}"))]
    Discover {
        /// Underlying discovery error.
        source: DiscoverError,
    },

    /// A source file could not be transformed.
    #[snafu(display("Transform failed: {source}"))]
    Transform {
        /// Underlying transform error.
        source: TransformError,
    },

    /// A transformed file could not be appended.
    #[snafu(display("Load of {} failed: {source}", path.display()))]
    Load {
        /// Source file whose rows were being appended.
        path: PathBuf,
        /// Underlying load error.
        source: LoadError,
    },
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Local directory scanned for CSV files (and the fetch destination).
    pub source_dir: PathBuf,
    /// Remote folder id to mirror into `source_dir` first; `None` skips
    /// the fetch stage.
    pub fetch_folder: Option<String>,
    /// Table every file is appended to.
    pub target: TargetTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            fetch_folder: None,
            target: TargetTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Config reading from `source_dir` with the default target.
    pub fn new(source_dir: impl AsRef<Path>) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

/// Run the whole job once.
///
/// `remote` is only used when `config.fetch_folder` is set. `sink` is only
/// called for discovered files, so an empty source directory never touches
/// the destination store.
pub async fn run_pipeline<R, S>(
    config: &PipelineConfig,
    remote: &R,
    sink: &S,
) -> PipelineResult<RunReport>
where
    R: RemoteFolder + ?Sized,
    S: Sink + ?Sized,
{
    let mut report = RunReportBuilder::new();

    if let Some(folder_id) = &config.fetch_folder {
        let fetched = fetch_folder(remote, folder_id, &config.source_dir)
            .await
            .context(FetchSnafu)?;
        log::info!(
            "fetched {} files ({} bytes) into {}",
            fetched.files.len(),
            fetched.bytes,
            config.source_dir.display()
        );
        report.set_fetched(fetched.files);
    }

    let files = list_csv_files(&config.source_dir)
        .await
        .context(DiscoverSnafu)?;
    report.set_discovered(files.clone());

    for path in files {
        let start = Instant::now();
        let table = transform_file(&path).await.context(TransformSnafu)?;
        let rows = sink
            .append(&config.target, &table)
            .await
            .context(LoadSnafu { path: &path })?;
        let elapsed = start.elapsed();
        log::debug!("{}: {rows} rows in {elapsed:?}", path.display());
        report.push_file(path, rows, elapsed);
    }

    Ok(report.finish())
}
