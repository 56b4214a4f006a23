use std::path::PathBuf;

use arrow::error::ArrowError;
use sales_etl_core::{DiscoverError, FetchError, PipelineError, TransformError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("{source}"))]
    Pipeline {
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },

    #[snafu(display("Fetch into {} failed: {source}", dir.display()))]
    Fetch { dir: PathBuf, source: FetchError },

    #[snafu(display("{source}"))]
    Discover { source: DiscoverError },

    #[snafu(display(
        "{source}. \
         Ensure the file has a header row with numeric quantidade and valor columns."
    ))]
    Preview {
        #[snafu(source(from(TransformError, Box::new)))]
        source: Box<TransformError>,
    },

    #[snafu(display("Failed to format preview value: {source}"))]
    Arrow { source: ArrowError },

    #[snafu(display("Failed to open log file {}: {source}", path.display()))]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to initialize logger: {source}"))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("Failed to write output: {source}"))]
    Output { source: std::io::Error },
}
