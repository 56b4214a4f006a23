//! Core stages of the sales CSV batch job.
//!
//! The job is a straight line of four stages, each exposed as its own
//! module so callers (the CLI, tests, other drivers) can run them alone:
//!
//! - [`fetch`]: mirror a remote shared folder into a local directory.
//! - [`discover`]: list the `.csv` files of a local directory.
//! - [`transform`]: read one CSV through DataFusion and derive
//!   `total_vendas = quantidade * valor`.
//! - [`load`]: append a transformed table to a target table
//!   (PostgreSQL, or an in-memory sink for dry runs).
//!
//! [`pipeline`] wires them together and returns a [`report::RunReport`].
//! Every stage takes its inputs as explicit parameters; nothing here reads
//! the process environment.
#![deny(missing_docs)]

pub mod discover;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod report;
pub mod transform;

pub use discover::{CSV_SUFFIX, DiscoverError, list_csv_files};
pub use fetch::{FetchError, FetchReport, GoogleDriveFolder, RemoteFolder, fetch_folder};
pub use load::{LoadError, MemorySink, PostgresSink, Sink, TargetTable};
pub use pipeline::{PipelineConfig, PipelineError, run_pipeline};
pub use report::{FileReport, RunReport};
pub use transform::{SalesTable, TransformError, transform_file};
