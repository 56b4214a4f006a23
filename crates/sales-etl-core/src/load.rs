//! Append-only loading of transformed tables.
//!
//! [`Sink`] is the seam between the pipeline and the destination store.
//! Two implementations ship with the crate:
//!
//! - [`PostgresSink`]: binary `COPY` into PostgreSQL, one transaction per
//!   append, creating the target table on first use.
//! - [`MemorySink`]: keeps batches in process; used for dry runs and tests.
//!
//! Both apply the same column rules (see [`columns`]) so a dry run rejects
//! exactly the appends the database would.

pub mod columns;
pub mod memory;
pub mod postgres;

use std::fmt;

use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::transform::SalesTable;

pub use memory::MemorySink;
pub use postgres::PostgresSink;

/// Result alias for the load stage.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors raised while appending to a target table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// No connection string was configured.
    #[snafu(display("No database connection string configured (set DATABASE_URL)"))]
    MissingConnectionString,

    /// The database could not be reached or rejected the credentials.
    #[snafu(display("Failed to connect to database: {source}"))]
    Connect {
        /// Underlying driver error.
        source: tokio_postgres::Error,
    },

    /// A statement against the target table failed.
    #[snafu(display("Database error while appending to {target}: {source}"))]
    Database {
        /// Qualified target table.
        target: String,
        /// Underlying driver error.
        source: tokio_postgres::Error,
    },

    /// A source column has a type with no column mapping.
    #[snafu(display("Column '{column}' has unsupported type {data_type}"))]
    UnsupportedType {
        /// Offending column.
        column: String,
        /// Arrow or SQL type name.
        data_type: String,
    },

    /// The rows do not fit the existing target table.
    #[snafu(display("Schema mismatch on {target}, column '{column}': {reason}"))]
    SchemaMismatch {
        /// Qualified target table.
        target: String,
        /// Offending column.
        column: String,
        /// What did not fit.
        reason: String,
    },

    /// A column could not be converted to the target type.
    #[snafu(display("Failed to convert column '{column}': {source}"))]
    Convert {
        /// Offending column.
        column: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Fixed schema namespace plus table name of an append target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetTable {
    schema: String,
    name: String,
}

impl TargetTable {
    /// Schema namespace used when none is given.
    pub const DEFAULT_SCHEMA: &'static str = "outros";

    /// Table name used when none is given.
    pub const DEFAULT_NAME: &'static str = "vendas_calculada";

    /// Target `schema.name`.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Schema namespace.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted `"schema"."name"` for use in SQL text.
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

impl Default for TargetTable {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SCHEMA, Self::DEFAULT_NAME)
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Destination store that appends rows to a named table.
///
/// Appends are insert-only: rows already in the target are never touched
/// and nothing is deduplicated, so appending the same table twice stores
/// its rows twice.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Append every row of `table` to `target`; returns rows written.
    async fn append(&self, target: &TargetTable, table: &SalesTable) -> LoadResult<u64>;
}
