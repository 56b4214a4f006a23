//! CSV → derived-column transform backed by DataFusion.
//!
//! Each call opens a fresh [`SessionContext`], registers the CSV under the
//! name [`SOURCE_TABLE`] (header row required, column types inferred) and
//! runs the projection built by [`transform_sql`]. The derivation is a
//! relational projection, not a row loop: integer operands multiply exactly
//! and any decimal operand promotes the result to `Float64`.
//!
//! `quantidade` and `valor` are matched case-insensitively against the
//! header. An integer product that does not fit in the result type is an
//! error, never a wrapped value.

use std::path::{Path, PathBuf};

use arrow::{
    compute::{cast, kernels::numeric::mul},
    datatypes::{Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use datafusion::{
    error::DataFusionError,
    prelude::{CsvReadOptions, SessionConfig, SessionContext},
};
use snafu::prelude::*;

use crate::load::quote_identifier;

/// Name the CSV is registered under inside the session.
pub const SOURCE_TABLE: &str = "source";

/// Quantity column expected in every source file.
pub const QUANTITY_COLUMN: &str = "quantidade";

/// Unit price column expected in every source file.
pub const PRICE_COLUMN: &str = "valor";

/// Column appended by the transform.
pub const TOTAL_COLUMN: &str = "total_vendas";

/// Header of `source` naming `wanted`: an exact match first, then one that
/// differs only in ASCII case. Falls back to `wanted` itself, so a missing
/// column is reported by query planning.
pub fn resolve_column<'a>(schema: &'a Schema, wanted: &'a str) -> &'a str {
    let names = || schema.fields().iter().map(|f| f.name().as_str());
    names()
        .find(|name| *name == wanted)
        .or_else(|| names().find(|name| name.eq_ignore_ascii_case(wanted)))
        .unwrap_or(wanted)
}

/// Projection that keeps every source column and appends [`TOTAL_COLUMN`].
pub fn transform_sql(quantity: &str, price: &str) -> String {
    format!(
        "SELECT *, {} * {} AS {TOTAL_COLUMN} FROM {SOURCE_TABLE}",
        quote_identifier(quantity),
        quote_identifier(price)
    )
}

/// Recompute an integer total with checked arithmetic so overflow surfaces
/// as an error instead of a wrapped value.
fn check_integer_total(
    batch: &RecordBatch,
    quantity: &str,
    price: &str,
) -> Result<(), ArrowError> {
    let (Some(total), Some(q), Some(p)) = (
        batch.column_by_name(TOTAL_COLUMN),
        batch.column_by_name(quantity),
        batch.column_by_name(price),
    ) else {
        return Ok(());
    };
    let result_type = total.data_type();
    if !result_type.is_integer() {
        return Ok(());
    }

    mul(&cast(q, result_type)?, &cast(p, result_type)?)?;
    Ok(())
}

/// Result alias for the transform stage.
pub type TransformResult<T> = Result<T, TransformError>;

/// Errors raised while reading or transforming a source file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransformError {
    /// The path cannot be handed to DataFusion (not valid UTF-8).
    #[snafu(display("Source path is not valid UTF-8: {}", path.display()))]
    NonUtf8Path {
        /// Offending path.
        path: PathBuf,
    },

    /// The file does not exist or cannot be accessed.
    #[snafu(display("Cannot open CSV {}: {source}", path.display()))]
    Open {
        /// Source file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file could not be parsed or its schema could not be inferred.
    #[snafu(display("Failed to read CSV {}: {source}", path.display()))]
    Read {
        /// Source file.
        path: PathBuf,
        /// Underlying DataFusion error.
        source: DataFusionError,
    },

    /// Planning or executing the derivation failed (for example a missing
    /// `quantidade`/`valor` column, or a non-numeric value).
    #[snafu(display("Failed to derive total_vendas for {}: {source}", path.display()))]
    Query {
        /// Source file.
        path: PathBuf,
        /// Underlying DataFusion error.
        source: DataFusionError,
    },
}

/// A source file's rows plus the derived `total_vendas` column.
#[derive(Debug, Clone)]
pub struct SalesTable {
    source: PathBuf,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl SalesTable {
    /// Build a table from already materialized batches.
    pub fn new(source: impl Into<PathBuf>, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            source: source.into(),
            schema,
            batches,
        }
    }

    /// File the rows were read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Arrow schema of every batch, derived column last.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Materialized batches in file order.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of rows across all batches.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// True when the file held a header but no data rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

/// Read `path` as CSV and return it with `total_vendas` appended.
///
/// The file is only read. Errors carry the path so the caller can report
/// which file stopped the run.
pub async fn transform_file(path: &Path) -> TransformResult<SalesTable> {
    let location = path.to_str().context(NonUtf8PathSnafu { path })?;
    tokio::fs::metadata(path)
        .await
        .context(OpenSnafu { path })?;

    let ctx = SessionContext::new_with_config(SessionConfig::new());
    ctx.register_csv(
        SOURCE_TABLE,
        location,
        CsvReadOptions::new().has_header(true),
    )
    .await
    .context(ReadSnafu { path })?;

    let source_schema = ctx
        .table(SOURCE_TABLE)
        .await
        .context(ReadSnafu { path })?
        .schema()
        .inner()
        .clone();
    let quantity = resolve_column(&source_schema, QUANTITY_COLUMN);
    let price = resolve_column(&source_schema, PRICE_COLUMN);
    let sql = transform_sql(quantity, price);

    log::debug!("{}: {sql}", path.display());
    let df = ctx.sql(&sql).await.context(QuerySnafu { path })?;
    let schema = df.schema().inner().clone();
    let batches = df.collect().await.context(QuerySnafu { path })?;
    for batch in &batches {
        check_integer_total(batch, quantity, price)
            .map_err(DataFusionError::from)
            .context(QuerySnafu { path })?;
    }

    let table = SalesTable::new(path, schema, batches);
    log::info!("transformed {} ({} rows)", path.display(), table.num_rows());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::AsArray,
        datatypes::{DataType, Float64Type, Int64Type},
    };
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn write_csv(dir: &TempDir, name: &str, body: &str) -> std::io::Result<PathBuf> {
        let path = dir.path().join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    fn float_column(table: &SalesTable, name: &str) -> Vec<f64> {
        table
            .batches()
            .iter()
            .flat_map(|b| {
                let col = b.column_by_name(name).expect("column present");
                let col = col.as_primitive::<Float64Type>();
                (0..col.len()).map(|i| col.value(i)).collect::<Vec<_>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn decimal_price_yields_float_total() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(&tmp, "vendas.csv", "produto,quantidade,valor\ncaneta,3,10.5\n")?;

        let table = transform_file(&path).await?;

        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.schema().field_with_name(TOTAL_COLUMN)?.data_type(),
            &DataType::Float64
        );
        assert_eq!(float_column(&table, TOTAL_COLUMN), vec![31.5]);
        Ok(())
    }

    #[tokio::test]
    async fn integer_operands_multiply_exactly() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(
            &tmp,
            "ints.csv",
            "quantidade,valor\n2,7\n1000000,3000\n0,99\n",
        )?;

        let table = transform_file(&path).await?;

        let batch = &table.batches()[0];
        let totals = batch
            .column_by_name(TOTAL_COLUMN)
            .ok_or("missing total")?
            .as_primitive::<Int64Type>();
        let values: Vec<i64> = (0..totals.len()).map(|i| totals.value(i)).collect();
        assert_eq!(values, vec![14, 3_000_000_000, 0]);
        Ok(())
    }

    #[tokio::test]
    async fn every_row_matches_quantity_times_price() -> TestResult {
        let tmp = TempDir::new()?;
        let mut body = String::from("id,quantidade,valor\n");
        for i in 0..50 {
            body.push_str(&format!("{i},{},{}.{}\n", i % 7 + 1, i * 3, i % 10));
        }
        let path = write_csv(&tmp, "many.csv", &body)?;

        let table = transform_file(&path).await?;
        assert_eq!(table.num_rows(), 50);

        for batch in table.batches() {
            let qty = batch.column_by_name(QUANTITY_COLUMN).ok_or("qty")?;
            let qty = qty.as_primitive::<Int64Type>();
            let price = batch.column_by_name(PRICE_COLUMN).ok_or("price")?;
            let price = price.as_primitive::<Float64Type>();
            let total = batch.column_by_name(TOTAL_COLUMN).ok_or("total")?;
            let total = total.as_primitive::<Float64Type>();
            for i in 0..batch.num_rows() {
                let expected = qty.value(i) as f64 * price.value(i);
                assert!((total.value(i) - expected).abs() < 1e-9);
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn keeps_source_columns_and_appends_total_last() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(
            &tmp,
            "cols.csv",
            "data,produto,quantidade,valor\n2024-01-02,lapis,4,1.25\n",
        )?;

        let table = transform_file(&path).await?;

        let names: Vec<&str> = table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(
            names,
            vec!["data", "produto", QUANTITY_COLUMN, PRICE_COLUMN, TOTAL_COLUMN]
        );
        assert_eq!(table.source(), path.as_path());
        Ok(())
    }

    #[tokio::test]
    async fn does_not_modify_source_file() -> TestResult {
        let tmp = TempDir::new()?;
        let body = "quantidade,valor\n1,2.5\n";
        let path = write_csv(&tmp, "keep.csv", body)?;

        transform_file(&path).await?;

        assert_eq!(std::fs::read_to_string(&path)?, body);
        Ok(())
    }

    #[tokio::test]
    async fn missing_price_column_fails_query() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(&tmp, "sem_valor.csv", "produto,quantidade\ncaneta,3\n")?;

        let err = transform_file(&path).await.unwrap_err();

        assert!(matches!(err, TransformError::Query { .. }), "{err:?}");
        assert!(err.to_string().contains("valor"));
        assert!(err.to_string().contains("sem_valor.csv"));
        Ok(())
    }

    #[tokio::test]
    async fn integer_overflow_is_an_error() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(&tmp, "grande.csv", "quantidade,valor\n4611686018427387904,4\n")?;

        let err = transform_file(&path).await.unwrap_err();

        assert!(matches!(err, TransformError::Query { .. }), "{err:?}");
        assert!(err.to_string().to_lowercase().contains("overflow"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn largest_fitting_product_is_kept() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(&tmp, "limite.csv", "quantidade,valor\n4611686018427387903,2\n")?;

        let table = transform_file(&path).await?;

        let totals = table.batches()[0]
            .column_by_name(TOTAL_COLUMN)
            .ok_or("missing total")?
            .as_primitive::<Int64Type>();
        assert_eq!(totals.value(0), i64::MAX - 1);
        Ok(())
    }

    #[tokio::test]
    async fn header_case_does_not_matter() -> TestResult {
        let tmp = TempDir::new()?;
        let path = write_csv(&tmp, "m.csv", "Produto,Quantidade,VALOR\ncaneta,3,10.5\n")?;

        let table = transform_file(&path).await?;

        let names: Vec<&str> = table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["Produto", "Quantidade", "VALOR", TOTAL_COLUMN]);
        assert_eq!(float_column(&table, TOTAL_COLUMN), vec![31.5]);
        Ok(())
    }

    #[test]
    fn exact_header_wins_over_case_insensitive_match() {
        use arrow::datatypes::Field;
        let schema = Schema::new(vec![
            Field::new("Valor", DataType::Float64, true),
            Field::new("valor", DataType::Float64, true),
        ]);

        assert_eq!(resolve_column(&schema, PRICE_COLUMN), "valor");
        assert_eq!(resolve_column(&schema, QUANTITY_COLUMN), QUANTITY_COLUMN);
        assert_eq!(
            transform_sql("Quantidade", "valor"),
            "SELECT *, \"Quantidade\" * \"valor\" AS total_vendas FROM source"
        );
    }

    #[tokio::test]
    async fn missing_file_fails_before_query() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("absent.csv");

        let err = transform_file(&path).await.unwrap_err();

        assert!(matches!(err, TransformError::Open { .. }), "{err:?}");
        Ok(())
    }
}
