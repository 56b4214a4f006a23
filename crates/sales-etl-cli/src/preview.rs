use std::{io::Write, time::Duration};

use arrow::{
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};
use sales_etl_core::SalesTable;
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{ArrowSnafu, CliResult, OutputSnafu};

#[derive(Debug, Clone)]
pub struct Preview {
    pub label: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: u64,
    pub elapsed: Option<Duration>,
}

impl Preview {
    /// Format at most `max_rows` rows of `table`.
    pub fn from_table(
        table: &SalesTable,
        max_rows: usize,
        elapsed: Option<Duration>,
    ) -> CliResult<Self> {
        let label = table
            .source()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| table.source().display().to_string());
        let columns = table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();

        let options = FormatOptions::default().with_null("NULL");
        let mut rows = Vec::new();
        let mut left = max_rows;
        for batch in table.batches() {
            if left == 0 {
                break;
            }
            let formatters = batch
                .columns()
                .iter()
                .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
                .collect::<Result<Vec<_>, ArrowError>>()
                .context(ArrowSnafu)?;

            let take = left.min(batch.num_rows());
            for row_idx in 0..take {
                let row = formatters
                    .iter()
                    .map(|f| f.value(row_idx).try_to_string())
                    .collect::<Result<Vec<_>, ArrowError>>()
                    .context(ArrowSnafu)?;
                rows.push(row);
            }
            left -= take;
        }

        Ok(Self {
            label,
            columns,
            rows,
            total_rows: table.num_rows() as u64,
            elapsed,
        })
    }
}

/// Rounded table with `label` set into its top border.
fn render_table(label: &str, columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    const LABEL_INDENT: usize = 2;
    let label = format!(" {label} ");
    let width = LABEL_INDENT + label.chars().count() + 2;

    let mut builder = Builder::default();
    builder.push_record(columns);
    rows.iter().for_each(|row| builder.push_record(row));

    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(MinWidth::new(width))
        .with(LineText::new(label, Rows::first()).offset(LABEL_INDENT))
        .with(MinWidth::new(width));
    table.to_string()
}

pub fn write_preview<W: Write>(preview: &Preview, out: &mut W) -> CliResult<()> {
    if !preview.rows.is_empty() {
        let rendered = render_table(&preview.label, &preview.columns, &preview.rows);
        writeln!(out, "{rendered}").context(OutputSnafu)?;
    } else if preview.total_rows == 0 {
        writeln!(out, "(no rows)").context(OutputSnafu)?;
    } else {
        writeln!(out, "(preview suppressed; use --max-rows > 0)").context(OutputSnafu)?;
    }

    writeln!(out, "total_rows: {}", preview.total_rows).context(OutputSnafu)?;
    if let Some(d) = preview.elapsed {
        writeln!(out, "elapsed_ms: {}", d.as_millis()).context(OutputSnafu)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{Float64Array, Int64Array, RecordBatch, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn sales(rows: usize) -> Result<SalesTable, ArrowError> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("produto", DataType::Utf8, true),
            Field::new("quantidade", DataType::Int64, true),
            Field::new("total_vendas", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("caneta"); rows])),
                Arc::new(Int64Array::from(vec![3; rows])),
                Arc::new(Float64Array::from(vec![31.5; rows])),
            ],
        )?;
        Ok(SalesTable::new("vendas.csv", schema, vec![batch]))
    }

    #[test]
    fn render_table_labels_border_with_source_name() {
        let columns = vec!["col1".to_string(), "longer".to_string()];
        let rows = vec![
            vec!["a".to_string(), "value".to_string()],
            vec!["bb".to_string(), "x".to_string()],
        ];

        let rendered = render_table("vendas_janeiro.csv", &columns, &rows);

        assert!(rendered.contains("col1"));
        assert!(rendered.contains("longer"));
        let top = rendered.lines().next().unwrap_or_default();
        assert!(top.contains("vendas_janeiro.csv"), "{rendered}");
    }

    #[test]
    fn preview_is_bounded_by_max_rows() -> TestResult {
        let preview = Preview::from_table(&sales(5)?, 2, None)?;

        assert_eq!(preview.label, "vendas.csv");
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.total_rows, 5);
        assert_eq!(preview.rows[0], ["caneta", "3", "31.5"]);
        Ok(())
    }

    #[test]
    fn summary_reports_total_rows() -> TestResult {
        let preview = Preview::from_table(&sales(3)?, 0, Some(Duration::from_millis(4)))?;
        let mut out = Vec::new();

        write_preview(&preview, &mut out)?;

        let text = String::from_utf8(out)?;
        assert!(text.contains("(preview suppressed"));
        assert!(text.contains("total_rows: 3"));
        assert!(text.contains("elapsed_ms: 4"));
        Ok(())
    }
}
