//! In-process sink.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use arrow::array::RecordBatch;

use super::{
    LoadResult, Sink, TargetTable,
    columns::{ExistingColumn, column_cells, plan_columns},
};
use crate::transform::SalesTable;

#[derive(Debug, Default)]
struct StoredTable {
    columns: Vec<ExistingColumn>,
    batches: Vec<RecordBatch>,
}

/// Sink that keeps appended batches in memory.
///
/// The first append to a target fixes its columns exactly as
/// [`PostgresSink`](super::PostgresSink) would create them, and later
/// appends are checked against them with the same rules.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<BTreeMap<TargetTable, StoredTable>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<TargetTable, StoredTable>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows stored in `target` (0 if it was never appended to).
    pub fn rows(&self, target: &TargetTable) -> u64 {
        self.lock()
            .get(target)
            .map(|t| t.batches.iter().map(|b| b.num_rows() as u64).sum())
            .unwrap_or(0)
    }

    /// Batches stored in `target`, in append order.
    pub fn batches(&self, target: &TargetTable) -> Vec<RecordBatch> {
        self.lock()
            .get(target)
            .map(|t| t.batches.clone())
            .unwrap_or_default()
    }

    /// Columns of `target` as they would be declared in the database.
    pub fn columns(&self, target: &TargetTable) -> Option<Vec<ExistingColumn>> {
        self.lock().get(target).map(|t| t.columns.clone())
    }

    /// Every target appended to so far.
    pub fn targets(&self) -> Vec<TargetTable> {
        self.lock().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Sink for MemorySink {
    async fn append(&self, target: &TargetTable, table: &SalesTable) -> LoadResult<u64> {
        let mut tables = self.lock();
        let existing = tables.get(target).map(|t| t.columns.as_slice());
        let plan = plan_columns(target, table.schema(), existing)?;

        // Run the same conversions the database path would.
        for batch in table.batches() {
            for (col, array) in plan.iter().zip(batch.columns()) {
                column_cells(&col.name, array, col.kind)?;
            }
        }

        let stored = tables.entry(target.clone()).or_insert_with(|| StoredTable {
            columns: plan
                .iter()
                .map(|c| ExistingColumn {
                    name: c.name.clone(),
                    data_type: c.kind.ddl().to_string(),
                })
                .collect(),
            batches: Vec::new(),
        });
        stored.batches.extend(table.batches().iter().cloned());

        let rows = table.num_rows() as u64;
        log::info!(
            "dry run: {rows} rows from {} accepted for {target}",
            table.source().display()
        );
        Ok(rows)
    }
}
