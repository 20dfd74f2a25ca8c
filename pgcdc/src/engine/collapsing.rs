//! `CollapsingMergeTree`: every mutation is encoded as sign-annotated rows
//! that a background merge algebraically cancels. An update is a cancel of
//! the old row paired with an assertion of the new one; a delete is a bare
//! cancel.

use async_trait::async_trait;

use super::{reconstruct_toast, row_to_json, FlushError, TableAdapter};
use crate::destination::{DestinationClient, DestinationRow};
use crate::lsn::Lsn;
use crate::wire::TupleData;

pub struct CollapsingMergeTreeAdapter {
    destination_table: String,
    destination: DestinationClient,
    batch_rows: usize,
    sign_column: String,
    columns: Vec<String>,
    pending: Vec<DestinationRow>,
}

impl CollapsingMergeTreeAdapter {
    pub fn new(
        destination_table: String,
        destination: DestinationClient,
        batch_rows: usize,
        sign_column: String,
    ) -> Self {
        Self {
            destination_table,
            destination,
            batch_rows,
            sign_column,
            columns: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn signed(&self, mut row: DestinationRow, sign: i8) -> DestinationRow {
        row.insert(self.sign_column.clone(), serde_json::Value::from(sign));
        row
    }

    async fn flush_if_full(&mut self) -> Result<(), FlushError> {
        if self.pending.len() >= self.batch_rows {
            self.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TableAdapter for CollapsingMergeTreeAdapter {
    fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    fn begin(&mut self) {}

    async fn insert(&mut self, _lsn: Lsn, new: &TupleData) -> Result<(), FlushError> {
        let row = self.signed(row_to_json(&self.columns, new), 1);
        self.pending.push(row);
        self.flush_if_full().await
    }

    async fn update(
        &mut self,
        _lsn: Lsn,
        old: &TupleData,
        new: &TupleData,
    ) -> Result<(), FlushError> {
        let resolved = reconstruct_toast(old, new);
        let cancel = self.signed(row_to_json(&self.columns, old), -1);
        let assert = self.signed(row_to_json(&self.columns, &resolved), 1);
        self.pending.push(cancel);
        self.pending.push(assert);
        self.flush_if_full().await
    }

    async fn delete(&mut self, _lsn: Lsn, old: &TupleData) -> Result<(), FlushError> {
        let row = self.signed(row_to_json(&self.columns, old), -1);
        self.pending.push(row);
        self.flush_if_full().await
    }

    async fn commit(&mut self) -> Result<(), FlushError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.destination
            .insert_batch(&self.destination_table, &self.pending)
            .await?;
        self.pending.clear();
        Ok(())
    }

    async fn sync_row(&mut self, row: &TupleData) -> Result<(), FlushError> {
        let encoded = self.signed(row_to_json(&self.columns, row), 1);
        self.pending.push(encoded);
        self.flush_if_full().await
    }

    async fn close(&mut self) -> Result<(), FlushError> {
        self.commit().await
    }
}
