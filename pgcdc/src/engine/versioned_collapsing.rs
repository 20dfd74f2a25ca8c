//! `VersionedCollapsingMergeTree`: like `CollapsingMergeTree`, but the merge
//! is only commutative if the version column strictly increases across the
//! cancel/assert pairs emitted for a given key. We derive that version from
//! the message LSN with a sub-sequence counter, since a single transaction
//! can emit more than one mutation at the same LSN.

use async_trait::async_trait;

use super::{reconstruct_toast, row_to_json, FlushError, TableAdapter};
use crate::destination::{DestinationClient, DestinationRow};
use crate::lsn::Lsn;
use crate::wire::TupleData;

/// Bits reserved for the in-transaction sub-sequence. 65536 mutations of a
/// single key within one source transaction would overflow into the next
/// LSN's range; this is a generous bound for realistic workloads.
const SUBSEQ_BITS: u32 = 16;

pub struct VersionedCollapsingMergeTreeAdapter {
    destination_table: String,
    destination: DestinationClient,
    batch_rows: usize,
    sign_column: String,
    version_column: String,
    columns: Vec<String>,
    pending: Vec<DestinationRow>,
    subseq: u64,
}

impl VersionedCollapsingMergeTreeAdapter {
    pub fn new(
        destination_table: String,
        destination: DestinationClient,
        batch_rows: usize,
        sign_column: String,
        version_column: String,
    ) -> Self {
        Self {
            destination_table,
            destination,
            batch_rows,
            sign_column,
            version_column,
            columns: Vec::new(),
            pending: Vec::new(),
            subseq: 0,
        }
    }

    fn next_version(&mut self, lsn: Lsn) -> u64 {
        let version = (lsn.as_u64() << SUBSEQ_BITS) | self.subseq;
        self.subseq += 1;
        version
    }

    fn encode(&mut self, row_source: &TupleData, sign: i8, lsn: Lsn) -> DestinationRow {
        let version = self.next_version(lsn);
        let mut row = row_to_json(&self.columns, row_source);
        row.insert(self.sign_column.clone(), serde_json::Value::from(sign));
        row.insert(self.version_column.clone(), serde_json::Value::from(version));
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
impl TableAdapter for VersionedCollapsingMergeTreeAdapter {
    fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    fn begin(&mut self) {
        self.subseq = 0;
    }

    async fn insert(&mut self, lsn: Lsn, new: &TupleData) -> Result<(), FlushError> {
        let row = self.encode(new, 1, lsn);
        self.pending.push(row);
        self.flush_if_full().await
    }

    async fn update(&mut self, lsn: Lsn, old: &TupleData, new: &TupleData) -> Result<(), FlushError> {
        let resolved = reconstruct_toast(old, new);
        let cancel = self.encode(old, -1, lsn);
        let assert = self.encode(&resolved, 1, lsn);
        self.pending.push(cancel);
        self.pending.push(assert);
        self.flush_if_full().await
    }

    async fn delete(&mut self, lsn: Lsn, old: &TupleData) -> Result<(), FlushError> {
        let row = self.encode(old, -1, lsn);
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
        let encoded = self.encode(row, 1, Lsn::from_u64(0));
        self.pending.push(encoded);
        self.flush_if_full().await
    }

    async fn close(&mut self) -> Result<(), FlushError> {
        self.commit().await
    }
}
