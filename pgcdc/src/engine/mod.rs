//! Per-engine translation of row mutations into column-store inserts.
//!
//! Modeled as a tagged capability set (the [`TableAdapter`] trait) rather
//! than open inheritance: each engine is a plain, value-typed struct that
//! implements the same handful of methods. The coordinator owns a
//! `HashMap<String, Box<dyn TableAdapter>>` and never needs to know which
//! concrete engine lives behind any given entry.

pub mod collapsing;
pub mod merge_tree;
pub mod replacing;
pub mod versioned_collapsing;

pub use collapsing::CollapsingMergeTreeAdapter;
pub use merge_tree::MergeTreeAdapter;
pub use replacing::ReplacingMergeTreeAdapter;
pub use versioned_collapsing::VersionedCollapsingMergeTreeAdapter;

use async_trait::async_trait;
use serde_json::Value;

use pgcdc_config::TableConfig;

pub use crate::destination::FlushError;
use crate::destination::{DestinationClient, DestinationRow};
use crate::lsn::Lsn;
use crate::wire::{Cell, TupleData};

/// Common capability set every table-engine adapter implements. Adapter
/// methods are only ever called from the coordinator task; adapters are not
/// internally thread-safe and don't need to be.
#[async_trait]
pub trait TableAdapter: Send {
    /// Record the column names in source order, learned from the
    /// `Relation` message. Called once before the first mutation.
    fn set_columns(&mut self, columns: Vec<String>);

    /// Start accumulating a batch for a new transaction frame. Cheap:
    /// allocating a fresh buffer is simpler than clearing one and avoids
    /// leaking identities across frames.
    fn begin(&mut self);

    async fn insert(&mut self, lsn: Lsn, new: &TupleData) -> Result<(), FlushError>;
    async fn update(&mut self, lsn: Lsn, old: &TupleData, new: &TupleData)
        -> Result<(), FlushError>;
    async fn delete(&mut self, lsn: Lsn, old: &TupleData) -> Result<(), FlushError>;

    /// Flush the pending batch in one round trip. On error the batch is
    /// considered lost; the coordinator terminates rather than attempt a
    /// partial-commit recovery.
    async fn commit(&mut self) -> Result<(), FlushError>;

    /// Treat `row` as an insert during the initial snapshot COPY.
    async fn sync_row(&mut self, row: &TupleData) -> Result<(), FlushError>;

    /// Flush any in-flight batch and release destination resources. Errors
    /// are logged by the caller but never prevent closing the remaining
    /// adapters.
    async fn close(&mut self) -> Result<(), FlushError>;
}

/// Build the adapter matching a table's configured engine.
pub fn build_adapter(
    table: &TableConfig,
    source_table: &str,
    destination: DestinationClient,
    sync_batch_rows: usize,
) -> Box<dyn TableAdapter> {
    let destination_table = table.destination_name(source_table).to_string();

    match table.engine {
        pgcdc_config::TableEngineKind::MergeTree => Box::new(MergeTreeAdapter::new(
            destination_table,
            destination,
            sync_batch_rows,
        )),
        pgcdc_config::TableEngineKind::ReplacingMergeTree => {
            Box::new(ReplacingMergeTreeAdapter::new(
                destination_table,
                destination,
                sync_batch_rows,
                table
                    .version_column
                    .clone()
                    .expect("validated at config load"),
            ))
        }
        pgcdc_config::TableEngineKind::CollapsingMergeTree => {
            Box::new(CollapsingMergeTreeAdapter::new(
                destination_table,
                destination,
                sync_batch_rows,
                table.sign_column.clone().expect("validated at config load"),
            ))
        }
        pgcdc_config::TableEngineKind::VersionedCollapsingMergeTree => {
            Box::new(VersionedCollapsingMergeTreeAdapter::new(
                destination_table,
                destination,
                sync_batch_rows,
                table.sign_column.clone().expect("validated at config load"),
                table
                    .version_column
                    .clone()
                    .expect("validated at config load"),
            ))
        }
    }
}

/// Replace `unchanged-toast` cells in `new` with the matching cell from
/// `old`. Mandated by requiring `full` replica identity: without the
/// pre-image there would be nothing to substitute.
pub(crate) fn reconstruct_toast(old: &TupleData, new: &TupleData) -> TupleData {
    let columns = new
        .columns
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            if cell.is_unchanged_toast() {
                old.columns.get(i).cloned().unwrap_or(Cell::Null)
            } else {
                cell.clone()
            }
        })
        .collect();

    TupleData { columns }
}

/// Best-effort conversion of a decoded text cell into a JSON value. Numeric
/// text is promoted to a JSON number so the destination's JSON parser
/// doesn't have to coerce every column out of a string; anything else is
/// sent as a JSON string.
fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Null | Cell::UnchangedToast => Value::Null,
        Cell::Text(s) => {
            if let Ok(i) = s.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Value::from(f)
            } else {
                Value::String(s.clone())
            }
        }
    }
}

/// Build a destination row object from column names and a decoded tuple.
pub(crate) fn row_to_json(columns: &[String], tuple: &TupleData) -> DestinationRow {
    let mut row = DestinationRow::new();
    for (name, cell) in columns.iter().zip(tuple.columns.iter()) {
        row.insert(name.clone(), cell_to_json(cell));
    }
    row
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn toast_reconstruction_pulls_from_old_row() {
        let old = TupleData {
            columns: vec![
                Cell::Text("1".into()),
                Cell::Text("big".into()),
                Cell::Text("small".into()),
            ],
        };
        let new = TupleData {
            columns: vec![
                Cell::Text("1".into()),
                Cell::UnchangedToast,
                Cell::Text("smaller".into()),
            ],
        };

        let reconstructed = reconstruct_toast(&old, &new);
        assert_eq!(
            reconstructed.columns,
            vec![
                Cell::Text("1".into()),
                Cell::Text("big".into()),
                Cell::Text("smaller".into()),
            ]
        );
    }

    #[test]
    fn cell_to_json_promotes_numeric_text() {
        assert_eq!(cell_to_json(&Cell::Text("42".into())), Value::from(42));
        assert_eq!(cell_to_json(&Cell::Text("4.5".into())), Value::from(4.5));
        assert_eq!(
            cell_to_json(&Cell::Text("abc".into())),
            Value::String("abc".into())
        );
        assert_eq!(cell_to_json(&Cell::Null), Value::Null);
    }

    #[test]
    fn row_to_json_zips_columns_with_cells() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let tuple = TupleData {
            columns: vec![Cell::Text("1".into()), Cell::Text("a".into())],
        };
        let row = row_to_json(&columns, &tuple);
        assert_eq!(row.get("id"), Some(&Value::from(1)));
        assert_eq!(row.get("name"), Some(&Value::String("a".into())));
    }
}
