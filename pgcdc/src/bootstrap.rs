//! Snapshot bootstrap: takes a consistent snapshot of every configured table
//! before the replication stream starts, so the destination begins from a
//! known-consistent baseline instead of an arbitrary partial state.

use std::collections::HashMap;

use pgcdc_config::Config;

use crate::destination::DestinationClient;
use crate::engine::{build_adapter, TableAdapter};
use crate::error::Error;
use crate::lsn::Lsn;
use crate::source::SourceClient;
use crate::wire::{Cell, TupleData};

/// Result of the temporary-slot creation command: the permanent slot is
/// created separately, but the temporary one is what hands us an atomic
/// (snapshot, LSN) pair to start from.
pub struct SnapshotHandle {
    pub consistent_lsn: Lsn,
    pub snapshot_name: String,
}

/// Issue `CREATE_REPLICATION_SLOT ... TEMPORARY LOGICAL pgoutput
/// USE_SNAPSHOT` on a replication-mode connection and parse its result row.
/// `sync_tables` drops the slot explicitly once every table is synced;
/// nothing here should be relied on to clean it up before that.
pub async fn open_snapshot(replication_client: &SourceClient) -> Result<SnapshotHandle, Error> {
    let row = replication_client
        .simple_query_row(
            r#"CREATE_REPLICATION_SLOT "pgcdc_snapshot" TEMPORARY LOGICAL pgoutput USE_SNAPSHOT"#,
        )
        .await?;

    let consistent_point = row.get(1).ok_or(Error::OutOfSync("missing consistent_point"))?;
    let snapshot_name = row.get(2).ok_or(Error::OutOfSync("missing snapshot_name"))?;

    Ok(SnapshotHandle {
        consistent_lsn: consistent_point
            .parse()
            .map_err(|_| Error::OutOfSync("invalid consistent_point"))?,
        snapshot_name: snapshot_name.clone(),
    })
}

/// Ensure the permanent logical replication slot configured for ongoing
/// streaming exists, creating it if this is a first run. Returns the LSN the
/// stream should start from: the slot's own `confirmed_flush_lsn` if it
/// already existed, or the snapshot's consistent point for a fresh slot.
pub async fn ensure_replication_slot(
    replication_client: &SourceClient,
    slot_name: &str,
    snapshot: &SnapshotHandle,
) -> Result<Lsn, Error> {
    let existing = replication_client
        .query(
            "SELECT confirmed_flush_lsn::text FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    if let Some(row) = existing.first() {
        let lsn_text: String = row.get(0);
        return lsn_text
            .parse()
            .map_err(|_| Error::OutOfSync("invalid confirmed_flush_lsn"));
    }

    let query = format!(
        r#"CREATE_REPLICATION_SLOT "{}" LOGICAL pgoutput"#,
        slot_name
    );
    replication_client.simple_query_row(&query).await?;
    Ok(snapshot.consistent_lsn)
}

/// Build one adapter per configured table and copy its current contents
/// (as seen by `snapshot`) into the destination, batching rows per
/// `sync_batch_rows`.
pub async fn sync_tables(
    snapshot_client: &SourceClient,
    replication_client: &SourceClient,
    config: &Config,
    destination: &DestinationClient,
    snapshot: &SnapshotHandle,
) -> Result<HashMap<String, Box<dyn TableAdapter>>, Error> {
    snapshot_client
        .execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .await?;
    snapshot_client
        .execute(&format!(
            "SET TRANSACTION SNAPSHOT '{}'",
            snapshot.snapshot_name
        ))
        .await?;

    let mut adapters = HashMap::with_capacity(config.tables.len());

    for (table_name, table_config) in &config.tables {
        let columns = table_columns(snapshot_client, table_name).await?;
        let mut adapter = build_adapter(
            table_config,
            table_name,
            destination.clone(),
            config.sync_batch_rows,
        );
        adapter.set_columns(columns.clone());

        if let Err(err) = sync_one_table(snapshot_client, table_name, &columns, adapter.as_mut()).await
        {
            snapshot_client.execute("ROLLBACK").await.ok();
            return Err(Error::Sync(table_name.clone(), Box::new(err)));
        }

        adapters.insert(table_name.clone(), adapter);
    }

    snapshot_client.execute("COMMIT").await?;

    // All tables synced from the snapshot; the temporary slot has done its
    // job. Drop it so Postgres stops retaining WAL on its behalf — it would
    // otherwise sit there pinning `restart_lsn` for the life of the process.
    replication_client
        .execute(r#"DROP_REPLICATION_SLOT "pgcdc_snapshot""#)
        .await?;

    Ok(adapters)
}

async fn table_columns(client: &SourceClient, table_name: &str) -> Result<Vec<String>, Error> {
    let rows = client
        .query(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = $1 ORDER BY ordinal_position",
            &[&table_name],
        )
        .await?;

    if rows.is_empty() {
        return Err(Error::UnknownTable(table_name.to_string()));
    }

    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn sync_one_table(
    client: &SourceClient,
    table_name: &str,
    columns: &[String],
    adapter: &mut dyn TableAdapter,
) -> Result<(), Error> {
    let select_list = columns
        .iter()
        .map(|c| format!("\"{}\"::text", c))
        .collect::<Vec<_>>()
        .join(", ");

    client
        .execute(&format!(
            "DECLARE pgcdc_cur CURSOR FOR SELECT {} FROM \"{}\"",
            select_list, table_name
        ))
        .await?;

    loop {
        let rows = client
            .query("FETCH FORWARD 10000 FROM pgcdc_cur", &[])
            .await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            let cells = (0..columns.len())
                .map(|i| match row.get::<_, Option<String>>(i) {
                    Some(s) => Cell::Text(s),
                    None => Cell::Null,
                })
                .collect();
            adapter.sync_row(&TupleData { columns: cells }).await.map_err(|e| {
                Error::Flush(table_name.to_string(), e)
            })?;
        }
    }

    client.execute("CLOSE pgcdc_cur").await?;
    adapter
        .close()
        .await
        .map_err(|e| Error::Flush(table_name.to_string(), e))
}
