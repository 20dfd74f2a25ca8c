//! The source-database collaborator: connection establishment and startup
//! parameter negotiation are tokio-postgres' job. We only call its narrow,
//! already-connected surface (`query`, `simple_query`, `copy_both_simple`).

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio_postgres::config::ReplicationMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, CopyBothDuplex, NoTls, Row, SimpleQueryMessage};

use pgcdc_config::SourceConfig;

use crate::error::Error;

/// A connection to the source, used either for catalog queries / the
/// bootstrap transaction, or (via [`start_replication`]) for the ongoing
/// streaming connection. Each purpose gets its own `SourceClient`; Postgres
/// does not allow mixing regular queries and replication commands on one
/// connection.
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    async fn connect_with(config: &SourceConfig, replication: bool) -> Result<Self, Error> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .dbname(&config.database);

        if let Some(password) = &config.password {
            pg_config.password(password);
        }

        if replication {
            pg_config.replication_mode(ReplicationMode::Logical);
        }

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(Error::SourceConnect)?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("source connection closed: {}", err);
            }
        });

        Ok(Self { client })
    }

    /// Connect for catalog queries / COPY, using regular query protocol.
    pub async fn connect(config: &SourceConfig) -> Result<Self, Error> {
        Self::connect_with(config, false).await
    }

    /// Connect in replication mode, required for `CREATE_REPLICATION_SLOT`
    /// and `START_REPLICATION`.
    pub async fn connect_replication(config: &SourceConfig) -> Result<Self, Error> {
        Self::connect_with(config, true).await
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        Ok(self.client.query(sql, params).await?)
    }

    pub async fn execute(&self, sql: &str) -> Result<(), Error> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// Run a replication-protocol command (`CREATE_REPLICATION_SLOT`,
    /// `DROP_REPLICATION_SLOT`) and return its result row as strings, since
    /// these commands don't go through the regular extended-query protocol.
    pub async fn simple_query_row(&self, sql: &str) -> Result<Vec<String>, Error> {
        let messages = self.client.simple_query(sql).await?;
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                return Ok((0..row.len())
                    .map(|i| row.get(i).unwrap_or_default().to_string())
                    .collect());
            }
        }
        Err(Error::OutOfSync("simple query: no result row"))
    }

    /// Begin the streaming replication command and return the raw
    /// bidirectional `CopyBoth` stream. Decoding `XLogData`/`KeepAlive`
    /// frames out of it is the stream consumer's job, not this adapter's.
    pub async fn start_replication(
        &self,
        slot: &str,
        publication: &str,
        from_lsn: crate::lsn::Lsn,
    ) -> Result<ReplicationStream, Error> {
        let query = format!(
            r#"START_REPLICATION SLOT "{}" LOGICAL {} (proto_version '2', publication_names '{}')"#,
            slot, from_lsn, publication
        );
        let duplex = self
            .client
            .copy_both_simple::<Bytes>(&query)
            .await?;

        Ok(ReplicationStream { duplex })
    }
}

/// The live replication byte stream: `XLogData` payloads flow in, standby
/// status updates flow out, both as raw `CopyData` bodies.
pub struct ReplicationStream {
    duplex: CopyBothDuplex<Bytes>,
}

impl ReplicationStream {
    /// Read the next `CopyData` payload off the wire. `None` means the
    /// source ended the stream (e.g. `DROP_REPLICATION_SLOT` elsewhere, or a
    /// server restart).
    pub async fn recv(&mut self) -> Result<Option<Bytes>, Error> {
        match self.duplex.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    /// Send a standby status update (or any other `CopyData` feedback frame)
    /// back to the source.
    pub async fn send(&mut self, payload: Bytes) -> Result<(), Error> {
        self.duplex.send(payload).await?;
        Ok(())
    }
}
