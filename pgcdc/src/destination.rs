//! The destination-database collaborator: an HTTP client for the columnar
//! store's bulk-insert endpoint. Transport and connection pooling are
//! `reqwest`'s job; we only expose the one operation every table engine
//! adapter needs.

use serde_json::Value;
use thiserror::Error;

use pgcdc_config::DestinationConfig;

/// A single destination row, column name -> JSON-encoded value. `Value::Null`
/// encodes a SQL NULL.
pub type DestinationRow = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("destination returned {status}: {body}")]
    Server {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct DestinationClient {
    http: reqwest::Client,
    base_url: String,
    database: String,
    auth: Option<(String, String)>,
}

impl DestinationClient {
    pub fn new(config: &DestinationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            auth: config
                .user
                .clone()
                .map(|user| (user, config.password.clone().unwrap_or_default())),
        }
    }

    /// Confirm the destination is reachable before the coordinator commits
    /// to a bootstrap/stream run.
    pub async fn ping(&self) -> Result<(), FlushError> {
        self.query("SELECT 1").await.map(|_| ())
    }

    async fn query(&self, sql: &str) -> Result<String, FlushError> {
        let mut request = self.http.post(&self.base_url).query(&[("query", sql)]);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FlushError::Server { status, body });
        }

        Ok(body)
    }

    /// Bulk-insert `rows` into `table` using `FORMAT JSONEachRow`, one JSON
    /// object per line. A single HTTP round trip per call, matching the
    /// "atomic from the adapter's viewpoint" batch-flush contract.
    pub async fn insert_batch(
        &self,
        table: &str,
        rows: &[DestinationRow],
    ) -> Result<(), FlushError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for row in rows {
            body.push_str(&Value::Object(row.clone()).to_string());
            body.push('\n');
        }

        let sql = format!(
            "INSERT INTO \"{}\".\"{}\" FORMAT JSONEachRow",
            self.database, table
        );

        let mut request = self
            .http
            .post(&self.base_url)
            .query(&[("query", sql.as_str())])
            .body(body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlushError::Server { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_batch_config_builds_without_auth() {
        let config = DestinationConfig {
            url: "http://localhost:8123/".to_string(),
            database: "default".to_string(),
            user: None,
            password: None,
        };
        let client = DestinationClient::new(&config);
        assert_eq!(client.base_url, "http://localhost:8123");
        assert!(client.auth.is_none());
    }
}
