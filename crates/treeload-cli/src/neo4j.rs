//! Neo4j store over the HTTP transactional endpoint.
//!
//! Every batch is sent as one auto-commit request to
//! `POST {url}/db/{database}/tx/commit`. Variables do not survive between
//! requests, so batches are rendered with [`render_batch`], which re-binds
//! earlier entities by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use treeload_model::{Batch, EntityKind, KindCounts};
use treeload_store::cypher::{self, render_batch, CypherStatement};
use treeload_store::{GraphStore, Result, StoreError, StoreSession};

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout: Option<Duration>,
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: &'a [CypherStatement],
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl TxResult {
    fn scalar(&self) -> Option<&Value> {
        self.data.first()?.row.first()
    }
}

/// Turn an HTTP status and body into results, or the first reported error.
fn parse_response(status: u16, body: &str) -> Result<Vec<TxResult>> {
    if !(200..300).contains(&status) {
        return Err(StoreError::new(format!("neo4j http error {status}: {body}")));
    }
    let response: TxResponse = serde_json::from_str(body)
        .map_err(|e| StoreError::new(format!("neo4j returned invalid JSON: {e}")))?;
    if let Some(error) = response.errors.first() {
        return Err(StoreError::new(format!("{}: {}", error.code, error.message)));
    }
    Ok(response.results)
}

fn count_of(result: Option<&TxResult>) -> Result<usize> {
    result
        .and_then(TxResult::scalar)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::new("count query returned no rows"))
}

pub struct Neo4jHttpStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jHttpStore {
    pub fn connect(config: &Neo4jConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(StoreError::transport)?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    fn commit(&self, statements: &[CypherStatement]) -> Result<Vec<TxResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&TxRequest { statements })
            .send()
            .map_err(|e| {
                StoreError::transport(format!("failed to reach neo4j at {} ({e})", self.endpoint))
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(StoreError::transport)?;
        parse_response(status, &body)
    }
}

pub struct Neo4jSession<'s> {
    store: &'s Neo4jHttpStore,
    batches: usize,
}

impl StoreSession for Neo4jSession<'_> {
    fn execute(&mut self, batch: &Batch<'_>) -> Result<()> {
        self.batches += 1;
        self.store.commit(&render_batch(batch))?;
        Ok(())
    }
}

impl Drop for Neo4jSession<'_> {
    fn drop(&mut self) {
        debug!(batches = self.batches, "neo4j session closed");
    }
}

impl GraphStore for Neo4jHttpStore {
    type Session<'s> = Neo4jSession<'s>;

    fn open_session(&mut self) -> Result<Self::Session<'_>> {
        Ok(Neo4jSession {
            store: self,
            batches: 0,
        })
    }

    fn reset_state(&mut self) -> Result<()> {
        self.commit(&[CypherStatement::new(cypher::DELETE_ALL)])?;
        let results = self.commit(&[CypherStatement::new(cypher::SHOW_CONSTRAINTS)])?;
        let drops: Vec<CypherStatement> = results
            .iter()
            .flat_map(|r| r.data.iter())
            .filter_map(|row| row.row.first().and_then(Value::as_str))
            .map(cypher::drop_constraint_named)
            .collect();
        debug!(constraints = drops.len(), "dropping constraints");
        // Schema changes must not share a transaction with each other.
        for statement in drops {
            self.commit(std::slice::from_ref(&statement))?;
        }
        Ok(())
    }

    fn ensure_constraints(&mut self, kinds: &[EntityKind]) -> Result<()> {
        for &kind in kinds {
            self.commit(&[cypher::create_constraint(kind)])?;
        }
        Ok(())
    }

    fn drop_constraints(&mut self, kinds: &[EntityKind]) -> Result<()> {
        for &kind in kinds {
            self.commit(&[cypher::drop_constraint(kind)])?;
        }
        Ok(())
    }

    fn count_by_kind(&self) -> Result<KindCounts> {
        let results = self.commit(&[
            cypher::count_by_label(EntityKind::Directory),
            cypher::count_by_label(EntityKind::File),
        ])?;
        Ok(KindCounts {
            directories: count_of(results.first())?,
            files: count_of(results.get(1))?,
        })
    }

    fn count_edges(&self) -> Result<usize> {
        let results = self.commit(&[cypher::count_edges()])?;
        count_of(results.first())
    }
}
