//! Pinecone serverless [`VectorIndex`] over the REST API.
//!
//! Control-plane calls (list/describe/create/delete) go to
//! `https://api.pinecone.io`; data-plane calls (upsert/query) go to the
//! per-index host reported by describe, cached after first lookup.
//!
//! Every request carries `Api-Key` and a pinned `X-Pinecone-API-Version`.
//! Chunk text and source path travel as record metadata (`text`,
//! `source`), so query results can be rendered without a second store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use super::{check_compatible, Candidate, EnsureOutcome, IndexDescription, IndexSpec, VectorIndex};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::models::VectorRecord;

const CONTROL_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    control_url: String,
    upsert_batch_size: usize,
    ready_timeout: Duration,
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            control_url: CONTROL_URL.to_string(),
            upsert_batch_size: config.upsert_batch_size.max(1),
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Point control-plane calls somewhere other than the public API.
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, IndexError> {
        Ok(builder.send().await?)
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription, IndexError> {
        let started = Instant::now();
        loop {
            let description = self
                .describe(name)
                .await?
                .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
            if description.ready {
                return Ok(description);
            }
            if started.elapsed() >= self.ready_timeout {
                return Err(IndexError::NotReady {
                    name: name.to_string(),
                    secs: self.ready_timeout.as_secs(),
                });
            }
            tracing::debug!(index = name, "waiting for index to become ready");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn host(&self, name: &str) -> Result<String, IndexError> {
        let cached = self
            .hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(host) = cached {
            return Ok(host);
        }

        let description = self
            .describe(name)
            .await?
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        let host = description
            .host
            .ok_or_else(|| IndexError::BadResponse(format!("index '{}' has no host", name)))?;
        Ok(host)
    }

    fn remember_host(&self, description: &IndexDescription) {
        if let Some(host) = &description.host {
            self.hosts
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(description.name.clone(), host.clone());
        }
    }
}

async fn error_for(response: reqwest::Response) -> IndexError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    IndexError::Api { status, body }
}

fn data_url(host: &str, path: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host.trim_end_matches('/'), path)
    } else {
        format!("https://{}{}", host.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, IndexError> {
        if let Some(existing) = self.describe(&spec.name).await? {
            check_compatible(spec, &existing)?;
            if !existing.ready {
                self.wait_until_ready(&spec.name).await?;
            }
            return Ok(EnsureOutcome::Existing);
        }

        tracing::info!(index = %spec.name, dims = spec.dims, metric = %spec.metric, "creating index");
        let body = json!({
            "name": spec.name,
            "dimension": spec.dims,
            "metric": spec.metric,
            "spec": {
                "serverless": {
                    "cloud": spec.cloud,
                    "region": spec.region,
                }
            }
        });
        let url = format!("{}/indexes", self.control_url);
        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;

        let outcome = match response.status() {
            s if s.is_success() => EnsureOutcome::Created,
            // Created concurrently by someone else.
            StatusCode::CONFLICT => EnsureOutcome::Existing,
            _ => return Err(error_for(response).await),
        };

        let description = self.wait_until_ready(&spec.name).await?;
        check_compatible(spec, &description)?;
        Ok(outcome)
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, IndexError> {
        let url = format!("{}/indexes/{}", self.control_url, name);
        let response = self.send(self.request(Method::GET, &url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let json: Value = response.json().await?;
        let description = parse_description(&json)?;
        self.remember_host(&description);
        Ok(Some(description))
    }

    async fn delete_index(&self, name: &str) -> Result<bool, IndexError> {
        let url = format!("{}/indexes/{}", self.control_url, name);
        let response = self.send(self.request(Method::DELETE, &url)).await?;

        self.hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(error_for(response).await),
        }
    }

    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }
        let url = data_url(&self.host(name).await?, "/vectors/upsert");
        let mut upserted = 0;

        for batch in records.chunks(self.upsert_batch_size) {
            let vectors: Vec<Value> = batch
                .iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "values": r.values,
                        "metadata": {
                            "text": r.text,
                            "source": r.source_path,
                        }
                    })
                })
                .collect();

            let response = self
                .send(self.request(Method::POST, &url).json(&json!({ "vectors": vectors })))
                .await?;
            if !response.status().is_success() {
                return Err(error_for(response).await);
            }

            let json: Value = response.json().await?;
            let count = json
                .get("upsertedCount")
                .and_then(|c| c.as_u64())
                .map(|c| c as usize)
                .unwrap_or(batch.len());
            tracing::debug!(index = name, count, "upserted batch");
            upserted += count;
        }

        Ok(upserted)
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        let url = data_url(&self.host(name).await?, "/query");
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeValues": true,
            "includeMetadata": true,
        });

        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let json: Value = response.json().await?;
        parse_matches(&json)
    }
}

fn parse_description(json: &Value) -> Result<IndexDescription, IndexError> {
    let field = |key: &str| {
        json.get(key)
            .ok_or_else(|| IndexError::BadResponse(format!("index description missing '{}'", key)))
    };

    let name = field("name")?
        .as_str()
        .ok_or_else(|| IndexError::BadResponse("index name is not a string".into()))?
        .to_string();
    let dims = field("dimension")?
        .as_u64()
        .ok_or_else(|| IndexError::BadResponse("index dimension is not a number".into()))?
        as usize;
    let metric = field("metric")?
        .as_str()
        .ok_or_else(|| IndexError::BadResponse("index metric is not a string".into()))?
        .to_string();
    let ready = json
        .pointer("/status/ready")
        .and_then(|r| r.as_bool())
        .unwrap_or(false);
    let host = json
        .get("host")
        .and_then(|h| h.as_str())
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    Ok(IndexDescription {
        name,
        dims,
        metric,
        ready,
        host,
    })
}

fn parse_matches(json: &Value) -> Result<Vec<Candidate>, IndexError> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| IndexError::BadResponse("query response missing 'matches'".into()))?;

    matches
        .iter()
        .map(|m| {
            let id = m
                .get("id")
                .and_then(|i| i.as_str())
                .ok_or_else(|| IndexError::BadResponse("match missing 'id'".into()))?;
            let metadata = m.get("metadata");
            let meta_str = |key: &str| {
                metadata
                    .and_then(|md| md.get(key))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let values = m
                .get("values")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|x| x.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default();

            Ok(Candidate {
                id: id.to_string(),
                text: meta_str("text"),
                source_path: meta_str("source"),
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                values,
            })
        })
        .collect()
}
