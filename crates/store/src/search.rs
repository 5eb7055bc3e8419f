//! HTTP search-index store
//!
//! Backend for the indexed deployment: documents live in a search index
//! addressed per collection, written through the document CRUD API and the
//! `_bulk` endpoint. Optimistic concurrency uses external versioning: every
//! write carries the document's `_version`, and the index rejects a write
//! whose version does not advance, which is exactly the CAS miss the
//! updater retries on.
//!
//! Secondary-index reconciliation is a no-op here beyond ensuring the index
//! exists: a search index indexes every field.

use std::time::Duration;

use serde_json::{json, Value};

use async_trait::async_trait;
use kaijs_protocol::{ArtifactModel, ArtifactType, UpdateSet};

use crate::error::StoreError;
use crate::traits::{BulkOp, DocStore, IndexSpec};

/// Connection settings for the search backend
#[derive(Debug, Clone)]
pub struct SearchStoreConfig {
    /// Base URL, e.g. `https://search.example.com:9200`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Index holding artifact documents
    pub artifacts_index: String,
    pub timeout: Duration,
}

impl Default for SearchStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            username: None,
            password: None,
            artifacts_index: "artifacts".into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the search index
pub struct SearchStore {
    client: reqwest::Client,
    config: SearchStoreConfig,
}

/// Escape a document id for use as a URL path segment.
fn encode_id(id: &str) -> String {
    id.replace('%', "%25").replace('/', "%2F")
}

/// Render the ndjson payload for a `_bulk` request.
fn render_bulk_body(ops: &[BulkOp]) -> Result<String, StoreError> {
    let mut body = String::new();
    for op in ops {
        let action = json!({
            "index": {"_index": op.collection, "_id": op.id}
        });
        body.push_str(&action.to_string());
        body.push('\n');
        let doc = serde_json::to_string(&op.doc)
            .map_err(|e| StoreError::fatal(format!("encode bulk doc '{}': {}", op.id, e)))?;
        body.push_str(&doc);
        body.push('\n');
    }
    Ok(body)
}

/// Collect per-item failures out of a `_bulk` response.
fn bulk_item_errors(response: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if response.get("errors").and_then(Value::as_bool) != Some(true) {
        return errors;
    }
    if let Some(items) = response.get("items").and_then(Value::as_array) {
        for item in items {
            let Some(action) = item.as_object().and_then(|o| o.values().next()) else {
                continue;
            };
            if let Some(err) = action.get("error") {
                let id = action.get("_id").and_then(Value::as_str).unwrap_or("?");
                errors.push(format!("{}: {}", id, err));
            }
        }
    }
    errors
}

impl SearchStore {
    pub fn new(config: SearchStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::fatal(format!("build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), path);
        let mut req = self.client.request(method, url);
        if let Some(user) = &self.config.username {
            req = req.basic_auth(user, self.config.password.as_deref());
        }
        req
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> StoreError {
        if status.as_u16() == 429 || status.is_server_error() {
            StoreError::transient(format!("{}: {}", status, body))
        } else {
            StoreError::fatal(format!("{}: {}", status, body))
        }
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = format!("{}/_doc/{}", index, encode_id(id));
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        match resp.status() {
            status if status.is_success() => {
                let body: Value = resp.json().await?;
                Ok(body.get("_source").cloned())
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Self::classify_status(status, &body))
            }
        }
    }

    /// Write a full document with external versioning; `Ok(false)` is a
    /// version conflict.
    async fn put_versioned(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
        version: u64,
    ) -> Result<bool, StoreError> {
        let path = format!(
            "{}/_doc/{}?version={}&version_type=external",
            index,
            encode_id(id),
            version
        );
        let resp = self
            .request(reqwest::Method::PUT, &path)
            .json(doc)
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::CONFLICT => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Self::classify_status(status, &body))
            }
        }
    }
}

#[async_trait]
impl DocStore for SearchStore {
    async fn open_collection(
        &self,
        name: &str,
        indexes: &[IndexSpec],
    ) -> Result<(), StoreError> {
        let resp = self.request(reqwest::Method::PUT, name).send().await?;
        let status = resp.status();
        if status.is_success() {
            tracing::info!(index = name, "search index created");
        } else if status == reqwest::StatusCode::BAD_REQUEST {
            // Index already exists.
            tracing::debug!(index = name, "search index present");
        } else {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }
        tracing::debug!(
            index = name,
            declared = indexes.len(),
            "field indexes implicit for search backend"
        );
        Ok(())
    }

    async fn get(
        &self,
        artifact_type: ArtifactType,
        aid: &str,
    ) -> Result<Option<ArtifactModel>, StoreError> {
        let id = format!("{}/{}", artifact_type, aid);
        let Some(doc) = self.get_doc(&self.config.artifacts_index, &id).await? else {
            return Ok(None);
        };
        let model =
            serde_json::from_value(doc).map_err(|e| StoreError::Decode { id, source: e })?;
        Ok(Some(model))
    }

    async fn find_or_create(
        &self,
        proposal: &ArtifactModel,
    ) -> Result<(ArtifactModel, bool), StoreError> {
        let artifact_type = proposal.artifact_type;
        let aid = proposal.aid.clone();
        if let Some(model) = self.get(artifact_type, &aid).await? {
            return Ok((model, false));
        }

        let mut created = proposal.clone();
        created.version = 1;
        let doc = serde_json::to_value(&created)
            .map_err(|e| StoreError::fatal(format!("encode new document: {}", e)))?;
        let landed = self
            .put_versioned(&self.config.artifacts_index, &created.doc_id(), &doc, 1)
            .await?;
        if landed {
            return Ok((created, true));
        }

        // Lost the creation race; the winner's document is authoritative.
        match self.get(artifact_type, &aid).await? {
            Some(model) => Ok((model, false)),
            None => Err(StoreError::transient(
                "document vanished after creation conflict",
            )),
        }
    }

    async fn cas_update(
        &self,
        id: &str,
        expected_version: u64,
        update_set: &UpdateSet,
    ) -> Result<bool, StoreError> {
        let Some(mut doc) = self.get_doc(&self.config.artifacts_index, id).await? else {
            return Ok(false);
        };
        if doc.get("_version").and_then(Value::as_u64) != Some(expected_version) {
            return Ok(false);
        }

        for (path, value) in update_set {
            let mut cur = &mut doc;
            let mut segs = path.split('.').peekable();
            while let Some(seg) = segs.next() {
                if !cur.is_object() {
                    *cur = Value::Object(Default::default());
                }
                let map = cur.as_object_mut().expect("coerced to object above");
                if segs.peek().is_none() {
                    map.insert(seg.to_string(), value.clone());
                    break;
                }
                cur = map.entry(seg.to_string()).or_insert(Value::Null);
            }
        }
        let next = expected_version + 1;
        doc["_version"] = Value::from(next);

        self.put_versioned(&self.config.artifacts_index, id, &doc, next)
            .await
    }

    async fn insert_sideline(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        let path = format!("{}/_doc", collection);
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(&doc)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(Self::classify_status(status, &body))
        }
    }

    async fn bulk_upsert(&self, ops: &[BulkOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let body = render_bulk_body(ops)?;
        let resp = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let response: Value = resp.json().await?;
        let errors = bulk_item_errors(&response);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::BulkRejected(errors.join("; ")))
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
