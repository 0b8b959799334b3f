//! REST adapters for a headless-CMS style asset store.
//!
//! Endpoints used:
//!
//! - `GET /assets/{id}` raw file bytes
//! - `GET|PATCH /files/{id}`, `POST /files` file metadata and uploads
//! - `GET /folders?filter[name][_eq]=...` folder lookup
//! - `GET|POST|PATCH /items/{collection}` owner rows, ledger rows and vault
//!   entries
//!
//! JSON responses are wrapped in a `{"data": ...}` envelope.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    AssetBlob, AssetMeta, AssetStore, CandidateRow, LedgerStore, OwnerKind, ReferenceStore,
    UploadForm, VaultStore,
};
use crate::config::{OwnerCollectionConfig, StoreConfig};
use crate::error::WatermarkError;
use crate::ledger::LedgerRow;
use crate::vault::VaultEntry;
use crate::watermark::WatermarkMarker;

const FILE_FIELDS: &str = "id,filename_download,folder,watermarked";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// One HTTP client implementing every store trait
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    projects: OwnerCollectionConfig,
    developers: OwnerCollectionConfig,
    ledger_collection: String,
    vault_collection: String,
}

impl HttpStore {
    /// # Errors
    ///
    /// Returns `WatermarkError::Config` if the HTTP client cannot be created.
    pub fn new(config: &StoreConfig) -> Result<Self, WatermarkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WatermarkError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            projects: config.projects.clone(),
            developers: config.developers.clone(),
            ledger_collection: config.ledger_collection.clone(),
            vault_collection: config.vault_collection.clone(),
        })
    }

    fn collection(&self, kind: OwnerKind) -> &OwnerCollectionConfig {
        match kind {
            OwnerKind::Project => &self.projects,
            OwnerKind::Developer => &self.developers,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, WatermarkError> {
        let response = request
            .send()
            .await
            .map_err(|e| WatermarkError::io(operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(WatermarkError::not_found(operation));
        }
        Err(WatermarkError::io(
            operation,
            format!("HTTP {status}: {}", truncate(&body, 200)),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, WatermarkError> {
        let response = self.send(operation, request).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| WatermarkError::io(operation, format!("invalid response body: {e}")))?;
        Ok(envelope.data)
    }

    async fn first_item<T: DeserializeOwned>(
        &self,
        operation: &str,
        collection: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, WatermarkError> {
        let items: Vec<T> = self
            .send_json(
                operation,
                self.request(Method::GET, &format!("/items/{collection}"))
                    .query(query)
                    .query(&[("limit", "1")]),
            )
            .await?;
        Ok(items.into_iter().next())
    }

    async fn patch_file(&self, operation: &str, id: &str, body: Value) -> Result<(), WatermarkError> {
        self.send(
            operation,
            self.request(Method::PATCH, &format!("/files/{id}")).json(&body),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl AssetStore for HttpStore {
    async fn fetch(&self, id: &str) -> Result<AssetBlob, WatermarkError> {
        let operation = format!("fetch asset {id}");
        let response = self
            .send(&operation, self.request(Method::GET, &format!("/assets/{id}")))
            .await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WatermarkError::io(&operation, e))?;

        Ok(AssetBlob { bytes, mime_type })
    }

    async fn upload(&self, form: UploadForm) -> Result<String, WatermarkError> {
        let operation = format!("upload {}", form.filename);
        let part = file_part(form.bytes, &form.filename, &form.mime_type)?;

        // Metadata fields must precede the file part
        let mut multipart = Form::new().text("filename_download", form.filename.clone());
        if let Some(folder) = form.folder_id {
            multipart = multipart.text("folder", folder);
        }
        let multipart = multipart.part("file", part);

        let created: Value = self
            .send_json(
                &operation,
                self.request(Method::POST, "/files").multipart(multipart),
            )
            .await?;

        id_string(&created["id"])
            .ok_or_else(|| WatermarkError::io(operation, "upload response has no id"))
    }

    async fn update_binary(
        &self,
        id: &str,
        bytes: Bytes,
        mime_type: &str,
    ) -> Result<(), WatermarkError> {
        let operation = format!("update asset {id}");
        let multipart = Form::new().part("file", file_part(bytes, id, mime_type)?);

        self.send(
            &operation,
            self.request(Method::PATCH, &format!("/files/{id}"))
                .multipart(multipart),
        )
        .await
        .map(|_| ())
    }

    async fn rename(&self, id: &str, filename: &str) -> Result<(), WatermarkError> {
        self.patch_file(
            &format!("rename asset {id}"),
            id,
            json!({ "filename_download": filename }),
        )
        .await
    }

    async fn set_watermarked(&self, id: &str) -> Result<(), WatermarkError> {
        self.patch_file(
            &format!("flag asset {id}"),
            id,
            json!({ "watermarked": true }),
        )
        .await
    }

    async fn find_folder_id(&self, name: &str) -> Result<Option<String>, WatermarkError> {
        let folders: Vec<Value> = self
            .send_json(
                "find folder",
                self.request(Method::GET, "/folders")
                    .query(&[("filter[name][_eq]", name), ("limit", "1")]),
            )
            .await?;
        Ok(folders.first().and_then(|f| id_string(&f["id"])))
    }
}

#[async_trait]
impl ReferenceStore for HttpStore {
    async fn fetch_candidates(
        &self,
        kind: OwnerKind,
        offset: usize,
        limit: usize,
        marker: &WatermarkMarker,
    ) -> Result<Vec<CandidateRow>, WatermarkError> {
        let collection = self.collection(kind);
        let rows: Vec<Value> = self
            .send_json(
                &format!("list {kind} candidates"),
                self.request(Method::GET, &format!("/items/{}", collection.collection))
                    .query(&[
                        ("fields", expanded_fields(&collection.image_fields)),
                        ("offset", offset.to_string()),
                        ("limit", limit.to_string()),
                        ("sort", "id".to_string()),
                    ]),
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| candidate_row(kind, row, &collection.image_fields, marker))
            .collect())
    }

    async fn owner_ids(&self, kind: OwnerKind) -> Result<Vec<String>, WatermarkError> {
        let collection = self.collection(kind);
        let rows: Vec<Value> = self
            .send_json(
                &format!("list {kind} ids"),
                self.request(Method::GET, &format!("/items/{}", collection.collection))
                    .query(&[("fields", "id"), ("limit", "-1"), ("sort", "id")]),
            )
            .await?;
        Ok(rows.iter().filter_map(|row| id_string(&row["id"])).collect())
    }

    async fn owner_images(
        &self,
        kind: OwnerKind,
        owner_id: &str,
    ) -> Result<Vec<AssetMeta>, WatermarkError> {
        let collection = self.collection(kind);
        let row: Value = self
            .send_json(
                &format!("load {kind} {owner_id}"),
                self.request(
                    Method::GET,
                    &format!("/items/{}/{owner_id}", collection.collection),
                )
                .query(&[("fields", expanded_fields(&collection.image_fields))]),
            )
            .await?;
        Ok(row_refs(&row, &collection.image_fields)
            .into_iter()
            .flatten()
            .collect())
    }

    async fn asset_meta(&self, id: &str) -> Result<AssetMeta, WatermarkError> {
        let operation = format!("load asset {id}");
        let file: Value = self
            .send_json(
                &operation,
                self.request(Method::GET, &format!("/files/{id}"))
                    .query(&[("fields", FILE_FIELDS)]),
            )
            .await?;
        file_ref(&file).ok_or_else(|| WatermarkError::not_found(operation))
    }
}

#[async_trait]
impl LedgerStore for HttpStore {
    async fn find_by_target(&self, target_id: &str) -> Result<Option<LedgerRow>, WatermarkError> {
        self.first_item(
            "find ledger row",
            &self.ledger_collection,
            &[("filter[target_id][_eq]", target_id.to_string())],
        )
        .await
    }

    async fn insert(&self, row: &LedgerRow) -> Result<(), WatermarkError> {
        self.send(
            "insert ledger row",
            self.request(Method::POST, &format!("/items/{}", self.ledger_collection))
                .json(row),
        )
        .await
        .map(|_| ())
    }

    async fn update(&self, row: &LedgerRow) -> Result<(), WatermarkError> {
        self.send(
            "update ledger row",
            self.request(
                Method::PATCH,
                &format!("/items/{}/{}", self.ledger_collection, row.id),
            )
            .json(row),
        )
        .await
        .map(|_| ())
    }

    async fn retry_eligible(&self, max_retry_count: u32) -> Result<Vec<LedgerRow>, WatermarkError> {
        self.send_json(
            "list retry-eligible ledger rows",
            self.request(Method::GET, &format!("/items/{}", self.ledger_collection))
                .query(&[
                    ("filter[status][_eq]", "error".to_string()),
                    ("filter[retry_count][_lt]", max_retry_count.to_string()),
                    ("limit", "-1".to_string()),
                ]),
        )
        .await
    }
}

#[async_trait]
impl VaultStore for HttpStore {
    async fn find_by_live_asset(&self, live_id: &str) -> Result<Option<VaultEntry>, WatermarkError> {
        self.first_item(
            "find vault entry",
            &self.vault_collection,
            &[("filter[live_asset_id][_eq]", live_id.to_string())],
        )
        .await
    }

    async fn find_by_filename_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<VaultEntry>, WatermarkError> {
        self.send_json(
            "search vault entries",
            self.request(Method::GET, &format!("/items/{}", self.vault_collection))
                .query(&[("filter[original_filename][_contains]", fragment)]),
        )
        .await
    }

    async fn insert(&self, entry: &VaultEntry) -> Result<(), WatermarkError> {
        self.send(
            "insert vault entry",
            self.request(Method::POST, &format!("/items/{}", self.vault_collection))
                .json(entry),
        )
        .await
        .map(|_| ())
    }
}

fn file_part(bytes: Bytes, filename: &str, mime_type: &str) -> Result<Part, WatermarkError> {
    Part::bytes(bytes.to_vec())
        .file_name(filename.to_string())
        .mime_str(mime_type)
        .map_err(|e| WatermarkError::Internal(format!("invalid mime type {mime_type}: {e}")))
}

/// Candidate row for one owner. A row without an id still yields an
/// all-empty row so the page length stays intact for pagination.
fn candidate_row(
    kind: OwnerKind,
    row: &Value,
    image_fields: &[String],
    marker: &WatermarkMarker,
) -> CandidateRow {
    match id_string(&row["id"]) {
        Some(owner_id) => CandidateRow::from_refs(owner_id, row_refs(row, image_fields), marker),
        None => {
            tracing::warn!(kind = %kind, "Owner row without id, ignoring its images");
            CandidateRow {
                owner_id: String::new(),
                image_ids: vec![None; image_fields.len()],
            }
        }
    }
}

/// `fields` query value: owner id plus the file columns of every image field
fn expanded_fields(image_fields: &[String]) -> String {
    std::iter::once("id".to_string())
        .chain(image_fields.iter().flat_map(|field| {
            FILE_FIELDS
                .split(',')
                .map(move |column| format!("{field}.{column}"))
        }))
        .collect::<Vec<_>>()
        .join(",")
}

/// One slot per image field, in configuration order
fn row_refs(row: &Value, image_fields: &[String]) -> Vec<Option<AssetMeta>> {
    image_fields
        .iter()
        .map(|field| row.get(field).and_then(file_ref))
        .collect()
}

/// Parse an expanded file object, or a bare file id
fn file_ref(value: &Value) -> Option<AssetMeta> {
    match value {
        Value::Object(file) => Some(AssetMeta {
            id: id_string(file.get("id")?)?,
            filename: file
                .get("filename_download")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            folder: file.get("folder").and_then(id_string),
            watermarked: file
                .get("watermarked")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        Value::String(_) => Some(AssetMeta {
            id: id_string(value)?,
            filename: String::new(),
            folder: None,
            watermarked: false,
        }),
        _ => None,
    }
}

/// Ids arrive as strings (UUID keys) or numbers (integer keys)
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
