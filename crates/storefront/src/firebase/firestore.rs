//! Cloud Firestore REST v1 client.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use tracing::{debug, instrument};
use url::Url;

use super::codec::{RestDocument, encode_fields, encode_transform, encode_value, quote_field_path};
use crate::backend::{
    BackendError, DocPath, Document, DocumentStore, FieldTransform, Fields, Filter, Write,
};
use crate::config::FirebaseConfig;

const PAGE_SIZE: &str = "300";
const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

/// Firestore document store over the REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and the attached
/// ID token.
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<FirestoreClientInner>,
}

struct FirestoreClientInner {
    client: reqwest::Client,
    /// `{host}/v1/projects/{p}/databases/{d}/documents`
    documents_url: String,
    /// `projects/{p}/databases/{d}/documents`, prefix of resource names.
    database_path: String,
    api_key: SecretString,
    emulator: bool,
    id_token: RwLock<Option<SecretString>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RestDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<RestDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl FirestoreClient {
    /// Create a client for the configured project.
    ///
    /// Uses the emulator at `FIRESTORE_EMULATOR_HOST` when configured.
    #[must_use]
    pub fn new(config: &FirebaseConfig, client: reqwest::Client) -> Self {
        let host = config
            .firestore_emulator_host
            .as_ref()
            .map_or_else(|| PRODUCTION_HOST.to_string(), |h| format!("http://{h}"));
        let database_path = format!(
            "projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Self {
            inner: Arc::new(FirestoreClientInner {
                client,
                documents_url: format!("{host}/v1/{database_path}"),
                database_path,
                api_key: config.api_key.clone(),
                emulator: config.firestore_emulator_host.is_some(),
                id_token: RwLock::new(None),
            }),
        }
    }

    fn resource_name(&self, path: &DocPath) -> String {
        format!("{}/{}/{}", self.inner.database_path, path.collection, path.id)
    }

    fn collection_url(&self, collection: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.inner.documents_url)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Decode("documents URL cannot be a base".to_string()))?
            .push(collection);
        Ok(url)
    }

    fn document_url(&self, path: &DocPath) -> Result<Url, BackendError> {
        let mut url = self.collection_url(&path.collection)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Decode("documents URL cannot be a base".to_string()))?
            .push(&path.id);
        Ok(url)
    }

    /// `{documents}:{verb}` endpoints (`:runQuery`, `:commit`).
    fn rpc_url(&self, verb: &str) -> Result<Url, BackendError> {
        Ok(Url::parse(&format!("{}:{verb}", self.inner.documents_url))?)
    }

    fn request(&self, method: Method, mut url: Url) -> RequestBuilder {
        if !self.inner.emulator {
            url.query_pairs_mut()
                .append_pair("key", self.inner.api_key.expose_secret());
        }
        let builder = self.inner.client.request(method, url);

        // The emulator accepts the special "owner" token, which bypasses rules.
        let token = self
            .inner
            .id_token
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.expose_secret().to_string()));
        match (token, self.inner.emulator) {
            (Some(token), _) => builder.bearer_auth(token),
            (None, true) => builder.bearer_auth("owner"),
            (None, false) => builder,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: RequestBuilder) -> Result<String, BackendError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Firestore returned non-success status"
        );
        Err(error_from_response(status, &body))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Firestore response"
            );
            BackendError::Parse(e)
        })
    }

    fn encode_write(&self, write: &Write) -> Json {
        match write {
            Write::Set {
                path,
                fields,
                transforms,
            } => self.encode_update(path, fields, transforms, None, false),
            Write::Merge {
                path,
                fields,
                transforms,
            } => self.encode_update(path, fields, transforms, Some(fields), false),
            Write::Update {
                path,
                fields,
                transforms,
            } => self.encode_update(path, fields, transforms, Some(fields), true),
            Write::Delete { path } => json!({ "delete": self.resource_name(path) }),
        }
    }

    fn encode_update(
        &self,
        path: &DocPath,
        fields: &Fields,
        transforms: &[(String, FieldTransform)],
        mask: Option<&Fields>,
        must_exist: bool,
    ) -> Json {
        let mut write = json!({
            "update": {
                "name": self.resource_name(path),
                "fields": encode_fields(fields),
            }
        });
        if let Some(mask) = mask {
            let paths: Vec<String> = mask.keys().map(|k| quote_field_path(k)).collect();
            write["updateMask"] = json!({ "fieldPaths": paths });
        }
        if !transforms.is_empty() {
            let encoded: Vec<Json> = transforms
                .iter()
                .map(|(field, t)| encode_transform(field, t))
                .collect();
            write["updateTransforms"] = Json::Array(encoded);
        }
        if must_exist {
            write["currentDocument"] = json!({ "exists": true });
        }
        write
    }
}

/// Map an error response to a [`BackendError`], using the canonical status
/// string of the error body when present.
fn error_from_response(status: StatusCode, body: &str) -> BackendError {
    let (message, canonical) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| (body.chars().take(200).collect::<String>(), String::new()),
        |e| (e.error.message, e.error.status),
    );

    match (status, canonical.as_str()) {
        (StatusCode::NOT_FOUND, _) | (_, "NOT_FOUND") => BackendError::NotFound(message),
        (StatusCode::FORBIDDEN, _) | (_, "PERMISSION_DENIED") => {
            BackendError::PermissionDenied(message)
        }
        (StatusCode::UNAUTHORIZED, _) | (_, "UNAUTHENTICATED") => BackendError::Unauthenticated,
        (_, "FAILED_PRECONDITION" | "ALREADY_EXISTS" | "ABORTED") => {
            BackendError::Precondition(message)
        }
        (StatusCode::SERVICE_UNAVAILABLE, _) | (_, "UNAVAILABLE") => {
            BackendError::Unavailable(message)
        }
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, BackendError> {
        let url = self.document_url(path)?;
        match self
            .send_json::<RestDocument>(self.request(Method::GET, url))
            .await
        {
            Ok(doc) => doc.into_document().map(Some),
            Err(BackendError::NotFound(_)) => {
                debug!("Document does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, BackendError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(collection)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ListDocumentsResponse =
                self.send_json(self.request(Method::GET, url)).await?;
            for doc in page.documents {
                documents.push(doc.into_document()?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = documents.len(), "Listed documents");
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, BackendError> {
        let Filter::Equal(field, value) = filter;
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": quote_field_path(field) },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });

        let url = self.rpc_url("runQuery")?;
        let items: Vec<RunQueryItem> = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;

        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(RestDocument::into_document)
            .collect()
    }

    #[instrument(skip(self, fields))]
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, BackendError> {
        let url = self.collection_url(collection)?;
        let body = json!({ "fields": encode_fields(&fields) });
        let doc: RestDocument = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        doc.into_document()
    }

    #[instrument(skip(self, writes), fields(count = writes.len()))]
    async fn commit(&self, writes: Vec<Write>) -> Result<(), BackendError> {
        if writes.is_empty() {
            return Ok(());
        }
        let encoded: Vec<Json> = writes.iter().map(|w| self.encode_write(w)).collect();
        let url = self.rpc_url("commit")?;
        self.send(
            self.request(Method::POST, url)
                .json(&json!({ "writes": encoded })),
        )
        .await
        .map_err(|e| match e {
            // Updating a missing document answers NOT_FOUND
            BackendError::NotFound(message) => BackendError::Precondition(message),
            other => other,
        })?;
        Ok(())
    }

    fn authorize(&self, id_token: Option<SecretString>) {
        if let Ok(mut slot) = self.inner.id_token.write() {
            *slot = id_token;
        }
    }
}
