// Firestore REST (v1) transport.
// Ref: https://firebase.google.com/docs/firestore/reference/rest
//
// Documents are copied with their typed `fields` object untouched, so values
// such as timestamps and references never round-trip through plain JSON.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use super::{DocumentStore, Page, StoreError, Write, MAX_BATCH_OPS};
use crate::{identity::TokenCell, Record};

pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";

const COUNT_ALIAS: &str = "count";

#[derive(Clone, Debug)]
pub enum Credential {
    /// OAuth2 access token with datastore scope (admin transport).
    AccessToken(String),
    /// ID token published by a password sign-in.
    SignedIn(TokenCell),
    /// No credential, e.g. against the local emulator.
    Anonymous,
}

pub struct FirestoreClient {
    http: reqwest::Client,
    endpoint: Url,
    /// `projects/{project}/databases/(default)/documents`
    database: String,
    credential: Credential,
    page_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct RestDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RestDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<RestWrite>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RestWrite {
    Update(RestDocument),
    Delete(String),
}

#[derive(Debug, Deserialize)]
struct AggregationResponse {
    result: Option<AggregationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResult {
    #[serde(default)]
    aggregate_fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    status: Option<String>,
}

impl FirestoreClient {
    pub fn new(http: reqwest::Client, project_id: &str, credential: Credential) -> Self {
        FirestoreClient {
            http,
            // DEFAULT_ENDPOINT is a valid absolute URL
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint"),
            database: format!("projects/{}/databases/(default)/documents", project_id),
            credential,
            page_size: 300,
        }
    }

    /// Talk to another host, e.g. `http://localhost:8080` for the emulator.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn resource_name(&self, path: &str) -> String {
        format!("{}/{}", self.database, path)
    }

    /// Build `{endpoint}/v1/{resource}`, percent-encoding each segment.
    fn url(&self, resource: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.endpoint.to_string()))?
            .pop_if_empty()
            .push("v1")
            .extend(resource.split('/'));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        match &self.credential {
            Credential::AccessToken(token) => Ok(request.bearer_auth(token)),
            Credential::SignedIn(cell) => cell
                .get()
                .map(|token| request.bearer_auth(token))
                .ok_or(StoreError::Unauthenticated),
            Credential::Anonymous => Ok(request),
        }
    }

    async fn list(
        &self,
        collection_path: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        let mut url = self.url(&self.resource_name(collection_path))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &page_size.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        tracing::debug!("GET {}", url);
        let response = self.authorize(self.http.get(url))?.send().await?;
        let response = error_for_status(response).await?;
        decode_list(response.json().await?)
    }

    fn commit_request(&self, writes: Vec<Write>) -> CommitRequest {
        let writes = writes
            .into_iter()
            .map(|write| match write {
                Write::Set { path, data } => RestWrite::Update(RestDocument {
                    name: self.resource_name(&path),
                    fields: data,
                }),
                Write::Delete { path } => RestWrite::Delete(self.resource_name(&path)),
            })
            .collect();
        CommitRequest { writes }
    }
}

async fn error_for_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    // Streaming endpoints wrap the error object in an array.
    let parsed = serde_json::from_str::<ErrorBody>(body).or_else(|_| {
        serde_json::from_str::<Vec<ErrorBody>>(body).and_then(|mut v| {
            v.pop()
                .ok_or_else(|| serde::de::Error::custom("empty error array"))
        })
    });
    match parsed {
        Ok(ErrorBody { error }) => match error.status {
            Some(status) => format!("{} ({})", error.message, status),
            None => error.message,
        },
        Err(_) => body.trim().to_owned(),
    }
}

fn decode_document(document: RestDocument) -> Result<Record, StoreError> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("document name {:?}", document.name)))?;
    Ok(Record::new(id, document.fields))
}

fn decode_list(response: ListDocumentsResponse) -> Result<Page, StoreError> {
    let documents = response
        .documents
        .into_iter()
        .map(decode_document)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        documents,
        next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
    })
}

fn decode_count(responses: Vec<AggregationResponse>) -> Result<usize, StoreError> {
    let value = responses
        .into_iter()
        .filter_map(|r| r.result)
        .find_map(|r| r.aggregate_fields.get(COUNT_ALIAS).cloned())
        .ok_or_else(|| StoreError::Decode("no count in aggregation result".into()))?;
    // int64 values are encoded as decimal strings
    value
        .get("integerValue")
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        })
        .ok_or_else(|| StoreError::Decode(format!("count value {}", value)))
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn list_page(
        &self,
        collection_path: &str,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        self.list(collection_path, self.page_size, page_token).await
    }

    async fn get(&self, document_path: &str) -> Result<Option<Record>, StoreError> {
        let url = self.url(&self.resource_name(document_path))?;
        tracing::debug!("GET {}", url);
        let response = self.authorize(self.http.get(url))?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = error_for_status(response).await?;
        Ok(Some(decode_document(response.json().await?)?))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        if writes.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge {
                len: writes.len(),
                max: MAX_BATCH_OPS,
            });
        }
        let url = self.url(&format!("{}:commit", self.database))?;
        tracing::debug!("POST {} ({} writes)", url, writes.len());
        let body = self.commit_request(writes);
        let response = self
            .authorize(self.http.post(url))?
            .json(&body)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }

    async fn first(&self, collection_path: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .list(collection_path, 1, None)
            .await?
            .documents
            .into_iter()
            .next())
    }

    async fn count(&self, collection_path: &str) -> Result<usize, StoreError> {
        let (parent, collection_id) = match collection_path.rsplit_once('/') {
            Some((parent, id)) => (self.resource_name(parent), id),
            None => (self.database.clone(), collection_path),
        };
        let url = self.url(&format!("{}:runAggregationQuery", parent))?;
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": { "from": [{ "collectionId": collection_id }] },
                "aggregations": [{ "alias": COUNT_ALIAS, "count": {} }]
            }
        });
        tracing::debug!("POST {}", url);
        let response = self
            .authorize(self.http.post(url))?
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        decode_count(response.json().await?)
    }
}
