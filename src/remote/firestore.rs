use super::{DocumentStore, IdentityProvider, RemoteDocument, SnapshotStream};
use crate::config::FirebaseConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const PAGE_SIZE: u32 = 300;

#[derive(Deserialize)]
struct WireDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<WireDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    documents_root: String,
    identity: Arc<dyn IdentityProvider>,
    poll_interval: Duration,
}

impl FirestoreStore {
    pub fn new(
        config: &FirebaseConfig,
        identity: Arc<dyn IdentityProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            documents_root: format!(
                "{}/projects/{}/databases/(default)/documents",
                config.firestore_endpoint, config.project_id
            ),
            identity,
            poll_interval,
        }
    }

    fn collection_url(&self, user_id: &str) -> Result<Url> {
        self.url(&["users", user_id, "documents"])
    }

    fn document_url(&self, user_id: &str, doc_id: &str) -> Result<Url> {
        self.url(&["users", user_id, "documents", doc_id])
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.documents_root)
            .map_err(|err| ClientError::Store(format!("invalid firestore endpoint: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Store("firestore endpoint cannot be a base".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<RemoteDocument>> {
        let token = self.identity.id_token().await?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(user_id)?;
            url.query_pairs_mut()
                .append_pair("pageSize", &PAGE_SIZE.to_string());
            if let Some(page_token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", page_token);
            }

            let response = self.client.get(url).bearer_auth(&token).send().await?;
            let page: ListResponse = check(response).await?.json().await?;
            documents.extend(page.documents.into_iter().map(into_remote));

            match page.next_page_token.filter(|next| !next.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn poll(self, user_id: String, tx: mpsc::Sender<Result<Vec<RemoteDocument>>>) {
        let mut last: Option<Vec<RemoteDocument>> = None;
        let mut last_error: Option<String> = None;

        loop {
            let push = match self.list(&user_id).await {
                Ok(snapshot) => {
                    last_error = None;
                    if last.as_ref() == Some(&snapshot) {
                        None
                    } else {
                        last = Some(snapshot.clone());
                        Some(Ok(snapshot))
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    if last_error.as_deref() == Some(message.as_str()) {
                        None
                    } else {
                        last_error = Some(message);
                        Some(Err(err))
                    }
                }
            };

            if let Some(push) = push {
                if tx.send(push).await.is_err() {
                    break;
                }
            }

            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!(uid = %user_id, "firestore live query stopped");
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn listen(&self, user_id: &str) -> Result<SnapshotStream> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(self.clone().poll(user_id.to_string(), tx));
        Ok(rx)
    }

    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<RemoteDocument>> {
        let token = self.identity.id_token().await?;
        let url = self.document_url(user_id, doc_id)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: WireDocument = check(response).await?.json().await?;
        Ok(Some(into_remote(document)))
    }

    async fn merge(&self, user_id: &str, doc_id: &str, fields: Map<String, Value>) -> Result<()> {
        let token = self.identity.id_token().await?;
        let mut url = self.document_url(user_id, doc_id)?;
        {
            let mut query = url.query_pairs_mut();
            for key in fields.keys() {
                query.append_pair("updateMask.fieldPaths", key);
            }
        }
        let body = json!({ "fields": encode_fields(&fields) });

        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        tracing::debug!(uid = %user_id, doc_id, fields = fields.len(), "merged document fields");
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(ClientError::Store(format!("firestore returned {status}: {message}")))
}

fn into_remote(document: WireDocument) -> RemoteDocument {
    let id = document
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    RemoteDocument {
        id,
        fields: decode_fields(&document.fields),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|typed| typed.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue"
        | "doubleValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(|fields| Value::Object(decode_fields(fields)))
            .unwrap_or_else(|| Value::Object(Map::new())),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => encode_number(number),
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(values) => json!({
            "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn encode_number(number: &Number) -> Value {
    match number.as_i64() {
        Some(integer) => json!({ "integerValue": integer.to_string() }),
        None => json!({ "doubleValue": number.as_f64().unwrap_or_default() }),
    }
}
