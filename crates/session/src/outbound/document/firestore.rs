//! Firestore over its REST API, authorised as the signed-in user.
//!
//! Requests carry the current ID token so the project's security rules apply
//! exactly as they do for the web front ends. Server timestamps are written
//! as `REQUEST_TIME` field transforms of a `:commit`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{DocumentStore, FieldValue, Fields, Query, StoreError, StoreErrorKind};
use crate::outbound::identity::{FirebaseOptions, IdentityProvider};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

pub struct FirestoreStore {
    database: String,
    api_key: String,
    identity: Arc<dyn IdentityProvider>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct QueryResult {
    document: Option<Document>,
}

impl FirestoreStore {
    pub fn new(options: &FirebaseOptions, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            database: format!("projects/{}/databases/(default)", options.project_id),
            api_key: options.api_key.clone(),
            identity,
            client: reqwest::Client::new(),
        }
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/documents/{collection}/{id}", self.database)
    }

    fn url(&self, path: &str) -> String {
        format!("{FIRESTORE_URL}/{path}")
    }

    async fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url).query(&[("key", self.api_key.as_str())]);
        match self.identity.id_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::new(classify(status), message))
    }

    async fn commit(&self, write: Value) -> Result<(), StoreError> {
        let url = self.url(&format!("{}/documents:commit", self.database));
        let response = self.request(reqwest::Method::POST, url).await.json(&json!({ "writes": [write] })).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Builds a write of `fields`, moving server timestamps into transforms.
    fn write(&self, collection: &str, id: &str, fields: Fields) -> (Value, Vec<String>) {
        let mut encoded = Map::new();
        let mut transforms = Vec::new();
        let mut written = Vec::new();

        for (name, value) in fields {
            match value {
                FieldValue::ServerTimestamp => {
                    transforms.push(json!({ "fieldPath": name, "setToServerValue": "REQUEST_TIME" }));
                },
                other => {
                    encoded.insert(name.clone(), encode(other));
                    written.push(name);
                },
            }
        }

        let mut write = json!({
            "update": { "name": self.document_name(collection, id), "fields": encoded },
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = Value::Array(transforms);
        }
        (write, written)
    }

    fn structured_query(collection: &str, query: &Query) -> Value {
        let mut structured = json!({ "from": [{ "collectionId": collection }] });

        let mut filters: Vec<Value> = query
            .filters
            .iter()
            .map(|filter| {
                json!({ "fieldFilter": {
                    "field": { "fieldPath": filter.field },
                    "op": filter.op.as_str(),
                    "value": encode(filter.value.clone()),
                }})
            })
            .collect();
        match filters.len() {
            0 => {},
            1 => structured["where"] = filters.remove(0),
            _ => structured["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
        }

        if !query.order_by.is_empty() {
            let order: Vec<Value> = query
                .order_by
                .iter()
                .map(|(field, direction)| json!({ "field": { "fieldPath": field }, "direction": direction.as_str() }))
                .collect();
            structured["orderBy"] = Value::Array(order);
        }
        if let Some(limit) = query.limit {
            structured["limit"] = json!(limit);
        }

        json!({ "structuredQuery": structured })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
        let url = self.url(&self.document_name(collection, id));
        let response = self.request(reqwest::Method::GET, url).await.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: Document = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Other, e.to_string()))?;
        Ok(Some(decode_fields(&document.fields)))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let (write, _) = self.write(collection, id, fields);
        self.commit(write).await
    }

    async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let (mut write, written) = self.write(collection, id, fields);
        write["updateMask"] = json!({ "fieldPaths": written });
        write["currentDocument"] = json!({ "exists": true });
        self.commit(write).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.url(&self.document_name(collection, id));
        let response = self.request(reqwest::Method::DELETE, url).await.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>, StoreError> {
        let body = Self::structured_query(collection, query);
        let url = self.url(&format!("{}/documents:runQuery", self.database));
        let response = self.request(reqwest::Method::POST, url).await.json(&body).send().await?;
        let results: Vec<QueryResult> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Other, e.to_string()))?;

        Ok(results
            .into_iter()
            .filter_map(|result| result.document)
            .map(|doc| {
                let id = doc.name.rsplit('/').next().unwrap_or_default().to_string();
                (id, decode_fields(&doc.fields))
            })
            .collect())
    }
}

fn classify(status: StatusCode) -> StoreErrorKind {
    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreErrorKind::Unavailable
        },
        StatusCode::NOT_FOUND => StoreErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreErrorKind::PermissionDenied,
        _ => StoreErrorKind::Other,
    }
}

fn encode(value: FieldValue) -> Value {
    match value {
        FieldValue::Null | FieldValue::ServerTimestamp => json!({ "nullValue": null }),
        FieldValue::Bool(flag) => json!({ "booleanValue": flag }),
        FieldValue::Integer(n) => json!({ "integerValue": n.to_string() }),
        FieldValue::Double(n) => json!({ "doubleValue": n }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(t) => json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) }),
        FieldValue::Map(fields) => {
            let fields: Map<String, Value> = fields.into_iter().map(|(k, v)| (k, encode(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        },
    }
}

fn decode(value: &Value) -> FieldValue {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return FieldValue::Null;
    };

    match kind.as_str() {
        "booleanValue" => inner.as_bool().map_or(FieldValue::Null, FieldValue::Bool),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| inner.as_i64())
            .map_or(FieldValue::Null, FieldValue::Integer),
        "doubleValue" => inner.as_f64().map_or(FieldValue::Null, FieldValue::Double),
        "stringValue" => inner.as_str().map_or(FieldValue::Null, |s| FieldValue::String(s.to_string())),
        "timestampValue" => inner
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(FieldValue::Null, |t| FieldValue::Timestamp(t.with_timezone(&Utc))),
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => FieldValue::Map(decode_fields(fields)),
            None => FieldValue::Map(Fields::new()),
        },
        _ => FieldValue::Null,
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Fields {
    fields.iter().map(|(name, value)| (name.clone(), decode(value))).collect()
}
