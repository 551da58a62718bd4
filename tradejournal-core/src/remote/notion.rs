//! Notion-style HTTP journal client.
//!
//! Talks to the database/page REST API: bulk queries are paged with
//! `start_cursor`/`has_more`, pages carry typed properties. HTTP statuses are
//! mapped onto `RemoteError` so the engine can tell a missing page from a
//! flaky network.
//!
//! The client never retries on its own; retry policy belongs to the
//! reconciliation jobs.

use super::client::{Filter, JournalClient, RelationIds, RemoteError, RemoteRecord};
use crate::domain::{CollectionId, RemoteId};
use crate::fields::{Field, FieldMap, FieldValue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Property holding the page title.
pub const TITLE_PROPERTY: &str = "Name";
/// Relation property pointing at the per-ticker page.
pub const TICKER_RELATION_PROPERTY: &str = "Ticker Page";
/// Relation property pointing at the per-day page.
pub const DATE_RELATION_PROPERTY: &str = "Day";

const PAGE_SIZE: u32 = 100;

/// Remote property name for each canonical field.
pub fn property_name(field: Field) -> &'static str {
    match field {
        Field::Title => TITLE_PROPERTY,
        Field::Ticker => "Ticker",
        Field::Side => "Side",
        Field::Result => "Result",
        Field::RealizedPl => "Realized P/L",
        Field::Duration => "Duration (s)",
        Field::EntryTimeslot => "Entry Timeslot",
        Field::CloseTimeslot => "Close Timeslot",
        Field::Rank => "Rank",
        Field::Setup => "Setup",
        Field::CloseTrigger => "Close Trigger",
        Field::OrderType => "Order Type",
        Field::FollowedPlan => "Followed Plan",
        Field::RevengeTrade => "Revenge Trade",
        Field::Fomo => "FOMO",
        Field::Comment => "Comment",
    }
}

fn field_for_property(name: &str) -> Option<Field> {
    Field::ALL.into_iter().find(|f| property_name(*f) == name)
}

/// Connection settings for the HTTP journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionSettings {
    pub base_url: String,
    pub token: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Blocking HTTP `JournalClient`.
pub struct NotionClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    api_version: String,
}

impl NotionClient {
    pub fn new(settings: &NotionSettings) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("tradejournal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, RemoteError> {
        let resp = request
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(resp.url().path().to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized(format!(
                "remote journal refused the integration token (HTTP {status})"
            )));
        }

        if status.is_server_error() {
            let message = resp.text().unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            });
        }

        if !status.is_success() {
            let message = resp.text().unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<Value>()
            .map_err(|e| RemoteError::Decode(format!("invalid JSON body: {e}")))
    }
}

impl JournalClient for NotionClient {
    fn name(&self) -> &str {
        "notion"
    }

    fn query_by_filter(
        &self,
        collection: &CollectionId,
        filter: &Filter,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let url = self.url(&format!("databases/{collection}/query"));
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = Map::new();
            body.insert("page_size".into(), json!(PAGE_SIZE));
            if let Filter::TitleEquals(title) = filter {
                body.insert(
                    "filter".into(),
                    json!({ "property": TITLE_PROPERTY, "title": { "equals": title } }),
                );
            }
            if let Some(c) = &cursor {
                body.insert("start_cursor".into(), json!(c));
            }

            let value = self.send(self.client.post(&url).json(&Value::Object(body)))?;
            let page: QueryResponse = serde_json::from_value(value)
                .map_err(|e| RemoteError::Decode(format!("query response: {e}")))?;

            for raw in &page.results {
                records.push(decode_page(raw)?);
            }
            debug!(collection = %collection, fetched = records.len(), "queried remote collection");

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(records)
    }

    fn create_record(
        &self,
        collection: &CollectionId,
        relations: &RelationIds,
        fields: &FieldMap,
    ) -> Result<RemoteRecord, RemoteError> {
        let mut properties = encode_properties(fields);
        properties.insert(
            TICKER_RELATION_PROPERTY.into(),
            json!({ "relation": [{ "id": relations.ticker.as_str() }] }),
        );
        properties.insert(
            DATE_RELATION_PROPERTY.into(),
            json!({ "relation": [{ "id": relations.date.as_str() }] }),
        );
        let body = json!({
            "parent": { "database_id": collection.as_str() },
            "properties": Value::Object(properties),
        });
        let value = self.send(self.client.post(self.url("pages")).json(&body))?;
        decode_page(&value)
    }

    fn retrieve_record(&self, id: &RemoteId) -> Result<RemoteRecord, RemoteError> {
        let value = self.send(self.client.get(self.url(&format!("pages/{id}"))))?;
        decode_page(&value)
    }

    fn update_record(&self, id: &RemoteId, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let body = json!({ "properties": Value::Object(encode_properties(fields)) });
        let value = self.send(self.client.patch(self.url(&format!("pages/{id}"))).json(&body))?;
        decode_page(&value)
    }
}

// ─── Property encoding ──────────────────────────────────────────────

fn rich_text(s: &str) -> Value {
    json!([{ "type": "text", "text": { "content": s } }])
}

fn encode_value(field: Field, value: &FieldValue) -> Value {
    if field == Field::Title {
        return json!({ "title": rich_text(&value.to_string()) });
    }
    match value {
        FieldValue::Text(s) => json!({ "rich_text": rich_text(s) }),
        FieldValue::Select(s) => json!({ "select": { "name": s } }),
        FieldValue::Decimal(d) => json!({ "number": d.to_f64() }),
        FieldValue::Integer(i) => json!({ "number": i }),
        FieldValue::Bool(b) => json!({ "checkbox": b }),
    }
}

/// Encode canonical fields as a page `properties` object.
pub fn encode_properties(fields: &FieldMap) -> Map<String, Value> {
    fields
        .iter()
        .map(|(field, value)| (property_name(*field).to_string(), encode_value(*field, value)))
        .collect()
}

fn plain_text(parts: &Value) -> String {
    parts
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn decode_value(field: Field, prop: &Value) -> Option<FieldValue> {
    let kind = prop.get("type").and_then(Value::as_str)?;
    match kind {
        "title" => Some(FieldValue::Text(plain_text(prop.get("title")?))),
        "rich_text" => {
            let text = plain_text(prop.get("rich_text")?);
            // An empty rich_text is how the API reports "unset".
            (!text.is_empty()).then_some(FieldValue::Text(text))
        }
        "select" => prop
            .get("select")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(|s| FieldValue::Select(s.to_string())),
        "number" => {
            let n = prop.get("number")?;
            if field == Field::Duration {
                n.as_i64().map(FieldValue::Integer)
            } else {
                n.as_f64()
                    .and_then(Decimal::from_f64_retain)
                    .map(FieldValue::Decimal)
            }
        }
        "checkbox" => prop.get("checkbox").and_then(Value::as_bool).map(FieldValue::Bool),
        _ => None,
    }
}

fn first_relation(prop: Option<&Value>) -> Option<RemoteId> {
    prop?
        .get("relation")?
        .as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(RemoteId::new)
}

/// Decode a page object into a `RemoteRecord`.
pub fn decode_page(page: &Value) -> Result<RemoteRecord, RemoteError> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Decode("page without id".into()))?;
    let collection = page
        .get("parent")
        .and_then(|p| p.get("database_id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let props = page
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| RemoteError::Decode(format!("page {id} has no properties")))?;

    let mut fields = FieldMap::new();
    for (name, prop) in props {
        if let Some(field) = field_for_property(name) {
            if let Some(value) = decode_value(field, prop) {
                fields.insert(field, value);
            }
        }
    }

    let title = fields
        .get(&Field::Title)
        .and_then(FieldValue::as_str)
        .unwrap_or_default()
        .to_string();

    let relations = match (
        first_relation(props.get(TICKER_RELATION_PROPERTY)),
        first_relation(props.get(DATE_RELATION_PROPERTY)),
    ) {
        (Some(ticker), Some(date)) => Some(RelationIds { ticker, date }),
        _ => None,
    };

    Ok(RemoteRecord {
        id: RemoteId::new(id),
        collection: CollectionId::new(collection),
        title,
        fields,
        relations,
    })
}
