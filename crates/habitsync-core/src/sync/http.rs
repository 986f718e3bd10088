//! reqwest-backed remote gateway for the habitsync REST API.
//!
//! Endpoints:
//! - `POST   /v1/{collection}`        create, body `{"data": {...}}`, with
//!   `Idempotency-Key` set to the creating client's local id
//! - `PATCH  /v1/{collection}/{id}`   update, body `{"data": {...}}`
//! - `DELETE /v1/{collection}/{id}`   delete
//! - `GET    /v1/changes?since=...`   pull, `since` in RFC 3339

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::gateway::{
    GatewayError, GatewayResult, PullResponse, RemoteGateway, RemoteRecord, CLIENT_KEY_FIELD,
};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::ResourceKind;
use crate::util::{compact_text, millis_to_rfc3339};

/// HTTP client for the remote API
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/v1/{}", self.base_url, kind.collection())
    }

    fn resource_url(&self, kind: ResourceKind, server_id: &str) -> String {
        format!("{}/{server_id}", self.collection_url(kind))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> GatewayResult<String> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        Ok(body)
    }
}

impl RemoteGateway for HttpGateway {
    async fn create(
        &self,
        kind: ResourceKind,
        payload: &serde_json::Value,
    ) -> GatewayResult<RemoteRecord> {
        let mut request = self
            .client
            .post(self.collection_url(kind))
            .json(&WriteBody { data: payload });
        if let Some(key) = payload.get(CLIENT_KEY_FIELD).and_then(serde_json::Value::as_str) {
            request = request.header("Idempotency-Key", key);
        }
        let body = self.send(request).await?;
        parse_record(&body)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        server_id: &str,
        payload: &serde_json::Value,
    ) -> GatewayResult<RemoteRecord> {
        let body = self
            .send(
                self.client
                    .patch(self.resource_url(kind, server_id))
                    .json(&WriteBody { data: payload }),
            )
            .await?;
        parse_record(&body)
    }

    async fn delete(&self, kind: ResourceKind, server_id: &str) -> GatewayResult<()> {
        match self
            .send(self.client.delete(self.resource_url(kind, server_id)))
            .await
        {
            Ok(_) => Ok(()),
            // Already gone on the server: the delete's goal is met
            Err(GatewayError::Permanent {
                status: Some(404), ..
            }) => {
                tracing::debug!("{kind} {server_id} was already deleted remotely");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn pull_changes(&self, since: Option<i64>) -> GatewayResult<PullResponse> {
        let mut request = self.client.get(format!("{}/v1/changes", self.base_url));
        if let Some(since) = since {
            request = request.query(&[("since", millis_to_rfc3339(since))]);
        }
        let body = self.send(request).await?;
        parse_changes(&body)
    }
}

#[derive(Serialize)]
struct WriteBody<'a> {
    data: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WireRecord {
    id: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    data: serde_json::Value,
}

impl From<WireRecord> for RemoteRecord {
    fn from(record: WireRecord) -> Self {
        Self {
            server_id: record.id,
            updated_at: record.updated_at.timestamp_millis(),
            deleted: record.deleted,
            fields: record.data,
        }
    }
}

#[derive(Deserialize)]
struct WireChanges {
    as_of: DateTime<Utc>,
    #[serde(default)]
    changes: BTreeMap<String, Vec<WireRecord>>,
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_record(body: &str) -> GatewayResult<RemoteRecord> {
    serde_json::from_str::<WireRecord>(body)
        .map(RemoteRecord::from)
        .map_err(|error| GatewayError::permanent(format!("Invalid record payload: {error}")))
}

fn parse_changes(body: &str) -> GatewayResult<PullResponse> {
    let payload: WireChanges = serde_json::from_str(body)
        .map_err(|error| GatewayError::permanent(format!("Invalid changes payload: {error}")))?;

    let mut resources = BTreeMap::new();
    for (collection, records) in payload.changes {
        let Some(kind) = ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == collection)
        else {
            tracing::warn!("Ignoring changes for unknown collection {collection}");
            continue;
        };
        resources.insert(kind, records.into_iter().map(RemoteRecord::from).collect());
    }

    Ok(PullResponse {
        as_of: payload.as_of.timestamp_millis(),
        resources,
    })
}

/// Map a non-success HTTP status to the retry classification.
fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = parse_api_error(status, body);
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        GatewayError::Transient(message)
    } else {
        GatewayError::Permanent {
            status: Some(status.as_u16()),
            message,
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_decode() {
        GatewayError::permanent(error.to_string())
    } else {
        GatewayError::Transient(error.to_string())
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<WireErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(classify_status(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_permanent_with_status() {
        let error = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"name is required"}"#,
        );
        assert_eq!(
            error,
            GatewayError::Permanent {
                status: Some(422),
                message: "name is required (422)".to_string(),
            }
        );
        assert!(!classify_status(StatusCode::NOT_FOUND, "").is_transient());
    }

    #[test]
    fn api_error_falls_back_to_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "  bad things  "),
            "bad things (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_REQUEST, ""), "HTTP 400");
    }

    #[test]
    fn parses_record_timestamps_to_millis() {
        let record = parse_record(
            r#"{"id":"srv-1","updated_at":"2024-03-04T10:00:00.250Z","data":{"name":"Run"}}"#,
        )
        .unwrap();
        assert_eq!(
            record,
            RemoteRecord {
                server_id: "srv-1".to_string(),
                updated_at: 1_709_546_400_250,
                deleted: false,
                fields: json!({ "name": "Run" }),
            }
        );
    }

    #[test]
    fn undecodable_record_is_permanent() {
        let error = parse_record("<html>oops</html>").unwrap_err();
        assert!(!error.is_transient());
    }

    #[test]
    fn parses_changes_by_collection() {
        let body = r#"{
            "as_of": "2024-03-04T12:00:00Z",
            "changes": {
                "habits": [
                    {"id":"h1","updated_at":"2024-03-04T11:00:00Z","data":{"name":"Run"}}
                ],
                "habit-completions": [
                    {"id":"c1","updated_at":"2024-03-04T11:30:00Z","deleted":true}
                ],
                "badges": [
                    {"id":"b1","updated_at":"2024-03-04T11:30:00Z"}
                ]
            }
        }"#;

        let response = parse_changes(body).unwrap();
        assert_eq!(response.as_of, 1_709_553_600_000);
        assert_eq!(response.record_count(), 2);
        assert_eq!(response.resources[&ResourceKind::Habit][0].server_id, "h1");
        let completion = &response.resources[&ResourceKind::HabitCompletion][0];
        assert!(completion.deleted);
        assert!(completion.fields.is_null());
    }

    #[test]
    fn urls_use_collection_paths() {
        let config = RemoteConfig::new("https://api.example.com/").unwrap();
        let gateway = HttpGateway::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            gateway.collection_url(ResourceKind::HabitCompletion),
            "https://api.example.com/v1/habit-completions"
        );
        assert_eq!(
            gateway.resource_url(ResourceKind::Friend, "f-9"),
            "https://api.example.com/v1/friends/f-9"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_is_transient() {
        let config = RemoteConfig::new("http://127.0.0.1:9").unwrap();
        let gateway = HttpGateway::new(&config, Duration::from_secs(2)).unwrap();
        let error = gateway.pull_changes(None).await.unwrap_err();
        assert!(error.is_transient(), "{error}");
    }
}
