//! Loki log source

use super::{http_client, LogSource};
use crate::config::ServiceScalingConfig;
use crate::error::{Result, ScalerError};
use crate::models::LogEvent;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Maximum number of lines requested per query
pub const LOKI_QUERY_LIMIT: u32 = 5000;

const STORE: &str = "loki";

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    #[serde(default)]
    data: QueryRangeData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<LogStream>,
}

#[derive(Debug, Deserialize)]
struct LogStream {
    #[serde(default)]
    values: Vec<(String, String)>,
}

/// Log source backed by Loki's `query_range` API
pub struct LokiLogSource {
    client: reqwest::Client,
    base_url: Url,
}

impl LokiLogSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: super::base_url(base_url)?,
        })
    }
}

#[async_trait]
impl LogSource for LokiLogSource {
    async fn fetch_events(
        &self,
        service: &ServiceScalingConfig,
        window: Duration,
    ) -> Result<Vec<LogEvent>> {
        let name = service.name();
        let unavailable = |reason: String| ScalerError::data_unavailable(STORE, name, reason);

        let end = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let start = end.saturating_sub(window.as_nanos().min(i64::MAX as u128) as i64);

        let url = self
            .base_url
            .join("loki/api/v1/query_range")
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("query", service.log_selector().to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("limit", LOKI_QUERY_LIMIT.to_string()),
                ("direction", "forward".to_string()),
            ])
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error ({}): {}", status, body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let events = parse_query_range(name, &body)?;

        let in_window: Vec<LogEvent> = events
            .into_iter()
            .filter(|e| e.timestamp_nanos >= start && e.timestamp_nanos <= end)
            .collect();

        debug!(
            service = %name,
            events = in_window.len(),
            "Fetched log events"
        );

        Ok(in_window)
    }
}

/// Decode a Loki `query_range` response body into events for `service`
///
/// Entries whose timestamp is not an integer nanosecond string are skipped.
pub fn parse_query_range(service: &str, body: &str) -> Result<Vec<LogEvent>> {
    let response: QueryRangeResponse = serde_json::from_str(body).map_err(|e| {
        ScalerError::data_unavailable(STORE, service, format!("malformed response: {}", e))
    })?;

    let mut events = Vec::new();
    for stream in response.data.result {
        for (timestamp, text) in stream.values {
            match timestamp.parse::<i64>() {
                Ok(nanos) => events.push(LogEvent::new(service, nanos, text)),
                Err(_) => debug!(
                    service = %service,
                    timestamp = %timestamp,
                    "Skipping entry with unparseable timestamp"
                ),
            }
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawServiceConfig;

    fn service() -> ServiceScalingConfig {
        ServiceScalingConfig::try_from(RawServiceConfig::new("flask-app-1")).unwrap()
    }

    fn body_with(values: &[(i64, &str)]) -> String {
        let values: Vec<serde_json::Value> = values
            .iter()
            .map(|(ts, line)| serde_json::json!([ts.to_string(), line]))
            .collect();
        serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    { "stream": { "application": "flask-app-1" }, "values": values }
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_query_range() {
        let body = body_with(&[(10, "ID: 1 request arrived"), (20, "ID: 1 request completed")]);
        let events = parse_query_range("flask-app-1", &body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp_nanos, 10);
        assert_eq!(events[1].text, "ID: 1 request completed");
        assert!(events.iter().all(|e| e.service == "flask-app-1"));
    }

    #[test]
    fn test_parse_skips_bad_timestamps() {
        let body = r#"{"data": {"result": [{"values": [["abc", "x"], ["5", "y"]]}]}}"#;
        let events = parse_query_range("svc", body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_nanos, 5);
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(parse_query_range("svc", r#"{"data": {"result": []}}"#)
            .unwrap()
            .is_empty());
        assert!(parse_query_range("svc", "<html>").is_err());
    }

    #[tokio::test]
    async fn test_fetch_events_filters_to_window() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now().timestamp_nanos_opt().unwrap();
        let body = body_with(&[
            (now - 5_000_000_000, "ID: 1 request arrived"),
            (now - 3_600_000_000_000, "ID: 0 request arrived"),
        ]);
        let mock = server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded(
                    "query".into(),
                    r#"{logger="werkzeug", application="flask-app-1"}"#.into(),
                ),
                mockito::Matcher::UrlEncoded("direction".into(), "forward".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "5000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let source = LokiLogSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let events = source
            .fetch_events(&service(), Duration::from_secs(60))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "ID: 1 request arrived");
    }

    #[tokio::test]
    async fn test_fetch_events_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/loki/api/v1/query_range")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let source = LokiLogSource::new(&server.url(), Duration::from_secs(2)).unwrap();
        let err = source
            .fetch_events(&service(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }

    #[tokio::test]
    async fn test_fetch_events_unreachable() {
        // Port 9 (discard) is expected to refuse connections
        let source = LokiLogSource::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = source
            .fetch_events(&service(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::DataUnavailable { store: "loki", .. }));
    }
}
