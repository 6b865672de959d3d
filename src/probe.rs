use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

use crate::appconfig::ApiKey;
use crate::error::{Error, Result};
use crate::format::{LocalZone, UNKNOWN, format_number, format_reset_time};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const PROBE_PROMPT: &str = "Check limits";
pub const ERROR_SENTINEL: &str = "Error";

pub const REQUESTS_LIMIT: &str = "anthropic-ratelimit-requests-limit";
pub const REQUESTS_REMAINING: &str = "anthropic-ratelimit-requests-remaining";
pub const TOKENS_LIMIT: &str = "anthropic-ratelimit-tokens-limit";
pub const TOKENS_REMAINING: &str = "anthropic-ratelimit-tokens-remaining";
pub const TOKENS_RESET: &str = "anthropic-ratelimit-tokens-reset";

#[derive(Debug, Serialize)]
struct ProbeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Cheapest possible request: one output token.
#[derive(Debug, Serialize)]
struct ProbeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ProbeMessage<'a>; 1],
}

impl<'a> ProbeRequest<'a> {
    fn new(model: &'a str) -> Self {
        Self {
            model,
            max_tokens: 1,
            messages: [ProbeMessage { role: "user", content: PROBE_PROMPT }],
        }
    }
}

/// Raw rate-limit header values, `"Unknown"` where absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub requests_limit: String,
    pub requests_remaining: String,
    pub tokens_limit: String,
    pub tokens_remaining: String,
    pub tokens_reset: String,
}

impl RateLimitHeaders {
    pub fn from_headers(hs: &HeaderMap) -> Self {
        let get = |k: &str| {
            hs.get(k)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            requests_limit: get(REQUESTS_LIMIT),
            requests_remaining: get(REQUESTS_REMAINING),
            tokens_limit: get(TOKENS_LIMIT),
            tokens_remaining: get(TOKENS_REMAINING),
            tokens_reset: get(TOKENS_RESET),
        }
    }
}

/// One display-ready table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub requests_limit: String,
    pub requests_remaining: String,
    pub tokens_limit: String,
    pub tokens_remaining: String,
    pub reset_time: String,
}

impl UsageRecord {
    pub fn from_headers(raw: &RateLimitHeaders, zone: LocalZone, now: OffsetDateTime) -> Self {
        Self {
            requests_limit: format_number(&raw.requests_limit),
            requests_remaining: format_number(&raw.requests_remaining),
            tokens_limit: format_number(&raw.tokens_limit),
            tokens_remaining: format_number(&raw.tokens_remaining),
            reset_time: format_reset_time(&raw.tokens_reset, zone, now),
        }
    }

    pub fn failed() -> Self {
        Self {
            requests_limit: ERROR_SENTINEL.into(),
            requests_remaining: ERROR_SENTINEL.into(),
            tokens_limit: ERROR_SENTINEL.into(),
            tokens_remaining: ERROR_SENTINEL.into(),
            reset_time: ERROR_SENTINEL.into(),
        }
    }
}

/// Model → record, in probe order, plus the messages of failed probes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageReport {
    entries: Vec<(String, UsageRecord)>,
    failures: Vec<String>,
}

impl UsageReport {
    /// First insert for a model wins.
    pub fn insert(&mut self, model: &str, record: UsageRecord) {
        if self.get(model).is_none() {
            self.entries.push((model.to_string(), record));
        }
    }

    pub fn get(&self, model: &str) -> Option<&UsageRecord> {
        self.entries.iter().find(|(m, _)| m == model).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UsageRecord)> {
        self.entries.iter().map(|(m, r)| (m.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Error checking token usage: ...` lines, one per failed probe.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }
}

/// What to do when a single probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop everything collected so far and return an empty report.
    #[default]
    AbortBatch,
    /// Record `"Error"` for the failed model and keep going.
    PerModel,
}

/// Sends one probe and hands back the response headers.
pub trait Transport {
    async fn probe(&self, model: &str) -> Result<HeaderMap>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: ApiKey,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: ApiKey, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            url: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

impl Transport for HttpTransport {
    async fn probe(&self, model: &str) -> Result<HeaderMap> {
        let resp = self
            .client
            .post(&self.url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", self.api_key.expose())
            .json(&ProbeRequest::new(model))
            .send()
            .await
            .map_err(|source| Error::Transport {
                model: model.to_string(),
                source,
            })?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(model, %status, "probe ok");
        } else {
            tracing::warn!(model, %status, "probe returned non-success status, using headers anyway");
        }
        Ok(resp.headers().clone())
    }
}

/// Probes every model in order, one request at a time.
pub async fn probe_all<T: Transport>(
    transport: &T,
    models: &[String],
    zone: LocalZone,
    policy: FailurePolicy,
) -> UsageReport {
    let mut report = UsageReport::default();
    for model in models {
        match transport.probe(model).await {
            Ok(hs) => {
                let raw = RateLimitHeaders::from_headers(&hs);
                tracing::debug!(model, ?raw, "rate limit headers");
                report.insert(model, UsageRecord::from_headers(&raw, zone, OffsetDateTime::now_utc()));
            }
            Err(e) => {
                tracing::debug!(model, error = %e, "probe failed");
                let message = format!("Error checking token usage: {e}");
                match policy {
                    FailurePolicy::AbortBatch => {
                        return UsageReport {
                            failures: vec![message],
                            ..UsageReport::default()
                        };
                    }
                    FailurePolicy::PerModel => {
                        report.failures.push(message);
                        report.insert(model, UsageRecord::failed());
                    }
                }
            }
        }
    }
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::cell::Cell;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn transport_error(model: &str) -> Error {
        let source = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        Error::Transport {
            model: model.to_string(),
            source,
        }
    }

    pub(crate) fn headers(req_limit: &str, req_rem: &str, tok_limit: &str, tok_rem: &str, reset: &str) -> HeaderMap {
        let mut hs = HeaderMap::new();
        hs.insert(REQUESTS_LIMIT, HeaderValue::from_str(req_limit).unwrap());
        hs.insert(REQUESTS_REMAINING, HeaderValue::from_str(req_rem).unwrap());
        hs.insert(TOKENS_LIMIT, HeaderValue::from_str(tok_limit).unwrap());
        hs.insert(TOKENS_REMAINING, HeaderValue::from_str(tok_rem).unwrap());
        hs.insert(TOKENS_RESET, HeaderValue::from_str(reset).unwrap());
        hs
    }

    /// Canned headers per call; fails on the `fail_on`-th call (0-based).
    pub(crate) struct FakeTransport {
        pub responses: Vec<HeaderMap>,
        pub fail_on: Option<usize>,
        pub calls: Cell<usize>,
    }

    impl FakeTransport {
        pub(crate) fn new(responses: Vec<HeaderMap>, fail_on: Option<usize>) -> Self {
            Self { responses, fail_on, calls: Cell::new(0) }
        }
    }

    impl Transport for FakeTransport {
        async fn probe(&self, model: &str) -> Result<HeaderMap> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if self.fail_on == Some(n) {
                return Err(transport_error(model));
            }
            Ok(self.responses.get(n).cloned().unwrap_or_default())
        }
    }

    fn models(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("model-{i}")).collect()
    }

    fn five_responses() -> Vec<HeaderMap> {
        (1..=5)
            .map(|i| headers(&format!("{}000", i), "999", "100000", "45200", "2099-01-01T00:00:00Z"))
            .collect()
    }

    #[test]
    fn test_rate_limit_headers_default_to_unknown() {
        let mut hs = HeaderMap::new();
        hs.insert(REQUESTS_LIMIT, HeaderValue::from_static("50"));
        let raw = RateLimitHeaders::from_headers(&hs);
        assert_eq!(raw.requests_limit, "50");
        assert_eq!(raw.requests_remaining, UNKNOWN);
        assert_eq!(raw.tokens_limit, UNKNOWN);
        assert_eq!(raw.tokens_remaining, UNKNOWN);
        assert_eq!(raw.tokens_reset, UNKNOWN);
    }

    #[test]
    fn test_usage_record_formats_fields() {
        let hs = headers("4000", "3999", "400000", "398765", "2024-01-01T00:00:00Z");
        let raw = RateLimitHeaders::from_headers(&hs);
        let now = time::macros::datetime!(2023-12-31 23:00:00 UTC);
        let rec = UsageRecord::from_headers(&raw, LocalZone::utc(), now);
        assert_eq!(rec.requests_limit, "4,000");
        assert_eq!(rec.requests_remaining, "3,999");
        assert_eq!(rec.tokens_limit, "400,000");
        assert_eq!(rec.tokens_remaining, "398,765");
        assert_eq!(rec.reset_time, "2024-01-01 12:00:00 AM UTC (Resets in 1h 0m)");
    }

    #[test]
    fn test_usage_record_all_unknown() {
        let raw = RateLimitHeaders::from_headers(&HeaderMap::new());
        let rec = UsageRecord::from_headers(&raw, LocalZone::utc(), OffsetDateTime::now_utc());
        assert_eq!(rec.requests_limit, UNKNOWN);
        assert_eq!(rec.reset_time, UNKNOWN);
    }

    #[test]
    fn test_report_keeps_insert_order_and_first_wins() {
        let mut report = UsageReport::default();
        report.insert("b", UsageRecord::failed());
        report.insert("a", UsageRecord::failed());
        let mut other = UsageRecord::failed();
        other.requests_limit = "1".into();
        report.insert("b", other);

        let order: Vec<&str> = report.iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(report.get("b").unwrap().requests_limit, ERROR_SENTINEL);
    }

    #[tokio::test]
    async fn test_probe_all_collects_in_model_order() {
        let transport = FakeTransport::new(five_responses(), None);
        let report = probe_all(&transport, &models(5), LocalZone::utc(), FailurePolicy::AbortBatch).await;

        assert_eq!(report.len(), 5);
        assert!(report.failures().is_empty());
        let order: Vec<&str> = report.iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec!["model-1", "model-2", "model-3", "model-4", "model-5"]);
        assert_eq!(report.get("model-3").unwrap().requests_limit, "3,000");
    }

    #[tokio::test]
    async fn test_probe_all_aborts_batch_on_error() {
        let transport = FakeTransport::new(five_responses(), Some(1));
        let report = probe_all(&transport, &models(5), LocalZone::utc(), FailurePolicy::AbortBatch).await;

        assert!(report.is_empty());
        assert_eq!(transport.calls.get(), 2);
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].starts_with("Error checking token usage: request for model-2 failed"));
    }

    #[tokio::test]
    async fn test_probe_all_per_model_isolation() {
        let transport = FakeTransport::new(five_responses(), Some(1));
        let report = probe_all(&transport, &models(5), LocalZone::utc(), FailurePolicy::PerModel).await;

        assert_eq!(report.len(), 5);
        assert_eq!(transport.calls.get(), 5);
        assert_eq!(report.get("model-2"), Some(&UsageRecord::failed()));
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].contains("model-2"));
        assert_eq!(report.get("model-5").unwrap().requests_limit, "5,000");
    }

    #[tokio::test]
    async fn test_http_transport_sends_probe_and_reads_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "model": "claude-test",
                "max_tokens": 1,
                "messages": [{"role": "user", "content": PROBE_PROMPT}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(REQUESTS_LIMIT, "50")
                    .insert_header(TOKENS_RESET, "2024-01-01T00:00:00Z")
                    .set_body_json(serde_json::json!({"type": "message"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/v1/", server.uri());
        let transport = HttpTransport::new(&base, ApiKey::new("test-key").unwrap(), None).unwrap();
        let hs = transport.probe("claude-test").await.unwrap();
        let raw = RateLimitHeaders::from_headers(&hs);
        assert_eq!(raw.requests_limit, "50");
        assert_eq!(raw.tokens_reset, "2024-01-01T00:00:00Z");
        assert_eq!(raw.tokens_remaining, UNKNOWN);
    }

    #[tokio::test]
    async fn test_http_transport_error_status_still_yields_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header(REQUESTS_REMAINING, "0"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), ApiKey::new("k").unwrap(), None).unwrap();
        let hs = transport.probe("m").await.unwrap();
        assert_eq!(RateLimitHeaders::from_headers(&hs).requests_remaining, "0");
    }

    #[tokio::test]
    async fn test_http_transport_connection_failure() {
        let transport = HttpTransport::new(
            "http://127.0.0.1:1",
            ApiKey::new("k").unwrap(),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let err = transport.probe("m").await.unwrap_err();
        assert!(matches!(err, Error::Transport { ref model, .. } if model == "m"));
    }
}
