use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{Result, RollcallError};
use crate::models::attendance::EndpointShape;
use crate::models::DateRange;

use super::payloads::{
    DayLevelRecord, DetailHistoryRecord, RawAttendance, RawSchool, RawStudent, SummaryRecord,
};
use super::AttendanceSource;

/// HTTP client for the source SIS.
///
/// Every request carries the certificate credential header, respects a
/// minimum inter-request interval (the upstream API is rate limited),
/// and is retried with capped, jittered exponential backoff on
/// timeouts, 429, and 5xx. Retry exhaustion surfaces as
/// [`RollcallError::Transient`] so the orchestrator can fail the
/// school without aborting the run.
pub struct SourceClient {
    base_url: String,
    certificate: String,
    http: Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    page_size: u64,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            certificate: config.certificate.clone(),
            http,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            page_size: config.page_size.max(1),
        })
    }

    /// Wait until the minimum inter-request interval has elapsed.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.backoff_cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }

    /// GET a JSON array from an endpoint, with throttling and retries.
    async fn get_array(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}{endpoint}", self.base_url);

        for attempt in 0..self.max_attempts {
            self.throttle().await;
            let started = Instant::now();

            let response = self
                .http
                .get(&url)
                .header("Certificate", &self.certificate)
                .query(query)
                .send()
                .await;

            let latency_ms = started.elapsed().as_millis() as u64;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let value: serde_json::Value = resp.json().await.map_err(|e| {
                            RollcallError::Source(format!(
                                "failed to parse response from {endpoint}: {e}"
                            ))
                        })?;
                        let records = value.as_array().map_or(0, |a| a.len());
                        info!(endpoint, status = %status, latency_ms, records, "source request");
                        return Ok(value);
                    }

                    if status == StatusCode::NOT_FOUND {
                        debug!(endpoint, latency_ms, "endpoint not found");
                        return Err(RollcallError::UnsupportedShape(format!(
                            "{endpoint} returned 404"
                        )));
                    }

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(RollcallError::FatalAuth(format!(
                            "{endpoint} returned {status}"
                        )));
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        warn!(endpoint, status = %status, attempt, latency_ms, "retryable source response");
                        if attempt + 1 == self.max_attempts {
                            return Err(RollcallError::Transient(format!(
                                "{endpoint} returned {status} after {} attempts",
                                self.max_attempts
                            )));
                        }
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                        continue;
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(RollcallError::Source(format!(
                        "{endpoint} returned unexpected status {status}: {body}"
                    )));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(endpoint, attempt, error = %e, "source request failed");
                    if attempt + 1 == self.max_attempts {
                        return Err(RollcallError::Transient(format!(
                            "{endpoint} failed after {} attempts: {e}",
                            self.max_attempts
                        )));
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
                Err(e) => return Err(RollcallError::Http(e)),
            }
        }

        Err(RollcallError::Transient(format!(
            "{endpoint} exhausted retry budget"
        )))
    }

    /// Fetch all pages of an offset-paginated endpoint.
    async fn get_paged<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        base_query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut results: Vec<T> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut query: Vec<(&str, String)> = base_query.to_vec();
            query.push(("start", offset.to_string()));
            query.push(("end", (offset + self.page_size - 1).to_string()));

            let value = self.get_array(endpoint, &query).await?;
            let page_count = value.as_array().map_or(0, |a| a.len()) as u64;

            let page: Vec<T> = serde_json::from_value(value).map_err(|e| {
                RollcallError::Source(format!("failed to deserialize {endpoint} page: {e}"))
            })?;
            results.extend(page);

            if page_count < self.page_size {
                debug!(endpoint, total = results.len(), "pagination complete");
                break;
            }
            offset += self.page_size;
        }

        Ok(results)
    }

    fn range_query(range: &DateRange) -> Vec<(&'static str, String)> {
        vec![
            ("startDate", range.start.format("%Y-%m-%d").to_string()),
            ("endDate", range.end.format("%Y-%m-%d").to_string()),
        ]
    }
}

#[async_trait]
impl AttendanceSource for SourceClient {
    async fn fetch_schools(&self) -> Result<Vec<RawSchool>> {
        let value = self.get_array("/schools", &[]).await?;
        serde_json::from_value(value)
            .map_err(|e| RollcallError::Source(format!("failed to deserialize /schools: {e}")))
    }

    async fn fetch_enrollment(&self, school_code: &str) -> Result<Vec<RawStudent>> {
        let endpoint = format!("/enrollment/{school_code}");
        self.get_paged(&endpoint, &[]).await
    }

    async fn fetch_attendance(
        &self,
        school_code: &str,
        range: &DateRange,
        shape: EndpointShape,
    ) -> Result<RawAttendance> {
        let query = Self::range_query(range);
        match shape {
            EndpointShape::DayLevel => {
                let endpoint = format!("/attendance/daily/{school_code}");
                let records: Vec<DayLevelRecord> = self.get_paged(&endpoint, &query).await?;
                Ok(RawAttendance::DayLevel(records))
            }
            EndpointShape::DetailHistory => {
                let endpoint = format!("/attendance/history/{school_code}");
                let records: Vec<DetailHistoryRecord> = self.get_paged(&endpoint, &query).await?;
                Ok(RawAttendance::DetailHistory(records))
            }
            EndpointShape::SummaryOnly => {
                let endpoint = format!("/attendance/summary/{school_code}");
                let value = self.get_array(&endpoint, &query).await?;
                let records: Vec<SummaryRecord> = serde_json::from_value(value).map_err(|e| {
                    RollcallError::Source(format!("failed to deserialize {endpoint}: {e}"))
                })?;
                Ok(RawAttendance::SummaryOnly(records))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> SourceConfig {
        SourceConfig {
            enabled: true,
            base_url: base_url.to_string(),
            certificate: "TEST-CERT".into(),
            request_timeout_secs: 5,
            min_request_interval_ms: 0,
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
            page_size: 2,
        }
    }

    fn range() -> DateRange {
        DateRange::day(NaiveDate::from_ymd_opt(2024, 8, 15).unwrap())
    }

    #[tokio::test]
    async fn fetch_schools_sends_certificate_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .and(header("Certificate", "TEST-CERT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"schoolCode": "1", "name": "Lincoln Elementary", "periodCount": 7},
                {"schoolCode": "2", "name": "Whitman Middle", "periodCount": 6}
            ])))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let schools = client.fetch_schools().await.unwrap();
        assert_eq!(schools.len(), 2);
        assert_eq!(schools[0].school_code, "1");
        assert_eq!(schools[1].period_count, 6);
    }

    #[tokio::test]
    async fn fetch_enrollment_paginates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrollment/1"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"studentId": "90001", "schoolCode": "1", "grade": "04"},
                {"studentId": "90002", "schoolCode": "1", "grade": "04"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/enrollment/1"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"studentId": "90003", "schoolCode": "1", "grade": "05"}
            ])))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let students = client.fetch_enrollment("1").await.unwrap();
        assert_eq!(students.len(), 3);
        assert_eq!(students[2].student_id, "90003");
    }

    #[tokio::test]
    async fn fetch_attendance_day_level() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/attendance/daily/1"))
            .and(query_param("startDate", "2024-08-15"))
            .and(query_param("endDate", "2024-08-15"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"studentId": "90001", "date": "2024-08-15", "periodCodes": ["P","P","A"]}
            ])))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let raw = client
            .fetch_attendance("1", &range(), EndpointShape::DayLevel)
            .await
            .unwrap();
        match raw {
            RawAttendance::DayLevel(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].period_codes, vec!["P", "P", "A"]);
            }
            other => panic!("expected day-level payload, got {:?}", other.shape()),
        }
    }

    #[tokio::test]
    async fn not_found_maps_to_unsupported_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/attendance/daily/1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let err = client
            .fetch_attendance("1", &range(), EndpointShape::DayLevel)
            .await
            .unwrap_err();
        assert!(matches!(err, RollcallError::UnsupportedShape(_)));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_fatal_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let err = client.fetch_schools().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn server_error_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"schoolCode": "1", "name": "Lincoln Elementary"}
            ])))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let schools = client.fetch_schools().await.unwrap();
        assert_eq!(schools.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = SourceClient::new(&test_config(&server.uri())).unwrap();
        let err = client.fetch_schools().await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn throttle_enforces_min_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.min_request_interval_ms = 50;
        let client = SourceClient::new(&config).unwrap();

        let started = Instant::now();
        client.fetch_schools().await.unwrap();
        client.fetch_schools().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn backoff_is_capped() {
        let config = SourceConfig {
            backoff_base_ms: 100,
            backoff_cap_ms: 300,
            ..test_config("http://localhost")
        };
        let client = SourceClient::new(&config).unwrap();
        // cap 300ms plus at most 25% jitter
        for attempt in 0..10 {
            assert!(client.backoff_delay(attempt) <= Duration::from_millis(375));
        }
    }
}
