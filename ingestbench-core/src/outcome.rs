use std::sync::Arc;
use std::time::Duration;

use ingestbench_http::HttpResponse;

/// Statuses the ingestion service uses to acknowledge a batch.
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 201, 202];

const BODY_EXCERPT_CHARS: usize = 80;

#[must_use]
pub fn is_accepted(status: u16) -> bool {
    ACCEPTED_STATUSES.contains(&status)
}

/// The result of one pattern invocation. Every invocation produces exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub pattern: Arc<str>,
    pub latency: Duration,
    pub success: bool,
    pub failure: Option<String>,
}

impl RequestOutcome {
    #[must_use]
    pub fn success(pattern: Arc<str>, latency: Duration) -> Self {
        Self {
            pattern,
            latency,
            success: true,
            failure: None,
        }
    }

    #[must_use]
    pub fn failure(pattern: Arc<str>, latency: Duration, detail: impl Into<String>) -> Self {
        Self {
            pattern,
            latency,
            success: false,
            failure: Some(detail.into()),
        }
    }

    /// Classifies an HTTP exchange: accepted statuses succeed, anything else
    /// (other statuses, connect errors, timeouts) fails with a short detail.
    #[must_use]
    pub fn from_http(
        pattern: Arc<str>,
        latency: Duration,
        res: ingestbench_http::Result<HttpResponse>,
    ) -> Self {
        match res {
            Ok(res) if is_accepted(res.status) => Self::success(pattern, latency),
            Ok(res) => {
                let excerpt = res.body_excerpt(BODY_EXCERPT_CHARS);
                let detail = if excerpt.is_empty() {
                    format!("status {}", res.status)
                } else {
                    format!("status {}: {excerpt}", res.status)
                };
                Self::failure(pattern, latency, detail)
            }
            Err(err) => Self::failure(
                pattern,
                latency,
                format!("{}: {err}", err.transport_error_kind()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn name() -> Arc<str> {
        Arc::from("POST /ingest/logs")
    }

    #[test]
    fn accepted_statuses_succeed() {
        for status in ACCEPTED_STATUSES {
            let res = Ok(HttpResponse {
                status,
                body: Bytes::new(),
            });
            let o = RequestOutcome::from_http(name(), Duration::from_millis(3), res);
            assert!(o.success, "status {status}");
            assert_eq!(o.failure, None);
        }
    }

    #[test]
    fn other_statuses_fail_with_status_detail() {
        let res = Ok(HttpResponse {
            status: 503,
            body: Bytes::from_static(b"injected failure"),
        });
        let o = RequestOutcome::from_http(name(), Duration::from_millis(3), res);
        assert!(!o.success);
        assert_eq!(o.failure.as_deref(), Some("status 503: injected failure"));
        assert_eq!(o.latency, Duration::from_millis(3));
    }

    #[test]
    fn transport_errors_fail_with_kind() {
        let res = Err(ingestbench_http::Error::Timeout(Duration::from_millis(50)));
        let o = RequestOutcome::from_http(name(), Duration::from_millis(50), res);
        assert!(!o.success);
        assert!(
            o.failure
                .as_deref()
                .is_some_and(|d| d.starts_with("timeout:")),
            "{:?}",
            o.failure
        );
    }
}
