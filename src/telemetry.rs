use std::{
    fmt,
    sync::Arc,
    time::Duration,
};

use crate::{identifiers::ResumeId, poll::PollPhase};

/// User-provided callbacks for emitting metrics without taking on a metrics
/// backend dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub poll_attempt: Option<Arc<dyn Fn(PollAttemptMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field(
                "poll_attempt",
                &self.poll_attempt.as_ref().map(|_| "callback"),
            )
            .finish()
    }
}

/// Common request metadata shared by all telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    /// Whether this request was the post-refresh retry of a 401.
    pub auth_retry: bool,
    pub context: RequestContext,
}

/// One status-poll attempt and the phase it left the poll in.
#[derive(Clone, Debug)]
pub struct PollAttemptMetrics {
    pub resume_id: ResumeId,
    pub attempt: u32,
    pub phase: PollPhase,
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn poll_enabled(&self) -> bool {
        self.callbacks.poll_attempt.is_some()
    }

    pub fn record_poll(&self, metrics: PollAttemptMetrics) {
        if let Some(cb) = &self.callbacks.poll_attempt {
            cb(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_are_invoked() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let telemetry = Telemetry::new(Some(MetricsCallbacks {
            http_request: Some(Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            poll_attempt: None,
        }));

        assert!(telemetry.http_enabled());
        assert!(!telemetry.poll_enabled());
        telemetry.record_http(HttpRequestMetrics {
            latency: Duration::from_millis(5),
            status: Some(200),
            error: None,
            auth_retry: false,
            context: RequestContext::new("GET", "/resumes"),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_context_ignores_blank_request_id() {
        let ctx = RequestContext::new("GET", "/resumes").with_request_id(Some("  ".into()));
        assert!(ctx.request_id.is_none());
    }
}
