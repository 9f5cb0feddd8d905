use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

fn register_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .unwrap_or_else(|e| panic!("failed to create {}: {}", name, e));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
    counter
}

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_http_requests_total",
        "Total HTTP requests handled by publication-service",
        &["method", "path", "status"],
    )
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "publication_service_http_request_duration_seconds",
            "HTTP request latency for publication-service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create publication_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register publication_service_http_request_duration_seconds");
    histogram
});

static POST_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_post_transitions_total",
        "Applied post status transitions",
        &["from", "to"],
    )
});

static NOTIFICATIONS_CREATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_notifications_created_total",
        "Notification records persisted",
        &["type"],
    )
});

static NOTIFICATION_FANOUT_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_notification_fanout_failures_total",
        "Recipients whose notification could not be persisted",
        &["type"],
    )
});

static MODERATION_VERDICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_moderation_verdicts_total",
        "Combined moderation verdicts by severity",
        &["severity"],
    )
});

static MODERATION_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_moderation_fallbacks_total",
        "Oracle calls that fell back to manual review",
        &["reason"],
    )
});

static REALTIME_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "publication_service_realtime_connections",
        "Currently open real-time sessions",
    )
    .expect("failed to create publication_service_realtime_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register publication_service_realtime_connections");
    gauge
});

static REALTIME_PUSHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_realtime_pushes_total",
        "Real-time frames pushed to sessions",
        &["event", "outcome"],
    )
});

static CACHE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter_vec(
        "publication_service_cache_events_total",
        "Ephemeral cache lookups and invalidations",
        &["namespace", "outcome"],
    )
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn record_transition(from: &str, to: &str) {
    POST_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
}

pub fn record_notifications_created(notification_type: &str, count: usize) {
    NOTIFICATIONS_CREATED_TOTAL
        .with_label_values(&[notification_type])
        .inc_by(count as u64);
}

pub fn record_fanout_failures(notification_type: &str, count: usize) {
    NOTIFICATION_FANOUT_FAILURES_TOTAL
        .with_label_values(&[notification_type])
        .inc_by(count as u64);
}

pub fn record_verdict(severity: &str) {
    MODERATION_VERDICTS_TOTAL.with_label_values(&[severity]).inc();
}

pub fn record_oracle_fallback(reason: &str) {
    MODERATION_FALLBACKS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn realtime_connection_opened() {
    REALTIME_CONNECTIONS.inc();
}

pub fn realtime_connection_closed() {
    REALTIME_CONNECTIONS.dec();
}

/// Current value of the open-sessions gauge
pub fn realtime_connections() -> i64 {
    REALTIME_CONNECTIONS.get()
}

pub fn record_push(event: &str, delivered: bool) {
    let outcome = if delivered { "delivered" } else { "dropped" };
    REALTIME_PUSHES_TOTAL.with_label_values(&[event, outcome]).inc();
}

pub fn record_cache_event(namespace: &str, outcome: &str) {
    CACHE_EVENTS_TOTAL.with_label_values(&[namespace, outcome]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

/// Records request count and latency per matched route pattern
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // route pattern keeps label cardinality bounded (no raw ids)
        let path = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(err) => {
                    let status = err.as_response_error().status_code().as_u16();
                    observe_http_request(&method, &path, status, elapsed);
                }
            }
            result
        })
    }
}
