use std::any::{type_name, Any};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, Request, Response, StatusCode};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::{FutureExt as _, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context as OtelContext, KeyValue};
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

use super::enrich::{RequestEnricher, RequestMetadata, UserIdentity};
use super::filter::RequestFilter;
use crate::settings::TracingConfig;
use crate::telemetry::{RequestMetrics, SdkTracer};

// 手动定义语义常量，保持与现有 dashboard 一致
const HTTP_METHOD: &str = "http.method";
const HTTP_URL: &str = "http.url";
const HTTP_STATUS_CODE: &str = "http.status_code";
const HTTP_DURATION_MS: &str = "http.duration_ms";
const HTTP_ROUTE: &str = "http.route";
const USER_ID: &str = "user.id";

// 未匹配路由时的指标 endpoint，避免原始 path 导致时间序列无限增长
const UNMATCHED_ROUTE: &str = "unmatched";

/// HTTP Headers 作为 Extractor，用于从请求头中提取 trace context
struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

#[derive(Clone)]
struct TaggerOptions {
    filter: RequestFilter,
    record_exceptions: bool,
    enricher: Option<Arc<dyn RequestEnricher>>,
}

impl Default for TaggerOptions {
    fn default() -> Self {
        Self {
            filter: RequestFilter::default(),
            record_exceptions: true,
            enricher: None,
        }
    }
}

/// 为每个请求创建一个 server span 并记录请求结果。
///
/// span 名称为 `"{method} {path}"`，属性包括 `http.method`、`http.url`、
/// `user.id`（来自 [`UserIdentity`] extension）、`http.status_code` 和
/// `http.duration_ms`。下游返回的错误或 panic 会记录到 span 上并原样向上传递。
///
/// 在 router 上全局注册即可，它会包在路由之外：
///
/// ```ignore
/// let app = Router::new()
///     .route("/orders/{id}", get(get_order))
///     .layer(telemetry.request_tagger());
/// ```
#[derive(Clone)]
pub struct RequestTaggerLayer {
    tracer: Option<SdkTracer>,
    options: Arc<TaggerOptions>,
    metrics: Option<RequestMetrics>,
}

impl RequestTaggerLayer {
    pub fn new(tracer: SdkTracer) -> Self {
        Self {
            tracer: Some(tracer),
            options: Arc::new(TaggerOptions::default()),
            metrics: None,
        }
    }

    /// 不创建 span，直接透传请求
    pub fn disabled() -> Self {
        Self {
            tracer: None,
            options: Arc::new(TaggerOptions::default()),
            metrics: None,
        }
    }

    pub fn from_config(tracer: Option<SdkTracer>, tracing: &TracingConfig) -> Self {
        let layer = match tracer {
            Some(tracer) if tracing.enabled => Self::new(tracer),
            _ => Self::disabled(),
        };

        layer
            .with_filter(RequestFilter::from_config(tracing))
            .with_record_exceptions(tracing.record_exceptions)
    }

    pub fn with_filter(mut self, filter: RequestFilter) -> Self {
        Arc::make_mut(&mut self.options).filter = filter;
        self
    }

    pub fn with_record_exceptions(mut self, record_exceptions: bool) -> Self {
        Arc::make_mut(&mut self.options).record_exceptions = record_exceptions;
        self
    }

    pub fn with_enricher(mut self, enricher: impl RequestEnricher + 'static) -> Self {
        Arc::make_mut(&mut self.options).enricher = Some(Arc::new(enricher));
        self
    }

    pub fn with_metrics(mut self, metrics: RequestMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }
}

impl<S> Layer<S> for RequestTaggerLayer {
    type Service = RequestTaggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTaggerService {
            inner,
            tracer: self.tracer.clone(),
            options: Arc::clone(&self.options),
            metrics: self.metrics.clone(),
        }
    }
}

/// [`RequestTaggerLayer`] 生成的 service
#[derive(Clone)]
pub struct RequestTaggerService<S> {
    inner: S,
    tracer: Option<SdkTracer>,
    options: Arc<TaggerOptions>,
    metrics: Option<RequestMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestTaggerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let tracer = match &self.tracer {
            Some(tracer) if self.options.filter.allows(&request) => tracer,
            _ => return self.inner.call(request).boxed(),
        };

        let guard = RequestSpan::start(tracer, &request, &self.options, self.metrics.clone());
        let cx = guard.context().clone();
        let future = self.inner.call(request);

        async move {
            let mut guard = guard;
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(response)) => {
                    guard.complete(response.status());
                    Ok(response)
                }
                Ok(Err(err)) => {
                    guard.fail(type_name::<S::Error>(), &err.to_string());
                    Err(err)
                }
                Err(payload) => {
                    guard.fail("panic", &panic_message(payload.as_ref()));
                    drop(guard);
                    panic::resume_unwind(payload)
                }
            }
        }
        .with_context(cx)
        .boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    InProgress,
    Completed,
    Failed,
}

/// 单个请求的 span，drop 时记录耗时并结束 span
///
/// 无论正常返回、下游报错、panic 还是 future 被取消，都只会结束一次。
struct RequestSpan {
    cx: OtelContext,
    method: String,
    path: String,
    route: String,
    started: Instant,
    state: RequestState,
    status_code: Option<u16>,
    record_exceptions: bool,
    metrics: Option<RequestMetrics>,
}

impl RequestSpan {
    fn start<B>(
        tracer: &SdkTracer,
        request: &Request<B>,
        options: &TaggerOptions,
        metrics: Option<RequestMetrics>,
    ) -> Self {
        let started = Instant::now();
        let method = request.method().as_str().to_owned();
        let path = request.uri().path().to_owned();
        let name = format!("{} {}", method, path);

        let parent_cx = global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderExtractor(request.headers()))
        });

        let mut attributes = vec![
            KeyValue::new(HTTP_METHOD, method.clone()),
            KeyValue::new(HTTP_URL, display_url(request)),
        ];
        let route = match request.extensions().get::<MatchedPath>() {
            Some(matched) => {
                attributes.push(KeyValue::new(HTTP_ROUTE, matched.as_str().to_owned()));
                matched.as_str().to_owned()
            }
            None => UNMATCHED_ROUTE.to_owned(),
        };
        if let Some(user) = request.extensions().get::<UserIdentity>() {
            attributes.push(KeyValue::new(USER_ID, user.0.clone()));
        }
        if let Some(enricher) = &options.enricher {
            attributes.extend(enricher.enrich(&RequestMetadata::from_request(request)));
        }

        let span = tracer
            .span_builder(name.clone())
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(tracer, &parent_cx);
        let cx = parent_cx.with_span(span);

        debug!(
            span = %name,
            trace_id = %cx.span().span_context().trace_id(),
            "Request started"
        );

        Self {
            cx,
            method,
            path,
            route,
            started,
            state: RequestState::InProgress,
            status_code: None,
            record_exceptions: options.record_exceptions,
            metrics,
        }
    }

    fn context(&self) -> &OtelContext {
        &self.cx
    }

    fn complete(&mut self, status: StatusCode) {
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(HTTP_STATUS_CODE, status.as_u16() as i64));
        span.set_status(span_status(status));

        self.status_code = Some(status.as_u16());
        self.state = RequestState::Completed;
    }

    fn fail(&mut self, error_type: &str, message: &str) {
        let span = self.cx.span();
        span.set_status(Status::error(message.to_owned()));

        if self.record_exceptions {
            span.add_event(
                "exception",
                vec![
                    KeyValue::new("exception.type", error_type.to_owned()),
                    KeyValue::new("exception.message", message.to_owned()),
                ],
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_error(error_type, &format!("{} {}", self.method, self.route));
        }

        error!(
            method = %self.method,
            path = %self.path,
            error = %message,
            "Request failed"
        );
        self.state = RequestState::Failed;
    }
}

impl Drop for RequestSpan {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let duration_ms = elapsed.as_millis() as i64;

        let span = self.cx.span();
        span.set_attribute(KeyValue::new(HTTP_DURATION_MS, duration_ms));
        span.end();

        if let Some(metrics) = &self.metrics {
            metrics.record_request(&self.method, &self.route, self.status_code, elapsed);
        }

        match (self.state, self.status_code) {
            (RequestState::InProgress, _) => warn!(
                method = %self.method,
                path = %self.path,
                duration_ms,
                "Request dropped before completion"
            ),
            (RequestState::Completed, Some(code)) if code >= 500 => error!(
                status_code = code,
                duration_ms,
                "Server error occurred"
            ),
            (RequestState::Completed, Some(code)) if code >= 400 => warn!(
                status_code = code,
                duration_ms,
                "Client error occurred"
            ),
            (RequestState::Completed, code) => info!(
                status_code = ?code,
                duration_ms,
                "Request completed successfully"
            ),
            (RequestState::Failed, _) => {}
        }
    }
}

/// 4xx 和 5xx 都标记为错误
fn span_status(status: StatusCode) -> Status {
    if status.as_u16() >= 400 {
        Status::error(status.canonical_reason().unwrap_or("request failed"))
    } else {
        Status::Ok
    }
}

/// 请求的完整 URL，server 端的 URI 通常只有 path，需要从 Host 头补全
fn display_url<B>(request: &Request<B>) -> String {
    let uri = request.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let host = uri.authority().map(|a| a.as_str()).or_else(|| {
        request
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
    });

    match host {
        Some(host) => format!("http://{}{}", host, path_and_query),
        None => path_and_query.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    }
}
