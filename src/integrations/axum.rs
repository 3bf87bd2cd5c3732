//! Axum框架的追踪传播中间件
//!
//! 服务端适配器：从入站请求提取追踪上下文，派生请求作用域的
//! 子上下文，并通过请求扩展把 `TraceScope` 显式传给后续处理器。

use crate::export::{SpanMetadata, SpanRecord, SpanSink};
use crate::generator::{IdGenerator, RandomIdGenerator};
use crate::propagation::TraceContextPropagator;
use crate::scope::TraceScope;
use crate::trace_context::{TraceContext, TraceFlags, TraceState};
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::LazyLock;
use std::time::SystemTime;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::Instrument;

/// 回显trace ID的响应头部字段名
const TRACE_ID_RESPONSE_HEADER: &str = "x-trace-id";

/// 中间件未安装时提取器使用的兜底生成器
static FALLBACK_GENERATOR: LazyLock<RandomIdGenerator> = LazyLock::new(RandomIdGenerator::new);

/// 传播中间件配置选项
///
/// 所有协作方都在这里显式注入——传播器、ID生成器和span sink，
/// 没有进程级的可变单例。
#[derive(Clone)]
pub struct PropagationConfig {
    /// 使用的传播器
    pub propagator: TraceContextPropagator,
    /// 使用的ID生成器
    pub generator: Arc<dyn IdGenerator>,
    /// span生命周期通知的接收方（可选）
    pub span_sink: Option<Arc<dyn SpanSink>>,
    /// 严格校验：存在却损坏的追踪头部直接拒绝请求（默认关闭）
    pub strict: bool,
    /// 是否启用 tracing span（默认启用）
    pub enable_span: bool,
    /// 是否在响应头回显trace ID（默认启用）
    pub enable_response_header: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            propagator: TraceContextPropagator::new(),
            generator: Arc::new(RandomIdGenerator::new()),
            span_sink: None,
            strict: false,
            enable_span: true,
            enable_response_header: true,
        }
    }
}

/// 追踪传播中间件层
///
/// 只负责上下文的提取、派生和传递，不做采样决策。
#[derive(Clone)]
pub struct PropagationLayer {
    config: PropagationConfig,
}

impl PropagationLayer {
    /// 创建新的传播层，使用默认配置
    pub fn new() -> Self {
        Self {
            config: PropagationConfig::default(),
        }
    }

    /// 创建严格校验模式的传播层
    ///
    /// 存在却损坏的 `traceparent` 会以 400 拒绝请求；
    /// 头部缺失仍然正常生成新上下文。
    pub fn strict() -> Self {
        Self {
            config: PropagationConfig {
                strict: true,
                ..PropagationConfig::default()
            },
        }
    }

    /// 使用自定义配置创建传播层
    pub fn with_config(config: PropagationConfig) -> Self {
        Self { config }
    }

    /// 替换ID生成器
    pub fn with_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.config.generator = generator;
        self
    }

    /// 设置span生命周期通知的接收方
    pub fn with_span_sink(mut self, span_sink: Arc<dyn SpanSink>) -> Self {
        self.config.span_sink = Some(span_sink);
        self
    }
}

impl Default for PropagationLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for PropagationLayer {
    type Service = PropagationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PropagationService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// 追踪传播服务
#[derive(Clone)]
pub struct PropagationService<S> {
    inner: S,
    config: PropagationConfig,
}

impl<S> Service<Request> for PropagationService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = self.config.clone();

        // 从入站头部提取上下文；严格模式下损坏的头部直接拒绝请求
        let extracted = if config.strict {
            match config.propagator.try_extract(req.headers()) {
                Ok(context) => context,
                Err(error) => {
                    tracing::warn!(%error, "rejecting request with malformed trace headers");
                    return Box::pin(async move { Ok(StatusCode::BAD_REQUEST.into_response()) });
                }
            }
        } else {
            config.propagator.extract(req.headers())
        };

        // 派生请求作用域的上下文：有效的远端上下文派生子span，
        // 缺失则生成全新的本地上下文
        let context = derive_request_context(&extracted, config.generator.as_ref());

        // 提取请求信息用于span（在req被移动之前）
        let method = req.method().clone();
        let uri = req.uri().clone();
        let metadata = SpanMetadata {
            name: "request".to_string(),
            method: method.to_string(),
            target: uri.to_string(),
        };

        // 把作用域显式挂到请求扩展上，供处理器和出站层转发
        let scope = TraceScope::new(context.clone());
        req.extensions_mut().insert(scope);

        if let Some(sink) = &config.span_sink {
            sink.on_span_start(&context, &metadata);
        }
        let start = SystemTime::now();

        // 根据配置决定是否创建 span
        let span = if config.enable_span {
            tracing::info_span!(
                "request",
                trace_id = %context.trace_id(),
                method = %method,
                uri = %uri
            )
        } else {
            tracing::Span::none()
        };

        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = future.await?;

                // 根据配置决定是否回显trace ID响应头
                if config.enable_response_header {
                    if let Ok(header_value) = context.trace_id().to_string().parse() {
                        response
                            .headers_mut()
                            .insert(TRACE_ID_RESPONSE_HEADER, header_value);
                    }
                }

                if let Some(sink) = &config.span_sink {
                    sink.on_span_end(SpanRecord {
                        context: context.clone(),
                        metadata,
                        start,
                        end: SystemTime::now(),
                    });
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// 派生请求作用域的上下文
///
/// 有效的提取结果派生子span（共享trace ID，span ID重新生成）；
/// 空上下文则用生成器开启一条全新trace。
fn derive_request_context<G>(extracted: &TraceContext, generator: &G) -> TraceContext
where
    G: IdGenerator + ?Sized,
{
    if extracted.is_valid() {
        extracted.child(generator)
    } else {
        let (trace_id, span_id) = generator.new_ids();
        TraceContext::new(
            trace_id,
            span_id,
            TraceFlags::NONE,
            TraceState::empty(),
            false,
        )
    }
}

// -- TraceScope Extractor --

/// Axum 提取器，用于在 handler 函数签名中直接获取 `TraceScope`
///
/// # 示例
/// ```no_run
/// use axum::{routing::get, Router};
/// use trace_context::{PropagationLayer, TraceScope};
///
/// async fn my_handler(scope: TraceScope) -> String {
///     tracing::info!(trace_id = %scope.trace_id(), "Handler started");
///     format!("Hello! Your trace ID is: {}", scope.trace_id())
/// }
///
/// let app: Router = Router::new()
///     .route("/", get(my_handler))
///     .layer(PropagationLayer::new());
/// ```
impl<S> FromRequestParts<S> for TraceScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    /// 从请求扩展中读取中间件放入的作用域
    ///
    /// 如果中间件未安装，记录警告并生成一个新的本地上下文兜底，
    /// 因此这个提取器永远不会失败。
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(scope) = parts.extensions.get::<TraceScope>() {
            return Ok(scope.clone());
        }

        tracing::warn!(
            "TraceScope not found in request extensions. Generating a new local context. \
             This might indicate the PropagationLayer middleware is not installed."
        );
        let context = derive_request_context(&TraceContext::empty(), &*FALLBACK_GENERATOR);
        Ok(TraceScope::new(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{InMemoryExporter, SimpleSpanSink};
    use crate::TRACEPARENT_HEADER;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    const INBOUND_HEADER: &str = "00-d41c1b69fdcf0b087fc0cdf0df436689-07c3d2d11ca3dca5-00";

    async fn handler(scope: TraceScope) -> String {
        format!("{}:{}", scope.trace_id(), scope.span_id())
    }

    fn app(layer: PropagationLayer) -> Router {
        Router::new().route("/", get(handler)).layer(layer)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // --- 辅助函数测试 ---
    mod request_context {
        use super::*;

        #[test]
        fn test_derive_child_from_remote_context() {
            let generator = RandomIdGenerator::new();
            let remote = crate::parse_traceparent(INBOUND_HEADER).unwrap();

            let derived = derive_request_context(&remote, &generator);
            assert_eq!(derived.trace_id(), remote.trace_id());
            assert_ne!(derived.span_id(), remote.span_id());
            assert!(!derived.is_remote());
        }

        #[test]
        fn test_derive_fresh_context_when_empty() {
            let generator = RandomIdGenerator::new();
            let derived = derive_request_context(&TraceContext::empty(), &generator);

            assert!(derived.is_valid());
            assert!(!derived.is_remote());
        }
    }

    // --- 提取器测试 ---
    #[tokio::test]
    async fn test_scope_extractor_reads_extensions() {
        let (mut parts, _body) = Request::builder().uri("/test").body(()).unwrap().into_parts();
        let generator = RandomIdGenerator::new();
        let expected = derive_request_context(&TraceContext::empty(), &generator);
        parts.extensions.insert(TraceScope::new(expected.clone()));

        let scope = TraceScope::from_request_parts(&mut parts, &())
            .await
            .expect("TraceScope extraction should never fail");
        assert_eq!(scope.trace_id(), expected.trace_id());
    }

    #[tokio::test]
    async fn test_scope_extractor_fallback_without_middleware() {
        let (mut parts, _body) = Request::builder().uri("/test").body(()).unwrap().into_parts();

        let scope = TraceScope::from_request_parts(&mut parts, &())
            .await
            .expect("TraceScope extraction should never fail");
        // 兜底生成的本地上下文必须有效
        assert!(scope.is_active());
    }

    // --- 中间件/服务测试 ---
    mod layer_behavior {
        use super::*;

        #[tokio::test]
        async fn test_inbound_header_is_extracted_and_child_derived() {
            let app = app(PropagationLayer::new());
            let request = Request::builder()
                .uri("/")
                .header(TRACEPARENT_HEADER, INBOUND_HEADER)
                .body(Body::empty())
                .unwrap();

            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            // 响应头回显trace ID
            assert_eq!(
                response.headers().get(TRACE_ID_RESPONSE_HEADER).unwrap(),
                "d41c1b69fdcf0b087fc0cdf0df436689"
            );

            // 处理器看到同一条trace，但span ID是新派生的
            let body = body_string(response).await;
            let (trace_id, span_id) = body.split_once(':').unwrap();
            assert_eq!(trace_id, "d41c1b69fdcf0b087fc0cdf0df436689");
            assert_ne!(span_id, "07c3d2d11ca3dca5");
        }

        #[tokio::test]
        async fn test_missing_header_generates_fresh_context() {
            let app = app(PropagationLayer::new());
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();

            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let header_id = response
                .headers()
                .get(TRACE_ID_RESPONSE_HEADER)
                .unwrap()
                .to_str()
                .unwrap()
                .to_owned();
            assert_eq!(header_id.len(), 32);
            assert_ne!(header_id, "00000000000000000000000000000000");

            let body = body_string(response).await;
            assert!(body.starts_with(&header_id));
        }

        #[tokio::test]
        async fn test_malformed_header_degrades_by_default() {
            let app = app(PropagationLayer::new());
            let request = Request::builder()
                .uri("/")
                .header(TRACEPARENT_HEADER, "00-invalid-header-01")
                .body(Body::empty())
                .unwrap();

            // 默认宽松：损坏的头部不影响响应，生成新上下文
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let header_id = response
                .headers()
                .get(TRACE_ID_RESPONSE_HEADER)
                .unwrap()
                .to_str()
                .unwrap();
            assert_eq!(header_id.len(), 32);
        }

        #[tokio::test]
        async fn test_strict_mode_rejects_malformed_header() {
            let app = app(PropagationLayer::strict());
            let request = Request::builder()
                .uri("/")
                .header(TRACEPARENT_HEADER, "00-invalid-header-01")
                .body(Body::empty())
                .unwrap();

            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_strict_mode_accepts_missing_header() {
            let app = app(PropagationLayer::strict());
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();

            // 严格模式只拒绝"存在却损坏"的头部，缺失仍然正常
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn test_disable_response_header() {
            let config = PropagationConfig {
                enable_response_header: false,
                ..PropagationConfig::default()
            };
            let app = app(PropagationLayer::with_config(config));
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();

            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(TRACE_ID_RESPONSE_HEADER).is_none());
        }

        #[tokio::test]
        async fn test_span_sink_receives_record() {
            let exporter = InMemoryExporter::new();
            let layer = PropagationLayer::new()
                .with_span_sink(Arc::new(SimpleSpanSink::new(Arc::new(exporter.clone()))));
            let app = app(layer);

            let request = Request::builder()
                .uri("/")
                .header(TRACEPARENT_HEADER, INBOUND_HEADER)
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let spans = exporter.finished_spans();
            assert_eq!(spans.len(), 1);
            assert_eq!(
                spans[0].context.trace_id().to_string(),
                "d41c1b69fdcf0b087fc0cdf0df436689"
            );
            assert_eq!(spans[0].metadata.method, "GET");
            assert_eq!(spans[0].metadata.target, "/");
            assert!(spans[0].end >= spans[0].start);
        }
    }
}
