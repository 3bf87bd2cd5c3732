//! 出站请求的追踪注入层
//!
//! 客户端适配器：包装任意tower出站服务，在发送前把调用方显式
//! 转发的 `TraceScope` 中的追踪标识注入到出站请求头部。
//! 没有作用域时请求原样发送——客户端从不凭空发明上下文，
//! 那是服务端收到请求时的职责。

use crate::propagation::TraceContextPropagator;
use crate::scope::TraceScope;
use axum::http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// 出站追踪注入层
///
/// 调用方通过 `req.extensions_mut().insert(scope)` 把当前请求的
/// 作用域挂到出站请求上，本层负责其余工作。
#[derive(Clone, Debug, Default)]
pub struct TraceClientLayer {
    propagator: TraceContextPropagator,
}

impl TraceClientLayer {
    /// 创建新的出站注入层
    pub fn new() -> Self {
        Self {
            propagator: TraceContextPropagator::new(),
        }
    }

    /// 使用指定传播器创建出站注入层
    pub fn with_propagator(propagator: TraceContextPropagator) -> Self {
        Self { propagator }
    }
}

impl<S> Layer<S> for TraceClientLayer {
    type Service = TraceClientService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceClientService {
            inner,
            propagator: self.propagator.clone(),
        }
    }
}

/// 出站追踪注入服务
#[derive(Clone, Debug)]
pub struct TraceClientService<S> {
    inner: S,
    propagator: TraceContextPropagator,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TraceClientService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // 读取调用方转发的作用域；注入会覆盖同名头部且幂等
        let context = req
            .extensions()
            .get::<TraceScope>()
            .map(|scope| scope.context().clone());

        if let Some(context) = context {
            if context.is_valid() {
                self.propagator.inject(&context, req.headers_mut());
            }
        }

        self.inner.call(req)
    }
}
