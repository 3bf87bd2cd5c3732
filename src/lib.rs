//! W3C TraceContext 传播引擎
//!
//! 解析入站 `traceparent` 头部、在缺失时生成新的trace/span ID、
//! 在单次请求处理期间携带追踪上下文、并在出站请求上序列化回线格式。
//! 核心功能与Web框架无关，并为Axum提供了开箱即用的中间件支持。
//!
//! ## Usage
//!
//! ### 基础用法：解析与注入 traceparent
//! ```
//! use std::collections::HashMap;
//! use trace_context::{Carrier, TraceContextPropagator, TRACEPARENT_HEADER};
//!
//! let propagator = TraceContextPropagator::new();
//!
//! let mut inbound: HashMap<String, String> = HashMap::new();
//! inbound.set(
//!     TRACEPARENT_HEADER,
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
//! );
//!
//! let context = propagator.extract(&inbound);
//! assert!(context.is_valid());
//! println!("trace ID: {}", context.trace_id());
//!
//! let mut outbound: HashMap<String, String> = HashMap::new();
//! propagator.inject(&context, &mut outbound);
//! ```
//!
//! ### Axum 集成（需要启用 axum feature）
//! ```ignore
//! use axum::{routing::get, Router};
//! use trace_context::{PropagationLayer, TraceScope};
//!
//! async fn handler(scope: TraceScope) -> String {
//!     // 直接在函数签名中获取当前请求的追踪作用域
//!     format!("Hello! Your trace ID is: {}", scope.trace_id())
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(PropagationLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod carrier;
mod error;
mod export;
mod generator;
mod propagation;
mod scope;
mod trace_context;

pub use carrier::Carrier;
pub use error::{ExportError, PropagationError};
pub use export::{
    InMemoryExporter, SimpleSpanSink, SpanExporter, SpanMetadata, SpanRecord, SpanSink,
};
pub use generator::{IdGenerator, RandomIdGenerator};
pub use propagation::{
    parse_traceparent, parse_tracestate, serialize_traceparent, TraceContextPropagator,
};
pub use scope::TraceScope;
pub use trace_context::{SpanId, TraceContext, TraceFlags, TraceId, TraceState};

/// 携带追踪上下文的HTTP头部字段名
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// 携带厂商状态的HTTP头部字段名
pub const TRACESTATE_HEADER: &str = "tracestate";

// -- axum feature --
#[cfg(feature = "axum")]
mod integrations;
#[cfg(feature = "axum")]
pub use integrations::axum::{PropagationConfig, PropagationLayer};
#[cfg(feature = "axum")]
pub use integrations::client::TraceClientLayer;
