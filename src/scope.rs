//! 请求作用域的追踪上下文
//!
//! `TraceScope` 是一个不透明、可克隆的值，携带当前请求的
//! `TraceContext`。每个请求处理调用显式接收并向下转发它，
//! 没有任何隐式的全局或任务本地查找：这让取消和测试都变得直接。
//!
//! 作用域内的上下文是只读的——需要变化时通过 `child` 派生一个
//! 替代作用域，而不是就地修改。

use std::sync::Arc;

use crate::generator::IdGenerator;
use crate::trace_context::{SpanId, TraceContext, TraceId};

/// 携带活动追踪上下文的请求作用域
///
/// 克隆是廉价的（内部为 `Arc`），所有克隆共享同一个不可变上下文。
#[derive(Clone, Debug)]
pub struct TraceScope {
    context: Arc<TraceContext>,
}

impl TraceScope {
    /// 用给定上下文创建作用域
    pub fn new(context: TraceContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// 读取活动的追踪上下文
    #[inline]
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// 当前trace ID，可随时用于日志关联
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.context.trace_id()
    }

    /// 当前span ID
    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.context.span_id()
    }

    /// 作用域内是否存在有效上下文
    #[inline]
    pub fn is_active(&self) -> bool {
        self.context.is_valid()
    }

    /// 派生携带子span上下文的替代作用域
    ///
    /// 原作用域保持不变，调用方自行决定向下转发哪一个。
    pub fn child<G>(&self, generator: &G) -> Self
    where
        G: IdGenerator + ?Sized,
    {
        Self::new(self.context.child(generator))
    }
}

impl From<TraceContext> for TraceScope {
    fn from(context: TraceContext) -> Self {
        Self::new(context)
    }
}
