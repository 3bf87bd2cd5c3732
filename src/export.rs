//! span生命周期协作方接口
//!
//! 传播核心只通过这里的窄接口通知被排除在外的导出流水线：
//! span开始/结束时调用 `SpanSink`，批量落盘由 `SpanExporter` 负责。
//! 核心从不阻塞等待sink完成，sink的失败也从不向上传播。

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::ExportError;
use crate::trace_context::TraceContext;

/// span的描述性元数据
///
/// 中间件用请求的方法和目标填充它，用于导出和日志关联。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanMetadata {
    /// span名称，例如 "request"
    pub name: String,
    /// HTTP方法
    pub method: String,
    /// 请求目标（URI）
    pub target: String,
}

/// 一个已结束span的完整记录
#[derive(Debug, Clone)]
pub struct SpanRecord {
    /// span所属的追踪上下文
    pub context: TraceContext,
    /// span元数据
    pub metadata: SpanMetadata,
    /// 开始时间
    pub start: SystemTime,
    /// 结束时间
    pub end: SystemTime,
}

/// span生命周期通知的接收方
pub trait SpanSink: Send + Sync {
    /// span开始时调用，核心不等待其完成
    fn on_span_start(&self, context: &TraceContext, metadata: &SpanMetadata);

    /// span结束时调用，携带完整记录
    fn on_span_end(&self, record: SpanRecord);
}

/// span批量导出的接收方
///
/// 由导出流水线调用，传播核心不直接使用。
pub trait SpanExporter: Send + Sync {
    /// 导出一批span记录
    fn export_spans(&self, records: Vec<SpanRecord>) -> Result<(), ExportError>;

    /// 关闭导出器，之后的导出调用应失败
    fn shutdown(&self) -> Result<(), ExportError>;
}

/// 将每个结束的span立即转发给导出器的sink
///
/// 导出失败只记录日志，绝不影响请求处理。
pub struct SimpleSpanSink {
    exporter: Arc<dyn SpanExporter>,
}

impl SimpleSpanSink {
    /// 用给定导出器创建sink
    pub fn new(exporter: Arc<dyn SpanExporter>) -> Self {
        Self { exporter }
    }
}

impl SpanSink for SimpleSpanSink {
    fn on_span_start(&self, context: &TraceContext, metadata: &SpanMetadata) {
        tracing::trace!(
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
            name = %metadata.name,
            "span started"
        );
    }

    fn on_span_end(&self, record: SpanRecord) {
        if let Err(error) = self.exporter.export_spans(vec![record]) {
            tracing::warn!(%error, "span export failed");
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    spans: Vec<SpanRecord>,
    shut_down: bool,
}

/// 内存导出器，测试专用
///
/// 记录所有导出的span供断言读取；克隆共享同一份存储。
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryExporter {
    /// 创建空的内存导出器
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取已导出span记录的快照
    pub fn finished_spans(&self) -> Vec<SpanRecord> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .spans
            .clone()
    }

    /// 清空已记录的span
    pub fn reset(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .spans
            .clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export_spans(&self, records: Vec<SpanRecord>) -> Result<(), ExportError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.shut_down {
            return Err(ExportError::Shutdown);
        }
        state.spans.extend(records);
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ExportError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.shut_down = true;
        Ok(())
    }
}
