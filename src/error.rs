//! 传播核心的错误分类
//!
//! 头部解析失败是局部的、非致命的：宽松提取会降级为空上下文，
//! 只有调用方显式选择严格模式时才会将错误向上传递。
//! `GeneratorFault` 是唯一的致命错误。

use thiserror::Error;

/// `traceparent` 解析与ID生成的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PropagationError {
    /// 违反 traceparent 文法结构：字段长度、分隔符数量或字符集不正确
    #[error("malformed traceparent header")]
    MalformedHeader,

    /// 版本字节超出允许范围（255为保留值）
    #[error("unsupported traceparent version")]
    UnsupportedVersion,

    /// trace ID 字段解码后为全零
    #[error("invalid trace id: all zero")]
    InvalidTraceId,

    /// span ID 字段解码后为全零
    #[error("invalid span id: all zero")]
    InvalidSpanId,

    /// 随机源违反了非零ID契约，属于致命缺陷
    #[error("id generator returned an all-zero identifier")]
    GeneratorFault,
}

/// span导出协作方接口的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// 导出器已关闭，不再接受span
    #[error("span exporter already shut down")]
    Shutdown,

    /// 导出操作失败
    #[error("span export failed: {0}")]
    Failed(String),
}
