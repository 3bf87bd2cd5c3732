//! `traceparent` 线格式编解码与传播器
//!
//! 线格式：`VV-TTTT...TTTT-SSSS...SSSS-FF`，全部为小写十六进制。
//! version 0 必须严格是4个字段；更高版本允许携带 `-...` 后缀，
//! 解析时忽略而不是拒绝。
//!
//! 示例：`00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`

use crate::carrier::Carrier;
use crate::error::PropagationError;
use crate::trace_context::{is_lower_hex, SpanId, TraceContext, TraceFlags, TraceId, TraceState};
use crate::{TRACEPARENT_HEADER, TRACESTATE_HEADER};

/// 序列化时写出的版本字节：本编解码器实现的版本
const SUPPORTED_VERSION: u8 = 0;

/// 允许的最大入站版本，255为保留值
const MAX_VERSION: u8 = 254;

/// 解析 `traceparent` 头部值
///
/// 按固定顺序校验：先做结构匹配（字段数量、各段长度、小写十六进制
/// 字符集），再校验版本字节，最后解码各字段并检查全零ID。
/// 解析结果的 `remote` 标记为 true，厂商状态为空，由调用方单独补充。
pub fn parse_traceparent(header: &str) -> Result<TraceContext, PropagationError> {
    let header = header.trim();
    let parts: Vec<&str> = header.split_terminator('-').collect();
    if parts.len() < 4 {
        return Err(PropagationError::MalformedHeader);
    }

    let (version_field, trace_id_field, span_id_field, flags_field) =
        (parts[0], parts[1], parts[2], parts[3]);

    // 结构匹配：各段定长、小写十六进制
    if version_field.len() != 2
        || trace_id_field.len() != 32
        || span_id_field.len() != 16
        || flags_field.len() != 2
        || !is_lower_hex(version_field.as_bytes())
        || !is_lower_hex(trace_id_field.as_bytes())
        || !is_lower_hex(span_id_field.as_bytes())
        || !is_lower_hex(flags_field.as_bytes())
    {
        return Err(PropagationError::MalformedHeader);
    }

    let version =
        u8::from_str_radix(version_field, 16).map_err(|_| PropagationError::MalformedHeader)?;
    if version > MAX_VERSION {
        return Err(PropagationError::UnsupportedVersion);
    }
    // version 0 必须严格是4个字段，不允许厂商后缀
    if version == 0 && parts.len() != 4 {
        return Err(PropagationError::MalformedHeader);
    }

    let trace_value =
        u128::from_str_radix(trace_id_field, 16).map_err(|_| PropagationError::MalformedHeader)?;
    let trace_id = TraceId::from_bytes(trace_value.to_be_bytes());
    if !trace_id.is_valid() {
        return Err(PropagationError::InvalidTraceId);
    }

    let span_value =
        u64::from_str_radix(span_id_field, 16).map_err(|_| PropagationError::MalformedHeader)?;
    let span_id = SpanId::from_bytes(span_value.to_be_bytes());
    if !span_id.is_valid() {
        return Err(PropagationError::InvalidSpanId);
    }

    let flags =
        u8::from_str_radix(flags_field, 16).map_err(|_| PropagationError::MalformedHeader)?;
    // version 0 只定义了采样位，更高位被设置视为结构违规
    if version == 0 && flags > 2 {
        return Err(PropagationError::MalformedHeader);
    }

    Ok(TraceContext::with_version(
        version,
        trace_id,
        span_id,
        TraceFlags::new(flags).masked(),
        TraceState::empty(),
        true,
    ))
}

/// 宽松解析 `tracestate` 头部值
///
/// 任何解析失败都会被吞掉（仅记录日志），返回空状态；
/// 一个损坏的 `tracestate` 永远不会使有效的 `traceparent` 失效。
pub fn parse_tracestate(header: &str) -> TraceState {
    match TraceState::parse(header) {
        Some(state) => state,
        None => {
            tracing::debug!(header, "discarding malformed tracestate header");
            TraceState::empty()
        }
    }
}

/// 序列化为 `traceparent` 头部值
///
/// 版本固定渲染为本编解码器实现的 `00`，flags屏蔽到采样位，
/// 全部输出为小写十六进制。
pub fn serialize_traceparent(context: &TraceContext) -> String {
    format!(
        "{:02x}-{}-{}-{:02x}",
        SUPPORTED_VERSION,
        context.trace_id(),
        context.span_id(),
        context.trace_flags().masked().to_u8()
    )
}

/// W3C TraceContext 传播器
///
/// 组合 `traceparent` 编解码和不透明的 `tracestate` 透传，
/// 负责 Extract（carrier → 上下文）和 Inject（上下文 → carrier）。
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// 创建新的传播器
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// 本传播器读写的头部字段名
    pub fn fields(&self) -> [&'static str; 2] {
        [TRACEPARENT_HEADER, TRACESTATE_HEADER]
    }

    /// 宽松提取：carrier → 上下文
    ///
    /// 头部缺失或损坏都返回空上下文，从不报错——缺少追踪元数据
    /// 是正常情况，只会降低关联性，不影响请求处理。
    pub fn extract<C>(&self, carrier: &C) -> TraceContext
    where
        C: Carrier + ?Sized,
    {
        match self.try_extract(carrier) {
            Ok(context) => context,
            Err(error) => {
                tracing::debug!(%error, "discarding malformed traceparent header");
                TraceContext::empty()
            }
        }
    }

    /// 严格提取：carrier → 上下文
    ///
    /// 头部缺失仍返回空上下文，但"存在却损坏"的头部会将解析错误
    /// 向上传递，供选择了严格校验的调用方拒绝请求。
    pub fn try_extract<C>(&self, carrier: &C) -> Result<TraceContext, PropagationError>
    where
        C: Carrier + ?Sized,
    {
        let header = match carrier.get(TRACEPARENT_HEADER) {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Ok(TraceContext::empty()),
        };

        let context = parse_traceparent(header)?;

        let trace_state = carrier
            .get(TRACESTATE_HEADER)
            .map(parse_tracestate)
            .unwrap_or_default();

        Ok(context.with_trace_state(trace_state))
    }

    /// 注入：上下文 → carrier
    ///
    /// 无效上下文不写任何头部。写入会覆盖已有条目，且是幂等的：
    /// 同一上下文注入两次，carrier内容不变。
    pub fn inject<C>(&self, context: &TraceContext, carrier: &mut C)
    where
        C: Carrier + ?Sized,
    {
        if !context.is_valid() {
            return;
        }

        carrier.set(TRACEPARENT_HEADER, serialize_traceparent(context));

        let trace_state = context.trace_state();
        if !trace_state.is_empty() {
            carrier.set(TRACESTATE_HEADER, trace_state.header());
        }
    }
}
