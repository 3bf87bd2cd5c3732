//! W3C TraceContext 核心数据模型
//!
//! 定义 `TraceId`、`SpanId`、`TraceFlags`、`TraceState` 和不可变的
//! `TraceContext` 值对象。所有标识符都是定宽字节数组，全零视为无效。

use std::fmt;

use crate::generator::IdGenerator;

/// trace-flags 中已定义的采样位
const FLAG_SAMPLED: u8 = 0x01;

/// `tracestate` 允许的最大厂商条目数（W3C 规范上限）
const MAX_TRACE_STATE_ENTRIES: usize = 32;

/// 字节级小写十六进制校验
///
/// 使用字节比较避免Unicode处理开销
#[inline]
pub(crate) fn is_lower_hex(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|&b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 16字节的追踪ID
///
/// 同一条逻辑请求链上的所有span共享一个trace ID。
/// 全零值表示"无效/缺失"。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// 无效（全零）的追踪ID
    pub const INVALID: TraceId = TraceId([0; 16]);

    /// 从16字节数组创建追踪ID
    #[inline]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// 从32字符小写十六进制字符串创建追踪ID，并进行校验
    ///
    /// # 校验规则（符合 W3C TraceContext 规范）
    /// - 长度必须是 32 个字符
    /// - 只能包含小写十六进制字符（0-9, a-f）
    /// - 不能全为零
    #[inline]
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !is_lower_hex(hex.as_bytes()) {
            return None;
        }

        let value = u128::from_str_radix(hex, 16).ok()?;
        let id = Self(value.to_be_bytes());
        if !id.is_valid() {
            return None;
        }

        Some(id)
    }

    /// 获取底层字节数组
    #[inline]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// 是否为有效（非全零）的追踪ID
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != [0; 16]
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

/// 8字节的span ID
///
/// 标识一条trace内的一个工作单元。全零值表示"无效/缺失"。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// 无效（全零）的span ID
    pub const INVALID: SpanId = SpanId([0; 8]);

    /// 从8字节数组创建span ID
    #[inline]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// 从16字符小写十六进制字符串创建span ID，并进行校验
    #[inline]
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 16 || !is_lower_hex(hex.as_bytes()) {
            return None;
        }

        let value = u64::from_str_radix(hex, 16).ok()?;
        let id = Self(value.to_be_bytes());
        if !id.is_valid() {
            return None;
        }

        Some(id)
    }

    /// 获取底层字节数组
    #[inline]
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    /// 是否为有效（非全零）的span ID
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != [0; 8]
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", u64::from_be_bytes(self.0))
    }
}

/// trace-flags 字节
///
/// 本库只解释采样位（0x01），解析时其余位会被屏蔽。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// 未设置任何标志
    pub const NONE: TraceFlags = TraceFlags(0);
    /// 采样位
    pub const SAMPLED: TraceFlags = TraceFlags(FLAG_SAMPLED);

    /// 从原始字节创建标志位
    #[inline]
    pub const fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// 屏蔽到仅保留采样位
    #[inline]
    pub(crate) const fn masked(self) -> Self {
        Self(self.0 & FLAG_SAMPLED)
    }

    /// 采样位是否被设置
    #[inline]
    pub const fn sampled(&self) -> bool {
        self.0 & FLAG_SAMPLED != 0
    }

    /// 获取原始字节值
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// `tracestate` 头部携带的有序厂商键值对
///
/// 对本库而言内容完全不透明，仅做存储和转发。解析是宽松的：
/// 一个无效的 `tracestate` 永远不会使有效的 `traceparent` 失效，
/// 调用方应将解析失败降级为空状态。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// 空的厂商状态
    #[inline]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// 解析 `tracestate` 头部值
    ///
    /// 条目以逗号分隔，每个条目是 `key=value`。空白条目会被跳过，
    /// 但任何一个格式非法的条目（或超过32个条目）都会导致整体解析失败。
    pub fn parse(header: &str) -> Option<Self> {
        let mut entries = Vec::new();

        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }

            let (key, value) = member.split_once('=')?;
            if !Self::is_valid_key(key) || !Self::is_valid_value(value) {
                return None;
            }

            entries.push((key.to_string(), value.to_string()));
            if entries.len() > MAX_TRACE_STATE_ENTRIES {
                return None;
            }
        }

        Some(Self(entries))
    }

    /// 厂商key校验：小写字母或数字开头，仅允许 a-z 0-9 _ - * / @
    fn is_valid_key(key: &str) -> bool {
        let bytes = key.as_bytes();
        match bytes.first() {
            Some(b'a'..=b'z') | Some(b'0'..=b'9') => {}
            _ => return false,
        }
        bytes
            .iter()
            .all(|&b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'*' | b'/' | b'@'))
    }

    /// 厂商value校验：非空可见ASCII，不含逗号和等号
    fn is_valid_value(value: &str) -> bool {
        !value.is_empty()
            && value
                .bytes()
                .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// 序列化为 `tracestate` 头部值，保持条目顺序不变
    pub fn header(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// 按key查找厂商条目
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 是否没有任何厂商条目
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 厂商条目数量
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// 不可变的追踪上下文
///
/// 由解析入站carrier（`remote = true`）或本地ID生成器（`remote = false`）
/// 创建，生命周期覆盖一次逻辑请求处理。上下文一经构造不可变更，
/// 任何变化都通过派生一个替代值来表达。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    version: u8,
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    trace_state: TraceState,
    remote: bool,
}

impl TraceContext {
    /// 创建本地（version 0）追踪上下文
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        trace_state: TraceState,
        remote: bool,
    ) -> Self {
        Self {
            version: 0,
            trace_id,
            span_id,
            trace_flags,
            trace_state,
            remote,
        }
    }

    /// 创建携带入站版本号的追踪上下文（解析器内部使用）
    pub(crate) fn with_version(
        version: u8,
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        trace_state: TraceState,
        remote: bool,
    ) -> Self {
        Self {
            version,
            trace_id,
            span_id,
            trace_flags,
            trace_state,
            remote,
        }
    }

    /// 空上下文（全零ID，无效）
    ///
    /// 表示"没有追踪元数据"这一正常情况，而不是错误。
    pub fn empty() -> Self {
        Self {
            version: 0,
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            trace_flags: TraceFlags::NONE,
            trace_state: TraceState::empty(),
            remote: false,
        }
    }

    /// trace ID 和 span ID 是否都有效（非全零）
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// 入站版本字节
    #[inline]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// 追踪ID
    #[inline]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// span ID
    #[inline]
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// trace-flags
    #[inline]
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// 厂商状态
    #[inline]
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// 是否源自入站carrier
    #[inline]
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// 采样位是否被设置
    #[inline]
    pub fn sampled(&self) -> bool {
        self.trace_flags.sampled()
    }

    /// 替换厂商状态，返回新值（解析器内部使用）
    pub(crate) fn with_trace_state(mut self, trace_state: TraceState) -> Self {
        self.trace_state = trace_state;
        self
    }

    /// 派生子span的上下文
    ///
    /// 共享trace ID，span ID由生成器重新生成，flags和厂商状态原样继承，
    /// `remote` 重置为 false。原上下文保持不变。
    pub fn child<G>(&self, generator: &G) -> Self
    where
        G: IdGenerator + ?Sized,
    {
        Self {
            version: 0,
            trace_id: self.trace_id,
            span_id: generator.new_span_id(&self.trace_id),
            trace_flags: self.trace_flags,
            trace_state: self.trace_state.clone(),
            remote: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{IdGenerator as _, RandomIdGenerator};

    #[test]
    fn test_trace_id_from_hex() {
        let valid_id = "0af7651916cd43dd8448eb211c80319c";
        let trace_id = TraceId::from_hex(valid_id).unwrap();
        assert_eq!(trace_id.to_string(), valid_id);

        // Invalid case: 长度不正确
        assert_eq!(TraceId::from_hex("short"), None);
        assert_eq!(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319"),
            None,
            "31个字符应被拒绝"
        );
        assert_eq!(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319ca"),
            None,
            "33个字符应被拒绝"
        );

        // Invalid case: 包含大写字符
        assert_eq!(TraceId::from_hex("0AF7651916CD43DD8448EB211C80319C"), None);

        // Invalid case: 包含非十六进制字符
        assert_eq!(TraceId::from_hex("0af7651916cd43dd8448eb211c80319g"), None);

        // Invalid case: 全为零
        assert_eq!(TraceId::from_hex("00000000000000000000000000000000"), None);
    }

    #[test]
    fn test_span_id_from_hex() {
        let span_id = SpanId::from_hex("00f067aa0ba902b7").unwrap();
        assert_eq!(span_id.to_string(), "00f067aa0ba902b7");
        assert_eq!(
            span_id.to_bytes(),
            [0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7]
        );

        assert_eq!(SpanId::from_hex("00f067aa0ba902b"), None);
        assert_eq!(SpanId::from_hex("00f067aa0ba902b7a"), None);
        assert_eq!(SpanId::from_hex("0000000000000000"), None);
        assert_eq!(SpanId::from_hex("00F067AA0BA902B7"), None);
    }

    #[test]
    fn test_display_preserves_leading_zeros() {
        let trace_id = TraceId::from_hex("000000000000000000000000000000ab").unwrap();
        assert_eq!(trace_id.to_string(), "000000000000000000000000000000ab");

        let span_id = SpanId::from_hex("00000000000000cd").unwrap();
        assert_eq!(span_id.to_string(), "00000000000000cd");
    }

    #[test]
    fn test_trace_flags() {
        assert!(TraceFlags::SAMPLED.sampled());
        assert!(!TraceFlags::NONE.sampled());

        // 屏蔽后仅保留采样位
        assert_eq!(TraceFlags::new(0xff).masked(), TraceFlags::SAMPLED);
        assert_eq!(TraceFlags::new(0x02).masked(), TraceFlags::NONE);
        assert_eq!(format!("{}", TraceFlags::SAMPLED), "01");
    }

    #[test]
    fn test_trace_state_parse_and_header() {
        let state = TraceState::parse("vendor1=value1,vendor2=value2").unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("vendor1"), Some("value1"));
        assert_eq!(state.get("vendor3"), None);

        // 序列化保持顺序不变
        assert_eq!(state.header(), "vendor1=value1,vendor2=value2");
    }

    #[test]
    fn test_trace_state_rejects_malformed() {
        assert!(TraceState::parse("no-equals-sign").is_none());
        assert!(TraceState::parse("=value").is_none());
        assert!(TraceState::parse("UPPER=value").is_none());
        assert!(TraceState::parse("key=").is_none());
        assert!(TraceState::parse("key=val,ok=1,bad").is_none());
    }

    #[test]
    fn test_trace_state_skips_empty_members() {
        let state = TraceState::parse("foo=bar, ,baz=qux,").unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.header(), "foo=bar,baz=qux");
    }

    #[test]
    fn test_trace_state_entry_limit() {
        let many = (0..33)
            .map(|i| format!("k{i}=v"))
            .collect::<Vec<_>>()
            .join(",");
        assert!(TraceState::parse(&many).is_none());
    }

    #[test]
    fn test_empty_context_is_invalid() {
        let ctx = TraceContext::empty();
        assert!(!ctx.is_valid());
        assert!(!ctx.is_remote());
        assert!(!ctx.sampled());
        assert!(ctx.trace_state().is_empty());
    }

    #[test]
    fn test_child_derivation() {
        let generator = RandomIdGenerator::new();
        let (trace_id, span_id) = generator.new_ids();
        let state = TraceState::parse("foo=bar").unwrap();
        let parent = TraceContext::new(trace_id, span_id, TraceFlags::SAMPLED, state, true);

        let child = parent.child(&generator);

        // 子上下文共享trace ID，span ID重新生成，remote重置
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());
        assert!(child.span_id().is_valid());
        assert!(child.sampled());
        assert_eq!(child.trace_state(), parent.trace_state());
        assert!(!child.is_remote());

        // 原上下文保持不变
        assert!(parent.is_remote());
        assert_eq!(parent.span_id(), span_id);
    }
}
