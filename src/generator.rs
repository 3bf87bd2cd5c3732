//! 追踪ID与span ID的随机生成器
//!
//! 生成器在进程内共享一个伪随机源，该随机源在构造时用操作系统的
//! 安全熵源播种一次，之后的每次调用只在互斥锁内完成定长字节填充，
//! 因此并发调用不会观察到同一个未序列化的流状态，也不会长时间阻塞。

use std::process;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::PropagationError;
use crate::trace_context::{SpanId, TraceId};

/// 非零随机ID的生成契约
///
/// 两个方法都必须返回密码学播种的伪随机非零值。返回全零值属于
/// 生成器自身的缺陷，调用方会快速失败而不是静默重试。
pub trait IdGenerator: Send + Sync {
    /// 生成一对新的 (trace ID, span ID)，用于开启一条新trace
    fn new_ids(&self) -> (TraceId, SpanId);

    /// 为已存在的trace生成新的span ID
    fn new_span_id(&self, trace_id: &TraceId) -> SpanId;
}

/// 基于 `StdRng` 的默认ID生成器
///
/// 随机源由互斥锁保护，锁只在填充定长缓冲区期间持有。
pub struct RandomIdGenerator {
    rng: Mutex<StdRng>,
}

impl RandomIdGenerator {
    /// 创建新的生成器并完成一次性播种
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(seeded_rng()),
        }
    }

    /// 在锁内填充定长缓冲区
    fn fill(&self, buf: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.fill_bytes(buf);
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_ids(&self) -> (TraceId, SpanId) {
        let mut trace_bytes = [0u8; 16];
        let mut span_bytes = [0u8; 8];
        {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.fill_bytes(&mut trace_bytes);
            rng.fill_bytes(&mut span_bytes);
        }

        let trace_id = TraceId::from_bytes(trace_bytes);
        let span_id = SpanId::from_bytes(span_bytes);
        if !trace_id.is_valid() || !span_id.is_valid() {
            panic!("{}", PropagationError::GeneratorFault);
        }

        (trace_id, span_id)
    }

    fn new_span_id(&self, _trace_id: &TraceId) -> SpanId {
        let mut span_bytes = [0u8; 8];
        self.fill(&mut span_bytes);

        let span_id = SpanId::from_bytes(span_bytes);
        if !span_id.is_valid() {
            panic!("{}", PropagationError::GeneratorFault);
        }

        span_id
    }
}

/// 构造播种完成的随机源
///
/// 优先使用操作系统熵源。仅当安全熵源不可用时，才退回到
/// 时间戳+进程ID的种子，避免同一时钟滴答内创建的两个生成器
/// 产生相关序列。
fn seeded_rng() -> StdRng {
    match StdRng::from_rng(OsRng) {
        Ok(rng) => rng,
        Err(err) => {
            tracing::warn!(
                error = %err,
                "OS entropy source unavailable, falling back to time-based seed"
            );
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let seed = (nanos as u64) ^ ((nanos >> 64) as u64) ^ u64::from(process::id());
            StdRng::seed_from_u64(seed)
        }
    }
}
