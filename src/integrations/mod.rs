//! Web框架集成
//!
//! 服务端中间件和客户端出站层都建立在 `Carrier` 能力之上，
//! 这里为 `http::HeaderMap` 提供该能力的适配。

pub mod axum;
pub mod client;

use ::axum::http::header::{HeaderName, HeaderValue};
use ::axum::http::HeaderMap;

use crate::carrier::Carrier;

/// HTTP头部表作为carrier
///
/// 非UTF-8的头部值视为不存在；无法编码为合法头部的键值对
/// 会被丢弃并记录日志，而不是使请求失败。
impl Carrier for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!(key, "dropping header with invalid name");
                return;
            }
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(_) => {
                tracing::warn!(key, "dropping header with invalid value");
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        HeaderMap::keys(self)
            .map(|name| name.as_str().to_string())
            .collect()
    }
}
