//! Carrier能力抽象
//!
//! 对"可读写的字符串键值头部存储"的最小化抽象。编解码器和传播器
//! 只依赖这个能力，从不依赖具体的传输类型；任何能按HTTP头部方式
//! 读写键值对的类型都可以实现它。

use std::collections::HashMap;

/// 头部式键值存储的读写能力
///
/// 只有三个操作：按键读取、按键写入、列出所有键。
/// `keys` 的顺序对正确性没有意义，但在单次调用内必须是确定的，
/// 以便测试。
pub trait Carrier {
    /// 读取指定键的值，不存在时返回 `None`
    fn get(&self, key: &str) -> Option<&str>;

    /// 写入键值对，覆盖已有条目
    fn set(&mut self, key: &str, value: String);

    /// 列出当前存储的所有键
    fn keys(&self) -> Vec<String>;
}

/// 普通哈希表作为carrier，主要用于测试和非HTTP场景
impl Carrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(|v| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = HashMap::keys(self).cloned().collect();
        // 哈希表本身无序，排序保证单次调用内的确定性
        keys.sort();
        keys
    }
}
