//! 内存键值配置与三层合并规则。
//!
//! ## 设计目标（Why）
//! - 服务记录的 `location`、`metadata` 与调用方配置都是“字符串键 → JSON 值”的映射，
//!   统一为 [`Config`] 后，资源类型只需面向一种结构做字段校验；
//! - 合并顺序对所有资源类型一致：元数据 < 位置信息 < 调用方配置，保证相同输入在不同
//!   资源类型下得到相同的合并结果。
//!
//! ## 契约说明（What）
//! - 合并为浅合并：右侧同名键整体覆盖左侧，不做嵌套对象的递归合并；
//! - 值为 `null` 的键在读取时视为缺失；
//! - `shared` 键默认 `false`，非布尔值视为非法。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 运行时与内置资源类型识别的配置键。
pub mod keys {
    /// 是否启用跨引用的客户端共享。
    pub const SHARED: &str = "shared";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const SSL: &str = "ssl";
    /// HTTP 端点的根路径。
    pub const ROOT: &str = "root";
    /// HTTP 端点的完整地址，由 [`crate::types::http::HttpLocation`] 写入记录。
    pub const ENDPOINT: &str = "endpoint";
    pub const URL: &str = "url";
    /// `url` 的别名，兼容以驼峰命名发布 JDBC 地址的注册中心。
    pub const JDBC_URL: &str = "jdbcUrl";
    pub const DRIVER_CLASS: &str = "driver_class";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    pub const MAX_POOL_SIZE: &str = "max_pool_size";
    /// gRPC `:authority` 覆盖值。
    pub const AUTHORITY: &str = "authority";
}

/// 字段读取失败的原因。
///
/// 资源类型通常将其转换为 [`crate::DiscoveryError::InvalidRecord`]。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing required field `{key}`")]
    Missing { key: String },
    #[error("field `{key}` must be {expected}, found {found}")]
    Invalid {
        key: String,
        expected: &'static str,
        found: String,
    },
}

impl FieldError {
    fn invalid(key: &str, expected: &'static str, found: &Value) -> Self {
        FieldError::Invalid {
            key: key.to_owned(),
            expected,
            found: found.to_string(),
        }
    }
}

/// 有序的键值配置映射。
///
/// # 教案式说明
/// - **意图 (Why)**：记录位置信息、记录元数据与调用方配置共享同一结构，便于合并与校验；
/// - **逻辑 (How)**：内部使用 `BTreeMap` 保持键有序，使 [`Config::canonical`] 的输出确定，
///   从而可以直接作为共享客户端身份键的组成部分；
/// - **契约 (What)**：序列化形态即 JSON 对象，与注册中心交换记录时无需额外转换。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    entries: BTreeMap<String, Value>,
}

impl Config {
    /// 创建空配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder 风格追加一项。
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入或覆盖一项，返回旧值。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// 读取原始值；`null` 视为缺失。
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).filter(|value| !value.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// 读取必填字符串字段。
    pub fn require_str(&self, key: &str) -> Result<&str, FieldError> {
        self.optional_str(key)?.ok_or_else(|| FieldError::Missing {
            key: key.to_owned(),
        })
    }

    /// 读取可选字符串字段；存在但不是字符串时报错。
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.as_str())),
            Some(other) => Err(FieldError::invalid(key, "a string", other)),
        }
    }

    /// 读取可选布尔字段；存在但不是布尔值时报错。
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(other) => Err(FieldError::invalid(key, "a boolean", other)),
        }
    }

    /// 读取可选非负整数字段。
    pub fn optional_u64(&self, key: &str) -> Result<Option<u64>, FieldError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| FieldError::invalid(key, "a non-negative integer", value)),
        }
    }

    /// 读取必填端口号，取值范围 `1..=65535`。
    pub fn require_port(&self, key: &str) -> Result<u16, FieldError> {
        let value = self.get(key).ok_or_else(|| FieldError::Missing {
            key: key.to_owned(),
        })?;
        value
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port != 0)
            .ok_or_else(|| FieldError::invalid(key, "a port in 1..=65535", value))
    }

    /// 读取 `shared` 标记，缺省为 `false`。
    pub fn shared_flag(&self) -> Result<bool, FieldError> {
        Ok(self.optional_bool(keys::SHARED)?.unwrap_or(false))
    }

    /// 浅合并：`other` 中的同名键覆盖当前值。
    pub fn merge_in(&mut self, other: &Config) {
        self.entries.extend(
            other
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
    }

    /// 仅保留给定键，缺失的键被忽略。
    pub fn project(&self, keys: &[&str]) -> Config {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| ((*key).to_owned(), value.clone())))
            .collect()
    }

    /// 确定性的紧凑 JSON 文本，键按字典序排列。
    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }

    /// 转换为 JSON 对象。
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Config
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl From<Map<String, Value>> for Config {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl TryFrom<Value> for Config {
    type Error = FieldError;

    /// 仅接受 JSON 对象。
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(FieldError::invalid("<root>", "a JSON object", &other)),
        }
    }
}

/// 按固定优先级合并三层配置。
///
/// # 教案式说明
/// - **意图 (Why)**：所有资源类型共享同一合并策略，避免同一记录在不同类型下语义漂移；
/// - **逻辑 (How)**：以 `metadata` 为底，依次被 `location`、`caller` 覆盖；
/// - **契约 (What)**：
///   - 输入 `metadata = {host:"a", port:1}`、`location = {host:"b"}`、`caller = {port:2}`，
///     输出 `{host:"b", port:2}`；
///   - 三个输入均不被修改，返回新的 [`Config`]。
pub fn merge(metadata: &Config, location: &Config, caller: &Config) -> Config {
    let mut merged = metadata.clone();
    merged.merge_in(location);
    merged.merge_in(caller);
    merged
}
