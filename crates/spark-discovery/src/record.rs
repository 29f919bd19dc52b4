//! 服务记录：描述一个可被发现的后端资源。
//!
//! ## 定位（Why）
//! - 记录由发现后端创建与修改，对运行时只读；引用绑定时复制一份，之后后端再怎么更新
//!   都不会影响已绑定的引用（copy-on-bind）。
//! - 记录本身不校验 `location` 字段，字段是否齐全由负责解析的资源类型在建连时判断。
//!
//! ## 序列化（What）
//! - 与注册中心交换的 JSON 形态：`{"name", "type", "location", "metadata", "status",
//!   "registration"}`，状态取值 `UP`/`DOWN`/`OUT_OF_SERVICE`/`UNKNOWN`；
//! - 无法识别的状态字符串反序列化为 `UNKNOWN`，避免新版本后端的扩展状态导致整条记录丢弃。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

/// 记录的可用状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Up,
    Down,
    OutOfService,
    #[default]
    Unknown,
}

impl Status {
    /// 稳定字符串形式。
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::OutOfService => "OUT_OF_SERVICE",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// 解析状态字符串，大小写不敏感，无法识别时返回 [`Status::Unknown`]。
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "UP" => Status::Up,
            "DOWN" => Status::Down,
            "OUT_OF_SERVICE" => Status::OutOfService,
            _ => Status::Unknown,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Status::parse(&value)
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_owned()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发现门面在发布记录时分配的注册标识。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 服务记录。
///
/// # 教案式说明
/// - **意图 (Why)**：以最小字段集描述“去哪里找服务、它是什么类型”，让调用方无需了解协议细节；
/// - **契约 (What)**：
///   - `type_name` 决定由哪个资源类型处理，绑定时必须非空且已注册；
///   - `location` 存放协议相关的地址字段（host、port、ssl、url……）；
///   - `metadata` 存放任意键值，可包含 `shared: bool`；
/// - **设计 (How)**：提供 Builder 风格方法，发布前组装，发布后只读。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    location: Config,
    #[serde(default)]
    metadata: Config,
    #[serde(default)]
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration: Option<RegistrationId>,
}

impl Record {
    /// 以名称与类型创建记录，状态为 [`Status::Unknown`]。
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            location: Config::new(),
            metadata: Config::new(),
            status: Status::Unknown,
            registration: None,
        }
    }

    /// 追加一个位置信息字段。
    #[must_use]
    pub fn with_location(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.location.insert(key, value);
        self
    }

    /// 整体替换位置信息。
    #[must_use]
    pub fn with_location_config(mut self, location: Config) -> Self {
        self.location = location;
        self
    }

    /// 追加一个元数据字段。
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// 整体替换元数据。
    #[must_use]
    pub fn with_metadata_config(mut self, metadata: Config) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_registration(mut self, registration: RegistrationId) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn location(&self) -> &Config {
        &self.location
    }

    pub fn metadata(&self) -> &Config {
        &self.metadata
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn registration(&self) -> Option<&RegistrationId> {
        self.registration.as_ref()
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_registration(&mut self, registration: RegistrationId) {
        self.registration = Some(registration);
    }

    /// 判断记录是否满足过滤条件。
    pub fn matches(&self, filter: &RecordFilter) -> bool {
        filter.criteria.iter().all(|(field, expected)| {
            let actual = match field {
                FilterField::Name => Some(Value::from(self.name.as_str())),
                FilterField::Type => Some(Value::from(self.type_name.as_str())),
                FilterField::Status => Some(Value::from(self.status.as_str())),
                FilterField::Registration => self
                    .registration
                    .as_ref()
                    .map(|registration| Value::from(registration.as_str())),
                FilterField::Attribute(key) => self
                    .metadata
                    .get(key)
                    .or_else(|| self.location.get(key))
                    .cloned(),
            };
            actual.is_some_and(|actual| value_matches(&actual, expected))
        })
    }
}

/// 过滤条件作用的字段。
#[derive(Clone, Debug, PartialEq, Eq)]
enum FilterField {
    Name,
    Type,
    Status,
    Registration,
    /// 先查元数据，再查位置信息。
    Attribute(String),
}

impl FilterField {
    fn parse(key: &str) -> Self {
        match key {
            "name" => FilterField::Name,
            "type" => FilterField::Type,
            "status" => FilterField::Status,
            "registration" => FilterField::Registration,
            other => FilterField::Attribute(other.to_owned()),
        }
    }
}

/// 记录过滤器：所有条件同时满足才算匹配，期望值 `"*"` 表示“字段存在即可”。
///
/// # 契约（What）
/// - 默认只匹配 [`Status::Up`] 的记录；显式设置状态条件或调用
///   [`RecordFilter::include_all_statuses`] 后解除该限制；
/// - 字符串与数字/布尔之间按文本形式比较，`{"port": "8080"}` 可以匹配 `port = 8080`。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFilter {
    criteria: Vec<(FilterField, Value)>,
    all_statuses: bool,
}

impl RecordFilter {
    /// 不带条件的过滤器，匹配所有 `UP` 记录。
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构造过滤器；非对象输入得到空过滤器。
    pub fn from_json(filter: &Value) -> Self {
        let mut result = Self::new();
        if let Some(object) = filter.as_object() {
            for (key, value) in object {
                result = result.field(key, value.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.field("name", Value::from(name.into()))
    }

    #[must_use]
    pub fn type_name(self, type_name: impl Into<String>) -> Self {
        self.field("type", Value::from(type_name.into()))
    }

    #[must_use]
    pub fn status(self, status: Status) -> Self {
        self.field("status", Value::from(status.as_str()))
    }

    /// 追加任意字段条件。
    #[must_use]
    pub fn field(mut self, key: &str, expected: impl Into<Value>) -> Self {
        self.criteria.push((FilterField::parse(key), expected.into()));
        self
    }

    /// 解除默认的 `UP` 状态限制。
    #[must_use]
    pub fn include_all_statuses(mut self) -> Self {
        self.all_statuses = true;
        self
    }

    /// 是否需要对记录状态施加默认的 `UP` 限制。
    pub(crate) fn restricts_to_up(&self) -> bool {
        !self.all_statuses
            && !self
                .criteria
                .iter()
                .any(|(field, _)| *field == FilterField::Status)
    }
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    if expected.as_str() == Some("*") {
        return true;
    }
    match (actual, expected) {
        (Value::String(actual), Value::String(expected)) => actual == expected,
        (Value::String(actual), expected) | (expected, Value::String(actual)) => {
            *actual == expected.to_string()
        }
        (actual, expected) => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> Record {
        Record::new("orders", "http-endpoint")
            .with_location("host", "svc.local")
            .with_location("port", 8080)
            .with_metadata("team", "checkout")
            .with_status(Status::Up)
    }

    #[test]
    fn record_json_uses_type_key_and_upper_case_status() {
        let json = serde_json::to_value(orders()).expect("记录必须可序列化");
        assert_eq!(json["type"], "http-endpoint");
        assert_eq!(json["status"], "UP");
        assert!(json.get("registration").is_none());

        let parsed: Record = serde_json::from_value(json).expect("记录必须可反序列化");
        assert_eq!(parsed, orders());
    }

    #[test]
    fn unknown_status_strings_parse_as_unknown() {
        let parsed: Record = serde_json::from_value(json!({
            "name": "legacy",
            "type": "jdbc",
            "status": "DRAINING"
        }))
        .expect("未知状态不应导致反序列化失败");
        assert_eq!(parsed.status(), Status::Unknown);
        assert!(parsed.location().is_empty());
    }

    #[test]
    fn filters_match_attributes_from_metadata_then_location() {
        let record = orders();
        assert!(record.matches(&RecordFilter::new().field("team", "checkout")));
        assert!(record.matches(&RecordFilter::new().field("host", "*")));
        assert!(record.matches(&RecordFilter::new().field("port", "8080")));
        assert!(!record.matches(&RecordFilter::new().field("zone", "*")));
        assert!(!record.matches(&RecordFilter::new().name("billing")));
    }

    #[test]
    fn json_filters_map_reserved_keys_to_record_fields() {
        let filter = RecordFilter::from_json(&json!({"type": "http-endpoint", "status": "UP"}));
        assert!(orders().matches(&filter));
        assert!(!filter.restricts_to_up(), "显式状态条件应解除默认限制");
        assert!(RecordFilter::new().restricts_to_up());
    }
}
