//! `http-endpoint`：REST/HTTP 服务端点。
//!
//! ## 契约（What）
//! - 合并后的配置必须给出 `host`（非空）与 `port`（`1..=65535`），`ssl` 缺省为 `false`，
//!   `root` 为可选的路径前缀；
//! - 记录位置信息要求 TLS（`ssl = true`）而调用方显式关闭时视为配置冲突；
//! - 客户端身份由 `host`、`port`、`ssl` 决定，其余字段（超时、连接池……）原样放在
//!   [`HttpClientOptions::options`] 中交给连接器。

use std::fmt;

use serde_json::Value;

use crate::config::{Config, keys};
use crate::error::{BoxError, DiscoveryError};
use crate::record::Record;
use crate::resource::{Connector, ResourceType};

use super::{field, non_empty};

/// 资源类型名。
pub const TYPE: &str = "http-endpoint";

/// HTTP 端点的位置信息。
///
/// 发布方用它组装记录的 `location`，其中 `endpoint` 为便于人工阅读的完整地址。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpLocation {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub root: Option<String>,
}

impl HttpLocation {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ssl: false,
            root: None,
        }
    }

    #[must_use]
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(normalize_root(&root.into()));
        self
    }

    /// 完整地址，例如 `https://svc.local:8443/api`。
    pub fn endpoint(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!(
            "{scheme}://{}:{}{}",
            self.host,
            self.port,
            self.root.as_deref().unwrap_or_default()
        )
    }

    /// 转换为记录的 `location` 字段集合。
    pub fn to_config(&self) -> Config {
        let mut location = Config::new()
            .with(keys::HOST, self.host.as_str())
            .with(keys::PORT, self.port)
            .with(keys::SSL, self.ssl)
            .with(keys::ENDPOINT, self.endpoint());
        if let Some(root) = &self.root {
            location.insert(keys::ROOT, root.as_str());
        }
        location
    }

    /// 以本位置信息创建 `http-endpoint` 记录。
    pub fn record(&self, name: impl Into<String>) -> Record {
        Record::new(name, TYPE).with_location_config(self.to_config())
    }
}

impl fmt::Display for HttpLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint())
    }
}

/// 交给连接器的 HTTP 客户端选项。
#[derive(Clone, Debug, PartialEq)]
pub struct HttpClientOptions {
    pub default_host: String,
    pub default_port: u16,
    pub ssl: bool,
    pub root: Option<String>,
    /// 合并后的完整配置，连接器可从中读取额外参数。
    pub options: Config,
}

impl HttpClientOptions {
    pub fn location(&self) -> HttpLocation {
        HttpLocation {
            host: self.default_host.clone(),
            port: self.default_port,
            ssl: self.ssl,
            root: self.root.clone(),
        }
    }
}

/// `http-endpoint` 资源类型。
///
/// # 教案式说明
/// - **意图 (Why)**：HTTP 客户端的实现（阻塞/异步、连接池策略）因宿主而异，本类型只产出
///   [`HttpClientOptions`]，建连交给注入的 [`Connector`]；
/// - **逻辑 (How)**：`resolve` 校验 host/port/ssl/root，`identity` 取 host/port/ssl；
/// - **风险 (Trade-offs)**：`root` 不参与身份判定，同一主机不同前缀的共享引用会复用同一客户端，
///   前缀由调用方在请求时拼接。
#[derive(Clone, Debug)]
pub struct HttpEndpoint<K> {
    connector: K,
}

impl<K> HttpEndpoint<K>
where
    K: Connector<HttpClientOptions>,
{
    pub fn new(connector: K) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }
}

impl<K> ResourceType for HttpEndpoint<K>
where
    K: Connector<HttpClientOptions>,
{
    type Target = HttpClientOptions;
    type Client = K::Client;

    fn type_name(&self) -> &str {
        TYPE
    }

    fn resolve(&self, record: &Record, merged: &Config) -> Result<HttpClientOptions, DiscoveryError> {
        let host = non_empty(TYPE, record, merged.require_str(keys::HOST), keys::HOST)?;
        let port = field(TYPE, record, merged.require_port(keys::PORT))?;
        let ssl = field(TYPE, record, merged.optional_bool(keys::SSL))?.unwrap_or(false);
        let location_requires_tls =
            field(TYPE, record, record.location().optional_bool(keys::SSL))?.unwrap_or(false);
        if location_requires_tls && !ssl {
            return Err(DiscoveryError::config_merge(
                TYPE,
                record.name(),
                "record location requires TLS but configuration sets `ssl` to false",
            ));
        }
        let root = field(TYPE, record, merged.optional_str(keys::ROOT))?
            .filter(|root| !root.is_empty())
            .map(normalize_root);

        Ok(HttpClientOptions {
            default_host: host.to_owned(),
            default_port: port,
            ssl,
            root,
            options: merged.clone(),
        })
    }

    fn identity(&self, target: &HttpClientOptions) -> Config {
        Config::new()
            .with(keys::HOST, target.default_host.as_str())
            .with(keys::PORT, Value::from(target.default_port))
            .with(keys::SSL, target.ssl)
    }

    fn connect(&self, target: &HttpClientOptions) -> Result<K::Client, BoxError> {
        self.connector.connect(target)
    }

    fn disconnect(&self, client: &K::Client) -> Result<(), BoxError> {
        self.connector.disconnect(client)
    }
}

fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FnConnector;

    fn endpoint() -> HttpEndpoint<impl Connector<HttpClientOptions, Client = HttpClientOptions>> {
        HttpEndpoint::new(FnConnector::new(
            |options: &HttpClientOptions| Ok(options.clone()),
            |_: &HttpClientOptions| Ok(()),
        ))
    }

    fn resolve(record: &Record, caller: &Config) -> Result<HttpClientOptions, DiscoveryError> {
        let merged = crate::config::merge(record.metadata(), record.location(), caller);
        endpoint().resolve(record, &merged)
    }

    #[test]
    fn location_builds_endpoint_and_record() {
        let location = HttpLocation::new("svc.local", 8443)
            .with_ssl(true)
            .with_root("api/");
        assert_eq!(location.endpoint(), "https://svc.local:8443/api");

        let record = location.record("orders");
        assert_eq!(record.type_name(), TYPE);
        assert_eq!(
            record.location().get_str(keys::ENDPOINT),
            Some("https://svc.local:8443/api")
        );
    }

    #[test]
    fn plaintext_defaults_and_caller_overrides() {
        let record = HttpLocation::new("svc.local", 8080).record("orders");

        let options = resolve(&record, &Config::new()).expect("合法记录必须解析成功");
        assert_eq!(options.location(), HttpLocation::new("svc.local", 8080));

        let overridden = resolve(&record, &Config::new().with("port", 9090).with("keep_alive", true))
            .expect("调用方覆盖必须生效");
        assert_eq!(overridden.default_port, 9090);
        assert_eq!(overridden.options.get_bool("keep_alive"), Some(true));
    }

    #[test]
    fn missing_or_invalid_fields_are_invalid_records() {
        for record in [
            Record::new("orders", TYPE).with_location("port", 8080),
            Record::new("orders", TYPE)
                .with_location("host", "")
                .with_location("port", 8080),
            Record::new("orders", TYPE)
                .with_location("host", "svc.local")
                .with_location("port", 0),
        ] {
            let err = resolve(&record, &Config::new()).expect_err("非法记录必须被拒绝");
            assert_eq!(err.code(), "discovery.record.invalid");
        }
    }

    #[test]
    fn caller_cannot_turn_off_tls_required_by_location() {
        let record = HttpLocation::new("svc.local", 443).with_ssl(true).record("pay");

        assert!(resolve(&record, &Config::new()).expect("缺省应保持 TLS").ssl);
        let err = resolve(&record, &Config::new().with("ssl", false))
            .expect_err("显式关闭 TLS 必须冲突");
        assert_eq!(err.code(), "discovery.config.conflict");

        let plaintext = HttpLocation::new("svc.local", 80).record("pay");
        assert!(
            resolve(&plaintext, &Config::new().with("ssl", true))
                .expect("调用方可以开启 TLS")
                .ssl
        );
    }

    #[test]
    fn identity_ignores_root_and_extra_options() {
        let resource = endpoint();
        let plain = resolve(&HttpLocation::new("svc", 80).record("a"), &Config::new())
            .expect("解析必须成功");
        let rooted = resolve(
            &HttpLocation::new("svc", 80).with_root("/v2").record("b"),
            &Config::new().with("timeout_ms", 100),
        )
        .expect("解析必须成功");
        assert_eq!(resource.identity(&plain), resource.identity(&rooted));
    }
}
