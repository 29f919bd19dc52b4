//! `grpc`：gRPC 通道。
//!
//! 字段规则与 HTTP 端点一致（`host` + `port`，可选 `ssl`），另可用 `authority` 覆盖
//! `:authority` 伪首部；`authority` 参与身份判定，因为它改变了 TLS SNI 与路由结果。

use crate::config::{Config, keys};
use crate::error::{BoxError, DiscoveryError};
use crate::record::Record;
use crate::resource::{Connector, ResourceType};

use super::{field, non_empty};

/// 资源类型名。
pub const TYPE: &str = "grpc";

/// 以主机与端口创建记录。
pub fn record(name: impl Into<String>, host: impl Into<String>, port: u16) -> Record {
    Record::new(name, TYPE)
        .with_location(keys::HOST, host.into())
        .with_location(keys::PORT, port)
}

/// 交给连接器的通道目标。
#[derive(Clone, Debug, PartialEq)]
pub struct GrpcTarget {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub authority: Option<String>,
    pub options: Config,
}

impl GrpcTarget {
    /// 通道 URI，例如 `https://svc.local:50051`。
    pub fn uri(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// `grpc` 资源类型。
#[derive(Clone, Debug)]
pub struct GrpcChannel<K> {
    connector: K,
}

impl<K> GrpcChannel<K>
where
    K: Connector<GrpcTarget>,
{
    pub fn new(connector: K) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }
}

impl<K> ResourceType for GrpcChannel<K>
where
    K: Connector<GrpcTarget>,
{
    type Target = GrpcTarget;
    type Client = K::Client;

    fn type_name(&self) -> &str {
        TYPE
    }

    fn resolve(&self, record: &Record, merged: &Config) -> Result<GrpcTarget, DiscoveryError> {
        let host = non_empty(TYPE, record, merged.require_str(keys::HOST), keys::HOST)?;
        Ok(GrpcTarget {
            host: host.to_owned(),
            port: field(TYPE, record, merged.require_port(keys::PORT))?,
            ssl: field(TYPE, record, merged.optional_bool(keys::SSL))?.unwrap_or(false),
            authority: field(TYPE, record, merged.optional_str(keys::AUTHORITY))?
                .map(str::to_owned),
            options: merged.clone(),
        })
    }

    fn identity(&self, target: &GrpcTarget) -> Config {
        let mut identity = Config::new()
            .with(keys::HOST, target.host.as_str())
            .with(keys::PORT, target.port)
            .with(keys::SSL, target.ssl);
        if let Some(authority) = &target.authority {
            identity.insert(keys::AUTHORITY, authority.as_str());
        }
        identity
    }

    fn connect(&self, target: &GrpcTarget) -> Result<K::Client, BoxError> {
        self.connector.connect(target)
    }

    fn disconnect(&self, client: &K::Client) -> Result<(), BoxError> {
        self.connector.disconnect(client)
    }
}
