//! `jdbc`：关系型数据源。
//!
//! ## 契约（What）
//! - 地址取自 `url`，缺失时回退到 `jdbcUrl`，必须以 `jdbc:` 开头；
//! - `driver_class`、`user`、`password` 为可选字符串，`max_pool_size` 为可选正整数；
//! - 身份字段：`url`、`user`、`driver_class`，以及口令的 SHA-256 指纹。指纹保证口令不同的
//!   两个引用不会共享连接池，同时避免明文口令出现在共享键与日志中。

use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::{Config, keys};
use crate::error::{BoxError, DiscoveryError};
use crate::record::Record;
use crate::resource::{Connector, ResourceType};

use super::{field, non_empty};

/// 资源类型名。
pub const TYPE: &str = "jdbc";

const URL_SCHEME: &str = "jdbc:";
const PASSWORD_FINGERPRINT: &str = "password_sha256";

/// 以 JDBC 地址创建记录。
pub fn record(name: impl Into<String>, url: impl Into<String>) -> Record {
    Record::new(name, TYPE).with_location(keys::URL, url.into())
}

/// 交给连接器的数据源选项。
#[derive(Clone, PartialEq)]
pub struct JdbcOptions {
    pub url: String,
    pub driver_class: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_pool_size: Option<u32>,
    /// 合并后的完整配置（含口令），连接器可从中读取驱动专有参数。
    pub options: Config,
}

impl JdbcOptions {
    fn password_fingerprint(&self) -> Option<String> {
        self.password
            .as_deref()
            .map(|password| hex::encode(Sha256::digest(password.as_bytes())))
    }
}

impl fmt::Debug for JdbcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcOptions")
            .field("url", &self.url)
            .field("driver_class", &self.driver_class)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_pool_size", &self.max_pool_size)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `jdbc` 资源类型。
///
/// 与 HTTP 端点一样，只负责产出 [`JdbcOptions`]；连接池由注入的 [`Connector`] 创建。
#[derive(Clone, Debug)]
pub struct JdbcDataSource<K> {
    connector: K,
}

impl<K> JdbcDataSource<K>
where
    K: Connector<JdbcOptions>,
{
    pub fn new(connector: K) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }
}

impl<K> ResourceType for JdbcDataSource<K>
where
    K: Connector<JdbcOptions>,
{
    type Target = JdbcOptions;
    type Client = K::Client;

    fn type_name(&self) -> &str {
        TYPE
    }

    fn resolve(&self, record: &Record, merged: &Config) -> Result<JdbcOptions, DiscoveryError> {
        let url = match field(TYPE, record, merged.optional_str(keys::URL))? {
            Some(url) => non_empty(TYPE, record, Ok(url), keys::URL)?,
            None => non_empty(TYPE, record, merged.require_str(keys::JDBC_URL), keys::JDBC_URL)
                .map_err(|_| {
                    DiscoveryError::invalid_record(
                        TYPE,
                        record.name(),
                        format!("missing required field `{}`", keys::URL),
                    )
                })?,
        };
        if !url.starts_with(URL_SCHEME) {
            return Err(DiscoveryError::invalid_record(
                TYPE,
                record.name(),
                format!("`{}` must start with `{URL_SCHEME}`", keys::URL),
            ));
        }

        let max_pool_size = match field(TYPE, record, merged.optional_u64(keys::MAX_POOL_SIZE))? {
            None => None,
            Some(size) => Some(
                u32::try_from(size)
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| {
                        DiscoveryError::invalid_record(
                            TYPE,
                            record.name(),
                            format!("`{}` must be a positive integer", keys::MAX_POOL_SIZE),
                        )
                    })?,
            ),
        };

        Ok(JdbcOptions {
            url: url.to_owned(),
            driver_class: field(TYPE, record, merged.optional_str(keys::DRIVER_CLASS))?
                .map(str::to_owned),
            user: field(TYPE, record, merged.optional_str(keys::USER))?.map(str::to_owned),
            password: field(TYPE, record, merged.optional_str(keys::PASSWORD))?.map(str::to_owned),
            max_pool_size,
            options: merged.clone(),
        })
    }

    fn identity(&self, target: &JdbcOptions) -> Config {
        let mut identity = Config::new().with(keys::URL, target.url.as_str());
        if let Some(user) = &target.user {
            identity.insert(keys::USER, user.as_str());
        }
        if let Some(driver_class) = &target.driver_class {
            identity.insert(keys::DRIVER_CLASS, driver_class.as_str());
        }
        if let Some(fingerprint) = target.password_fingerprint() {
            identity.insert(PASSWORD_FINGERPRINT, fingerprint);
        }
        identity
    }

    fn connect(&self, target: &JdbcOptions) -> Result<K::Client, BoxError> {
        self.connector.connect(target)
    }

    fn disconnect(&self, client: &K::Client) -> Result<(), BoxError> {
        self.connector.disconnect(client)
    }
}
