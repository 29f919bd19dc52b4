//! 内置资源类型。
//!
//! 每个类型只负责记录校验、选项生成与身份字段选择；真正的协议客户端通过
//! [`Connector`](crate::resource::Connector) 由宿主注入。

pub mod grpc;
pub mod http;
pub mod jdbc;

pub use grpc::{GrpcChannel, GrpcTarget};
pub use http::{HttpClientOptions, HttpEndpoint, HttpLocation};
pub use jdbc::{JdbcDataSource, JdbcOptions};

use crate::config::FieldError;
use crate::error::DiscoveryError;
use crate::record::Record;

/// 读取非空字符串字段。
pub(crate) fn non_empty<'a>(
    type_name: &str,
    record: &Record,
    value: Result<&'a str, FieldError>,
    key: &str,
) -> Result<&'a str, DiscoveryError> {
    let value = value.map_err(|err| DiscoveryError::invalid_record(type_name, record.name(), err))?;
    if value.trim().is_empty() {
        return Err(DiscoveryError::invalid_record(
            type_name,
            record.name(),
            format!("field `{key}` must not be empty"),
        ));
    }
    Ok(value)
}

/// 将字段错误转换为记录校验错误。
pub(crate) fn field<T>(
    type_name: &str,
    record: &Record,
    value: Result<T, FieldError>,
) -> Result<T, DiscoveryError> {
    value.map_err(|err| DiscoveryError::invalid_record(type_name, record.name(), err))
}
