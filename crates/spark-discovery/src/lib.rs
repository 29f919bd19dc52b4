#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-discovery: 将服务记录解析为可共享、可回收客户端句柄的服务发现运行时。"]
#![doc = ""]
#![doc = "== 生命周期 =="]
#![doc = "记录 → `ReferenceBinder::bind` → `ServiceReference::acquire`（惰性构建、缓存）→ `release`（断开或归还共享持有）→ … → `retire`。"]
#![doc = ""]
#![doc = "== 扩展 =="]
#![doc = "新的资源类型实现 `ResourceType` 后注册到 `TypeRegistry` 即可被绑定；客户端建连细节经 `Connector` 注入，运行时从不检查客户端内部。"]
#![doc = "第三方实现可使用 `spark-discovery-tck` 验证其满足生命周期契约。"]

/// 引用绑定器。
///
/// - **意图说明 (Why)**：组合类型注册表与共享注册表，把记录变成引用；
/// - **契约定位 (What)**：类型未注册时不创建引用。
pub mod binder;
/// 三层配置合并与已识别的配置键。
pub mod config;
/// 内存版发现门面：发布、查询、分发引用与事件。
pub mod discovery;
/// 错误类型与稳定错误码。
pub mod error;
pub mod record;
/// 服务引用的状态机。
///
/// - **意图说明 (Why)**：保证每个引用在一个获取周期内只构建一次客户端；
/// - **风险提示 (Trade-offs)**：构建与断开都在引用锁内执行，慢速连接器会阻塞同一引用的其他调用方。
pub mod reference;
pub mod registry;
/// 资源类型的泛型层、对象层与连接器边界。
pub mod resource;
/// 引用计数的共享客户端注册表。
pub mod shared;
/// 内置的 HTTP / JDBC / gRPC 资源类型。
pub mod types;

#[cfg(test)]
mod test_support;

pub use binder::{ReferenceBinder, bind};
pub use config::{Config, FieldError, merge};
pub use discovery::{DiscoveryEvent, ServiceDiscovery};
pub use error::{BoxError, DiscoveryError};
pub use record::{Record, RecordFilter, RegistrationId, Status};
pub use reference::{ReferenceId, ReferenceState, ReleaseHook, ReleaseOutcome, ServiceReference};
pub use registry::TypeRegistry;
pub use resource::{
    BuiltClient, Connector, DynResourceType, FnConnector, Resolution, ResourceType, ServiceClient,
    TypedResourceAdapter,
};
pub use shared::{SharedClientRegistry, SharedKey, SharedRelease};
