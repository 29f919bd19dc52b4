use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{self, Config, keys};
use crate::error::DiscoveryError;
use crate::record::Record;
use crate::shared::{SharedClientRegistry, SharedKey};

use super::generic::ResourceType;

/// 类型擦除后的客户端句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：注册表需要在同一张表中存放不同协议的客户端，因此以
///   `Arc<dyn Any + Send + Sync>` 承载，调用方再按约定类型 [`downcast`](Self::downcast)；
/// - **契约 (What)**：克隆只增加引用计数，不会创建新连接；[`ptr_eq`](Self::ptr_eq) 判断两个句柄
///   是否指向同一个底层客户端实例；
/// - **风险 (Trade-offs)**：持有克隆并不阻止运行时调用 `disconnect`，释放后的句柄仅保证内存安全，
///   不保证连接仍然可用。
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServiceClient {
    pub fn new<C>(client: C) -> Self
    where
        C: Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(client))
    }

    pub fn from_arc<C>(client: Arc<C>) -> Self
    where
        C: Send + Sync + 'static,
    {
        Self {
            inner: client,
            type_name: type_name::<C>(),
        }
    }

    /// 还原为具体客户端类型；类型不符时返回 `None`。
    pub fn downcast<C>(&self) -> Option<Arc<C>>
    where
        C: Send + Sync + 'static,
    {
        Arc::clone(&self.inner).downcast::<C>().ok()
    }

    pub fn downcast_ref<C>(&self) -> Option<&C>
    where
        C: Send + Sync + 'static,
    {
        self.inner.downcast_ref::<C>()
    }

    /// 具体客户端的类型名，仅用于诊断。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 两个句柄是否指向同一客户端实例。
    pub fn ptr_eq(&self, other: &ServiceClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 一次解析的结果：合并后的配置、共享判定、共享键以及类型擦除的连接目标。
pub struct Resolution {
    merged: Config,
    shared: bool,
    key: SharedKey,
    target: Box<dyn Any + Send + Sync>,
    target_type: &'static str,
}

impl Resolution {
    pub fn new<T>(merged: Config, shared: bool, key: SharedKey, target: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            merged,
            shared,
            key,
            target: Box::new(target),
            target_type: type_name::<T>(),
        }
    }

    /// 按 `metadata < location < caller` 合并后的完整配置。
    pub fn merged(&self) -> &Config {
        &self.merged
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    pub fn target<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.target.downcast_ref::<T>()
    }

    pub fn target_type_name(&self) -> &'static str {
        self.target_type
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("shared", &self.shared)
            .field("key", &self.key)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

/// `DynResourceType` 为注册表与引用提供对象安全的资源类型接口。
///
/// # 设计初衷（Why）
/// - 类型注册表以类型名为键存放各种实现，需要统一的 trait 对象；
/// - 与泛型 [`ResourceType`] 功能等价，差异仅在于类型擦除与运行时类型检查。
///
/// # 契约说明（What）
/// - `prepare` 只做校验与合并，不产生副作用；
/// - `connect` 必须接收同一实现 `prepare` 产出的 [`Resolution`]，否则返回
///   [`DiscoveryError::ClientTypeMismatch`]；
/// - `teardown` 对每个实际建立的客户端只会被运行时调用一次。
pub trait DynResourceType: Send + Sync + 'static {
    fn type_name(&self) -> &str;

    fn prepare(&self, record: &Record, caller: &Config) -> Result<Resolution, DiscoveryError>;

    fn connect(&self, resolution: &Resolution) -> Result<ServiceClient, DiscoveryError>;

    fn teardown(&self, client: &ServiceClient) -> Result<(), DiscoveryError>;
}

/// `TypedResourceAdapter` 将泛型 [`ResourceType`] 装箱为对象安全的 [`DynResourceType`]。
///
/// # 行为逻辑（How）
/// - `prepare` 执行统一的三层合并、读取 `shared` 标记，再委托 `resolve` 与 `identity`；
///   共享键总是包含 `shared` 字段本身与 `R::Client` 的类型名；
/// - `connect`/`teardown` 在委托前做一次 `downcast` 还原具体类型。
///
/// # 风险提示（Trade-offs）
/// - 每次建连/断开各多一次类型检查，相对网络开销可以忽略。
pub struct TypedResourceAdapter<R>
where
    R: ResourceType,
{
    inner: R,
}

impl<R> TypedResourceAdapter<R>
where
    R: ResourceType,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 直接得到可注册、可绑定的 trait 对象。
    pub fn into_dyn(inner: R) -> Arc<dyn DynResourceType> {
        Arc::new(Self::new(inner))
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> DynResourceType for TypedResourceAdapter<R>
where
    R: ResourceType,
{
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn prepare(&self, record: &Record, caller: &Config) -> Result<Resolution, DiscoveryError> {
        let type_name = self.inner.type_name();
        let merged = config::merge(record.metadata(), record.location(), caller);
        let shared = merged
            .shared_flag()
            .map_err(|err| DiscoveryError::config_merge(type_name, record.name(), err))?;
        let target = self.inner.resolve(record, &merged)?;

        let mut identity = self.inner.identity(&target);
        identity.insert(keys::SHARED, shared);
        let key = SharedKey::new(type_name, &identity).for_client::<R::Client>();

        Ok(Resolution::new(merged, shared, key, target))
    }

    fn connect(&self, resolution: &Resolution) -> Result<ServiceClient, DiscoveryError> {
        let target = resolution.target::<R::Target>().ok_or_else(|| {
            DiscoveryError::ClientTypeMismatch {
                expected: type_name::<R::Target>(),
                actual: resolution.target_type_name(),
            }
        })?;
        self.inner
            .connect(target)
            .map(ServiceClient::new)
            .map_err(|source| DiscoveryError::Connect {
                type_name: self.inner.type_name().to_owned(),
                source,
            })
    }

    fn teardown(&self, client: &ServiceClient) -> Result<(), DiscoveryError> {
        let typed = client.downcast_ref::<R::Client>().ok_or_else(|| {
            DiscoveryError::ClientTypeMismatch {
                expected: type_name::<R::Client>(),
                actual: client.type_name(),
            }
        })?;
        self.inner
            .disconnect(typed)
            .map_err(|source| DiscoveryError::Teardown {
                type_name: self.inner.type_name().to_owned(),
                source,
            })
    }
}

/// 一次成功构建的结果；`lease` 非空表示客户端来自共享注册表，释放时必须归还该键。
#[derive(Debug)]
pub struct BuiltClient {
    pub client: ServiceClient,
    pub lease: Option<SharedKey>,
}

/// 将记录构建为客户端。
///
/// # 教案式说明
/// - **意图 (Why)**：共享判定对所有资源类型一致，因此放在运行时而非各实现中；
/// - **逻辑 (How)**：`prepare` → 若 `shared` 则经共享注册表按键获取（未命中才建连），
///   否则直接建连；
/// - **契约 (What)**：除建立客户端与登记共享条目外无其他副作用；失败时共享注册表不残留条目。
pub fn build(
    handler: &Arc<dyn DynResourceType>,
    record: &Record,
    caller: &Config,
    shared: &SharedClientRegistry,
) -> Result<BuiltClient, DiscoveryError> {
    let resolution = handler.prepare(record, caller)?;
    if resolution.is_shared() {
        let key = resolution.key().clone();
        let client = shared.acquire_shared(&key, handler, || handler.connect(&resolution))?;
        return Ok(BuiltClient {
            client,
            lease: Some(key),
        });
    }

    debug!(
        discovery.record.name = record.name(),
        discovery.resource.type = handler.type_name(),
        "connecting dedicated client"
    );
    Ok(BuiltClient {
        client: handler.connect(&resolution)?,
        lease: None,
    })
}
