//! 引用绑定：把一条记录与调用方配置变成 [`ServiceReference`]。

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::record::Record;
use crate::reference::ServiceReference;
use crate::registry::TypeRegistry;
use crate::resource::DynResourceType;
use crate::shared::SharedClientRegistry;

/// 组合类型注册表与共享客户端注册表的绑定器。
///
/// # 教案式说明
/// - **意图 (Why)**：发现门面只需给出记录，绑定器负责按类型名找到实现并构造引用；
/// - **契约 (What)**：
///   - 类型未注册（含空类型名）时返回 [`DiscoveryError::UnknownType`]，不创建引用；
///   - 绑定本身不建连，客户端在首次 `acquire()` 时才构建；
/// - **风险 (Trade-offs)**：同一绑定器产生的引用共用一个共享注册表，跨绑定器共享需显式传入
///   同一实例，或使用 [`ReferenceBinder::with_global_shared`]。
#[derive(Clone, Debug)]
pub struct ReferenceBinder {
    types: Arc<TypeRegistry>,
    shared: Arc<SharedClientRegistry>,
}

impl ReferenceBinder {
    pub fn new(types: Arc<TypeRegistry>, shared: Arc<SharedClientRegistry>) -> Self {
        Self { types, shared }
    }

    /// 使用进程级共享注册表。
    pub fn with_global_shared(types: Arc<TypeRegistry>) -> Self {
        Self::new(types, SharedClientRegistry::global())
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn shared(&self) -> &Arc<SharedClientRegistry> {
        &self.shared
    }

    /// 按记录类型查找实现并绑定。
    pub fn bind(
        &self,
        record: &Record,
        config: &Config,
    ) -> Result<Arc<ServiceReference>, DiscoveryError> {
        let handler = self.types.lookup(record.type_name())?;
        Ok(Arc::new(bind(
            record,
            handler,
            config,
            Arc::clone(&self.shared),
        )))
    }
}

/// 以给定实现绑定记录，记录与配置均被复制。
pub fn bind(
    record: &Record,
    handler: Arc<dyn DynResourceType>,
    config: &Config,
    shared: Arc<SharedClientRegistry>,
) -> ServiceReference {
    let reference = ServiceReference::new(record.clone(), config.clone(), handler, shared);
    debug!(
        discovery.reference.id = %reference.id(),
        discovery.record.name = record.name(),
        discovery.resource.type = record.type_name(),
        "service reference bound"
    );
    reference
}
