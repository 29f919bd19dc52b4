//! 资源类型注册表：按类型名分派到具体的资源类型实现。
//!
//! ## 定位（Why）
//! - 记录只携带字符串形式的类型名，运行时必须在绑定时找到对应实现；以 trait 对象表驱动
//!   分派，新的资源类型只需注册即可接入，无需修改运行时；
//! - 查找位于每次绑定的热路径，注册/注销极少发生，因此使用读多写少的 `RwLock`。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::DiscoveryError;
use crate::resource::{DynResourceType, ResourceType, TypedResourceAdapter};

/// 类型名 → 资源类型实现。
///
/// # 契约说明（What）
/// - 类型名非空且在同一注册表内唯一；
/// - [`register`](Self::register) 遇到重名时失败，
///   [`register_or_replace`](Self::register_or_replace) 显式覆盖并返回旧实现；
/// - 已绑定的引用持有各自的实现 `Arc`，注销或替换不会影响它们。
#[derive(Default)]
pub struct TypeRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn DynResourceType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册泛型资源类型。
    pub fn register<R>(&self, resource: R) -> Result<(), DiscoveryError>
    where
        R: ResourceType,
    {
        self.register_dyn(TypedResourceAdapter::into_dyn(resource))
    }

    /// 注册对象层资源类型。
    pub fn register_dyn(&self, handler: Arc<dyn DynResourceType>) -> Result<(), DiscoveryError> {
        let type_name = validated_name(handler.as_ref())?;
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&type_name) {
            return Err(DiscoveryError::DuplicateType { type_name });
        }
        info!(discovery.resource.type = %type_name, "resource type registered");
        handlers.insert(type_name, handler);
        Ok(())
    }

    /// 注册或覆盖同名资源类型，返回被覆盖的实现。
    pub fn register_or_replace<R>(
        &self,
        resource: R,
    ) -> Result<Option<Arc<dyn DynResourceType>>, DiscoveryError>
    where
        R: ResourceType,
    {
        self.register_or_replace_dyn(TypedResourceAdapter::into_dyn(resource))
    }

    pub fn register_or_replace_dyn(
        &self,
        handler: Arc<dyn DynResourceType>,
    ) -> Result<Option<Arc<dyn DynResourceType>>, DiscoveryError> {
        let type_name = validated_name(handler.as_ref())?;
        let previous = self.handlers.write().insert(type_name.clone(), handler);
        info!(
            discovery.resource.type = %type_name,
            replaced = previous.is_some(),
            "resource type registered"
        );
        Ok(previous)
    }

    /// 按类型名查找实现。
    pub fn lookup(&self, type_name: &str) -> Result<Arc<dyn DynResourceType>, DiscoveryError> {
        self.handlers
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownType {
                type_name: type_name.to_owned(),
            })
    }

    pub fn unregister(&self, type_name: &str) -> Option<Arc<dyn DynResourceType>> {
        let removed = self.handlers.write().remove(type_name);
        if removed.is_some() {
            info!(discovery.resource.type = type_name, "resource type unregistered");
        }
        removed
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.read().contains_key(type_name)
    }

    /// 已注册的类型名，按字典序排列。
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

fn validated_name(handler: &dyn DynResourceType) -> Result<String, DiscoveryError> {
    let type_name = handler.type_name();
    if type_name.trim().is_empty() {
        return Err(DiscoveryError::InvalidTypeName);
    }
    Ok(type_name.to_owned())
}
