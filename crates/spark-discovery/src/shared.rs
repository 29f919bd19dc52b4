//! 共享客户端注册表：按身份键引用计数的客户端缓存。
//!
//! ## 定位（Why）
//! - 多个引用指向同一后端（同 host/port/ssl、同数据库账号……）且声明 `shared = true` 时，
//!   应复用一个昂贵的客户端（连接池、TLS 会话、gRPC 通道），而不是各自建连；
//! - 最后一个持有者释放后才真正断开，避免“一个消费者关闭了别人还在用的连接”。
//!
//! ## 并发模型（How）
//! - 外层 `DashMap` 只负责“键 → 槽位”的映射，每个槽位是独立的 `parking_lot::Mutex`；
//!   同一键上的获取/释放串行，不同键之间互不阻塞；
//! - 锁顺序固定为“槽位锁 → 分片锁”：任何路径都不会在持有分片守卫时去锁槽位，
//!   因此先把槽位 `Arc` 克隆出来再加锁；
//! - 槽位清空后会被移出映射；拿到过期槽位的线程检测到后重新取槽，保证同一键任意时刻至多
//!   一个存活客户端。
//!
//! ## 契约（What）
//! - 建连失败不残留条目，持有者计数不变；
//! - 计数归零时在槽位锁内执行 `teardown`，其错误返回给触发释放的调用方；
//! - 计数大于零时绝不执行 `teardown`。

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::resource::{DynResourceType, ServiceClient};

/// 共享客户端的身份键。
///
/// 由资源类型名、客户端具体类型与身份字段的规范化 JSON 文本组成，三者都参与比较：
/// 不同资源类型的相同字段不会冲突，同名但产出不同客户端类型的处理器也不会互相命中。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedKey {
    type_name: Arc<str>,
    identity: Arc<str>,
    client_type: &'static str,
}

impl SharedKey {
    pub fn new(type_name: &str, identity: &Config) -> Self {
        Self {
            type_name: Arc::from(type_name),
            identity: Arc::from(identity.canonical()),
            client_type: "",
        }
    }

    /// 把客户端具体类型并入键中。
    #[must_use]
    pub fn for_client<C: 'static>(mut self) -> Self {
        self.client_type = std::any::type_name::<C>();
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 身份字段的规范化 JSON 文本。
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 客户端具体类型名；未经 [`for_client`](Self::for_client) 时为空串。
    pub fn client_type(&self) -> &'static str {
        self.client_type
    }
}

impl fmt::Display for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.identity)
    }
}

/// 共享释放的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharedRelease {
    /// 仍有其他持有者，客户端保持存活。
    Retained { holders: usize },
    /// 最后一个持有者释放，客户端已断开并移出注册表。
    Closed,
    /// 注册表中没有该键。
    Unknown,
}

struct SharedEntry {
    client: ServiceClient,
    holders: usize,
    handler: Arc<dyn DynResourceType>,
}

type Slot = Arc<Mutex<Option<SharedEntry>>>;

/// 引用计数的共享客户端注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：为 `shared = true` 的引用提供“同键同实例”的保证；
/// - **逻辑 (How)**：见模块文档中的并发模型；
/// - **契约 (What)**：
///   - [`acquire_shared`](Self::acquire_shared) 命中时持有者 +1 并返回同一实例，
///     未命中时调用 `build` 并登记持有者 1；
///   - [`release_shared`](Self::release_shared) 持有者 -1，归零时断开并移除；
/// - **风险 (Trade-offs)**：`build` 在槽位锁内执行，同键的其他获取者会阻塞到建连结束，
///   这正是“同键只建一次”所需的语义。
#[derive(Default)]
pub struct SharedClientRegistry {
    slots: DashMap<SharedKey, Slot>,
}

impl SharedClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享注册表，首次访问时惰性初始化。
    pub fn global() -> Arc<SharedClientRegistry> {
        static GLOBAL: OnceLock<Arc<SharedClientRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SharedClientRegistry::new())))
    }

    /// 获取（必要时构建）共享客户端。
    ///
    /// `handler` 会随条目保存，最后一个持有者释放时用它断开客户端。
    pub fn acquire_shared<F>(
        &self,
        key: &SharedKey,
        handler: &Arc<dyn DynResourceType>,
        build: F,
    ) -> Result<ServiceClient, DiscoveryError>
    where
        F: FnOnce() -> Result<ServiceClient, DiscoveryError>,
    {
        loop {
            let slot = self.slot_for(key);
            let mut guard = slot.lock();

            if let Some(entry) = guard.as_mut() {
                entry.holders += 1;
                debug!(
                    discovery.shared.key = %key,
                    discovery.shared.holders = entry.holders,
                    "shared client reused"
                );
                return Ok(entry.client.clone());
            }

            if !self.is_current(key, &slot) {
                continue;
            }

            return match build() {
                Ok(client) => {
                    *guard = Some(SharedEntry {
                        client: client.clone(),
                        holders: 1,
                        handler: Arc::clone(handler),
                    });
                    debug!(
                        discovery.shared.key = %key,
                        discovery.shared.holders = 1_usize,
                        "shared client created"
                    );
                    Ok(client)
                }
                Err(err) => {
                    self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                    Err(err)
                }
            };
        }
    }

    /// 归还一次持有。
    pub fn release_shared(&self, key: &SharedKey) -> Result<SharedRelease, DiscoveryError> {
        let Some(slot) = self.existing_slot(key) else {
            return Ok(SharedRelease::Unknown);
        };
        let mut guard = slot.lock();

        let holders = match guard.as_mut() {
            Some(entry) => {
                entry.holders -= 1;
                entry.holders
            }
            None => return Ok(SharedRelease::Unknown),
        };
        if holders > 0 {
            debug!(
                discovery.shared.key = %key,
                discovery.shared.holders = holders,
                "shared client retained"
            );
            return Ok(SharedRelease::Retained { holders });
        }

        let Some(entry) = guard.take() else {
            return Ok(SharedRelease::Unknown);
        };
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
        debug!(discovery.shared.key = %key, "shared client closing");
        entry.handler.teardown(&entry.client)?;
        Ok(SharedRelease::Closed)
    }

    /// 当前持有者数量；键不存在时为 0。
    pub fn holders(&self, key: &SharedKey) -> usize {
        self.existing_slot(key)
            .and_then(|slot| slot.lock().as_ref().map(|entry| entry.holders))
            .unwrap_or(0)
    }

    /// 存活客户端的键，按字典序排列。
    pub fn keys(&self) -> Vec<SharedKey> {
        let mut keys: Vec<SharedKey> = self
            .live_slots()
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.live_slots()
            .iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, key: &SharedKey) -> Slot {
        let entry = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)));
        Arc::clone(entry.value())
    }

    fn existing_slot(&self, key: &SharedKey) -> Option<Slot> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    fn is_current(&self, key: &SharedKey, slot: &Slot) -> bool {
        self.existing_slot(key)
            .is_some_and(|current| Arc::ptr_eq(&current, slot))
    }

    // 先克隆出槽位再逐个加锁，不在分片守卫下锁槽位。
    fn live_slots(&self) -> Vec<(SharedKey, Slot)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

impl fmt::Debug for SharedClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClientRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::record::Record;
    use crate::resource::{ResourceType, TypedResourceAdapter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        disconnects: Arc<AtomicUsize>,
        fail_disconnect: bool,
    }

    impl ResourceType for Counting {
        type Target = ();
        type Client = u32;

        fn type_name(&self) -> &str {
            "counting"
        }

        fn resolve(&self, _: &Record, _: &Config) -> Result<(), DiscoveryError> {
            Ok(())
        }

        fn identity(&self, _: &()) -> Config {
            Config::new()
        }

        fn connect(&self, _: &()) -> Result<u32, BoxError> {
            Ok(7)
        }

        fn disconnect(&self, _: &u32) -> Result<(), BoxError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err("socket already closed".into());
            }
            Ok(())
        }
    }

    fn key() -> SharedKey {
        SharedKey::new("counting", &Config::new().with("host", "db"))
    }

    #[test]
    fn last_release_tears_down_exactly_once() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let handler = TypedResourceAdapter::into_dyn(Counting {
            disconnects: Arc::clone(&disconnects),
            ..Counting::default()
        });
        let registry = SharedClientRegistry::new();

        let first = registry
            .acquire_shared(&key(), &handler, || Ok(ServiceClient::new(1_u32)))
            .expect("首次获取必须成功");
        let second = registry
            .acquire_shared(&key(), &handler, || panic!("命中时不应再次构建"))
            .expect("第二次获取必须命中");
        assert!(first.ptr_eq(&second), "同键必须得到同一实例");
        assert_eq!(registry.holders(&key()), 2);

        assert_eq!(
            registry.release_shared(&key()).expect("释放不应失败"),
            SharedRelease::Retained { holders: 1 }
        );
        assert_eq!(disconnects.load(Ordering::SeqCst), 0, "仍有持有者时不得断开");

        assert_eq!(
            registry.release_shared(&key()).expect("释放不应失败"),
            SharedRelease::Closed
        );
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(
            registry.release_shared(&key()).expect("未知键释放不应失败"),
            SharedRelease::Unknown
        );
    }

    #[test]
    fn failed_build_leaves_no_entry() {
        let handler = TypedResourceAdapter::into_dyn(Counting::default());
        let registry = SharedClientRegistry::new();

        let err = registry
            .acquire_shared(&key(), &handler, || {
                Err(DiscoveryError::Connect {
                    type_name: "counting".to_owned(),
                    source: "refused".into(),
                })
            })
            .expect_err("构建失败必须上抛");
        assert_eq!(err.code(), "discovery.client.connect");
        assert!(registry.is_empty());
        assert_eq!(registry.holders(&key()), 0);

        registry
            .acquire_shared(&key(), &handler, || Ok(ServiceClient::new(2_u32)))
            .expect("失败后重新获取应当成功");
        assert_eq!(registry.keys(), vec![key()]);
    }

    #[test]
    fn teardown_failure_surfaces_to_last_releaser() {
        let handler = TypedResourceAdapter::into_dyn(Counting {
            fail_disconnect: true,
            ..Counting::default()
        });
        let registry = SharedClientRegistry::new();
        registry
            .acquire_shared(&key(), &handler, || Ok(ServiceClient::new(3_u32)))
            .expect("获取必须成功");

        let err = registry
            .release_shared(&key())
            .expect_err("断开失败必须返回给最后的释放者");
        assert_eq!(err.code(), "discovery.client.teardown");
        assert!(registry.is_empty(), "即便断开失败，条目也必须移除");
    }

    #[test]
    fn client_type_separates_same_named_handlers() {
        let identity = Config::new().with("host", "svc");
        let narrow = SharedKey::new("counting", &identity).for_client::<u32>();
        let wide = SharedKey::new("counting", &identity).for_client::<u64>();
        assert_ne!(narrow, wide, "客户端类型不同的键不得相等");
        assert_eq!(narrow.client_type(), std::any::type_name::<u32>());

        let handler = TypedResourceAdapter::into_dyn(Counting::default());
        let registry = SharedClientRegistry::new();
        registry
            .acquire_shared(&narrow, &handler, || Ok(ServiceClient::new(1_u32)))
            .expect("获取必须成功");
        let other = registry
            .acquire_shared(&wide, &handler, || Ok(ServiceClient::new(2_u64)))
            .expect("另一客户端类型必须独立构建");
        assert_eq!(other.downcast_ref::<u64>(), Some(&2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn keys_of_different_types_never_collide() {
        let identity = Config::new().with("host", "svc");
        assert_ne!(
            SharedKey::new("http-endpoint", &identity),
            SharedKey::new("grpc", &identity)
        );
        assert_eq!(
            SharedKey::new("grpc", &identity).to_string(),
            r#"grpc#{"host":"svc"}"#
        );
    }
}
