//! 服务引用：一条记录与一份调用方配置绑定后的生命周期对象。
//!
//! ## 状态机（What）
//! ```text
//! Unbound --acquire--> Cached --release--> Unbound --> ... --retire--> Retired
//! ```
//! - `acquire` 在 `Cached` 时直接返回缓存，在 `Unbound` 时于引用互斥锁内构建一次；
//! - `release` 在 `Unbound`/`Retired` 时为空操作；
//! - `Retired` 为终态，之后的 `acquire` 返回 [`DiscoveryError::ReferenceRetired`]。
//!
//! ## 并发（How）
//! - 每个引用一把 `parking_lot::Mutex`，覆盖“检查并构建”与“释放并断开”两个临界区，
//!   因此 N 个线程并发 `acquire` 只会构建一次，且释放与获取不会交错；
//! - 释放回调在锁外执行，回调内部再次访问本引用不会死锁。

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::DiscoveryError;
use crate::record::Record;
use crate::resource::{self, DynResourceType, ServiceClient};
use crate::shared::{SharedClientRegistry, SharedKey, SharedRelease};

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一、单调分配的引用标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(u64);

impl ReferenceId {
    fn next() -> Self {
        Self(NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref-{}", self.0)
    }
}

/// 对外可观察的引用状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceState {
    Unbound,
    Cached,
    Retired,
}

/// 一次释放产生的效果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// 没有缓存的客户端，什么也没发生。
    Idle,
    /// 客户端已断开。
    Closed,
    /// 共享客户端仍被其他引用持有，本引用只归还了一次持有。
    Detached { holders: usize },
}

/// 引用释放客户端后的回调。
pub type ReleaseHook = Box<dyn Fn(&ServiceReference, ReleaseOutcome) + Send + Sync>;

struct CachedClient {
    client: ServiceClient,
    lease: Option<SharedKey>,
}

enum Slot {
    Unbound,
    Cached(CachedClient),
    Retired,
}

/// 服务引用。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方只持有引用，按需 `acquire()` 拿到客户端、用完 `release()`，
///   无需了解协议或连接细节；
/// - **契约 (What)**：
///   - 绑定时复制记录与配置，之后记录在发现后端的变化不影响本引用；
///   - 任意时刻至多缓存一个客户端；
///   - 建连失败时状态保持 `Unbound`，调用方可再次 `acquire()`；
///   - 非共享客户端断开失败时错误返回给调用方，但状态依旧回到 `Unbound`；
/// - **风险 (Trade-offs)**：构建在引用锁内执行，慢速建连会阻塞同一引用上的其他获取者，
///   不影响其他引用。
pub struct ServiceReference {
    id: ReferenceId,
    record: Record,
    config: Config,
    handler: Arc<dyn DynResourceType>,
    shared: Arc<SharedClientRegistry>,
    slot: Mutex<Slot>,
    release_hook: OnceLock<ReleaseHook>,
}

impl ServiceReference {
    /// 以记录副本与调用方配置创建处于 `Unbound` 的引用。
    pub fn new(
        record: Record,
        config: Config,
        handler: Arc<dyn DynResourceType>,
        shared: Arc<SharedClientRegistry>,
    ) -> Self {
        Self {
            id: ReferenceId::next(),
            record,
            config,
            handler,
            shared,
            slot: Mutex::new(Slot::Unbound),
            release_hook: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }

    /// 绑定时复制的记录。
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// 绑定时传入的调用方配置。
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn type_name(&self) -> &str {
        self.handler.type_name()
    }

    pub fn state(&self) -> ReferenceState {
        match &*self.slot.lock() {
            Slot::Unbound => ReferenceState::Unbound,
            Slot::Cached(_) => ReferenceState::Cached,
            Slot::Retired => ReferenceState::Retired,
        }
    }

    /// 获取客户端，必要时构建。
    ///
    /// # 教案式说明
    /// - **逻辑 (How)**：加锁 → 已缓存直接返回克隆 → 已退役报错 → 否则调用
    ///   [`resource::build`]（`shared = true` 时经共享注册表）并缓存结果；
    /// - **契约 (What)**：同一获取周期内多次调用返回同一实例、只构建一次；
    ///   构建失败不改变状态。
    pub fn acquire(&self) -> Result<ServiceClient, DiscoveryError> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Cached(cached) => {
                debug!(
                    discovery.reference.id = %self.id,
                    discovery.record.name = self.record.name(),
                    "service reference cache hit"
                );
                return Ok(cached.client.clone());
            }
            Slot::Retired => return Err(DiscoveryError::ReferenceRetired { id: self.id }),
            Slot::Unbound => {}
        }

        let built = resource::build(&self.handler, &self.record, &self.config, &self.shared)?;
        debug!(
            discovery.reference.id = %self.id,
            discovery.record.name = self.record.name(),
            discovery.resource.type = self.handler.type_name(),
            shared = built.lease.is_some(),
            "service reference bound client"
        );
        let client = built.client.clone();
        *slot = Slot::Cached(CachedClient {
            client: built.client,
            lease: built.lease,
        });
        Ok(client)
    }

    /// 获取并还原为具体客户端类型。
    ///
    /// 类型不符时返回 [`DiscoveryError::ClientTypeMismatch`]，已缓存的客户端保持不变。
    pub fn acquire_as<C>(&self) -> Result<Arc<C>, DiscoveryError>
    where
        C: Send + Sync + 'static,
    {
        let client = self.acquire()?;
        client
            .downcast::<C>()
            .ok_or_else(|| DiscoveryError::ClientTypeMismatch {
                expected: type_name::<C>(),
                actual: client.type_name(),
            })
    }

    /// 观察当前缓存的客户端，不触发构建。
    pub fn cached(&self) -> Option<ServiceClient> {
        match &*self.slot.lock() {
            Slot::Cached(cached) => Some(cached.client.clone()),
            Slot::Unbound | Slot::Retired => None,
        }
    }

    pub fn cached_as<C>(&self) -> Option<Arc<C>>
    where
        C: Send + Sync + 'static,
    {
        self.cached().and_then(|client| client.downcast::<C>())
    }

    /// 释放缓存的客户端，回到 `Unbound`。
    pub fn release(&self) -> Result<ReleaseOutcome, DiscoveryError> {
        let result = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Unbound) {
                Slot::Cached(cached) => self.close(cached),
                Slot::Unbound => Ok(ReleaseOutcome::Idle),
                Slot::Retired => {
                    *slot = Slot::Retired;
                    Ok(ReleaseOutcome::Idle)
                }
            }
        };
        self.notify(&result);
        result
    }

    /// 释放缓存的客户端并永久退役；重复调用为空操作。
    pub fn retire(&self) -> Result<ReleaseOutcome, DiscoveryError> {
        let result = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Retired) {
                Slot::Cached(cached) => self.close(cached),
                Slot::Unbound | Slot::Retired => Ok(ReleaseOutcome::Idle),
            }
        };
        if matches!(result, Ok(ReleaseOutcome::Idle)) {
            debug!(discovery.reference.id = %self.id, "service reference retired");
        }
        self.notify(&result);
        result
    }

    /// 安装释放回调；只能安装一次，重复安装返回 `false`。
    pub fn on_release(&self, hook: ReleaseHook) -> bool {
        self.release_hook.set(hook).is_ok()
    }

    fn close(&self, cached: CachedClient) -> Result<ReleaseOutcome, DiscoveryError> {
        let outcome = match cached.lease {
            Some(key) => match self.shared.release_shared(&key)? {
                SharedRelease::Retained { holders } => ReleaseOutcome::Detached { holders },
                SharedRelease::Closed => ReleaseOutcome::Closed,
                SharedRelease::Unknown => ReleaseOutcome::Detached { holders: 0 },
            },
            None => {
                self.handler.teardown(&cached.client)?;
                ReleaseOutcome::Closed
            }
        };
        debug!(
            discovery.reference.id = %self.id,
            discovery.record.name = self.record.name(),
            outcome = ?outcome,
            "service reference released client"
        );
        Ok(outcome)
    }

    // 断开失败时客户端同样已离开缓存，按 `Closed` 通知。
    fn notify(&self, result: &Result<ReleaseOutcome, DiscoveryError>) {
        let outcome = match result {
            Ok(ReleaseOutcome::Idle) => return,
            Ok(outcome) => *outcome,
            Err(_) => ReleaseOutcome::Closed,
        };
        if let Some(hook) = self.release_hook.get() {
            hook(self, outcome);
        }
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.id)
            .field("record", &self.record.name())
            .field("type", &self.handler.type_name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ServiceReference {
    fn drop(&mut self) {
        let Slot::Cached(cached) = std::mem::replace(self.slot.get_mut(), Slot::Retired) else {
            return;
        };
        let result = self.close(cached);
        if let Err(err) = &result {
            warn!(
                discovery.reference.id = %self.id,
                discovery.record.name = self.record.name(),
                error.code = err.code(),
                error = %err,
                "failed to release client of dropped service reference"
            );
        }
        self.notify(&result);
    }
}
