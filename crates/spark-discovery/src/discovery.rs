//! 内存版服务发现门面。
//!
//! ## 定位（Why）
//! - 提供“发布记录 → 按条件查询 → 取得引用 → 释放”的完整闭环，便于嵌入式使用与测试；
//! - 真正的注册中心（复制、一致性、跨进程通知）不在本 crate 范围内，门面只维护进程内记录表。
//!
//! ## 契约（What）
//! - 发布时分配注册标识，状态为 `UNKNOWN` 的记录按 `UP` 发布；
//! - 查询默认只返回 `UP` 记录；
//! - 门面持有每个由它分发的引用，[`ServiceDiscovery::release`] 或 [`ServiceDiscovery::close`]
//!   时退役引用并停止跟踪；
//! - 监听器在任何内部锁之外同步调用。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::binder::ReferenceBinder;
use crate::config::Config;
use crate::error::DiscoveryError;
use crate::record::{Record, RecordFilter, RegistrationId, Status};
use crate::reference::{ReferenceId, ReleaseOutcome, ServiceReference};

/// 门面对外广播的事件。
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryEvent {
    Published(Record),
    /// 记录已下线，携带的副本状态为 `DOWN`。
    Unpublished(Record),
    Updated(Record),
    Bound {
        reference: ReferenceId,
        record: String,
    },
    Released {
        reference: ReferenceId,
        record: String,
        outcome: ReleaseOutcome,
    },
}

type Listener = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

struct DiscoveryInner {
    binder: ReferenceBinder,
    records: RwLock<BTreeMap<RegistrationId, Record>>,
    bindings: Mutex<BTreeMap<ReferenceId, Arc<ServiceReference>>>,
    listeners: RwLock<Vec<Listener>>,
    next_registration: AtomicU64,
}

impl DiscoveryInner {
    fn emit(&self, event: &DiscoveryEvent) {
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

/// 服务发现门面。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方以记录为中心工作，不直接接触类型注册表与共享注册表；
/// - **逻辑 (How)**：记录表使用 `RwLock<BTreeMap>`，以注册标识排序，保证查询结果稳定；
///   引用的释放回调只持有门面的弱引用，门面销毁后回调自动失效；
/// - **风险 (Trade-offs)**：克隆门面共享同一内部状态，适合在多线程间传递。
#[derive(Clone)]
pub struct ServiceDiscovery {
    inner: Arc<DiscoveryInner>,
}

impl ServiceDiscovery {
    pub fn new(binder: ReferenceBinder) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                binder,
                records: RwLock::new(BTreeMap::new()),
                bindings: Mutex::new(BTreeMap::new()),
                listeners: RwLock::new(Vec::new()),
                next_registration: AtomicU64::new(1),
            }),
        }
    }

    pub fn binder(&self) -> &ReferenceBinder {
        &self.inner.binder
    }

    /// 发布记录，返回带有注册标识的副本。
    pub fn publish(&self, record: Record) -> Record {
        let mut record = record;
        let sequence = self.inner.next_registration.fetch_add(1, Ordering::Relaxed);
        let registration = RegistrationId::new(format!("reg-{sequence:08}"));
        record.set_registration(registration.clone());
        if record.status() == Status::Unknown {
            record.set_status(Status::Up);
        }

        self.inner
            .records
            .write()
            .insert(registration.clone(), record.clone());
        info!(
            discovery.record.name = record.name(),
            discovery.resource.type = record.type_name(),
            discovery.registration = %registration,
            "record published"
        );
        self.inner.emit(&DiscoveryEvent::Published(record.clone()));
        record
    }

    /// 下线记录，返回状态为 `DOWN` 的副本。
    pub fn unpublish(&self, registration: &RegistrationId) -> Result<Record, DiscoveryError> {
        let mut record = self
            .inner
            .records
            .write()
            .remove(registration)
            .ok_or_else(|| unknown_registration(Some(registration)))?;
        record.set_status(Status::Down);
        info!(
            discovery.record.name = record.name(),
            discovery.registration = %registration,
            "record unpublished"
        );
        self.inner.emit(&DiscoveryEvent::Unpublished(record.clone()));
        Ok(record)
    }

    /// 以注册标识替换已发布的记录。
    ///
    /// 已绑定的引用持有旧记录的副本，不受更新影响。
    pub fn update(&self, record: Record) -> Result<Record, DiscoveryError> {
        let registration = record
            .registration()
            .cloned()
            .ok_or_else(|| unknown_registration(None))?;
        {
            let mut records = self.inner.records.write();
            let slot = records
                .get_mut(&registration)
                .ok_or_else(|| unknown_registration(Some(&registration)))?;
            *slot = record.clone();
        }
        info!(
            discovery.record.name = record.name(),
            discovery.registration = %registration,
            status = %record.status(),
            "record updated"
        );
        self.inner.emit(&DiscoveryEvent::Updated(record.clone()));
        Ok(record)
    }

    /// 第一条满足条件的记录，按注册标识顺序。
    pub fn get_record(&self, filter: &RecordFilter) -> Option<Record> {
        self.inner
            .records
            .read()
            .values()
            .find(|record| accepts(filter, record))
            .cloned()
    }

    pub fn get_records(&self, filter: &RecordFilter) -> Vec<Record> {
        self.inner
            .records
            .read()
            .values()
            .filter(|record| accepts(filter, record))
            .cloned()
            .collect()
    }

    /// 以空调用方配置取得引用。
    pub fn get_reference(&self, record: &Record) -> Result<Arc<ServiceReference>, DiscoveryError> {
        self.get_reference_with_config(record, &Config::new())
    }

    /// 绑定记录并开始跟踪返回的引用。
    pub fn get_reference_with_config(
        &self,
        record: &Record,
        config: &Config,
    ) -> Result<Arc<ServiceReference>, DiscoveryError> {
        let reference = self.inner.binder.bind(record, config)?;

        let weak: Weak<DiscoveryInner> = Arc::downgrade(&self.inner);
        reference.on_release(Box::new(
            move |reference: &ServiceReference, outcome: ReleaseOutcome| {
                if let Some(inner) = weak.upgrade() {
                    inner.emit(&DiscoveryEvent::Released {
                        reference: reference.id(),
                        record: reference.record().name().to_owned(),
                        outcome,
                    });
                }
            },
        ));

        self.inner
            .bindings
            .lock()
            .insert(reference.id(), Arc::clone(&reference));
        self.inner.emit(&DiscoveryEvent::Bound {
            reference: reference.id(),
            record: record.name().to_owned(),
        });
        Ok(reference)
    }

    /// 当前由门面跟踪的引用快照。
    pub fn bindings(&self) -> Vec<Arc<ServiceReference>> {
        self.inner.bindings.lock().values().cloned().collect()
    }

    /// 退役引用并停止跟踪。
    pub fn release(&self, reference: &ServiceReference) -> Result<ReleaseOutcome, DiscoveryError> {
        let tracked = self.inner.bindings.lock().remove(&reference.id());
        let outcome = reference.retire();
        drop(tracked);
        outcome
    }

    /// 注册事件监听器。
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&DiscoveryEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    /// 退役所有被跟踪的引用。
    ///
    /// 逐个退役，单个失败不会中断其余引用；返回遇到的第一个错误。
    pub fn close(&self) -> Result<(), DiscoveryError> {
        let bindings = std::mem::take(&mut *self.inner.bindings.lock());
        let mut first_error = None;
        for reference in bindings.into_values() {
            if let Err(err) = reference.retire() {
                warn!(
                    discovery.reference.id = %reference.id(),
                    discovery.record.name = reference.record().name(),
                    error.code = err.code(),
                    error = %err,
                    "failed to release client while closing discovery"
                );
                first_error.get_or_insert(err);
            }
        }
        info!("service discovery closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ServiceDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDiscovery")
            .field("records", &self.inner.records.read().len())
            .field("bindings", &self.inner.bindings.lock().len())
            .finish_non_exhaustive()
    }
}

fn accepts(filter: &RecordFilter, record: &Record) -> bool {
    (!filter.restricts_to_up() || record.status() == Status::Up) && record.matches(filter)
}

fn unknown_registration(registration: Option<&RegistrationId>) -> DiscoveryError {
    DiscoveryError::UnknownRegistration {
        registration: registration.map(ToString::to_string).unwrap_or_default(),
    }
}
