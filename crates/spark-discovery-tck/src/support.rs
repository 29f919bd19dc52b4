use parking_lot::Mutex;
use spark_discovery::{
    Config, DiscoveryError, DynResourceType, Record, Resolution, ServiceClient,
    SharedClientRegistry, ServiceReference, bind,
};
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ResourceTypeFixture;

/// 给失败用例的 panic 信息加上 `[discovery-tck::<类型>::<主题>::<用例>]` 前缀后继续展开。
///
/// 非字符串负载只保留前缀与占位说明。
pub fn panic_with_context(
    resource_type: &str,
    case: &str,
    payload: Box<dyn std::any::Any + Send>,
) -> ! {
    let cause = payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<非字符串 panic 负载>".to_owned());
    panic::resume_unwind(Box::new(format!(
        "[discovery-tck::{resource_type}::{case}] {cause}"
    )))
}

/// 创建线程安全的 `Vec` 收集器。
pub fn shared_vec<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// 被测资源类型上发生的生命周期事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Journal {
    Connected,
    TornDown,
}

/// 包装被测资源类型，统计建连与断开。
///
/// # 教案式说明
/// - **意图 (Why)**：TCK 不了解被测类型的客户端，只能在对象层边界上观察调用次数；
/// - **契约 (What)**：只记录成功的 `connect`/`teardown`，失败原样上抛且不计数。
pub struct CountingResourceType {
    inner: Arc<dyn DynResourceType>,
    connects: AtomicUsize,
    teardowns: AtomicUsize,
    journal: Arc<Mutex<Vec<Journal>>>,
}

impl CountingResourceType {
    pub fn new(inner: Arc<dyn DynResourceType>) -> Self {
        Self {
            inner,
            connects: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            journal: shared_vec(),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<Journal> {
        self.journal.lock().clone()
    }
}

impl DynResourceType for CountingResourceType {
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn prepare(&self, record: &Record, caller: &Config) -> Result<Resolution, DiscoveryError> {
        self.inner.prepare(record, caller)
    }

    fn connect(&self, resolution: &Resolution) -> Result<ServiceClient, DiscoveryError> {
        let client = self.inner.connect(resolution)?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(Journal::Connected);
        Ok(client)
    }

    fn teardown(&self, client: &ServiceClient) -> Result<(), DiscoveryError> {
        self.inner.teardown(client)?;
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(Journal::TornDown);
        Ok(())
    }
}

/// 单个用例的运行环境：计数包装后的资源类型与独立的共享注册表。
pub struct Harness {
    fixture: ResourceTypeFixture,
    counting: Arc<CountingResourceType>,
    shared: Arc<SharedClientRegistry>,
}

impl Harness {
    pub fn new(fixture: ResourceTypeFixture) -> Self {
        let counting = Arc::new(CountingResourceType::new(Arc::clone(&fixture.handler)));
        Self {
            fixture,
            counting,
            shared: Arc::new(SharedClientRegistry::new()),
        }
    }

    pub fn counting(&self) -> &CountingResourceType {
        &self.counting
    }

    pub fn shared(&self) -> &SharedClientRegistry {
        &self.shared
    }

    pub fn handler(&self) -> Arc<dyn DynResourceType> {
        Arc::clone(&self.counting) as Arc<dyn DynResourceType>
    }

    pub fn record(&self) -> &Record {
        &self.fixture.record
    }

    /// 以 `shared` 取值覆盖夹具配置后绑定。
    pub fn bind(&self, shared: bool) -> ServiceReference {
        bind(
            &self.fixture.record,
            self.handler(),
            &self.config(shared),
            Arc::clone(&self.shared),
        )
    }

    pub fn config(&self, shared: bool) -> Config {
        self.fixture.config.clone().with("shared", shared)
    }
}
