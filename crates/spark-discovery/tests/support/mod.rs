//! 集成测试共用的连接器替身与装配函数。
//!
//! - **Why**：内置资源类型只产出选项，真实客户端由连接器注入；测试用 [`RecordingConnector`]
//!   记录建连/断开次数并按需注入失败，从而在不触网的前提下验证生命周期契约。
//! - **What**：同一个 `RecordingConnector` 的克隆共享计数器，可同时注入多个资源类型。

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use spark_discovery::types::{GrpcChannel, HttpEndpoint, JdbcDataSource};
use spark_discovery::{BoxError, Connector, ReferenceBinder, SharedClientRegistry, TypeRegistry};

#[derive(Default)]
pub struct Counters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    connect_delay_ms: AtomicU64,
}

/// 记录型连接器。
#[derive(Clone, Default)]
pub struct RecordingConnector {
    counters: Arc<Counters>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.counters.disconnects.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.counters.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.counters.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// 放大建连窗口，让并发测试更容易撞上竞争。
    pub fn delay_connect(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.counters.connect_delay_ms.store(millis, Ordering::SeqCst);
    }
}

/// 假客户端：保存建连序号与收到的选项。
#[derive(Debug)]
pub struct FakeClient<O> {
    pub serial: usize,
    pub options: O,
    closed: AtomicBool,
}

impl<O> FakeClient<O> {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<O> Connector<O> for RecordingConnector
where
    O: Clone + Send + Sync + 'static,
{
    type Client = FakeClient<O>;

    fn connect(&self, options: &O) -> Result<FakeClient<O>, BoxError> {
        let delay = self.counters.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.counters.fail_connect.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        let serial = self.counters.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeClient {
            serial,
            options: options.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn disconnect(&self, client: &FakeClient<O>) -> Result<(), BoxError> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        client.closed.store(true, Ordering::SeqCst);
        if self.counters.fail_disconnect.load(Ordering::SeqCst) {
            return Err("broken pipe".into());
        }
        Ok(())
    }
}

/// 注册全部内置资源类型，均使用同一连接器。
pub fn builtin_types(connector: &RecordingConnector) -> Arc<TypeRegistry> {
    let types = Arc::new(TypeRegistry::new());
    types
        .register(HttpEndpoint::new(connector.clone()))
        .expect("注册 http-endpoint 必须成功");
    types
        .register(JdbcDataSource::new(connector.clone()))
        .expect("注册 jdbc 必须成功");
    types
        .register(GrpcChannel::new(connector.clone()))
        .expect("注册 grpc 必须成功");
    types
}

/// 使用独立共享注册表的绑定器，测试之间互不干扰。
pub fn binder(connector: &RecordingConnector) -> ReferenceBinder {
    ReferenceBinder::new(
        builtin_types(connector),
        Arc::new(SharedClientRegistry::new()),
    )
}
