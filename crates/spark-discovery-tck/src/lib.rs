//! 服务发现资源类型契约测试套件（TCK）入口。
//!
//! # 教案式综述（Why / How / What）
//! - **为什么存在**：第三方资源类型（消息队列、缓存、对象存储……）只实现 `ResourceType`，
//!   但运行时对它们有隐含要求：`resolve`/`identity` 必须确定、`connect` 每次产出新实例、
//!   `disconnect` 对每个实例恰好调用一次。本 crate 把这些要求固化为可复用的断言。
//! - **如何集成**：在目标仓库的 `tests` 目录下调用 [`run_resource_type_suite`]，传入能产生
//!   [`ResourceTypeFixture`] 的闭包即可；每个用例都会拿到一份全新的夹具与独立的共享注册表。
//! - **测试对象**：生命周期（幂等获取/释放、重建、退役）、共享（同身份复用、非共享隔离、
//!   身份确定性）与并发（同一引用并发获取只构建一次、并发释放只断开一次）。
//!
//! # 契约说明（What）
//! - **输入要求**：夹具中的记录必须是被测类型可以成功建连的合法记录；
//! - **输出保证**：全部通过即说明该类型可以安全地放入 `TypeRegistry` 与其他类型并存；
//! - 失败时 panic 信息带有 `[discovery-tck::<类型>::<用例>]` 前缀。
//!
//! # 风险提示（Trade-offs）
//! - 套件会真实调用被测类型的 `connect`/`disconnect`，需要网络的实现应在夹具中注入替身连接器。

mod concurrency;
mod lifecycle;
mod sharing;
mod support;

use std::sync::Arc;

use spark_discovery::{Config, DynResourceType, Record};

use case::{TckSuite, run_suite};
pub use support::{CountingResourceType, Journal};

const ALL_SUITES: [&TckSuite; 3] = [lifecycle::suite(), sharing::suite(), concurrency::suite()];

/// 被测资源类型及一条可用的记录。
#[derive(Clone)]
pub struct ResourceTypeFixture {
    pub handler: Arc<dyn DynResourceType>,
    pub record: Record,
    /// 绑定时附加的调用方配置；TCK 会在其上覆盖 `shared`。
    pub config: Config,
}

impl ResourceTypeFixture {
    pub fn new(handler: Arc<dyn DynResourceType>, record: Record) -> Self {
        Self {
            handler,
            record,
            config: Config::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

mod case {
    use super::ResourceTypeFixture;
    use super::support::{self, Harness};
    use std::panic;

    /// 表示单个 TCK 用例的元信息。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：以结构体封装测试函数与名称，便于统一遍历并在失败时打印上下文；
    /// - **契约 (What)**：`test` 必须在失败时 `panic`。
    #[derive(Clone, Copy)]
    pub struct TckCase {
        pub name: &'static str,
        pub test: fn(&Harness),
    }

    /// 同一主题的一组用例。
    #[derive(Clone, Copy)]
    pub struct TckSuite {
        pub name: &'static str,
        pub cases: &'static [TckCase],
    }

    /// 为每个用例构造新的夹具并在捕获 panic 的前提下执行。
    pub fn run_suite(suite: &TckSuite, fixture: &dyn Fn() -> ResourceTypeFixture) {
        assert!(!suite.cases.is_empty(), "TCK 套件不应为空");
        for case in suite.cases {
            let harness = Harness::new(fixture());
            let type_name = harness.record().type_name().to_owned();
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| (case.test)(&harness)));
            if let Err(payload) = outcome {
                support::panic_with_context(
                    &type_name,
                    &format!("{}::{}", suite.name, case.name),
                    payload,
                );
            }
        }
    }
}

/// 运行全部主题。
pub fn run_resource_type_suite<F>(fixture: F)
where
    F: Fn() -> ResourceTypeFixture,
{
    for suite in ALL_SUITES {
        run_suite(suite, &fixture);
    }
}

/// 只运行生命周期主题：幂等获取/释放、释放后重建、退役。
pub fn run_lifecycle_suite<F>(fixture: F)
where
    F: Fn() -> ResourceTypeFixture,
{
    run_suite(lifecycle::suite(), &fixture);
}

/// 只运行共享主题。
pub fn run_sharing_suite<F>(fixture: F)
where
    F: Fn() -> ResourceTypeFixture,
{
    run_suite(sharing::suite(), &fixture);
}

/// 只运行并发主题。
pub fn run_concurrency_suite<F>(fixture: F)
where
    F: Fn() -> ResourceTypeFixture,
{
    run_suite(concurrency::suite(), &fixture);
}
