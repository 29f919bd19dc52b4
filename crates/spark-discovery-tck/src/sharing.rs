use crate::case::{TckCase, TckSuite};
use crate::support::{Harness, Journal};
use spark_discovery::ReleaseOutcome;

const CASES: &[TckCase] = &[
    TckCase {
        name: "identity_is_deterministic",
        test: identity_is_deterministic,
    },
    TckCase {
        name: "shared_references_share_one_client",
        test: shared_references_share_one_client,
    },
    TckCase {
        name: "unshared_references_are_isolated",
        test: unshared_references_are_isolated,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "sharing",
    cases: CASES,
};

/// 返回“共享”主题的测试套件。
///
/// # 教案式说明
/// - **意图 (Why)**：共享判定依赖被测类型的 `identity`，不确定的身份会让共享失效或错误复用；
/// - **契约 (What)**：返回 `'static` 引用。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// 同一输入两次解析得到相同共享键，`shared` 不同则键不同。
fn identity_is_deterministic(harness: &Harness) {
    let handler = harness.handler();
    let first = handler
        .prepare(harness.record(), &harness.config(true))
        .expect("合法记录必须解析成功");
    let second = handler
        .prepare(harness.record(), &harness.config(true))
        .expect("合法记录必须解析成功");
    let unshared = handler
        .prepare(harness.record(), &harness.config(false))
        .expect("合法记录必须解析成功");

    assert_eq!(first.key(), second.key(), "身份键必须确定");
    assert_eq!(first.key().type_name(), handler.type_name());
    assert_ne!(first.key(), unshared.key(), "共享与非共享不得使用同一键");
    assert!(first.is_shared());
    assert!(!unshared.is_shared());
    assert_eq!(harness.counting().connects(), 0, "解析不得建连");
}

/// 同身份的共享引用复用同一实例，最后一个释放者负责断开。
fn shared_references_share_one_client(harness: &Harness) {
    let left = harness.bind(true);
    let right = harness.bind(true);

    let left_client = left.acquire().expect("获取必须成功");
    let right_client = right.acquire().expect("获取必须成功");
    assert!(left_client.ptr_eq(&right_client), "同身份必须共享实例");
    assert_eq!(harness.counting().connects(), 1);
    assert_eq!(harness.shared().len(), 1);

    assert_eq!(
        left.release().expect("释放不应失败"),
        ReleaseOutcome::Detached { holders: 1 }
    );
    assert_eq!(harness.counting().teardowns(), 0, "仍有持有者时不得断开");

    assert_eq!(right.release().expect("释放不应失败"), ReleaseOutcome::Closed);
    assert_eq!(
        harness.counting().journal(),
        vec![Journal::Connected, Journal::TornDown]
    );
    assert!(harness.shared().is_empty());
}

/// 非共享引用各自建连、各自断开。
fn unshared_references_are_isolated(harness: &Harness) {
    let left = harness.bind(false);
    let right = harness.bind(false);

    let left_client = left.acquire().expect("获取必须成功");
    let right_client = right.acquire().expect("获取必须成功");
    assert!(!left_client.ptr_eq(&right_client), "非共享引用不得复用实例");
    assert!(harness.shared().is_empty());

    left.release().expect("释放不应失败");
    assert_eq!(harness.counting().teardowns(), 1);
    assert!(right.cached().is_some(), "释放一个引用不得影响另一个");
    right.release().expect("释放不应失败");
    assert_eq!(harness.counting().teardowns(), 2);
}
