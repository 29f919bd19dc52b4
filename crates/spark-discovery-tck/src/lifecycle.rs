use crate::case::{TckCase, TckSuite};
use crate::support::{Harness, Journal};
use spark_discovery::{DiscoveryError, ReferenceState, ReleaseOutcome};

const CASES: &[TckCase] = &[
    TckCase {
        name: "acquire_is_idempotent_within_a_cycle",
        test: acquire_is_idempotent_within_a_cycle,
    },
    TckCase {
        name: "release_is_idempotent",
        test: release_is_idempotent,
    },
    TckCase {
        name: "reacquire_after_release_rebuilds",
        test: reacquire_after_release_rebuilds,
    },
    TckCase {
        name: "retired_reference_rejects_acquire",
        test: retired_reference_rejects_acquire,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "lifecycle",
    cases: CASES,
};

/// 返回“生命周期”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// 同一获取周期内重复 `acquire()` 返回同一实例，且只建连一次。
fn acquire_is_idempotent_within_a_cycle(harness: &Harness) {
    let reference = harness.bind(false);

    let first = reference.acquire().expect("首次获取必须成功");
    let second = reference.acquire().expect("重复获取必须成功");

    assert!(first.ptr_eq(&second), "同一周期内必须返回同一实例");
    assert_eq!(harness.counting().connects(), 1, "只能建连一次");
    assert_eq!(reference.state(), ReferenceState::Cached);
}

/// 重复 `release()` 只断开一次。
///
/// # 教案式说明
/// - **契约 (What)**：第一次释放返回 `Closed`，第二次返回 `Idle`，断开计数恰为 1。
fn release_is_idempotent(harness: &Harness) {
    let reference = harness.bind(false);
    reference.acquire().expect("获取必须成功");

    assert_eq!(
        reference.release().expect("首次释放不应失败"),
        ReleaseOutcome::Closed
    );
    assert_eq!(
        reference.release().expect("重复释放不应失败"),
        ReleaseOutcome::Idle
    );
    assert_eq!(harness.counting().teardowns(), 1, "重复释放只能断开一次");
}

/// 释放后再次获取必须建立新实例。
fn reacquire_after_release_rebuilds(harness: &Harness) {
    let reference = harness.bind(false);
    let first = reference.acquire().expect("获取必须成功");
    reference.release().expect("释放不应失败");

    let second = reference.acquire().expect("再次获取必须成功");

    assert!(!first.ptr_eq(&second), "释放后不得复用旧实例");
    assert_eq!(
        harness.counting().journal(),
        vec![Journal::Connected, Journal::TornDown, Journal::Connected]
    );
}

/// 退役后的引用拒绝获取，且不再建连。
fn retired_reference_rejects_acquire(harness: &Harness) {
    let reference = harness.bind(false);
    reference.acquire().expect("获取必须成功");

    reference.retire().expect("退役不应失败");

    assert!(matches!(
        reference.acquire(),
        Err(DiscoveryError::ReferenceRetired { .. })
    ));
    assert_eq!(reference.state(), ReferenceState::Retired);
    assert_eq!(harness.counting().connects(), 1);
    assert_eq!(harness.counting().teardowns(), 1);
}
