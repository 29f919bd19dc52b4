use crate::case::{TckCase, TckSuite};
use crate::support::{Harness, shared_vec};
use spark_discovery::ReleaseOutcome;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

const CASES: &[TckCase] = &[
    TckCase {
        name: "concurrent_acquire_builds_once",
        test: concurrent_acquire_builds_once,
    },
    TckCase {
        name: "concurrent_shared_acquire_builds_once",
        test: concurrent_shared_acquire_builds_once,
    },
    TckCase {
        name: "concurrent_release_tears_down_once",
        test: concurrent_release_tears_down_once,
    },
    TckCase {
        name: "concurrent_shared_release_tears_down_once",
        test: concurrent_shared_release_tears_down_once,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "concurrency",
    cases: CASES,
};

/// 返回“并发”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// 多线程同时获取同一引用：只建连一次，所有线程观察到同一实例。
///
/// # 教案式说明
/// - **逻辑 (How)**：`Barrier` 让所有线程同时起跑，收集到的客户端两两比较指针；
/// - **风险提示**：若被测类型的 `connect` 本身不是线程安全的，本用例可能以 panic 之外的方式暴露问题。
fn concurrent_acquire_builds_once(harness: &Harness) {
    let reference = Arc::new(harness.bind(false));
    let barrier = Arc::new(Barrier::new(THREADS));
    let clients = shared_vec();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let reference = Arc::clone(&reference);
            let barrier = Arc::clone(&barrier);
            let clients = Arc::clone(&clients);
            scope.spawn(move || {
                barrier.wait();
                let client = reference.acquire().expect("并发获取必须成功");
                clients.lock().push(client);
            });
        }
    });

    let clients = clients.lock();
    assert_eq!(clients.len(), THREADS);
    assert!(
        clients.iter().all(|client| client.ptr_eq(&clients[0])),
        "所有线程必须观察到同一实例"
    );
    assert_eq!(harness.counting().connects(), 1, "并发获取只能建连一次");
}

/// 多个共享引用并发获取：同一共享键只建连一次，全部释放后断开一次。
fn concurrent_shared_acquire_builds_once(harness: &Harness) {
    let references: Vec<_> = (0..THREADS).map(|_| harness.bind(true)).collect();
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for reference in &references {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                reference.acquire().expect("并发获取必须成功");
            });
        }
    });
    assert_eq!(harness.counting().connects(), 1, "同一共享键只能建连一次");

    for reference in &references {
        reference.release().expect("释放不应失败");
    }
    assert_eq!(harness.counting().teardowns(), 1);
    assert!(harness.shared().is_empty());
}

/// 多线程同时释放同一引用：恰好一个 `Closed`，其余 `Idle`，断开一次。
fn concurrent_release_tears_down_once(harness: &Harness) {
    let reference = harness.bind(false);
    reference.acquire().expect("获取必须成功");
    let barrier = Barrier::new(THREADS);
    let outcomes = shared_vec();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let (reference, barrier, outcomes) = (&reference, &barrier, &outcomes);
            scope.spawn(move || {
                barrier.wait();
                let outcome = reference.release().expect("并发释放不应失败");
                outcomes.lock().push(outcome);
            });
        }
    });

    let outcomes = outcomes.lock();
    let closed = outcomes
        .iter()
        .filter(|outcome| **outcome == ReleaseOutcome::Closed)
        .count();
    assert_eq!(closed, 1, "只能有一个线程真正关闭客户端");
    assert!(
        outcomes
            .iter()
            .filter(|outcome| **outcome != ReleaseOutcome::Closed)
            .all(|outcome| *outcome == ReleaseOutcome::Idle),
        "其余释放必须是空操作"
    );
    assert_eq!(harness.counting().teardowns(), 1, "并发释放只能断开一次");
}

/// 多个共享持有者同时释放：只有最后一个持有者断开。
fn concurrent_shared_release_tears_down_once(harness: &Harness) {
    let references: Vec<_> = (0..THREADS).map(|_| harness.bind(true)).collect();
    for reference in &references {
        reference.acquire().expect("获取必须成功");
    }
    let barrier = Barrier::new(THREADS);
    let outcomes = shared_vec();

    thread::scope(|scope| {
        for reference in &references {
            let (barrier, outcomes) = (&barrier, &outcomes);
            scope.spawn(move || {
                barrier.wait();
                let outcome = reference.release().expect("并发释放不应失败");
                outcomes.lock().push(outcome);
            });
        }
    });

    let closed = outcomes
        .lock()
        .iter()
        .filter(|outcome| **outcome == ReleaseOutcome::Closed)
        .count();
    assert_eq!(closed, 1, "只有最后一个持有者负责断开");
    assert_eq!(harness.counting().connects(), 1);
    assert_eq!(harness.counting().teardowns(), 1);
    assert!(harness.shared().is_empty());
}
