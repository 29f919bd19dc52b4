//! 并发获取/释放的竞态测试。
//!
//! - **Why**：引用锁与共享键锁是“只构建一次”“持有者为正时绝不断开”两条不变量的唯一保障，
//!   必须在真实线程竞争下验证；
//! - **How**：以 `Barrier` 让所有线程同时起跑，连接器人为放大建连耗时以扩大竞争窗口；
//! - **What**：断言构建次数、实例同一性与最终的建连/断开平衡。

mod support;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use spark_discovery::types::HttpLocation;
use spark_discovery::{Config, ReleaseOutcome, ServiceClient};

use support::{RecordingConnector, binder};

const THREADS: usize = 8;

/// ## 测试一：同一引用上的并发获取
///
/// - **契约 (What)**：N 个线程同时 `acquire()`，只构建一次且全部观察到同一实例。
#[test]
fn concurrent_acquire_on_one_reference_builds_once() {
    let connector = RecordingConnector::new();
    connector.delay_connect(Duration::from_millis(20));
    let reference = binder(&connector)
        .bind(&HttpLocation::new("svc.local", 8080).record("orders"), &Config::new())
        .expect("绑定必须成功");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let reference = Arc::clone(&reference);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reference.acquire().expect("并发获取必须成功")
            })
        })
        .collect();
    let clients: Vec<ServiceClient> = handles
        .into_iter()
        .map(|handle| handle.join().expect("工作线程不得 panic"))
        .collect();

    assert_eq!(connector.connects(), 1, "并发获取只能构建一次");
    assert!(
        clients.iter().all(|client| client.ptr_eq(&clients[0])),
        "所有线程必须观察到同一实例"
    );
}

/// ## 测试二：不同引用并发获取同一共享键
#[test]
fn concurrent_shared_acquire_across_references_builds_once() {
    let connector = RecordingConnector::new();
    connector.delay_connect(Duration::from_millis(20));
    let binder = binder(&connector);
    let record = HttpLocation::new("svc.local", 8080)
        .record("orders")
        .with_metadata("shared", true);
    let references: Vec<_> = (0..THREADS)
        .map(|_| binder.bind(&record, &Config::new()).expect("绑定必须成功"))
        .collect();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = references
        .iter()
        .map(|reference| {
            let reference = Arc::clone(reference);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reference.acquire().expect("并发获取必须成功")
            })
        })
        .collect();
    let clients: Vec<ServiceClient> = handles
        .into_iter()
        .map(|handle| handle.join().expect("工作线程不得 panic"))
        .collect();

    assert_eq!(connector.connects(), 1, "同一共享键只能构建一次");
    assert!(clients.iter().all(|client| client.ptr_eq(&clients[0])));
    let key = binder.shared().keys().pop().expect("共享注册表必须登记该键");
    assert_eq!(binder.shared().holders(&key), THREADS);

    for reference in &references {
        reference.release().expect("释放不应失败");
    }
    assert_eq!(connector.disconnects(), 1, "最后一个持有者释放时恰好断开一次");
    assert!(binder.shared().is_empty());
}

/// ## 测试三：获取与释放交错
///
/// - **意图 (Why)**：释放线程可能在另一线程拿到过期槽位时移除条目，验证重试路径不会丢失客户端
///   或泄漏连接；
/// - **契约 (What)**：循环结束并全部释放后，建连次数与断开次数相等，共享注册表为空。
#[test]
fn interleaved_acquire_and_release_stay_balanced() {
    const ROUNDS: usize = 200;

    let connector = RecordingConnector::new();
    let binder = binder(&connector);
    let record = HttpLocation::new("svc.local", 8080)
        .record("orders")
        .with_metadata("shared", true);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let reference = binder.bind(&record, &Config::new()).expect("绑定必须成功");
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    let client = reference.acquire().expect("获取必须成功");
                    assert!(reference.cached().is_some_and(|cached| cached.ptr_eq(&client)));
                    reference.release().expect("释放不应失败");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("工作线程不得 panic");
    }

    assert!(connector.connects() >= 1);
    assert_eq!(
        connector.connects(),
        connector.disconnects(),
        "每个建立的客户端都必须恰好断开一次"
    );
    assert!(binder.shared().is_empty(), "全部释放后不得残留条目");
}

/// ## 测试四：同一引用上的并发释放
///
/// - **契约 (What)**：N 个线程同时 `release()`，恰好一个得到 `Closed` 并断开一次，其余均为 `Idle`。
#[test]
fn concurrent_release_on_one_reference_tears_down_once() {
    let connector = RecordingConnector::new();
    let reference = binder(&connector)
        .bind(&HttpLocation::new("svc.local", 8080).record("orders"), &Config::new())
        .expect("绑定必须成功");
    reference.acquire().expect("获取必须成功");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let reference = Arc::clone(&reference);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reference.release().expect("并发释放不应失败")
            })
        })
        .collect();
    let outcomes: Vec<ReleaseOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("工作线程不得 panic"))
        .collect();

    let closed = outcomes
        .iter()
        .filter(|outcome| **outcome == ReleaseOutcome::Closed)
        .count();
    let idle = outcomes
        .iter()
        .filter(|outcome| **outcome == ReleaseOutcome::Idle)
        .count();
    assert_eq!(closed, 1, "只能有一个线程真正关闭客户端");
    assert_eq!(idle, THREADS - 1);
    assert_eq!(connector.disconnects(), 1, "并发释放只能断开一次");
}

/// ## 测试五：多个共享持有者并发释放
///
/// - **契约 (What)**：恰好一个持有者观察到 `Closed`，其余观察到 `Detached`，断开一次且注册表清空。
#[test]
fn concurrent_release_of_shared_holders_tears_down_once() {
    let connector = RecordingConnector::new();
    let binder = binder(&connector);
    let record = HttpLocation::new("svc.local", 8080)
        .record("orders")
        .with_metadata("shared", true);
    let references: Vec<_> = (0..THREADS)
        .map(|_| {
            let reference = binder.bind(&record, &Config::new()).expect("绑定必须成功");
            reference.acquire().expect("获取必须成功");
            reference
        })
        .collect();
    assert_eq!(connector.connects(), 1);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = references
        .iter()
        .map(|reference| {
            let reference = Arc::clone(reference);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reference.release().expect("并发释放不应失败")
            })
        })
        .collect();
    let outcomes: Vec<ReleaseOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("工作线程不得 panic"))
        .collect();

    let closed = outcomes
        .iter()
        .filter(|outcome| **outcome == ReleaseOutcome::Closed)
        .count();
    let detached = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ReleaseOutcome::Detached { .. }))
        .count();
    assert_eq!(closed, 1, "只有最后一个持有者负责断开");
    assert_eq!(detached, THREADS - 1);
    assert_eq!(connector.disconnects(), 1);
    assert!(binder.shared().is_empty());
}
