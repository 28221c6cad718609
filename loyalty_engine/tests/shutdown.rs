mod support;

use std::{sync::Arc, time::Duration};

use loyalty_common::Points;
use loyalty_engine::{
    db_types::OrderStatusType,
    BalanceManagement,
    DispatchError,
    DispatcherConfig,
    JobDispatcher,
    OrderFlowError,
    OrderManagement,
};
use support::*;

#[tokio::test]
async fn submissions_fail_after_shutdown() {
    let db = prepare_test_db().await;
    let dispatcher = JobDispatcher::new(Arc::clone(&db), fast_config());
    let handle = dispatcher.start(Arc::new(ScriptedAccrual::new())).unwrap();
    dispatcher.shutdown().await;
    // Again, for idempotency
    dispatcher.shutdown().await;
    handle.await.unwrap();

    assert!(matches!(dispatcher.submit(number("79927398713"), "alice").await, Err(DispatchError::JobChannelClosed)));
    assert!(matches!(dispatcher.try_submit(number("79927398713"), "alice"), Err(DispatchError::JobChannelClosed)));
    assert!(dispatcher.submitter().is_closed());
    assert!(matches!(dispatcher.start(Arc::new(ScriptedAccrual::new())), Err(DispatchError::JobChannelClosed)));

    // Uploads are still saved, and picked up by the next dispatcher
    let api = dispatcher.order_flow_api();
    let err = api.register_order(number("4561261212345467"), "alice").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Dispatch(DispatchError::JobChannelClosed)));
    let pending = db.fetch_pending_orders().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].number.as_str(), "4561261212345467");
}

#[tokio::test]
async fn blocked_submissions_are_released_by_shutdown() {
    let db = prepare_test_db().await;
    let config = DispatcherConfig { queue_size: 1, ..fast_config() };
    // Never started, so nothing drains the queue
    let dispatcher = JobDispatcher::new(Arc::clone(&db), config);
    dispatcher.submit(number("79927398713"), "alice").await.unwrap();
    assert!(matches!(dispatcher.try_submit(number("2377225624"), "alice"), Err(DispatchError::QueueFull)));

    let submitter = dispatcher.submitter();
    let blocked = tokio::spawn(async move { submitter.submit(number("2377225624"), "alice").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    dispatcher.shutdown().await;
    let result = tokio::time::timeout(Duration::from_secs(1), blocked).await.expect("submit deadlocked").unwrap();
    assert!(matches!(result, Err(DispatchError::JobChannelClosed)));
}

#[tokio::test]
async fn in_flight_results_are_discarded() {
    let db = prepare_test_db().await;
    let n = "79927398713";
    let accrual = Arc::new(
        ScriptedAccrual::new().with_latency(Duration::from_millis(300)).script(n, vec![processed(n, 500)]),
    );
    let dispatcher = JobDispatcher::new(Arc::clone(&db), fast_config());
    let handle = dispatcher.start(Arc::clone(&accrual)).unwrap();
    dispatcher.order_flow_api().register_order(number(n), "alice").await.unwrap();

    // Wait for the lookup to be under way, then pull the plug
    wait_for_stats(&dispatcher, |s| s.polls == 1).await;
    dispatcher.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("dispatcher did not stop").unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.credited, 0);
    assert_eq!(db.fetch_order_status("alice", &number(n)).await.unwrap(), Some(OrderStatusType::New));
    assert_eq!(db.fetch_balance("alice").await.unwrap().current, Points::default());
}

#[tokio::test]
async fn queued_jobs_are_dropped_on_shutdown() {
    let db = prepare_test_db().await;
    let numbers = ["79927398713", "4561261212345467", "2377225624", "9278923470"];
    let accrual = Arc::new(
        numbers
            .iter()
            .fold(ScriptedAccrual::new().with_latency(Duration::from_millis(200)), |a, n| a.script(n, vec![processing(n)])),
    );
    let config = DispatcherConfig { max_concurrent_jobs: 1, ..fast_config() };
    let dispatcher = JobDispatcher::new(Arc::clone(&db), config);
    let api = dispatcher.order_flow_api();
    for n in numbers {
        api.register_order(number(n), "bob").await.unwrap();
    }
    let handle = dispatcher.start(Arc::clone(&accrual)).unwrap();
    wait_for_stats(&dispatcher, |s| s.polls >= 1).await;
    dispatcher.shutdown().await;
    handle.await.unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.dropped, 3);
    assert_eq!(stats.in_flight(), 0);
    // Everything is still pending, ready to be resumed
    assert_eq!(db.fetch_pending_orders().await.unwrap().len(), 4);
}

#[tokio::test]
async fn dispatcher_starts_once() {
    let db = prepare_test_db().await;
    let dispatcher = JobDispatcher::new(Arc::clone(&db), fast_config());
    let handle = dispatcher.start(Arc::new(ScriptedAccrual::new())).unwrap();
    let clone = dispatcher.clone();
    assert!(matches!(clone.start(Arc::new(ScriptedAccrual::new())), Err(DispatchError::AlreadyRunning)));
    assert!(matches!(clone.run("http://localhost:8081"), Err(DispatchError::AlreadyRunning)));
    dispatcher.shutdown().await;
    handle.await.unwrap();
}

#[tokio::test]
async fn bad_accrual_address() {
    let db = prepare_test_db().await;
    let dispatcher = JobDispatcher::new(Arc::clone(&db), fast_config());
    assert!(matches!(dispatcher.run("http://"), Err(DispatchError::Client(_))));
}
