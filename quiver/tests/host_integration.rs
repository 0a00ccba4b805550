mod common;

use common::{counter_class, quiet_loop, watching};
use futures::executor::LocalPool;
use quiver::host;
use quiver::testing::EventRecorder;
use quiver::{Component, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_local_pool_flushes_without_manual_iter() {
    let mut pool = LocalPool::new();
    let lp = quiet_loop();
    host::integrate_local_pool(&lp, pool.spawner()).unwrap();

    let recorder = EventRecorder::new();
    let c = Component::new(&watching(&counter_class(), &recorder, &["count"]), &lp).unwrap();
    pool.run_until_stalled();
    assert_eq!(recorder.call_count(), 1);
    recorder.clear();

    c.call("increment", &[]).unwrap();
    c.call("increment", &[]).unwrap();
    assert_eq!(recorder.call_count(), 0);
    pool.run_until_stalled();

    assert_eq!(recorder.batch_sizes(), [2]);
    assert_eq!(recorder.new_values(), [Value::Int(1), Value::Int(2)]);
    assert!(!lp.has_pending());
}

#[test]
fn test_local_pool_runs_deferred_calls_in_order() {
    let mut pool = LocalPool::new();
    let lp = quiet_loop();
    lp.integrate(host::local_pool(pool.spawner()), true).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
        let order = Rc::clone(&order);
        lp.call_soon(move || order.borrow_mut().push(i));
    }
    pool.run_until_stalled();
    assert_eq!(*order.borrow(), [0, 1, 2]);
}

#[cfg(feature = "tokio")]
#[tokio::test(flavor = "current_thread")]
async fn test_tokio_local_set_flushes() {
    use std::time::Duration;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let lp = quiet_loop();
            lp.integrate(host::tokio_local(), true).unwrap();
            let recorder = EventRecorder::new();
            let c =
                Component::new(&watching(&counter_class(), &recorder, &["count"]), &lp).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            recorder.clear();

            c.call("set_to", &[Value::Int(7)]).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(recorder.new_values(), [Value::Int(7)]);
            assert!(!lp.has_pending());
        })
        .await;
}
