//! Integration tests for single-flight execution
//!
//! Tests cover:
//! - Concurrent executes share one invocation and one outcome
//! - Lifecycle event ordering
//! - Fresh cycles after settlement
//! - Instance independence across keys

use super::test_utils::{drain, names, record, Gate};
use futures::future::join_all;
use statecraft::{Contract, ExecutionError, Phase};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::test]
async fn test_concurrent_executes_invoke_once() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(7).unwrap();

            let deferred: Vec<_> = (0..5).map(|_| instance.execute()).collect();
            assert!(instance.is_pending());
            gate.resolve(99).await;

            let results = join_all(deferred).await;
            assert_eq!(gate.calls(), 1);
            let first = results[0].as_ref().unwrap();
            assert_eq!(**first, 99);
            for result in &results {
                assert!(Rc::ptr_eq(first, result.as_ref().unwrap()));
            }
            assert_eq!(instance.phase(), Phase::Resolved);
        })
        .await;
}

#[tokio::test]
async fn test_concurrent_executes_share_failure() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(7).unwrap();

            let deferred: Vec<_> = (0..3).map(|_| instance.execute()).collect();
            gate.reject("unreachable").await;

            let results = join_all(deferred).await;
            assert_eq!(gate.calls(), 1);
            let recorded = instance.errors().unwrap();
            for result in results {
                match result {
                    Err(ExecutionError::Failed(err)) => assert!(Rc::ptr_eq(&err, &recorded)),
                    other => panic!("expected failure, got {:?}", other.map(|v| *v)),
                }
            }
            assert_eq!(instance.phase(), Phase::Rejected);
        })
        .await;
}

#[tokio::test]
async fn test_lifecycle_events_for_one_cycle() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let log = record(&contract);
            let instance = contract.instance(1).unwrap();

            let first = instance.execute();
            let second = instance.execute();
            gate.resolve(5).await;
            first.await.unwrap();
            second.await.unwrap();

            assert_eq!(names(&log), vec!["execute", "update", "finish", "update"]);
            assert!(log.borrow().iter().all(|(_, key)| key == "[1]"));
        })
        .await;
}

#[tokio::test]
async fn test_delayed_answer_executes_once() {
    LocalSet::new()
        .run_until(async {
            let invocations = Rc::new(Cell::new(0));
            let counter = Rc::clone(&invocations);
            let contract = Contract::new(move |_: ()| {
                counter.set(counter.get() + 1);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<u32, String>(42)
                }
            });
            let instance = contract.instance(()).unwrap();

            let first = instance.execute();
            let second = instance.execute();
            let (first, second) = futures::join!(first, second);

            assert_eq!(*first.unwrap(), 42);
            assert_eq!(*second.unwrap(), 42);
            assert_eq!(invocations.get(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_execute_after_settlement_runs_again() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            let first = instance.execute();
            gate.resolve(1).await;
            assert_eq!(*first.await.unwrap(), 1);

            let second = instance.execute();
            assert!(instance.is_pending());
            // The previous value stays readable while the new cycle runs.
            assert_eq!(instance.value().map(|v| *v), Some(1));
            gate.resolve(2).await;
            assert_eq!(*second.await.unwrap(), 2);
            assert_eq!(gate.calls(), 2);
        })
        .await;
}

#[tokio::test]
async fn test_fetch_joins_in_flight_execution() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            let executing = instance.execute();
            let fetching = instance.fetch();
            gate.resolve(3).await;

            assert_eq!(*executing.await.unwrap(), 3);
            assert_eq!(*fetching.await.unwrap(), 3);
            assert_eq!(gate.calls(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_instances_are_independent() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let log = record(&contract);
            let one = contract.instance(1).unwrap();
            let two = contract.instance(2).unwrap();

            let first = one.execute();
            let second = two.execute();
            assert_eq!(contract.instance_count(), 2);
            drain().await;
            assert_eq!(gate.calls(), 2);

            gate.reject("first failed").await;
            assert!(one.errors().is_some());
            assert!(two.is_pending());
            assert!(two.errors().is_none());

            gate.resolve(20).await;
            assert!(first.await.is_err());
            assert_eq!(*second.await.unwrap(), 20);
            assert!(one.value().is_none());

            let keys: Vec<String> = log.borrow().iter().map(|(_, key)| key.clone()).collect();
            assert!(keys.contains(&"[1]".to_string()));
            assert!(keys.contains(&"[2]".to_string()));
        })
        .await;
}

#[tokio::test]
async fn test_value_equal_arguments_share_instance() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<(String, Vec<u32>)>());
            let a = contract.instance(("team".to_string(), vec![1, 2])).unwrap();
            let b = contract.instance(("team".to_string(), vec![1, 2])).unwrap();
            let c = contract.instance(("team".to_string(), vec![2, 1])).unwrap();
            assert_eq!(a.key(), b.key());
            assert_ne!(a.key(), c.key());
            assert_eq!(contract.instance_count(), 2);

            let from_a = a.execute();
            assert!(b.is_pending());
            let from_b = b.execute();
            gate.resolve(11).await;

            assert!(Rc::ptr_eq(&from_a.await.unwrap(), &from_b.await.unwrap()));
            assert_eq!(gate.calls(), 1);
            assert!(c.value().is_none());
        })
        .await;
}

#[tokio::test]
async fn test_argument_shape_selects_instance() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<serde_json::Value>());
            let scalar = contract.instance(serde_json::json!(1)).unwrap();
            let list = contract.instance(serde_json::json!([1])).unwrap();
            let null = contract.instance(serde_json::Value::Null).unwrap();
            let empty = contract.instance(serde_json::json!([])).unwrap();

            assert_ne!(scalar.key(), list.key());
            assert_ne!(null.key(), empty.key());
            assert_eq!(contract.instance_count(), 4);

            scalar.set(1);
            assert!(list.value().is_none());
        })
        .await;
}
