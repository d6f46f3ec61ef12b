//! Integration tests for cached reads and resets
//!
//! Tests cover:
//! - fetch and get serving cached values
//! - get starting background executions
//! - set and clear semantics
//! - client-only contracts on the server site

use super::test_utils::{drain, names, record, Gate};
use statecraft::{Contract, ContractOptions, ExecutionError, ExecutionSite, Phase};
use std::rc::Rc;
use tokio::task::LocalSet;

#[tokio::test]
async fn test_fetch_after_resolve_uses_cache() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(4).unwrap();

            let first = instance.fetch();
            gate.resolve(16).await;
            let first = first.await.unwrap();

            let log = record(&contract);
            let second = instance.fetch().await.unwrap();
            assert!(Rc::ptr_eq(&first, &second));
            assert_eq!(gate.calls(), 1);
            assert!(log.borrow().is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_get_on_fresh_instance_executes_in_background() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let log = record(&contract);
            let instance = contract.instance(1).unwrap();

            assert!(instance.get().is_none());
            assert!(instance.is_pending());
            assert!(instance.get().is_none());
            drain().await;
            assert_eq!(gate.calls(), 1);

            gate.resolve(8).await;
            assert_eq!(instance.get().map(|v| *v), Some(8));
            assert_eq!(gate.calls(), 1);
            assert_eq!(names(&log), vec!["execute", "update", "finish", "update"]);
        })
        .await;
}

#[tokio::test]
async fn test_get_never_surfaces_errors() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            assert!(instance.get().is_none());
            gate.reject("offline").await;

            assert_eq!(instance.errors().as_deref().map(String::as_str), Some("offline"));
            // A recorded failure stops get from retrying on its own.
            assert!(instance.get().is_none());
            drain().await;
            assert_eq!(gate.calls(), 1);
            assert_eq!(instance.phase(), Phase::Rejected);
        })
        .await;
}

#[tokio::test]
async fn test_error_is_kept_until_next_execute() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            let failed = instance.execute();
            gate.reject("first").await;
            assert!(matches!(failed.await, Err(ExecutionError::Failed(_))));
            assert!(instance.errors().is_some());

            let retry = instance.execute();
            assert!(instance.errors().is_none());
            gate.resolve(3).await;
            assert_eq!(*retry.await.unwrap(), 3);
            assert!(instance.errors().is_none());
        })
        .await;
}

#[tokio::test]
async fn test_set_emits_single_update() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            let running = instance.execute();
            let log = record(&contract);
            instance.set(77);

            assert_eq!(names(&log), vec!["update"]);
            assert_eq!(instance.value().map(|v| *v), Some(77));
            assert!(instance.is_pending());
            assert!(instance.errors().is_none());

            gate.resolve(5).await;
            assert_eq!(*running.await.unwrap(), 5);
            assert_eq!(instance.value().map(|v| *v), Some(5));
        })
        .await;
}

#[tokio::test]
async fn test_set_without_execution_serves_fetch() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            instance.set(12);
            assert_eq!(*instance.fetch().await.unwrap(), 12);
            assert_eq!(instance.get().map(|v| *v), Some(12));
            assert_eq!(gate.calls(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_clear_resets_instances_silently() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();
            let other = contract.instance(2).unwrap();
            instance.set(1);
            other.set(2);

            let log = record(&contract);
            contract.clear();
            assert!(log.borrow().is_empty());
            assert_eq!(contract.instance_count(), 0);

            assert!(instance.value().is_none());
            assert_eq!(instance.phase(), Phase::Idle);
            assert!(contract.instance(2).unwrap().value().is_none());
        })
        .await;
}

#[tokio::test]
async fn test_clear_during_flight_detaches_result() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let contract = Contract::new(gate.operation::<u32>());
            let instance = contract.instance(1).unwrap();

            let running = instance.execute();
            contract.clear();
            assert!(!instance.is_pending());

            gate.resolve(9).await;
            // The caller still gets its result; the fresh instance does not.
            assert_eq!(*running.await.unwrap(), 9);
            assert!(instance.value().is_none());
        })
        .await;
}

#[tokio::test]
async fn test_client_only_on_server_never_runs() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let options = ContractOptions {
                client_only: true,
                site: ExecutionSite::Server,
                ..Default::default()
            };
            let contract = Contract::with_options(gate.operation::<u32>(), options).unwrap();
            let log = record(&contract);
            let instance = contract.instance(1).unwrap();

            assert!(matches!(instance.execute().await, Err(ExecutionError::ClientOnly)));
            assert!(instance.get().is_none());
            assert!(!instance.is_pending());

            instance.set(6);
            assert_eq!(*instance.fetch().await.unwrap(), 6);
            assert_eq!(*instance.execute().await.unwrap(), 6);
            drain().await;
            assert_eq!(gate.calls(), 0);
            assert_eq!(names(&log), vec!["update"]);
        })
        .await;
}

#[tokio::test]
async fn test_renamed_update_event() {
    LocalSet::new()
        .run_until(async {
            let gate = Gate::new();
            let options = ContractOptions {
                event: "players-changed".to_string(),
                ..Default::default()
            };
            let contract = Contract::with_options(gate.operation::<u32>(), options).unwrap();
            let log = record(&contract);
            let plain_updates = Rc::new(std::cell::Cell::new(0));
            let counter = Rc::clone(&plain_updates);
            contract
                .events()
                .subscribe("update", move |_| counter.set(counter.get() + 1));

            let instance = contract.instance(1).unwrap();
            let running = instance.execute();
            gate.resolve(1).await;
            running.await.unwrap();

            assert_eq!(
                names(&log),
                vec!["execute", "players-changed", "finish", "players-changed"]
            );
            assert_eq!(plain_updates.get(), 0);
        })
        .await;
}

#[test]
fn test_get_outside_runtime_is_a_plain_read() {
    let gate = Gate::new();
    let contract = Contract::new(gate.operation::<u32>());
    let log = record(&contract);
    let instance = contract.instance(1).unwrap();

    assert!(instance.get().is_none());
    assert!(!instance.is_pending());
    assert!(matches!(
        futures::executor::block_on(instance.execute()),
        Err(ExecutionError::NoRuntime)
    ));

    instance.set(5);
    assert_eq!(instance.get().map(|v| *v), Some(5));
    assert_eq!(gate.calls(), 0);
    assert_eq!(names(&log), vec!["update"]);
}
