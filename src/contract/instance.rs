//! Execution State Machine
//!
//! Per-key state of a contract: `idle -> pending -> resolved | rejected`, and back
//! to `pending` on a fresh explicit execute. Transitions run synchronously between
//! await points, so checking and setting `pending` can never interleave with
//! another caller. At most one operation is in flight per instance; callers that
//! arrive while it runs join its waiter list and all receive the same outcome.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::{self, FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::contract::{ContractInner, EXECUTE_EVENT, FINISH_EVENT, OOPS_EVENT};
use crate::error::ExecutionError;
use crate::key::ArgsKey;

/// Deferred result of [`ContractInstance::execute`] and [`ContractInstance::fetch`]
pub type Deferred<T, E> = LocalBoxFuture<'static, Result<Rc<T>, ExecutionError<E>>>;

type Settled<T, E> = Result<Rc<T>, Rc<E>>;
type Waiter<T, E> = oneshot::Sender<Settled<T, E>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Pending,
    Resolved,
    Rejected,
}

pub(crate) struct InstanceState<T, E> {
    phase: Phase,
    value: Option<Rc<T>>,
    error: Option<Rc<E>>,
    waiters: Vec<Waiter<T, E>>,
}

impl<T, E> InstanceState<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            value: None,
            error: None,
            waiters: Vec::new(),
        }
    }
}

pub(crate) type Slot<T, E> = RefCell<InstanceState<T, E>>;

enum Start<T, E> {
    Launched,
    Joined,
    Skipped(Result<Rc<T>, ExecutionError<E>>),
}

/// Settles a launched execution exactly once. If the task driving the operation
/// is dropped first, the instance returns to idle and its waiters observe
/// [`ExecutionError::Abandoned`].
struct InFlight<A: 'static, T: 'static, E: 'static> {
    contract: Rc<ContractInner<A, T, E>>,
    key: ArgsKey,
    slot: Rc<Slot<T, E>>,
    settled: bool,
}

impl<A: 'static, T: 'static, E: 'static> InFlight<A, T, E> {
    fn settle(mut self, result: Result<T, E>) {
        self.settled = true;
        let (outcome, waiters) = {
            let mut state = self.slot.borrow_mut();
            let outcome = match result {
                Ok(value) => {
                    let value = Rc::new(value);
                    state.value = Some(Rc::clone(&value));
                    state.phase = Phase::Resolved;
                    Ok(value)
                }
                Err(error) => {
                    let error = Rc::new(error);
                    state.error = Some(Rc::clone(&error));
                    state.phase = Phase::Rejected;
                    Err(error)
                }
            };
            (outcome, std::mem::take(&mut state.waiters))
        };

        let event = if outcome.is_ok() {
            debug!(key = %self.key, waiters = waiters.len(), "Execution resolved");
            FINISH_EVENT
        } else {
            debug!(key = %self.key, waiters = waiters.len(), "Execution rejected");
            OOPS_EVENT
        };
        self.contract.announce(event, &self.key);
        self.contract.announce(self.contract.update_event(), &self.key);

        for waiter in waiters {
            // A dropped receiver only means that caller stopped listening.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl<A: 'static, T: 'static, E: 'static> Drop for InFlight<A, T, E> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Ok(mut state) = self.slot.try_borrow_mut() {
            warn!(key = %self.key, waiters = state.waiters.len(), "Execution abandoned before settling");
            state.phase = Phase::Idle;
            state.waiters.clear();
        }
    }
}

/// Handle to one keyed instance of a contract.
///
/// The handle resolves its state through the contract's registry on every call,
/// so after [`Contract::clear`](crate::contract::Contract::clear) it behaves as a
/// brand new instance.
pub struct ContractInstance<A: 'static, T: 'static, E: 'static> {
    pub(crate) contract: Rc<ContractInner<A, T, E>>,
    pub(crate) key: ArgsKey,
    pub(crate) args: A,
}

impl<A: Clone + 'static, T: 'static, E: 'static> Clone for ContractInstance<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            contract: Rc::clone(&self.contract),
            key: self.key.clone(),
            args: self.args.clone(),
        }
    }
}

impl<A: fmt::Debug + 'static, T: 'static, E: 'static> fmt::Debug for ContractInstance<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractInstance")
            .field("key", &self.key)
            .field("args", &self.args)
            .field("phase", &self.phase())
            .finish()
    }
}

impl<A: 'static, T: 'static, E: 'static> ContractInstance<A, T, E> {
    fn slot(&self) -> Rc<Slot<T, E>> {
        self.contract.slot(&self.key)
    }

    /// Replace the cached value and emit the update event. Pending state and the
    /// last error are left alone.
    pub fn set(&self, value: T) {
        self.slot().borrow_mut().value = Some(Rc::new(value));
        debug!(key = %self.key, "Value set directly");
        self.contract
            .announce(self.contract.update_event(), &self.key);
    }

    pub fn is_pending(&self) -> bool {
        self.phase() == Phase::Pending
    }

    /// Failure recorded by the last execution, kept until the next one starts.
    pub fn errors(&self) -> Option<Rc<E>> {
        self.slot().borrow().error.clone()
    }

    pub fn value(&self) -> Option<Rc<T>> {
        self.slot().borrow().value.clone()
    }

    pub fn phase(&self) -> Phase {
        self.slot().borrow().phase
    }

    pub fn key(&self) -> &ArgsKey {
        &self.key
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

impl<A: Clone + 'static, T: 'static, E: 'static> ContractInstance<A, T, E> {
    /// A handle that does not keep the contract alive.
    ///
    /// Listeners live inside the contract, so a listener holding a strong
    /// instance keeps the whole contract alive through a cycle. Capture this
    /// instead.
    pub fn downgrade(&self) -> WeakContractInstance<A, T, E> {
        WeakContractInstance {
            contract: Rc::downgrade(&self.contract),
            key: self.key.clone(),
            args: self.args.clone(),
        }
    }

    /// Start the operation unconditionally, or join the one already in flight.
    ///
    /// The state transition and the `execute`/`update` events happen before this
    /// returns; the operation itself runs on the current `LocalSet`, so this must
    /// be called from within one. Called with no tokio runtime at all, nothing
    /// starts and the result is [`ExecutionError::NoRuntime`].
    pub fn execute(&self) -> Deferred<T, E> {
        let (tx, rx) = oneshot::channel();
        if let Start::Skipped(outcome) = self.start(Some(tx)) {
            return future::ready(outcome).boxed_local();
        }
        async move {
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ExecutionError::Failed(error)),
                Err(_) => Err(ExecutionError::Abandoned),
            }
        }
        .boxed_local()
    }

    /// The cached value if there is one, otherwise the same as [`execute`](Self::execute).
    pub fn fetch(&self) -> Deferred<T, E> {
        if let Some(value) = self.value() {
            trace!(key = %self.key, "Fetch served from cache");
            return future::ready(Ok(value)).boxed_local();
        }
        self.execute()
    }

    /// Non-suspending read of the cached value.
    ///
    /// With nothing cached, no execution in flight, and no recorded error, this
    /// starts an execution in the background and still returns immediately.
    /// Outside a tokio runtime the background start is skipped. Failures are
    /// never surfaced here; see [`errors`](Self::errors).
    pub fn get(&self) -> Option<Rc<T>> {
        let slot = self.slot();
        let (value, idle) = {
            let state = slot.borrow();
            (
                state.value.clone(),
                state.phase != Phase::Pending && state.error.is_none(),
            )
        };
        if value.is_none() && idle {
            trace!(key = %self.key, "Get on empty instance, executing in background");
            self.start(None);
        }
        value
    }

    fn start(&self, waiter: Option<Waiter<T, E>>) -> Start<T, E> {
        let slot = self.slot();
        {
            let mut state = slot.borrow_mut();
            if state.phase == Phase::Pending {
                if let Some(waiter) = waiter {
                    state.waiters.push(waiter);
                }
                debug!(key = %self.key, waiters = state.waiters.len(), "Joined in-flight execution");
                return Start::Joined;
            }
            if !self.contract.options.may_execute() {
                debug!(key = %self.key, "Execution skipped for client-only contract");
                return Start::Skipped(state.value.clone().ok_or(ExecutionError::ClientOnly));
            }
            if Handle::try_current().is_err() {
                warn!(key = %self.key, "No tokio runtime on this thread, execution not started");
                return Start::Skipped(Err(ExecutionError::NoRuntime));
            }
            state.error = None;
            state.phase = Phase::Pending;
            if let Some(waiter) = waiter {
                state.waiters.push(waiter);
            }
        }

        debug!(key = %self.key, "Execution started");
        self.contract.announce(EXECUTE_EVENT, &self.key);
        self.contract
            .announce(self.contract.update_event(), &self.key);

        let in_flight = InFlight {
            contract: Rc::clone(&self.contract),
            key: self.key.clone(),
            slot,
            settled: false,
        };
        let operation = Rc::clone(&self.contract.operation);
        let args = self.args.clone();
        tokio::task::spawn_local(async move {
            let result = operation.run(args).await;
            in_flight.settle(result);
        });
        Start::Launched
    }
}

/// Non-owning [`ContractInstance`] handle; see [`ContractInstance::downgrade`].
pub struct WeakContractInstance<A: 'static, T: 'static, E: 'static> {
    contract: Weak<ContractInner<A, T, E>>,
    key: ArgsKey,
    args: A,
}

impl<A: Clone + 'static, T: 'static, E: 'static> WeakContractInstance<A, T, E> {
    /// The instance, unless its contract has been dropped.
    pub fn upgrade(&self) -> Option<ContractInstance<A, T, E>> {
        Some(ContractInstance {
            contract: self.contract.upgrade()?,
            key: self.key.clone(),
            args: self.args.clone(),
        })
    }
}

impl<A: Clone + 'static, T: 'static, E: 'static> Clone for WeakContractInstance<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            contract: Weak::clone(&self.contract),
            key: self.key.clone(),
            args: self.args.clone(),
        }
    }
}

impl<A: fmt::Debug + 'static, T: 'static, E: 'static> fmt::Debug for WeakContractInstance<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContractInstance")
            .field("key", &self.key)
            .field("args", &self.args)
            .field("live", &(self.contract.strong_count() > 0))
            .finish()
    }
}
