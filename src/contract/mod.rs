//! Contract
//!
//! Wraps a fallible async [`Operation`] with per-argument caching, pending and
//! error tracking, and single-flight request coalescing. Each distinct argument
//! value (compared structurally) gets its own [`ContractInstance`]; all instances
//! of one contract share one notification channel, and listeners tell instances
//! apart by the key carried in each [`ContractEvent`].
//!
//! Everything here is single-threaded. Operations are spawned with
//! `tokio::task::spawn_local`, so contracts must be driven from a
//! `tokio::task::LocalSet`.

pub mod instance;
pub mod operation;
pub mod registry;

pub use instance::{ContractInstance, Deferred, Phase, WeakContractInstance};
pub use operation::Operation;
pub use registry::KeyedRegistry;

use crate::error::{ConfigError, KeyError};
use crate::key::ArgsKey;
use crate::notify::NotificationChannel;
use instance::{InstanceState, Slot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

pub const EXECUTE_EVENT: &str = "execute";
pub const FINISH_EVENT: &str = "finish";
pub const OOPS_EVENT: &str = "oops";
/// Default name of the event emitted on every observable state change
pub const DEFAULT_UPDATE_EVENT: &str = "update";

/// Where the process is running, for `client_only` contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSite {
    #[default]
    Client,
    Server,
}

/// Contract options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractOptions {
    /// Name used in place of `update`
    pub event: String,

    /// Only run the operation when `site` is [`ExecutionSite::Client`]
    pub client_only: bool,

    pub site: ExecutionSite,
}

impl Default for ContractOptions {
    fn default() -> Self {
        Self {
            event: DEFAULT_UPDATE_EVENT.to_string(),
            client_only: false,
            site: ExecutionSite::Client,
        }
    }
}

impl ContractOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.event.trim().is_empty() {
            return Err("Update event name cannot be empty".to_string());
        }
        if [EXECUTE_EVENT, FINISH_EVENT, OOPS_EVENT].contains(&self.event.as_str()) {
            return Err(format!(
                "Update event name '{}' collides with a lifecycle event",
                self.event
            ));
        }
        Ok(())
    }

    /// Whether the operation may run at this site.
    pub fn may_execute(&self) -> bool {
        !self.client_only || self.site == ExecutionSite::Client
    }
}

/// Payload delivered to contract listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    /// Instance the event belongs to
    pub key: ArgsKey,
}

pub(crate) struct ContractInner<A: 'static, T: 'static, E: 'static> {
    pub(crate) operation: Rc<dyn Operation<A, Output = T, Error = E>>,
    pub(crate) options: ContractOptions,
    registry: KeyedRegistry<Slot<T, E>>,
    channel: NotificationChannel<ContractEvent>,
}

impl<A: 'static, T: 'static, E: 'static> ContractInner<A, T, E> {
    pub(crate) fn slot(&self, key: &ArgsKey) -> Rc<Slot<T, E>> {
        self.registry
            .get_or_create(key, || Slot::new(InstanceState::new()))
    }

    pub(crate) fn update_event(&self) -> &str {
        &self.options.event
    }

    pub(crate) fn announce(&self, event: &str, key: &ArgsKey) {
        self.channel.emit(
            event,
            &ContractEvent {
                name: event.to_string(),
                key: key.clone(),
            },
        );
    }
}

/// A wrapped async operation plus the registry of its keyed instances.
///
/// Cloning shares the same registry and channel.
pub struct Contract<A: 'static, T: 'static, E: 'static> {
    inner: Rc<ContractInner<A, T, E>>,
}

impl<A: 'static, T: 'static, E: 'static> Clone for Contract<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static, T: 'static, E: 'static> fmt::Debug for Contract<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("options", &self.inner.options)
            .field("instances", &self.inner.registry.len())
            .finish()
    }
}

impl<A, T, E> Contract<A, T, E>
where
    A: Serialize + Clone + 'static,
    T: 'static,
    E: 'static,
{
    /// Wrap `operation` with default options.
    pub fn new<O>(operation: O) -> Self
    where
        O: Operation<A, Output = T, Error = E> + 'static,
    {
        Self::build(Rc::new(operation), ContractOptions::default())
    }

    pub fn with_options<O>(operation: O, options: ContractOptions) -> Result<Self, ConfigError>
    where
        O: Operation<A, Output = T, Error = E> + 'static,
    {
        options.validate().map_err(ConfigError::Invalid)?;
        Ok(Self::build(Rc::new(operation), options))
    }

    fn build(operation: Rc<dyn Operation<A, Output = T, Error = E>>, options: ContractOptions) -> Self {
        Self {
            inner: Rc::new(ContractInner {
                operation,
                options,
                registry: KeyedRegistry::new(),
                channel: NotificationChannel::new(),
            }),
        }
    }

    /// The instance for `args`, created on first use. Structurally equal
    /// arguments always resolve to the same instance state.
    pub fn instance(&self, args: A) -> Result<ContractInstance<A, T, E>, KeyError> {
        let key = ArgsKey::from_args(&args)?;
        self.inner.slot(&key);
        Ok(ContractInstance {
            contract: Rc::clone(&self.inner),
            key,
            args,
        })
    }
}

impl<A: 'static, T: 'static, E: 'static> Contract<A, T, E> {
    /// Reset every instance to a brand new, idle state. Emits nothing.
    ///
    /// Executions already in flight still settle their own waiters, but their
    /// results are not visible through the cleared registry.
    pub fn clear(&self) {
        let dropped = self.inner.registry.clear();
        debug!(dropped, "Contract registry cleared");
    }

    /// Subscription handle shared by every instance of this contract.
    ///
    /// Listeners are owned by the contract. A listener that needs to read an
    /// instance should capture [`ContractInstance::downgrade`], not a clone,
    /// or the contract is never freed.
    pub fn events(&self) -> &NotificationChannel<ContractEvent> {
        &self.inner.channel
    }

    pub fn options(&self) -> &ContractOptions {
        &self.inner.options
    }

    /// Name of the update event (`update` unless renamed).
    pub fn update_event(&self) -> &str {
        self.inner.update_event()
    }

    pub fn instance_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn keys(&self) -> Vec<ArgsKey> {
        self.inner.registry.keys()
    }
}
