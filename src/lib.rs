//! Statecraft: Shared Reactive State
//!
//! Two primitives for sharing state across many independent consumers:
//!
//! - [`Store`]: synchronous state with named setters and memoized getters. Any
//!   setter that reports a change drops every memoized getter result and emits
//!   `update`.
//! - [`Contract`]: a fallible async operation with per-argument instances, each
//!   caching its last value and error, tracking whether it is pending, and
//!   coalescing concurrent calls into one in-flight invocation.
//!
//! Both announce changes through a [`NotificationChannel`], so a consumer can
//! re-read cached values on `update` and compare them cheaply by `Rc` identity.

pub mod config;
pub mod contract;
pub mod error;
pub mod key;
pub mod logging;
pub mod notify;
pub mod store;

pub use contract::{
    Contract, ContractEvent, ContractInstance, ContractOptions, Deferred, ExecutionSite, Operation,
    Phase, WeakContractInstance,
};
pub use error::{ConfigError, ExecutionError, KeyError, StoreError};
pub use key::ArgsKey;
pub use notify::{ListenerId, NotificationChannel};
pub use store::{Mutation, Store, StoreBuilder, StoreEvent};
