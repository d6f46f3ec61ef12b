//! The fallible async operation wrapped by a contract.

use async_trait::async_trait;
use std::future::Future;

/// Given arguments, eventually produce a value or fail.
///
/// Implemented for any `Fn(A) -> impl Future<Output = Result<T, E>>`, so plain
/// closures returning `async move` blocks can be wrapped directly.
#[async_trait(?Send)]
pub trait Operation<A: 'static> {
    type Output: 'static;
    type Error: 'static;

    async fn run(&self, args: A) -> Result<Self::Output, Self::Error>;
}

#[async_trait(?Send)]
impl<A, F, Fut, T, E> Operation<A> for F
where
    A: 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + 'static,
    T: 'static,
    E: 'static,
{
    type Output = T;
    type Error = E;

    async fn run(&self, args: A) -> Result<T, E> {
        (self)(args).await
    }
}
