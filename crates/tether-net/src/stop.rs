//! Shared completion signal returned by `stop()`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

/// Resolves once a `stop()` request has completed.
///
/// Clones share one underlying completion, so every caller that receives a
/// clone observes completion at the same point. Dropping a `StopFuture` does
/// not cancel the stop.
#[derive(Clone)]
#[must_use = "a StopFuture does nothing unless awaited or polled"]
pub struct StopFuture {
    inner: Shared<BoxFuture<'static, ()>>,
    done: Arc<AtomicBool>,
}

/// Completes the `StopFuture` it was created with, when resolved or dropped.
pub(crate) struct StopResolver {
    tx: Option<oneshot::Sender<()>>,
    done: Arc<AtomicBool>,
}

impl StopResolver {
    pub(crate) fn resolve(self) {
        drop(self);
    }
}

impl Drop for StopResolver {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl StopFuture {
    /// A future that is already complete.
    pub(crate) fn ready() -> Self {
        Self {
            inner: future::ready(()).boxed().shared(),
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A future completed by the returned resolver.
    ///
    /// Dropping the resolver also completes the future, so stop requests
    /// never hang on a torn-down owner.
    pub(crate) fn pending() -> (StopResolver, Self) {
        let (tx, rx) = oneshot::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));
        let inner = async move {
            let _ = rx.await;
        }
        .boxed()
        .shared();

        let resolver = StopResolver {
            tx: Some(tx),
            done: done.clone(),
        };
        (resolver, Self { inner, done })
    }

    /// Check whether two futures share the same completion.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Check whether the stop has completed, whether or not this future has
    /// been polled yet.
    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

impl Future for StopFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl std::fmt::Debug for StopFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopFuture")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_future_is_complete_before_polling() {
        assert!(StopFuture::ready().is_complete());
    }

    #[tokio::test]
    async fn test_ready_future_resolves() {
        let stop = StopFuture::ready();
        stop.clone().await;
        assert!(stop.is_complete());
    }

    #[tokio::test]
    async fn test_clones_share_completion() {
        let (resolver, stop) = StopFuture::pending();
        let other = stop.clone();

        assert!(stop.ptr_eq(&other));
        assert!(!stop.is_complete());

        resolver.resolve();
        assert!(other.is_complete());
        stop.await;
        assert!(other.is_complete());
    }

    #[tokio::test]
    async fn test_dropped_resolver_completes() {
        let (resolver, stop) = StopFuture::pending();
        drop(resolver);
        assert!(stop.is_complete());
        stop.await;
    }

    #[test]
    fn test_independent_futures_differ() {
        assert!(!StopFuture::ready().ptr_eq(&StopFuture::ready()));
    }
}
