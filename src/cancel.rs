//! # Cancelable Future
//!
//! A one-shot asynchronous result container with an explicit cancellation
//! operation. The producer side ([`Settler`]) and the consumer side
//! ([`CancelableFuture`]) share a small state machine:
//!
//! ```text
//!            ┌──────────▶ Resolved
//!            │
//!  Pending ──┼──────────▶ Rejected
//!            │
//!            └──────────▶ Cancelled
//! ```
//!
//! The first settlement wins; every later `resolve`/`reject`/`cancel` is ignored
//! and reports `false`. Cleanup hooks registered with [`Settler::on_settle`] run
//! exactly once, after the state lock is released, whatever the cause of the
//! settlement.
//!
//! Derived futures created by [`CancelableFuture::then`] keep a link to their
//! source: cancelling the derived future cancels the source as well.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use crate::{BridgeError, BridgeResult};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

impl FutureState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FutureState::Pending)
    }
}

struct Core<T> {
    state: FutureState,
    result: Option<BridgeResult<T>>,
    waker: Option<Waker>,
    on_cancel: Vec<Hook>,
    on_settle: Vec<Hook>,
}

struct Shared<T> {
    core: Mutex<Core<T>>,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            core: Mutex::new(Core {
                state: FutureState::Pending,
                result: None,
                waker: None,
                on_cancel: Vec::new(),
                on_settle: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core<T>> {
        // hooks never run under the lock, so a poisoned lock still holds a consistent state
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> FutureState {
        self.lock().state
    }

    fn settle(&self, state: FutureState, result: BridgeResult<T>) -> bool {
        let (waker, cancel_hooks, settle_hooks) = {
            let mut core = self.lock();
            if core.state.is_terminal() {
                return false;
            }
            core.state = state;
            core.result = Some(result);
            let cancel_hooks = std::mem::take(&mut core.on_cancel);
            let cancel_hooks = if state == FutureState::Cancelled {
                cancel_hooks
            } else {
                Vec::new()
            };
            (
                core.waker.take(),
                cancel_hooks,
                std::mem::take(&mut core.on_settle),
            )
        };

        for hook in cancel_hooks {
            hook();
        }
        for hook in settle_hooks {
            hook();
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn cancel(&self, error: BridgeError) -> bool {
        self.settle(FutureState::Cancelled, Err(error))
    }

    fn add_on_cancel(&self, hook: Hook) {
        let run_now = {
            let mut core = self.lock();
            match core.state {
                FutureState::Pending => {
                    core.on_cancel.push(hook);
                    None
                }
                FutureState::Cancelled => Some(hook),
                _ => None,
            }
        };
        if let Some(hook) = run_now {
            hook();
        }
    }

    fn add_on_settle(&self, hook: Hook) {
        let run_now = {
            let mut core = self.lock();
            if core.state.is_terminal() {
                Some(hook)
            } else {
                core.on_settle.push(hook);
                None
            }
        };
        if let Some(hook) = run_now {
            hook();
        }
    }

    fn take_result(&self) -> Option<(FutureState, BridgeResult<T>)> {
        let mut core = self.lock();
        let state = core.state;
        core.result.take().map(|result| (state, result))
    }
}

/// Producer side of a [`CancelableFuture`], handed to the executor.
pub struct Settler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Settler<T> {
    pub fn resolve(&self, value: T) -> bool {
        self.shared.settle(FutureState::Resolved, Ok(value))
    }

    pub fn reject(&self, error: BridgeError) -> bool {
        self.shared.settle(FutureState::Rejected, Err(error))
    }

    /// Cancels from the producer side with the given error (e.g. `Aborted`).
    pub fn cancel(&self, error: BridgeError) -> bool {
        self.shared.cancel(error)
    }

    /// Registers a hook that runs only if the future ends up cancelled.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.add_on_cancel(Box::new(hook));
    }

    /// Registers a cleanup hook that runs once on any settlement. If the future
    /// is already settled the hook runs immediately.
    pub fn on_settle<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.add_on_settle(Box::new(hook));
    }

    pub fn state(&self) -> FutureState {
        self.shared.state()
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    fn settle_from(&self, state: FutureState, result: BridgeResult<T>) -> bool {
        self.shared.settle(state, result)
    }
}

impl<T: Send + 'static> Settler<T> {
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            inner: self.shared.clone(),
        }
    }
}

trait Cancel: Send + Sync {
    fn cancel_because(&self, reason: &str) -> bool;
    fn current_state(&self) -> FutureState;
}

impl<T: Send> Cancel for Shared<T> {
    fn cancel_because(&self, reason: &str) -> bool {
        self.cancel(BridgeError::cancelled(reason))
    }

    fn current_state(&self) -> FutureState {
        self.state()
    }
}

/// Type-erased handle that cancels a future owned by someone else.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<dyn Cancel>,
}

impl CancelHandle {
    pub fn cancel(&self) -> bool {
        self.inner.cancel_because("cancelled by caller")
    }

    pub fn cancel_with(&self, reason: &str) -> bool {
        self.inner.cancel_because(reason)
    }

    pub fn state(&self) -> FutureState {
        self.inner.current_state()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Consumer side: awaitable, cancelable, chainable.
///
/// Dropping an unsettled future cancels it, so a caller that stops waiting
/// releases whatever the producer registered for cleanup.
#[must_use = "dropping a CancelableFuture cancels it"]
pub struct CancelableFuture<T> {
    shared: Arc<Shared<T>>,
    cancel_on_drop: bool,
}

impl<T> CancelableFuture<T> {
    pub fn new<E>(executor: E) -> Self
    where
        E: FnOnce(Settler<T>),
    {
        let shared = Arc::new(Shared::new());
        executor(Settler {
            shared: shared.clone(),
        });
        Self {
            shared,
            cancel_on_drop: true,
        }
    }

    pub fn resolved(value: T) -> Self {
        Self::new(|settler| {
            settler.resolve(value);
        })
    }

    pub fn rejected(error: BridgeError) -> Self {
        Self::new(|settler| {
            settler.reject(error);
        })
    }

    /// Cancels a pending future. No-op (returns `false`) once settled.
    pub fn cancel(&self) -> bool {
        self.cancel_with("cancelled by caller")
    }

    pub fn cancel_with(&self, reason: &str) -> bool {
        self.shared.cancel(BridgeError::cancelled(reason))
    }

    pub fn state(&self) -> FutureState {
        self.shared.state()
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    /// Runs `hook` once the future settles, whatever the outcome.
    pub fn finally<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.add_on_settle(Box::new(hook));
        self
    }

    fn detach(mut self) -> Arc<Shared<T>> {
        self.cancel_on_drop = false;
        self.shared.clone()
    }
}

impl<T: Send + 'static> CancelableFuture<T> {
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            inner: self.shared.clone(),
        }
    }

    /// Derives a future from this one. The source result is handed to `f`;
    /// errors pass through untouched. Cancelling the derived future cancels
    /// the source.
    pub fn then<U, F>(self, f: F) -> CancelableFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> BridgeResult<U> + Send + 'static,
    {
        let source = self.detach();
        CancelableFuture::new(move |derived: Settler<U>| {
            let upstream = source.clone();
            derived.on_cancel(move || {
                upstream.cancel(BridgeError::cancelled("derived future cancelled"));
            });

            let downstream = derived.clone();
            let settled = source.clone();
            source.add_on_settle(Box::new(move || {
                let Some((state, result)) = settled.take_result() else {
                    return;
                };
                match result {
                    Ok(value) => match f(value) {
                        Ok(mapped) => downstream.resolve(mapped),
                        Err(error) => downstream.reject(error),
                    },
                    Err(error) => downstream.settle_from(state, Err(error)),
                };
            }));
        })
    }

    pub fn map<U, F>(self, f: F) -> CancelableFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Ok(f(value)))
    }
}

impl<T> Future for CancelableFuture<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut core = self.shared.lock();
        if let Some(result) = core.result.take() {
            return Poll::Ready(result);
        }
        if core.state.is_terminal() {
            return Poll::Ready(Err(BridgeError::InvalidRequest(
                "future polled after completion".to_string(),
            )));
        }
        core.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for CancelableFuture<T> {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            self.shared
                .cancel(BridgeError::cancelled("future dropped before settlement"));
        }
    }
}

impl<T> fmt::Debug for CancelableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelableFuture")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pending<T>() -> (CancelableFuture<T>, Settler<T>) {
        let mut slot = None;
        let future = CancelableFuture::new(|settler| slot = Some(settler));
        (future, slot.unwrap())
    }

    #[tokio::test]
    async fn test_resolve_then_await() {
        let (future, settler) = pending::<u32>();
        assert_eq!(future.state(), FutureState::Pending);
        assert!(settler.resolve(7));
        assert_eq!(future.state(), FutureState::Resolved);
        assert_eq!(future.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_first_settle_wins() {
        let (future, settler) = pending::<u32>();
        assert!(settler.reject(BridgeError::UnknownEnv));
        assert!(!settler.resolve(1));
        assert!(!future.cancel());
        assert_eq!(future.state(), FutureState::Rejected);
        assert!(matches!(future.await, Err(BridgeError::UnknownEnv)));
    }

    #[tokio::test]
    async fn test_cancel_runs_hooks_once() {
        let cancel_calls = Arc::new(AtomicUsize::new(0));
        let settle_calls = Arc::new(AtomicUsize::new(0));
        let (future, settler) = pending::<u32>();

        let counter = cancel_calls.clone();
        settler.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = settle_calls.clone();
        settler.on_settle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(future.cancel());
        assert!(!future.cancel());
        assert!(!future.cancel_with("again"));
        assert!(!settler.resolve(3));

        assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(future.state(), FutureState::Cancelled);
        let err = future.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_resolve_keeps_value() {
        let settle_calls = Arc::new(AtomicUsize::new(0));
        let (future, settler) = pending::<&'static str>();
        let counter = settle_calls.clone();
        settler.on_settle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        settler.resolve("paid");

        assert!(!future.cancel());
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(future.await.unwrap(), "paid");
    }

    #[test]
    fn test_on_settle_after_settlement_runs_immediately() {
        let (future, settler) = pending::<()>();
        settler.resolve(());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        settler.on_settle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(future);
    }

    #[test]
    fn test_drop_cancels_pending() {
        let (future, settler) = pending::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        settler.on_settle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(future);
        assert_eq!(settler.state(), FutureState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_then_maps_value() {
        let (future, settler) = pending::<u32>();
        let derived = future.then(|n| Ok(n * 2)).map(|n| n.to_string());
        settler.resolve(21);
        assert_eq!(derived.await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_then_propagates_errors() {
        let (future, settler) = pending::<u32>();
        let derived = future.then(|_| -> BridgeResult<u32> { unreachable!() });
        settler.reject(BridgeError::parse("bad json"));
        assert!(matches!(derived.await, Err(BridgeError::Parse { .. })));

        let (future, settler) = pending::<u32>();
        let derived = future.then(|_| -> BridgeResult<u32> { Err(BridgeError::UnknownEnv) });
        settler.resolve(1);
        assert!(matches!(derived.await, Err(BridgeError::UnknownEnv)));
    }

    #[tokio::test]
    async fn test_cancel_derived_cancels_source() {
        let (future, settler) = pending::<u32>();
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = cleaned.clone();
        settler.on_settle(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let derived = future.map(|n| n + 1);
        assert!(derived.cancel());
        assert_eq!(settler.state(), FutureState::Cancelled);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(!settler.resolve(1));
        assert!(derived.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_source_cancel_marks_derived_cancelled() {
        let (future, _settler) = pending::<u32>();
        let handle = future.cancel_handle();
        let derived = future.map(|n| n + 1);
        assert!(handle.cancel());
        assert_eq!(derived.state(), FutureState::Cancelled);
        assert!(derived.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_wakes_waiting_task() {
        let (future, settler) = pending::<u32>();
        let task = tokio::spawn(future);
        tokio::task::yield_now().await;
        settler.resolve(5);
        assert_eq!(task.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_ready_constructors() {
        assert_eq!(CancelableFuture::resolved(1).await.unwrap(), 1);
        let rejected: CancelableFuture<u32> = CancelableFuture::rejected(BridgeError::UnknownEnv);
        assert_eq!(rejected.state(), FutureState::Rejected);
        assert!(rejected.await.is_err());
    }
}
