//! # Request Manager
//!
//! The RequestManager turns the fire-and-forget host channel into a
//! request/response API. A method call is sent through a [`Dispatcher`]; the
//! answer arrives later as an ordinary event on the [`EventBus`], and the
//! manager decides which pending call it belongs to.
//!
//! ## Key Features
//!
//! - **Correlation by Predicate**: every call carries a [`Capture`] that inspects
//!   candidate payloads, so concurrent calls waiting on the same event name
//!   never steal each other's answers
//! - **Timeout Handling**: per-call timeout, falling back to the configured default
//! - **Cancellation**: explicit `cancel()`, dropping the future, an external
//!   [`CancellationToken`], or [`RequestManager::cancel_waiting_requests`]
//! - **Leak Freedom**: every settlement path runs the same cleanup
//!
//! ## Implementation Details
//!
//! A call is a [`CancelableFuture`] whose executor subscribes to the expected
//! events, registers the call in the pending table, dispatches, then arms the
//! timer and abort watcher. Cleanup is attached as `on_settle` hooks, which run
//! exactly once whichever of response, timeout, abort, cancellation or
//! dispatch failure wins. The subscriptions live inside such a hook, so
//! settling drops them and the bus forgets the listeners.
//!
//! Already dispatched messages are never revoked: the host may still answer a
//! cancelled call, and that answer is ignored.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::{
    capture::Capture,
    event_bus::{EventBus, Subscription},
    event_registry::{EventNames, HostRequest, MethodName},
};
use crate::{
    BridgeError, BridgeResult,
    cancel::{CancelHandle, CancelableFuture, Settler},
    config::BridgeConfig,
    dispatch::{Dispatch, Dispatcher},
    payload,
};

/// Identifies a call in the pending table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

struct PendingCall {
    method: MethodName,
    events: EventNames,
    cancel: CancelHandle,
}

/// Per-call options.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use serde_json::json;
/// use webview_bridge::{RequestOptions, capture::field_eq};
///
/// let options = RequestOptions::new()
///     .params(json!({"slug": "abc"}))
///     .capture(field_eq("slug", "abc"))
///     .timeout(Duration::from_secs(30));
/// ```
#[derive(Clone, Default)]
pub struct RequestOptions {
    params: Value,
    capture: Capture,
    timeout: Option<Duration>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Without a capture the first payload of any expected event wins.
    pub fn capture(mut self, capture: Capture) -> Self {
        self.capture = capture;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends this call through `dispatcher` instead of the manager's own.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Cancelling `signal` aborts the call.
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .field("dispatcher", &self.dispatcher.is_some())
            .field("signal", &self.signal.is_some())
            .finish()
    }
}

/// # Request Manager
///
/// Correlates method calls with the events that answer them.
pub struct RequestManager {
    event_bus: EventBus,
    dispatcher: Arc<dyn Dispatcher>,
    pending_requests: Arc<DashMap<CallId, PendingCall>>,
    default_timeout: Option<Duration>,
    next_id: AtomicU64,
}

impl RequestManager {
    pub fn new(event_bus: EventBus, dispatcher: Arc<dyn Dispatcher>, config: &BridgeConfig) -> Self {
        Self {
            event_bus,
            dispatcher,
            pending_requests: Arc::new(DashMap::new()),
            default_timeout: config.default_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Sends `method` and waits for the first payload of one of `events`
    /// accepted by the call's capture.
    ///
    /// # Errors
    ///
    /// Returned synchronously, before anything is subscribed or sent:
    ///
    /// * `InvalidRequest` - empty event list, or a timeout/signal without a tokio runtime
    /// * Whatever [`Dispatcher::check`] reports (`UnknownEnv`, `MethodUnsupported`, ...)
    /// * `Aborted` - the signal is already cancelled
    ///
    /// Everything else settles the returned future: the dispatcher's own
    /// error, `TimedOut`, `Aborted`, `Cancelled`, or a `Capture` error.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use serde_json::json;
    /// # use webview_bridge::{BridgeConfig, EventBus, RequestManager, RequestOptions};
    /// # use webview_bridge::dispatch::ChannelDispatcher;
    /// # async fn example() -> webview_bridge::BridgeResult<()> {
    /// let (dispatcher, _outbound) = ChannelDispatcher::channel(16);
    /// let manager = RequestManager::new(EventBus::new(), Arc::new(dispatcher), &BridgeConfig::default());
    /// let viewport = manager
    ///     .request("web_app_request_viewport", "viewport_changed", RequestOptions::new())?
    ///     .await?;
    /// println!("height: {}", viewport["height"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn request<M, E>(
        &self,
        method: M,
        events: E,
        options: RequestOptions,
    ) -> BridgeResult<CancelableFuture<Value>>
    where
        M: Into<MethodName>,
        E: Into<EventNames>,
    {
        self.start(method.into(), events.into(), options)
    }

    /// Like [`RequestManager::request`] for a method described by a
    /// [`HostRequest`]; the payload is parsed strictly into `R::Payload`.
    pub fn request_typed<R: HostRequest>(
        &self,
        params: &R::Params,
        options: RequestOptions,
    ) -> BridgeResult<CancelableFuture<R::Payload>> {
        let params = serde_json::to_value(params).map_err(|e| BridgeError::parse(e.to_string()))?;
        let call = self.request(R::METHOD, R::EVENT, options.params(params))?;
        Ok(call.then(payload::parse_object::<R::Payload>))
    }

    #[instrument(level = "debug", skip(self, options))]
    fn start(
        &self,
        method: MethodName,
        events: EventNames,
        options: RequestOptions,
    ) -> BridgeResult<CancelableFuture<Value>> {
        if events.is_empty() {
            return Err(BridgeError::InvalidRequest(
                "at least one expected event is required".to_string(),
            ));
        }

        let RequestOptions {
            params,
            capture,
            timeout,
            dispatcher,
            signal,
        } = options;
        let dispatcher = dispatcher.unwrap_or_else(|| self.dispatcher.clone());
        dispatcher.check(&method, &params)?;

        if signal.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(BridgeError::aborted("signal was cancelled before the call"));
        }
        let timeout = timeout.or(self.default_timeout);
        let runtime = if timeout.is_some() || signal.is_some() {
            Some(Handle::try_current().map_err(|_| {
                BridgeError::InvalidRequest(
                    "timeouts and abort signals require a tokio runtime".to_string(),
                )
            })?)
        } else {
            None
        };

        let call_id = CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let call = CancelableFuture::new(|settler: Settler<Value>| {
            self.pending_requests.insert(
                call_id,
                PendingCall {
                    method: method.clone(),
                    events: events.clone(),
                    cancel: settler.cancel_handle(),
                },
            );
            let pending_requests = self.pending_requests.clone();
            settler.on_settle(move || {
                pending_requests.remove(&call_id);
                trace!("{} released", call_id);
            });

            let subscriptions = self.subscribe(call_id, &events, &capture, &settler);
            settler.on_settle(move || drop(subscriptions));

            self.dispatch(call_id, dispatcher.as_ref(), &method, &params, &settler);
            if settler.is_settled() {
                return;
            }

            let Some(runtime) = runtime else {
                return;
            };
            if let Some(timeout) = timeout {
                let timed_out = settler.clone();
                let timer = runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if timed_out.reject(BridgeError::TimedOut { timeout }) {
                        debug!("{} timed out after {:?}", call_id, timeout);
                    }
                });
                settler.on_settle(move || timer.abort());
            }
            if let Some(signal) = signal {
                let aborted = settler.clone();
                let watcher = runtime.spawn(async move {
                    signal.cancelled().await;
                    if aborted.cancel(BridgeError::aborted("abort signal received")) {
                        debug!("{} aborted", call_id);
                    }
                });
                settler.on_settle(move || watcher.abort());
            }
        });
        Ok(call)
    }

    fn subscribe(
        &self,
        call_id: CallId,
        events: &EventNames,
        capture: &Capture,
        settler: &Settler<Value>,
    ) -> Vec<Subscription> {
        events
            .iter()
            .map(|event| {
                let settler = settler.clone();
                let capture = capture.clone();
                let name = event.clone();
                self.event_bus.on(event.clone(), move |payload| {
                    if settler.is_settled() {
                        return;
                    }
                    match capture.evaluate(payload) {
                        Ok(true) => {
                            if settler.resolve(payload.clone()) {
                                debug!("{} captured {}", call_id, name);
                            }
                        }
                        Ok(false) => trace!("{} ignored {}", call_id, name),
                        Err(e) => {
                            warn!("{} capture failed on {}: {}", call_id, name, e);
                            settler.reject(e);
                        }
                    }
                })
            })
            .collect()
    }

    fn dispatch(
        &self,
        call_id: CallId,
        dispatcher: &dyn Dispatcher,
        method: &MethodName,
        params: &Value,
        settler: &Settler<Value>,
    ) {
        match dispatcher.dispatch(method, params) {
            Ok(Dispatch::Sent) => trace!("{} sent {}", call_id, method),
            Ok(Dispatch::Pending(send)) => match Handle::try_current() {
                Ok(runtime) => {
                    let failed = settler.clone();
                    runtime.spawn(async move {
                        if let Err(e) = send.await {
                            warn!("{} dispatch failed: {}", call_id, e);
                            failed.reject(e);
                        }
                    });
                }
                Err(_) => {
                    settler.reject(BridgeError::InvalidRequest(
                        "asynchronous dispatch requires a tokio runtime".to_string(),
                    ));
                }
            },
            Err(e) => {
                warn!("{} dispatch failed: {}", call_id, e);
                settler.reject(e);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Cancels every pending call with `reason`. Returns how many calls were
    /// actually cancelled.
    pub fn cancel_waiting_requests(&self, reason: &str) -> usize {
        // cancelling removes the entry, so collect before touching the map again
        let pending: Vec<(CallId, MethodName, CancelHandle)> = self
            .pending_requests
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    entry.method.clone(),
                    entry.cancel.clone(),
                )
            })
            .collect();

        let mut cancelled = 0;
        for (call_id, method, handle) in pending {
            if handle.cancel_with(reason) {
                debug!("{} ({}) cancelled: {}", call_id, method, reason);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Calls currently waiting on `event`.
    pub fn waiting_on(&self, event: &str) -> usize {
        self.pending_requests
            .iter()
            .filter(|entry| entry.events.contains(event))
            .count()
    }
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("pending", &self.pending_count())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
