//! # webview-bridge: request/response calls over a fire-and-forget host channel
//!
//! A Mini App talks to its host through a one-way message channel: the app
//! posts a method call and, at some later point, the host emits an event that
//! may or may not be the answer. This crate turns that channel into ordinary
//! awaitable calls.
//!
//! ## Building Blocks
//!
//! ### 1. Cancelable Futures
//! One-shot results with an explicit cancel operation and exactly-once cleanup
//! ([`cancel`]).
//!
//! ### 2. Event System
//! Host events are delivered synchronously to subscribers of the
//! [`event_bus::EventBus`]. Method and event identifiers live in
//! [`event_registry`].
//!
//! ### 3. Request Correlation
//! The [`RequestManager`] subscribes to the events that may answer a call,
//! dispatches it, and settles the call with the first payload its
//! [`capture::Capture`] accepts, or with a timeout, abort or cancellation
//! ([`event`]).
//!
//! ### 4. Dispatchers
//! The host boundary ([`dispatch`]): capability checks against the host
//! version, and a channel-backed dispatcher feeding the [`transport`] writer.
//!
//! ### 5. Typed Methods
//! Invoices, custom methods, viewport and theme requests ([`methods`]), with
//! strict payload parsing ([`payload`]).
//!
//! ## Call Lifecycle
//!
//! ```text
//! check → subscribe → dispatch → (response | timeout | abort | cancel) → cleanup
//! ```
//!
//! Whatever ends a call, the same cleanup runs exactly once: listeners are
//! removed, timers stop and the call leaves the pending table.

pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod methods;
pub mod payload;
pub mod transport;

pub use event::{capture, event_bus, event_registry, request_manager};

// Re-exports
pub use cancel::{CancelHandle, CancelableFuture, FutureState, Settler};
pub use config::BridgeConfig;
pub use error::*;
pub use event::HostRequest;
pub use event_bus::{EventBus, Subscription, SubscriptionId};
pub use request_manager::{RequestManager, RequestOptions};
