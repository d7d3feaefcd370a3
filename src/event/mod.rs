//! # Event-Driven Request/Response
//!
//! The host answers method calls asynchronously, by emitting events. This
//! module turns that into awaitable calls.
//!
//! ## Architecture Overview
//!
//! - **EventBus**: synchronous publish/subscribe registry of host events
//! - **EventRegistry**: typed method and event names, plus the [`HostRequest`]
//!   descriptions used for typed calls
//! - **Capture**: predicates deciding which payload answers which call
//! - **RequestManager**: correlates calls with their answers, with timeouts and
//!   cancellation
//!
//! ## Call Flow
//!
//! ```text
//! ┌──────────┐ request ┌──────────────┐ dispatch ┌──────┐
//! │  Caller  │────────▶│RequestManager│─────────▶│ Host │
//! └────▲─────┘         └──────▲───────┘          └──┬───┘
//!      │                      │ capture?            │ event
//!      │    CancelableFuture  │                ┌────▼─────┐
//!      └──────────────────────┴────────────────│ EventBus │
//!                                              └──────────┘
//! ```
//!
//! 1. The caller asks the RequestManager for a method call and the events that
//!    may answer it
//! 2. The manager subscribes, then sends the call through the dispatcher
//! 3. Each emission of an expected event is offered to the call's capture
//! 4. The first accepted payload resolves the call; all listeners are removed
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use webview_bridge::{BridgeConfig, EventBus, RequestManager, RequestOptions};
//! use webview_bridge::capture::field_eq;
//! use webview_bridge::dispatch::ChannelDispatcher;
//!
//! # async fn example() -> webview_bridge::BridgeResult<()> {
//! let (dispatcher, _outbound) = ChannelDispatcher::channel(16);
//! let manager = RequestManager::new(EventBus::new(), Arc::new(dispatcher), &BridgeConfig::default());
//!
//! let closed = manager
//!     .request(
//!         "web_app_open_invoice",
//!         "invoice_closed",
//!         RequestOptions::new()
//!             .params(json!({"slug": "abc"}))
//!             .capture(field_eq("slug", "abc")),
//!     )?
//!     .await?;
//! println!("status: {}", closed["status"]);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod event_bus;
pub mod event_registry;
pub mod request_manager;

pub use event_registry::HostRequest;
