//! # Dispatcher
//!
//! The boundary through which a method call reaches the host. The bridge never
//! talks to the host itself; it hands the method name and JSON parameters to a
//! [`Dispatcher`] and waits for the host to answer on the event bus.
//!
//! A dispatcher can refuse a call in two places:
//!
//! - [`Dispatcher::check`] runs before any subscription exists. Capability
//!   problems known ahead of I/O belong here.
//! - [`Dispatcher::dispatch`] performs the send. It either fails right away,
//!   completes right away ([`Dispatch::Sent`]), or hands back a future that
//!   completes later ([`Dispatch::Pending`]).

pub mod capability;
pub mod channel;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::{BridgeResult, event_registry::MethodName};

pub use capability::{VersionGate, supports, supports_param};
pub use channel::ChannelDispatcher;

/// Outcome of a successful [`Dispatcher::dispatch`].
pub enum Dispatch {
    Sent,
    Pending(BoxFuture<'static, BridgeResult<()>>),
}

impl Dispatch {
    pub fn pending<F>(future: F) -> Self
    where
        F: std::future::Future<Output = BridgeResult<()>> + Send + 'static,
    {
        Dispatch::Pending(Box::pin(future))
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Sent => f.write_str("Sent"),
            Dispatch::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

#[mockall::automock]
pub trait Dispatcher: Send + Sync {
    /// Rejects calls that can't succeed in the current environment.
    fn check(&self, method: &MethodName, params: &Value) -> BridgeResult<()> {
        let _ = (method, params);
        Ok(())
    }

    fn dispatch(&self, method: &MethodName, params: &Value) -> BridgeResult<Dispatch>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn check(&self, method: &MethodName, params: &Value) -> BridgeResult<()> {
        (**self).check(method, params)
    }

    fn dispatch(&self, method: &MethodName, params: &Value) -> BridgeResult<Dispatch> {
        (**self).dispatch(method, params)
    }
}

/// Adapts a closure into a synchronous dispatcher.
pub struct FnDispatcher<F> {
    send: F,
}

impl<F> FnDispatcher<F>
where
    F: Fn(&MethodName, &Value) -> BridgeResult<()> + Send + Sync,
{
    pub fn new(send: F) -> Self {
        Self { send }
    }
}

impl<F> Dispatcher for FnDispatcher<F>
where
    F: Fn(&MethodName, &Value) -> BridgeResult<()> + Send + Sync,
{
    fn dispatch(&self, method: &MethodName, params: &Value) -> BridgeResult<Dispatch> {
        (self.send)(method, params)?;
        Ok(Dispatch::Sent)
    }
}
