use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use super::{Dispatch, Dispatcher};
use crate::{BridgeError, BridgeResult, event_registry::MethodName, transport::HostMessage};

/// Queues outgoing calls for a transport writer task.
///
/// A full queue doesn't fail the call: the send completes asynchronously once
/// the writer catches up. A closed queue fails it with a transport error.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<HostMessage>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<HostMessage>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HostMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, method: &MethodName, params: &Value) -> BridgeResult<Dispatch> {
        let message = HostMessage::new(method.as_str(), params.clone());
        match self.tx.try_send(message) {
            Ok(()) => Ok(Dispatch::Sent),
            Err(TrySendError::Full(message)) => {
                trace!("Outbound queue full, waiting to send {}", method);
                let tx = self.tx.clone();
                Ok(Dispatch::pending(async move {
                    tx.send(message)
                        .await
                        .map_err(|_| BridgeError::transport("host channel closed"))
                }))
            }
            Err(TrySendError::Closed(_)) => Err(BridgeError::transport("host channel closed")),
        }
    }
}
