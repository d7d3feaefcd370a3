use serde::{Deserialize, Serialize};

use crate::{
    BridgeResult, CancelableFuture, RequestManager, RequestOptions,
    event_registry::{EventName, HostRequest, MethodName},
};

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportChanged {
    pub height: f64,
    /// Some hosts leave the width out; the caller knows its own window.
    #[serde(default)]
    pub width: Option<f64>,
    pub is_expanded: bool,
    pub is_state_stable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    pub height: f64,
    pub width: Option<f64>,
    pub is_expanded: bool,
    pub is_stable: bool,
}

impl From<ViewportChanged> for ViewportState {
    fn from(changed: ViewportChanged) -> Self {
        Self {
            height: changed.height,
            width: changed.width,
            is_expanded: changed.is_expanded,
            is_stable: changed.is_state_stable,
        }
    }
}

pub struct RequestViewport;

impl HostRequest for RequestViewport {
    const METHOD: MethodName = MethodName::RequestViewport;
    const EVENT: EventName = EventName::ViewportChanged;
    type Params = ();
    type Payload = ViewportChanged;
}

pub fn request_viewport(
    manager: &RequestManager,
    options: RequestOptions,
) -> BridgeResult<CancelableFuture<ViewportState>> {
    let call = manager.request_typed::<RequestViewport>(&(), options)?;
    Ok(call.map(ViewportState::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BridgeError, methods::testing::recording_manager};
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_request_viewport() {
        let (manager, sent) = recording_manager();
        let call = request_viewport(&manager, RequestOptions::new()).unwrap();
        assert_eq!(
            sent.lock().unwrap()[0],
            ("web_app_request_viewport".to_string(), Value::Null)
        );

        manager.event_bus().emit(
            "viewport_changed",
            &json!({"height": 640.0, "is_expanded": true, "is_state_stable": false}),
        );
        assert_eq!(
            call.await.unwrap(),
            ViewportState {
                height: 640.0,
                width: None,
                is_expanded: true,
                is_stable: false,
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_viewport_payload() {
        let (manager, _sent) = recording_manager();
        let call = request_viewport(&manager, RequestOptions::new()).unwrap();
        manager
            .event_bus()
            .emit("viewport_changed", &json!({"height": "tall"}));
        assert!(matches!(call.await, Err(BridgeError::Parse { .. })));
    }
}
