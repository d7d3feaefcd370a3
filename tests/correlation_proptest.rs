//! Property-based tests for request correlation.

use futures::executor::block_on;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;
use webview_bridge::{
    BridgeConfig, EventBus, FutureState, RequestManager, RequestOptions,
    capture::same_req,
    dispatch::FnDispatcher,
    event_registry::MethodName,
};

fn manager() -> RequestManager {
    RequestManager::new(
        EventBus::new(),
        Arc::new(FnDispatcher::new(|_: &MethodName, _: &Value| Ok(()))),
        &BridgeConfig::default(),
    )
}

/// Answer order for `n` calls, with unrelated payloads mixed in.
fn answers_strategy() -> impl Strategy<Value = (usize, Vec<usize>, usize)> {
    (1usize..24).prop_flat_map(|n| {
        (
            Just(n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            0usize..8,
        )
    })
}

proptest! {
    #[test]
    fn test_each_call_gets_its_own_answer((n, order, noise) in answers_strategy()) {
        let manager = manager();
        let calls: Vec<_> = (0..n)
            .map(|i| {
                manager
                    .request(
                        "web_app_invoke_custom_method",
                        "custom_method_invoked",
                        RequestOptions::new()
                            .params(json!({"req_id": format!("r{}", i)}))
                            .capture(same_req(format!("r{}", i))),
                    )
                    .unwrap()
            })
            .collect();

        let bus = manager.event_bus();
        for k in 0..noise {
            bus.emit("custom_method_invoked", &json!({"req_id": format!("stray{}", k)}));
        }
        prop_assert_eq!(manager.pending_count(), n);

        for i in order {
            bus.emit("custom_method_invoked", &json!({"req_id": format!("r{}", i), "result": i}));
        }

        for (i, call) in calls.into_iter().enumerate() {
            prop_assert_eq!(call.state(), FutureState::Resolved);
            let payload = block_on(call).unwrap();
            prop_assert_eq!(&payload["result"], &json!(i));
        }
        prop_assert_eq!(manager.pending_count(), 0);
        prop_assert_eq!(bus.total_subscribers(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent(extra in 0usize..5) {
        let manager = manager();
        let call = manager
            .request("web_app_request_theme", "theme_changed", RequestOptions::new())
            .unwrap();
        prop_assert!(call.cancel());
        for _ in 0..extra {
            prop_assert!(!call.cancel());
        }
        prop_assert_eq!(call.state(), FutureState::Cancelled);
        prop_assert_eq!(manager.pending_count(), 0);
        prop_assert_eq!(manager.event_bus().total_subscribers(), 0);
    }
}
