//! Custom methods: free-form calls answered by `custom_method_invoked`.
//!
//! All custom methods share one response event, so each call embeds a fresh
//! `req_id` in its envelope and only accepts the payload echoing it back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    BridgeError, BridgeResult, CancelableFuture, RequestManager, RequestOptions,
    capture::{RequestId, same_req},
    event_registry::{EventName, HostRequest, MethodName},
};

pub struct InvokeCustomMethod;

#[derive(Debug, Clone, Serialize)]
pub struct CustomMethodParams {
    pub req_id: String,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomMethodInvoked {
    pub req_id: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl CustomMethodInvoked {
    /// A reported `error` wins over any `result`. Empty errors (`""`, `false`,
    /// `0`, `null`) count as no error.
    pub fn into_result(self) -> BridgeResult<Value> {
        match self.error.filter(|error| !is_empty_error(error)) {
            Some(Value::String(error)) => Err(BridgeError::CustomMethodInvokeResponse { error }),
            Some(error) => Err(BridgeError::CustomMethodInvokeResponse {
                error: error.to_string(),
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

fn is_empty_error(error: &Value) -> bool {
    match error {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

impl HostRequest for InvokeCustomMethod {
    const METHOD: MethodName = MethodName::InvokeCustomMethod;
    const EVENT: EventName = EventName::CustomMethodInvoked;
    type Params = CustomMethodParams;
    type Payload = CustomMethodInvoked;
}

/// Invokes `method` under a freshly generated request id.
pub fn invoke_custom_method(
    manager: &RequestManager,
    method: &str,
    params: Value,
    options: RequestOptions,
) -> BridgeResult<CancelableFuture<Value>> {
    invoke_custom_method_with_id(manager, RequestId::generate(), method, params, options)
}

pub fn invoke_custom_method_with_id(
    manager: &RequestManager,
    request_id: RequestId,
    method: &str,
    params: Value,
    options: RequestOptions,
) -> BridgeResult<CancelableFuture<Value>> {
    let envelope = CustomMethodParams {
        req_id: request_id.to_string(),
        method: method.to_string(),
        params,
    };
    let call = manager.request_typed::<InvokeCustomMethod>(
        &envelope,
        options.capture(same_req(request_id)),
    )?;
    Ok(call.then(CustomMethodInvoked::into_result))
}
