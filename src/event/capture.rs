//! Capture predicates and the request identity convention.
//!
//! Every pending call decides for itself whether an incoming payload belongs
//! to it. The usual way to make that decision unambiguous is to embed an
//! identifier in the outgoing parameters and expect the host to echo it back:
//! [`same_req`] matches the echoed `req_id`, [`field_eq`] matches a natural key
//! such as an invoice slug.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use serde_json::Value;
use uuid::Uuid;

use crate::{BridgeError, BridgeResult};

type Predicate = dyn Fn(&Value) -> BridgeResult<bool> + Send + Sync;

#[derive(Clone)]
pub struct Capture(Arc<Predicate>);

impl Capture {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Capture(Arc::new(move |payload: &Value| Ok(predicate(payload))))
    }

    /// A predicate that can fail. An error rejects the call that owns it.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> BridgeResult<bool> + Send + Sync + 'static,
    {
        Capture(Arc::new(predicate))
    }

    /// Accepts the first payload of the expected event.
    pub fn always() -> Self {
        Capture::new(|_| true)
    }

    /// Evaluates the predicate. A panic inside it is reported as
    /// [`BridgeError::Capture`] instead of unwinding through the event bus.
    pub fn evaluate(&self, payload: &Value) -> BridgeResult<bool> {
        match catch_unwind(AssertUnwindSafe(|| (self.0)(payload))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "capture predicate panicked".to_string());
                Err(BridgeError::Capture { message })
            }
        }
    }
}

impl Default for Capture {
    fn default() -> Self {
        Capture::always()
    }
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Capture(..)")
    }
}

/// Matches payloads whose `req_id` echoes `request_id`.
pub fn same_req<S: Into<String>>(request_id: S) -> Capture {
    let request_id = request_id.into();
    Capture::new(move |payload| {
        payload.get("req_id").and_then(Value::as_str) == Some(request_id.as_str())
    })
}

/// Matches payloads where `key` equals `expected`.
pub fn field_eq<K, V>(key: K, expected: V) -> Capture
where
    K: Into<String>,
    V: Into<Value>,
{
    let key = key.into();
    let expected = expected.into();
    Capture::new(move |payload| payload.get(&key) == Some(&expected))
}

/// Identifier embedded in outgoing parameters and echoed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        RequestId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId(value)
    }
}

impl From<RequestId> for String {
    fn from(value: RequestId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_req() {
        let capture = same_req("r1");
        assert!(capture.evaluate(&json!({"req_id": "r1"})).unwrap());
        assert!(!capture.evaluate(&json!({"req_id": "r2"})).unwrap());
        assert!(!capture.evaluate(&json!({"req_id": 1})).unwrap());
        assert!(!capture.evaluate(&json!("r1")).unwrap());
    }

    #[test]
    fn test_field_eq() {
        let capture = field_eq("slug", "abc");
        assert!(capture.evaluate(&json!({"slug": "abc", "status": "paid"})).unwrap());
        assert!(!capture.evaluate(&json!({"slug": "xyz"})).unwrap());
        assert!(!capture.evaluate(&json!({})).unwrap());
    }

    #[test]
    fn test_panicking_predicate_becomes_error() {
        let capture = Capture::new(|payload| payload["slug"].as_str().unwrap() == "abc");
        let err = capture.evaluate(&json!({})).unwrap_err();
        assert!(matches!(err, BridgeError::Capture { .. }));
    }

    #[test]
    fn test_fallible_predicate() {
        let capture = Capture::fallible(|payload| match payload.get("slug") {
            Some(Value::String(slug)) => Ok(slug == "abc"),
            _ => Err(BridgeError::UnexpectedType {
                expected: "string".to_string(),
                got: "missing".to_string(),
            }),
        });
        assert!(capture.evaluate(&json!({"slug": "abc"})).unwrap());
        assert!(capture.evaluate(&json!({"slug": 3})).is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
