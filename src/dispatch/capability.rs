//! Host capability table.
//!
//! Methods and some of their parameters appeared in specific Mini Apps
//! versions. [`VersionGate`] consults this table before anything is sent so
//! that an unsupported call fails without touching the event bus.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde_json::Value;
use tracing::debug;

use super::{Dispatch, Dispatcher};
use crate::{BridgeError, BridgeResult, event_registry::MethodName};

/// Dotted numeric version such as `6.10`. Missing components compare as zero.
#[derive(Debug, Clone)]
pub struct Version(Vec<u32>);

impl FromStr for Version {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BridgeError::Config(format!("invalid version '{}': {}", s, e)))?;
        Ok(Version(parts))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

fn method_since(method: &MethodName) -> Option<(u32, u32)> {
    match method {
        MethodName::OpenInvoice | MethodName::SetHeaderColor => Some((6, 1)),
        MethodName::ReadTextFromClipboard => Some((6, 4)),
        MethodName::InvokeCustomMethod | MethodName::RequestPhone => Some((6, 9)),
        // available in every version
        _ => None,
    }
}

fn param_since(method: &MethodName, param: &str) -> Option<(u32, u32)> {
    match (method, param) {
        (MethodName::OpenLink, "try_instant_view") => Some((6, 4)),
        (MethodName::SetHeaderColor, "color") => Some((6, 9)),
        _ => None,
    }
}

fn at_least(version: &Version, (major, minor): (u32, u32)) -> bool {
    *version >= Version(vec![major, minor])
}

pub fn supports(method: &MethodName, version: &Version) -> bool {
    method_since(method).is_none_or(|since| at_least(version, since))
}

pub fn supports_param(method: &MethodName, param: &str, version: &Version) -> bool {
    param_since(method, param).is_none_or(|since| at_least(version, since))
}

/// Wraps a dispatcher with the capability table for a given host version.
pub struct VersionGate<D> {
    inner: D,
    version: Option<Version>,
}

impl<D: Dispatcher> VersionGate<D> {
    /// `None` means the host environment could not be identified; every call
    /// then fails with `UnknownEnv`.
    pub fn new(inner: D, version: Option<&str>) -> BridgeResult<Self> {
        let version = version.map(str::parse::<Version>).transpose()?;
        Ok(Self { inner, version })
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
}

impl<D: Dispatcher> Dispatcher for VersionGate<D> {
    fn check(&self, method: &MethodName, params: &Value) -> BridgeResult<()> {
        let version = self.version.as_ref().ok_or(BridgeError::UnknownEnv)?;

        if !supports(method, version) {
            debug!("{} is not supported by host {}", method, version);
            return Err(BridgeError::MethodUnsupported {
                method: method.to_string(),
                version: version.to_string(),
            });
        }

        if let Some(object) = params.as_object() {
            if let Some(param) = object
                .keys()
                .find(|param| !supports_param(method, param, version))
            {
                return Err(BridgeError::MethodParameterUnsupported {
                    method: method.to_string(),
                    param: param.clone(),
                    version: version.to_string(),
                });
            }
        }

        self.inner.check(method, params)
    }

    fn dispatch(&self, method: &MethodName, params: &Value) -> BridgeResult<Dispatch> {
        self.inner.dispatch(method, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FnDispatcher;
    use serde_json::json;

    fn gate(version: Option<&str>) -> VersionGate<impl Dispatcher> {
        VersionGate::new(
            FnDispatcher::new(|_: &MethodName, _: &Value| Ok(())),
            version,
        )
        .unwrap()
    }

    #[test]
    fn test_version_ordering() {
        let v: Version = "6.10".parse().unwrap();
        assert!(v > "6.9".parse::<Version>().unwrap());
        assert_eq!("6".parse::<Version>().unwrap(), "6.0".parse::<Version>().unwrap());
        assert!("six".parse::<Version>().is_err());
    }

    #[test]
    fn test_unknown_env() {
        let err = gate(None)
            .check(&MethodName::RequestViewport, &Value::Null)
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownEnv));
    }

    #[test]
    fn test_method_unsupported() {
        let err = gate(Some("6.0"))
            .check(&MethodName::OpenInvoice, &json!({"slug": "abc"}))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MethodUnsupported { .. }));
        assert!(gate(Some("6.1"))
            .check(&MethodName::OpenInvoice, &json!({"slug": "abc"}))
            .is_ok());
    }

    #[test]
    fn test_parameter_unsupported() {
        let err = gate(Some("6.2"))
            .check(
                &MethodName::OpenLink,
                &json!({"url": "https://t.me", "try_instant_view": true}),
            )
            .unwrap_err();
        match err {
            BridgeError::MethodParameterUnsupported { param, .. } => {
                assert_eq!(param, "try_instant_view")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(gate(Some("6.2"))
            .check(&MethodName::OpenLink, &json!({"url": "https://t.me"}))
            .is_ok());
    }

    #[test]
    fn test_custom_methods_pass() {
        assert!(gate(Some("6.0"))
            .check(&MethodName::from("web_app_something_new"), &Value::Null)
            .is_ok());
    }
}
