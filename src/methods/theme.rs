use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    BridgeResult, CancelableFuture, RequestManager, RequestOptions,
    event_registry::{EventName, HostRequest, MethodName},
};

/// Theme colors keyed by name, e.g. `bg_color` → `#ffffff`.
pub type ThemeParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeChanged {
    pub theme_params: ThemeParams,
}

pub struct RequestTheme;

impl HostRequest for RequestTheme {
    const METHOD: MethodName = MethodName::RequestTheme;
    const EVENT: EventName = EventName::ThemeChanged;
    type Params = ();
    type Payload = ThemeChanged;
}

pub fn request_theme(
    manager: &RequestManager,
    options: RequestOptions,
) -> BridgeResult<CancelableFuture<ThemeParams>> {
    let call = manager.request_typed::<RequestTheme>(&(), options)?;
    Ok(call.map(|changed| changed.theme_params))
}
