//! Known host methods and events, and the compile-time mapping between them.
//!
//! Both enums are closed over the names the bridge knows about, with a
//! `Custom` variant for anything else the host may speak. Parsing never fails:
//! an unknown name becomes `Custom`.

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Serialize, de::DeserializeOwned};

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Custom(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $wire,)+
                    $name::Custom(name) => name.as_str(),
                }
            }

            pub fn is_custom(&self) -> bool {
                matches!(self, $name::Custom(_))
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($wire => $name::$variant,)+
                    other => $name::Custom(other.to_string()),
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value.parse() {
                    Ok(name) => name,
                    Err(never) => match never {},
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::from(value.as_str())
            }
        }

        impl From<&String> for $name {
            fn from(value: &String) -> Self {
                $name::from(value.as_str())
            }
        }

        impl From<&$name> for $name {
            fn from(value: &$name) -> Self {
                value.clone()
            }
        }
    };
}

named_enum! {
    /// Methods the bridge posts to the host.
    MethodName {
        OpenInvoice => "web_app_open_invoice",
        RequestViewport => "web_app_request_viewport",
        RequestTheme => "web_app_request_theme",
        InvokeCustomMethod => "web_app_invoke_custom_method",
        OpenLink => "web_app_open_link",
        SetHeaderColor => "web_app_set_header_color",
        ReadTextFromClipboard => "web_app_read_text_from_clipboard",
        RequestPhone => "web_app_request_phone",
    }
}

named_enum! {
    /// Events the host emits back.
    EventName {
        InvoiceClosed => "invoice_closed",
        ViewportChanged => "viewport_changed",
        ThemeChanged => "theme_changed",
        CustomMethodInvoked => "custom_method_invoked",
        ClipboardTextReceived => "clipboard_text_received",
        PhoneRequested => "phone_requested",
        PopupClosed => "popup_closed",
    }
}

/// The set of events a single call listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames(Vec<EventName>);

impl EventNames {
    pub fn iter(&self) -> impl Iterator<Item = &EventName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|event| event.as_str() == name)
    }
}

impl From<EventName> for EventNames {
    fn from(value: EventName) -> Self {
        EventNames(vec![value])
    }
}

impl From<&str> for EventNames {
    fn from(value: &str) -> Self {
        EventNames(vec![value.into()])
    }
}

impl From<String> for EventNames {
    fn from(value: String) -> Self {
        EventNames(vec![value.into()])
    }
}

impl<T: Into<EventName>> From<Vec<T>> for EventNames {
    fn from(value: Vec<T>) -> Self {
        let mut names: Vec<EventName> = Vec::with_capacity(value.len());
        for name in value.into_iter().map(Into::into) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        EventNames(names)
    }
}

impl<T: Into<EventName>, const N: usize> From<[T; N]> for EventNames {
    fn from(value: [T; N]) -> Self {
        EventNames::from(Vec::from(value))
    }
}

/// Static description of a host method whose completion is reported by a
/// single event with a known payload shape.
pub trait HostRequest {
    const METHOD: MethodName;
    const EVENT: EventName;
    type Params: Serialize;
    type Payload: DeserializeOwned + Send + 'static;
}
