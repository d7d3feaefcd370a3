//! Typed host methods built on top of the [`RequestManager`](crate::RequestManager).
//!
//! Each submodule describes one method with a [`HostRequest`](crate::HostRequest)
//! and adds whatever correlation or validation that method needs.

pub mod custom_method;
pub mod invoice;
pub mod theme;
pub mod viewport;

pub use custom_method::{invoke_custom_method, invoke_custom_method_with_id};
pub use invoice::{InvoiceOpener, InvoiceStatus};
pub use theme::{ThemeParams, request_theme};
pub use viewport::{ViewportState, request_viewport};
