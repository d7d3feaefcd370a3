//! Invoices.
//!
//! Only one invoice can be open at a time. The host reports the outcome with
//! `invoice_closed`, carrying the slug it was opened with.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    BridgeError, BridgeResult, CancelableFuture, RequestManager, RequestOptions,
    capture::field_eq,
    event_registry::{EventName, HostRequest, MethodName},
};

const INVOICE_HOST: &str = "t.me";

lazy_static! {
    // "/invoice/my-slug" or "/$my-slug"
    static ref SLUG_PATH: Regex = Regex::new(r"^/(\$|invoice/)([A-Za-z0-9\-_=]+)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Failed,
    Pending,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenInvoiceParams {
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceClosed {
    pub slug: String,
    pub status: InvoiceStatus,
}

pub struct OpenInvoice;

impl HostRequest for OpenInvoice {
    const METHOD: MethodName = MethodName::OpenInvoice;
    const EVENT: EventName = EventName::InvoiceClosed;
    type Params = OpenInvoiceParams;
    type Payload = InvoiceClosed;
}

/// Extracts the slug from a `https://t.me/$slug` or
/// `https://t.me/invoice/slug` link.
pub fn slug_from_url(raw: &str) -> BridgeResult<String> {
    let url = Url::parse(raw)
        .map_err(|e| BridgeError::InvalidRequest(format!("invalid invoice url '{}': {}", raw, e)))?;
    let host = url.host_str().unwrap_or_default();
    if host != INVOICE_HOST {
        return Err(BridgeError::InvalidHostname(host.to_string()));
    }
    SLUG_PATH
        .captures(url.path())
        .and_then(|captures| captures.get(2))
        .map(|slug| slug.as_str().to_string())
        .ok_or_else(|| BridgeError::InvalidSlug(raw.to_string()))
}

/// Opens invoices, refusing to open a second one while the first is shown.
#[derive(Clone)]
pub struct InvoiceOpener {
    manager: Arc<RequestManager>,
    opened: Arc<AtomicBool>,
}

impl InvoiceOpener {
    pub fn new(manager: Arc<RequestManager>) -> Self {
        Self {
            manager,
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Opens the invoice identified by `slug` and resolves with its final status.
    pub fn open(
        &self,
        slug: &str,
        options: RequestOptions,
    ) -> BridgeResult<CancelableFuture<InvoiceStatus>> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::InvoiceOpened);
        }

        let params = OpenInvoiceParams {
            slug: slug.to_string(),
        };
        let call = match self
            .manager
            .request_typed::<OpenInvoice>(&params, options.capture(field_eq("slug", slug)))
        {
            Ok(call) => call,
            Err(e) => {
                self.opened.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        debug!("Opened invoice {}", slug);

        let opened = self.opened.clone();
        Ok(call
            .map(|closed| closed.status)
            .finally(move || opened.store(false, Ordering::SeqCst)))
    }

    /// Same as [`InvoiceOpener::open`], taking a full invoice link.
    pub fn open_url(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> BridgeResult<CancelableFuture<InvoiceStatus>> {
        if self.is_opened() {
            return Err(BridgeError::InvoiceOpened);
        }
        let slug = slug_from_url(url)?;
        self.open(&slug, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::testing::recording_manager;
    use serde_json::json;

    #[test]
    fn test_slug_from_url() {
        assert_eq!(slug_from_url("https://t.me/$abc-DEF_1=").unwrap(), "abc-DEF_1=");
        assert_eq!(slug_from_url("https://t.me/invoice/my-slug").unwrap(), "my-slug");
        assert!(matches!(
            slug_from_url("https://example.com/$abc"),
            Err(BridgeError::InvalidHostname(host)) if host == "example.com"
        ));
        assert!(matches!(
            slug_from_url("https://t.me/abc"),
            Err(BridgeError::InvalidSlug(_))
        ));
        assert!(matches!(
            slug_from_url("https://t.me/invoice/a/b"),
            Err(BridgeError::InvalidSlug(_))
        ));
        assert!(matches!(
            slug_from_url("not a url"),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_open_resolves_status() {
        let (manager, sent) = recording_manager();
        let opener = InvoiceOpener::new(manager.clone());

        let call = opener.open("abc", RequestOptions::new()).unwrap();
        assert!(opener.is_opened());
        assert_eq!(
            sent.lock().unwrap()[0],
            ("web_app_open_invoice".to_string(), json!({"slug": "abc"}))
        );

        let bus = manager.event_bus();
        bus.emit("invoice_closed", &json!({"slug": "xyz", "status": "failed"}));
        bus.emit("invoice_closed", &json!({"slug": "abc", "status": "paid"}));

        assert_eq!(call.await.unwrap(), InvoiceStatus::Paid);
        assert!(!opener.is_opened());
        assert_eq!(bus.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_second_open_rejected() {
        let (manager, sent) = recording_manager();
        let opener = InvoiceOpener::new(manager.clone());

        let call = opener.open("abc", RequestOptions::new()).unwrap();
        assert!(matches!(
            opener.open("xyz", RequestOptions::new()),
            Err(BridgeError::InvoiceOpened)
        ));
        assert!(matches!(
            opener.open_url("https://t.me/$xyz", RequestOptions::new()),
            Err(BridgeError::InvoiceOpened)
        ));
        assert_eq!(sent.lock().unwrap().len(), 1);

        assert!(call.cancel());
        assert!(!opener.is_opened());
        assert!(call.await.unwrap_err().is_cancelled());

        let call = opener
            .open_url("https://t.me/invoice/xyz", RequestOptions::new())
            .unwrap();
        manager
            .event_bus()
            .emit("invoice_closed", &json!({"slug": "xyz", "status": "something_new"}));
        assert_eq!(call.await.unwrap(), InvoiceStatus::Unknown);
    }

    #[test]
    fn test_invalid_url_keeps_opener_closed() {
        let (manager, sent) = recording_manager();
        let opener = InvoiceOpener::new(manager);
        assert!(opener
            .open_url("https://t.me/abc", RequestOptions::new())
            .is_err());
        assert!(!opener.is_opened());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(InvoiceStatus::Cancelled.to_string(), "cancelled");
    }
}
