// Test mocks for the monitor.
//
// - MockFetcher (PageFetcher): one scripted response, swappable between ticks,
//   optionally held behind a gate so a tick can be caught mid-fetch
// - MockTransport (MessageTransport): records every send, scripted outcomes
//   per recipient

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::fetcher::PageFetcher;
use crate::notify::{DeliveryOutcome, MessageTransport, OutgoingMessage};
use ielts_common::RecipientId;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An announcements page whose known session cell carries the given dates.
pub fn exam_page(exam_date: &str, deadline: &str) -> String {
    format!(
        "<html><body><table class=\"tablepress\"><tbody>\
         <tr class=\"row-1 odd\"><td class=\"column-1\">IELTS Sınav Tarihleri</td></tr>\
         <tr class=\"row-2 even\"><td class=\"column-1\">\
         -- {exam_date} - Sınav Saati 09:00 Son Başvuru ve Belge YüklemeTarihi: {deadline}\
         </td></tr></tbody></table></body></html>"
    )
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

enum Scripted {
    Page(String),
    Failure(String),
}

/// Returns whatever was last scripted, for any URL.
pub struct MockFetcher {
    next: Mutex<Scripted>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<usize>,
}

impl MockFetcher {
    pub fn page(html: impl Into<String>) -> Self {
        Self {
            next: Mutex::new(Scripted::Page(html.into())),
            gate: None,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            next: Mutex::new(Scripted::Failure(reason.into())),
            gate: None,
            calls: Mutex::new(0),
        }
    }

    /// Every fetch waits for one permit on `gate` before returning.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_page(&self, html: impl Into<String>) {
        *self.next.lock().unwrap() = Scripted::Page(html.into());
    }

    pub fn set_failure(&self, reason: impl Into<String>) {
        *self.next.lock().unwrap() = Scripted::Failure(reason.into());
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        match &*self.next.lock().unwrap() {
            Scripted::Page(html) => Ok(html.clone()),
            Scripted::Failure(reason) => bail!("MockFetcher: GET {url} failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Delivers everything unless an outcome was scripted for the recipient.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<HashMap<RecipientId, DeliveryOutcome>>,
    sent: Mutex<Vec<(RecipientId, OutgoingMessage)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_send(self, recipient: RecipientId, outcome: DeliveryOutcome) -> Self {
        self.outcomes.lock().unwrap().insert(recipient, outcome);
        self
    }

    /// Every attempted send, in call order, including failed ones.
    pub fn sent(&self) -> Vec<(RecipientId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: RecipientId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == recipient)
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(&self, recipient: RecipientId, message: &OutgoingMessage) -> DeliveryOutcome {
        self.sent.lock().unwrap().push((recipient, message.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .get(&recipient)
            .cloned()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}
