use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::extractor;
use crate::fetcher::PageFetcher;
use crate::notify::{BroadcastSummary, Notification, Notifier};
use crate::state::StateStore;
use ielts_common::ExamDates;

const EXTRACTION_FAILED_MESSAGE: &str =
    "Web sitesinden veri çekilemedi. Lütfen daha sonra tekrar deneyin.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Idle,
    Fetching,
    Extracting,
    Diffing,
    Notifying,
}

/// What one check cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still in flight.
    Skipped,
    /// First successful observation; stored without notifying.
    Baseline(ExamDates),
    Unchanged(ExamDates),
    Changed {
        previous: Option<ExamDates>,
        current: ExamDates,
        summary: BroadcastSummary,
    },
    /// Fetch failed or both strategies missed; an error was broadcast.
    ExtractionFailed {
        reason: String,
        summary: BroadcastSummary,
    },
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped: previous check still running"),
            Self::Baseline(dates) => write!(f, "baseline stored: {dates}"),
            Self::Unchanged(dates) => write!(f, "unchanged: {dates}"),
            Self::Changed {
                previous,
                current,
                summary,
            } => {
                match previous {
                    Some(previous) => write!(f, "changed: {previous} -> {current}")?,
                    None => write!(f, "changed: {current}")?,
                }
                write!(f, " ({summary})")
            }
            Self::ExtractionFailed { reason, summary } => {
                write!(f, "extraction failed: {reason} ({summary})")
            }
        }
    }
}

/// Snapshot of the monitor for `/status`-style reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    /// A check cycle is executing right now. Not whether the service is up.
    pub tick_in_flight: bool,
    pub phase: MonitorPhase,
    pub last_dates: Option<ExamDates>,
    pub last_notification_sent: Option<DateTime<Utc>>,
    pub is_initialized: bool,
    pub target_url: String,
    pub check_interval_minutes: u64,
    pub subscriber_count: usize,
}

/// Runs check cycles: fetch, extract, diff, notify, persist.
pub struct Monitor {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<StateStore>,
    notifier: Arc<Notifier>,
    target_url: String,
    check_interval_minutes: u64,
    phase: Mutex<MonitorPhase>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Monitor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<StateStore>,
        notifier: Arc<Notifier>,
        target_url: impl Into<String>,
        check_interval_minutes: u64,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            target_url: target_url.into(),
            check_interval_minutes,
            phase: Mutex::new(MonitorPhase::Idle),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> MonitorStatus {
        let phase = self.phase();
        MonitorStatus {
            tick_in_flight: phase != MonitorPhase::Idle,
            phase,
            last_dates: self.store.last_dates(),
            last_notification_sent: self.store.last_notification_sent(),
            is_initialized: self.store.is_initialized(),
            target_url: self.target_url.clone(),
            check_interval_minutes: self.check_interval_minutes,
            subscriber_count: self.store.subscriber_count(),
        }
    }

    /// One check cycle. Never overlaps with itself: a tick that starts while
    /// another is in flight returns [`TickOutcome::Skipped`].
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous check still running, skipping this tick");
            return TickOutcome::Skipped;
        };

        let outcome = self.tick_inner().await;
        self.set_phase(MonitorPhase::Idle);
        outcome
    }

    async fn tick_inner(&self) -> TickOutcome {
        info!(url = %self.target_url, "Checking for exam date changes");

        self.set_phase(MonitorPhase::Fetching);
        let html = match self.fetcher.fetch(&self.target_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %self.target_url, error = %format!("{e:#}"), "Failed to fetch page");
                return self
                    .extraction_failed(format!("{EXTRACTION_FAILED_MESSAGE} ({e:#})"))
                    .await;
            }
        };

        self.set_phase(MonitorPhase::Extracting);
        let snapshot = match extractor::extract_page(&html) {
            Ok((snapshot, strategy)) => {
                info!(
                    strategy = %strategy,
                    exam_date = %snapshot.exam_date,
                    application_deadline = %snapshot.application_deadline,
                    "Extracted exam dates"
                );
                snapshot
            }
            Err(miss) => {
                warn!(reason = %miss, "Could not extract exam date information");
                return self
                    .extraction_failed(EXTRACTION_FAILED_MESSAGE.to_string())
                    .await;
            }
        };

        self.set_phase(MonitorPhase::Diffing);
        let current = snapshot.dates();
        let was_initialized = self.store.is_initialized();
        let changed = self
            .store
            .has_changed(&current.exam_date, &current.application_deadline);

        let outcome = if changed {
            let previous = self.store.last_dates();
            info!(
                previous = ?previous,
                current = %current,
                "Exam date changed, notifying subscribers"
            );

            self.set_phase(MonitorPhase::Notifying);
            let summary = self
                .notifier
                .broadcast(&Notification::DateChanged {
                    previous: previous.clone(),
                    current: current.clone(),
                    page_url: self.target_url.clone(),
                })
                .await;
            info!(summary = %summary, "Date change notification complete");

            TickOutcome::Changed {
                previous,
                current: current.clone(),
                summary,
            }
        } else if was_initialized {
            info!("No changes detected");
            TickOutcome::Unchanged(current.clone())
        } else {
            TickOutcome::Baseline(current.clone())
        };

        self.store
            .update(&current.exam_date, &current.application_deadline);
        outcome
    }

    async fn extraction_failed(&self, cause: String) -> TickOutcome {
        self.set_phase(MonitorPhase::Notifying);
        let summary = self.notifier.broadcast(&Notification::error(&cause)).await;
        TickOutcome::ExtractionFailed {
            reason: cause,
            summary,
        }
    }

    fn set_phase(&self, phase: MonitorPhase) {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
    }
}
