use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque notification target. For Telegram this is the chat id.
pub type RecipientId = i64;

/// The pair of dates the monitor compares between ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDates {
    pub exam_date: String,
    pub application_deadline: String,
}

impl ExamDates {
    pub fn new(exam_date: impl Into<String>, application_deadline: impl Into<String>) -> Self {
        Self {
            exam_date: exam_date.into(),
            application_deadline: application_deadline.into(),
        }
    }
}

impl fmt::Display for ExamDates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exam_date={} application_deadline={}",
            self.exam_date, self.application_deadline
        )
    }
}

/// What one successful extraction produced. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedSnapshot {
    pub exam_date: String,
    pub application_deadline: String,
    /// The page text the dates were read from, kept for logging.
    pub raw_text: String,
}

impl ScrapedSnapshot {
    pub fn dates(&self) -> ExamDates {
        ExamDates::new(&self.exam_date, &self.application_deadline)
    }
}

/// On-disk record of the monitor. Field names match the JSON layout
/// written by earlier deployments of the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "lastExamDate")]
    pub last_exam_date: Option<String>,
    #[serde(rename = "lastApplicationDeadline")]
    pub last_application_deadline: Option<String>,
    #[serde(rename = "lastNotificationSent")]
    pub last_notification_sent: Option<DateTime<Utc>>,
    #[serde(rename = "isInitialized", default)]
    pub initialized: bool,
    #[serde(rename = "subscribedChatIds", default)]
    pub subscribers: BTreeSet<RecipientId>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::baseline()
    }
}

impl PersistedState {
    /// Empty, uninitialized record.
    pub fn baseline() -> Self {
        Self {
            last_exam_date: None,
            last_application_deadline: None,
            last_notification_sent: None,
            initialized: false,
            subscribers: BTreeSet::new(),
        }
    }

    pub fn last_dates(&self) -> Option<ExamDates> {
        match (&self.last_exam_date, &self.last_application_deadline) {
            (Some(exam), Some(deadline)) => Some(ExamDates::new(exam, deadline)),
            _ => None,
        }
    }

    /// Repair a record that breaks the pairing rules: dates are both set or
    /// both null, and `initialized` holds exactly when they are set.
    /// Subscribers are always kept. Returns true if anything was changed.
    pub fn normalize(&mut self) -> bool {
        let consistent = match (
            &self.last_exam_date,
            &self.last_application_deadline,
            self.initialized,
        ) {
            (Some(_), Some(_), true) => true,
            (None, None, false) => true,
            _ => false,
        };
        if consistent {
            return false;
        }

        self.last_exam_date = None;
        self.last_application_deadline = None;
        self.last_notification_sent = None;
        self.initialized = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_layout_uses_legacy_field_names() {
        let mut state = PersistedState::baseline();
        state.subscribers.insert(42);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lastExamDate": null,
                "lastApplicationDeadline": null,
                "lastNotificationSent": null,
                "isInitialized": false,
                "subscribedChatIds": [42]
            })
        );
    }

    #[test]
    fn missing_subscribers_field_loads_empty() {
        let json = r#"{
            "lastExamDate": "12 Ocak 2025, Pazar",
            "lastApplicationDeadline": "20 Aralık 2024, Cuma",
            "lastNotificationSent": "2024-12-01T09:30:00.000Z",
            "isInitialized": true
        }"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert!(state.subscribers.is_empty());
        assert!(state.initialized);
        assert_eq!(
            state.last_dates(),
            Some(ExamDates::new("12 Ocak 2025, Pazar", "20 Aralık 2024, Cuma"))
        );
        assert!(state.last_notification_sent.is_some());
    }

    #[test]
    fn duplicate_subscribers_collapse() {
        let json = r#"{"lastExamDate":null,"lastApplicationDeadline":null,"lastNotificationSent":null,"isInitialized":false,"subscribedChatIds":[5,3,5]}"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert_eq!(state.subscribers.iter().copied().collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn normalize_clears_half_set_dates_but_keeps_subscribers() {
        let mut state = PersistedState::baseline();
        state.last_exam_date = Some("12 Ocak 2025, Pazar".into());
        state.initialized = true;
        state.subscribers.insert(7);

        assert!(state.normalize());
        assert_eq!(state.last_exam_date, None);
        assert!(!state.initialized);
        assert!(state.subscribers.contains(&7));
    }

    #[test]
    fn normalize_leaves_consistent_records_alone() {
        let mut state = PersistedState::baseline();
        assert!(!state.normalize());

        state.last_exam_date = Some("a".into());
        state.last_application_deadline = Some("b".into());
        state.initialized = true;
        assert!(!state.normalize());
    }
}
