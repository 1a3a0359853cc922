use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use ielts_common::{ExamDates, PersistedState, RecipientId, StateLocation};

/// Where mutations go after they are applied in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBacking {
    /// Rewritten after every mutation.
    File(PathBuf),
    /// Nothing survives a restart; a cold start is always uninitialized
    /// unless a seed record was supplied.
    Ephemeral,
}

/// Owns the monitor's persisted record: the last observed dates and the
/// subscriber set. Every read-modify-write runs under one mutex, and the
/// lock is never held across an await.
pub struct StateStore {
    state: Mutex<PersistedState>,
    backing: StateBacking,
}

impl StateStore {
    pub fn open(location: &StateLocation) -> Self {
        match location {
            StateLocation::File(path) => Self::with_file(path),
            StateLocation::Ephemeral { seed: Some(seed) } => Self::ephemeral_seeded(seed),
            StateLocation::Ephemeral { seed: None } => Self::ephemeral(),
        }
    }

    /// Load from `path`, or start from the baseline if it is missing or unreadable.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match load_file(&path) {
            Ok(Some(state)) => {
                info!(path = %path.display(), "Loaded existing state from file");
                state
            }
            Ok(None) => {
                info!(path = %path.display(), "No state file yet, starting from baseline");
                PersistedState::baseline()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error loading state file, starting from baseline");
                PersistedState::baseline()
            }
        };

        Self {
            state: Mutex::new(state),
            backing: StateBacking::File(path),
        }
    }

    pub fn ephemeral() -> Self {
        info!("Using ephemeral state (no persistent storage)");
        Self {
            state: Mutex::new(PersistedState::baseline()),
            backing: StateBacking::Ephemeral,
        }
    }

    /// Ephemeral store seeded from a JSON record, e.g. the `BOT_STATE` variable.
    pub fn ephemeral_seeded(seed: &str) -> Self {
        let state = match parse_record(seed) {
            Ok(state) => {
                info!("Loaded state from BOT_STATE seed");
                state
            }
            Err(e) => {
                error!(error = %e, "Error parsing BOT_STATE seed, starting from baseline");
                PersistedState::baseline()
            }
        };

        Self {
            state: Mutex::new(state),
            backing: StateBacking::Ephemeral,
        }
    }

    pub fn backing(&self) -> &StateBacking {
        &self.backing
    }

    // --- Date tracking ---

    /// The first observation is a baseline, never a change.
    pub fn has_changed(&self, exam_date: &str, application_deadline: &str) -> bool {
        let state = self.lock();
        if !state.initialized {
            info!("First run - initializing with current dates");
            return false;
        }

        state.last_exam_date.as_deref() != Some(exam_date)
            || state.last_application_deadline.as_deref() != Some(application_deadline)
    }

    /// Overwrite the stored dates, stamp the time and mark the store initialized.
    pub fn update(&self, exam_date: &str, application_deadline: &str) {
        let mut state = self.lock();
        let changed = state.last_exam_date.as_deref() != Some(exam_date)
            || state.last_application_deadline.as_deref() != Some(application_deadline);

        state.last_exam_date = Some(exam_date.to_string());
        state.last_application_deadline = Some(application_deadline.to_string());
        state.last_notification_sent = Some(Utc::now());
        state.initialized = true;
        self.persist(&state);

        if changed {
            info!(exam_date, application_deadline, "Exam date information updated");
        }
    }

    pub fn last_dates(&self) -> Option<ExamDates> {
        self.lock().last_dates()
    }

    pub fn last_notification_sent(&self) -> Option<DateTime<Utc>> {
        self.lock().last_notification_sent
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    // --- Subscribers ---

    /// Returns true only when the recipient was not subscribed before.
    pub fn add_subscriber(&self, id: RecipientId) -> bool {
        let mut state = self.lock();
        if !state.subscribers.insert(id) {
            return false;
        }
        self.persist(&state);
        info!(chat_id = id, "Added new subscriber");
        true
    }

    /// Returns true only when the recipient was subscribed and is now removed.
    pub fn remove_subscriber(&self, id: RecipientId) -> bool {
        let mut state = self.lock();
        if !state.subscribers.remove(&id) {
            return false;
        }
        self.persist(&state);
        info!(chat_id = id, "Removed subscriber");
        true
    }

    pub fn is_subscriber(&self, id: RecipientId) -> bool {
        self.lock().subscribers.contains(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Sorted copy; later mutations do not show up in it.
    pub fn list_subscribers(&self) -> Vec<RecipientId> {
        self.lock().subscribers.iter().copied().collect()
    }

    // --- Whole record ---

    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    /// Back to the empty, uninitialized record (subscribers included).
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = PersistedState::baseline();
        self.persist(&state);
        info!("State has been reset");
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        // A panic mid-mutation leaves a record that is still well-formed.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write-through. Failures are logged and never reach the caller.
    fn persist(&self, state: &PersistedState) {
        match &self.backing {
            StateBacking::File(path) => match write_file(path, state) {
                Ok(()) => debug!(path = %path.display(), "State saved to file"),
                Err(e) => error!(path = %path.display(), error = %e, "Error saving state file"),
            },
            StateBacking::Ephemeral => {
                debug!(
                    state = %serde_json::to_string(state).unwrap_or_default(),
                    "State updated (ephemeral, not persisted)"
                );
            }
        }
    }
}

fn parse_record(json: &str) -> Result<PersistedState> {
    let mut state: PersistedState =
        serde_json::from_str(json).context("State record is not valid JSON")?;
    if state.normalize() {
        warn!("State record had inconsistent date fields; dates reset to baseline");
    }
    Ok(state)
}

fn load_file(path: &Path) -> Result<Option<PersistedState>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_record(&data).map(Some)
}

/// Write to a sibling temp file, then rename over the target.
fn write_file(path: &Path, state: &PersistedState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(state)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAM: &str = "12 Ocak 2025, Pazar";
    const DEADLINE: &str = "20 Aralık 2024, Cuma";

    #[test]
    fn first_observation_is_never_a_change() {
        let store = StateStore::ephemeral();
        assert!(!store.has_changed(EXAM, DEADLINE));
        assert!(!store.has_changed("anything", "else"));
        assert!(!store.is_initialized());
    }

    #[test]
    fn identical_updates_are_not_changes() {
        let store = StateStore::ephemeral();
        store.update(EXAM, DEADLINE);
        store.update(EXAM, DEADLINE);
        assert!(!store.has_changed(EXAM, DEADLINE));
        assert!(store.is_initialized());
        assert!(store.last_notification_sent().is_some());
    }

    #[test]
    fn differing_field_is_a_change() {
        let store = StateStore::ephemeral();
        store.update(EXAM, DEADLINE);
        assert!(store.has_changed("2 Şubat 2025, Pazar", DEADLINE));
        assert!(store.has_changed(EXAM, "10 Ocak 2025, Cuma"));

        store.update("2 Şubat 2025, Pazar", DEADLINE);
        assert!(!store.has_changed("2 Şubat 2025, Pazar", DEADLINE));
        assert_eq!(
            store.last_dates(),
            Some(ExamDates::new("2 Şubat 2025, Pazar", DEADLINE))
        );
    }

    #[test]
    fn subscriber_membership() {
        let store = StateStore::ephemeral();
        assert!(store.add_subscriber(42));
        assert!(!store.add_subscriber(42));
        assert!(store.is_subscriber(42));
        assert_eq!(store.subscriber_count(), 1);

        assert!(store.remove_subscriber(42));
        assert!(!store.remove_subscriber(42));
        assert!(!store.is_subscriber(42));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_list_is_a_sorted_copy() {
        let store = StateStore::ephemeral();
        store.add_subscriber(30);
        store.add_subscriber(-10);
        store.add_subscriber(20);

        let mut listed = store.list_subscribers();
        assert_eq!(listed, vec![-10, 20, 30]);

        listed.clear();
        listed.push(999);
        assert_eq!(store.subscriber_count(), 3);
        assert!(!store.is_subscriber(999));
    }

    #[test]
    fn reset_restores_baseline() {
        let store = StateStore::ephemeral();
        store.update(EXAM, DEADLINE);
        store.add_subscriber(1);

        store.reset();
        assert_eq!(store.snapshot(), PersistedState::baseline());
        assert!(!store.has_changed("x", "y"));
    }

    #[test]
    fn file_round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("bot-state.json");

        let store = StateStore::with_file(&path);
        store.add_subscriber(7);
        store.add_subscriber(3);
        let before = store.snapshot();
        assert_eq!(before.last_exam_date, None);
        assert_eq!(before.last_notification_sent, None);

        let reopened = StateStore::with_file(&path);
        assert_eq!(reopened.snapshot(), before);

        reopened.update(EXAM, DEADLINE);
        let updated = reopened.snapshot();
        let again = StateStore::with_file(&path);
        assert_eq!(again.snapshot(), updated);
        assert!(again.is_initialized());
        assert_eq!(again.list_subscribers(), vec![3, 7]);
    }

    #[test]
    fn written_file_uses_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot-state.json");
        let store = StateStore::with_file(&path);
        store.update(EXAM, DEADLINE);
        store.add_subscriber(42);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["lastExamDate"], EXAM);
        assert_eq!(json["lastApplicationDeadline"], DEADLINE);
        assert_eq!(json["isInitialized"], true);
        assert_eq!(json["subscribedChatIds"], serde_json::json!([42]));
        assert!(json["lastNotificationSent"].is_string());
    }

    #[test]
    fn corrupt_file_loads_as_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot-state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = StateStore::with_file(&path);
        assert_eq!(store.snapshot(), PersistedState::baseline());

        // The next mutation repairs the file.
        store.add_subscriber(1);
        let reopened = StateStore::with_file(&path);
        assert_eq!(reopened.list_subscribers(), vec![1]);
    }

    #[test]
    fn seeded_ephemeral_store_starts_initialized() {
        let seed = format!(
            r#"{{"lastExamDate":"{EXAM}","lastApplicationDeadline":"{DEADLINE}","lastNotificationSent":null,"isInitialized":true,"subscribedChatIds":[5]}}"#
        );
        let store = StateStore::ephemeral_seeded(&seed);
        assert!(store.is_initialized());
        assert!(!store.has_changed(EXAM, DEADLINE));
        assert!(store.is_subscriber(5));
        assert_eq!(store.backing(), &StateBacking::Ephemeral);
    }

    #[test]
    fn bad_seed_falls_back_to_baseline() {
        let store = StateStore::ephemeral_seeded("nope");
        assert_eq!(store.snapshot(), PersistedState::baseline());
    }
}
