use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::monitor::Monitor;
use crate::notify::{Notification, Notifier};

/// Delay before the first check, so the listener is up first.
pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(10);
pub const STARTUP_MESSAGE_DELAY: Duration = Duration::from_secs(15);

/// Run one check after [`INITIAL_CHECK_DELAY`], then one per `every` until
/// `shutdown` flips. Each tick runs on its own task, so a slow check never
/// delays the timer; the monitor itself skips a tick that would overlap.
pub async fn run_checks(monitor: Arc<Monitor>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(
        initial_delay_secs = INITIAL_CHECK_DELAY.as_secs(),
        interval_secs = every.as_secs(),
        "Scheduler started"
    );

    tokio::select! {
        _ = shutdown.changed() => {
            info!("Scheduler stopped before first check");
            return;
        }
        _ = tokio::time::sleep(INITIAL_CHECK_DELAY) => {}
    }

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    let outcome = monitor.tick().await;
                    info!(outcome = %outcome, "Check complete");
                });
            }
        }
    }

    info!("Scheduler stopped");
}

/// Broadcast one liveness message after [`STARTUP_MESSAGE_DELAY`], unless
/// shutdown comes first.
pub async fn send_startup_message(notifier: Arc<Notifier>, mut shutdown: watch::Receiver<bool>) {
    tokio::select! {
        _ = shutdown.changed() => return,
        _ = tokio::time::sleep(STARTUP_MESSAGE_DELAY) => {}
    }

    let summary = notifier.broadcast(&Notification::liveness()).await;
    info!(summary = %summary, "Startup message sent");
}
