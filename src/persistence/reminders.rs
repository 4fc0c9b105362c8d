//! Minute-granular alarm/reminder tick worker (supplemental feature,
//! per the design note in spec §9: "a tick-driven worker consulting the
//! store every ~60s rather than a per-alarm scheduler").
//!
//! Grounded on the teacher's `soul`-style background-heartbeat-worker
//! shape (a `tokio::spawn`'d interval loop that's cheap to start
//! alongside the dispatcher), reduced to the one tick this crate needs.

use super::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// A due alarm rendered as a synthetic wake-equivalent event: the
/// orchestrator starts a turn with this transcript instead of real ASR
/// text (spec §9's "the one place the system initiates a turn without
/// a wake word").
#[derive(Debug, Clone)]
pub struct ReminderEvent {
    pub transcript: String,
}

/// Polls `alarms` once a minute and emits a `ReminderEvent` for each
/// alarm whose `fire_at` has passed; non-recurring alarms are removed,
/// recurring ones are pushed forward a day.
pub struct ReminderTick {
    store: Arc<Store>,
    tx: mpsc::UnboundedSender<ReminderEvent>,
}

impl ReminderTick {
    pub fn new(store: Arc<Store>, tx: mpsc::UnboundedSender<ReminderEvent>) -> Self {
        Self { store, tx }
    }

    /// Spawns the tick loop; returns its join handle so callers can
    /// abort it on shutdown.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = self.tick_once() {
                    error!("reminder tick failed: {e}");
                }
            }
        })
    }

    fn tick_once(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        for alarm in self.store.due_alarms(now)? {
            info!(label = %alarm.label, "alarm due, injecting synthetic turn");
            let _ = self.tx.send(ReminderEvent { transcript: format!("time for {}", alarm.label) });
            if alarm.recurring {
                self.store.reschedule_alarm(alarm.id, alarm.fire_at + chrono::Duration::days(1))?;
            } else {
                self.store.remove_alarm(alarm.id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_once_emits_event_and_removes_non_recurring_alarm() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.add_alarm(Utc::now() - chrono::Duration::minutes(1), "wake up", false).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tick = ReminderTick::new(store.clone(), tx);
        tick.tick_once().unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.transcript, "time for wake up");
        assert!(store.due_alarms(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn tick_once_reschedules_recurring_alarm() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let now = Utc::now();
        store.add_alarm(now - chrono::Duration::minutes(1), "standup", true).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tick = ReminderTick::new(store.clone(), tx);
        tick.tick_once().unwrap();
        assert!(rx.try_recv().is_ok());
        // Rescheduled a day out, so it should no longer be due "now".
        assert!(store.due_alarms(now).unwrap().is_empty());
    }
}
