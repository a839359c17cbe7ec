//! Drives config entries the way the host scheduler would: setup with
//! retry, periodic polling, unload on shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ha_config::MasterthermAccount;
use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntrySource};
use ha_entity::Platform;
use mastertherm::{Mastertherm, CONF_PASSWORD, CONF_USERNAME, DOMAIN};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Config entry imported from a `mastertherm.accounts` item
pub fn entry_for_account(account: &MasterthermAccount) -> ConfigEntry {
    ConfigEntry::new(DOMAIN, account.username.clone())
        .with_unique_id(account.username.to_lowercase())
        .with_source(ConfigEntrySource::Import)
        .with_data_value(CONF_USERNAME, json!(account.username))
        .with_data_value(CONF_PASSWORD, json!(account.password.expose_secret()))
}

pub struct Runner {
    entries: Arc<ConfigEntries<Mastertherm>>,
    retry_at: HashMap<String, Instant>,
}

impl Runner {
    pub fn new(entries: Arc<ConfigEntries<Mastertherm>>) -> Self {
        Self {
            entries,
            retry_at: HashMap::new(),
        }
    }

    /// Set up every entry once
    pub async fn setup_all(&mut self) {
        for entry_id in self.entries.entry_ids() {
            self.setup(&entry_id).await;
        }
    }

    /// Earliest pending retry, if any
    pub fn next_retry(&self) -> Option<Instant> {
        self.retry_at.values().min().copied()
    }

    /// Retry every entry whose delay has elapsed
    pub async fn retry_due(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .retry_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for entry_id in due {
            self.retry_at.remove(&entry_id);
            self.setup(&entry_id).await;
        }
    }

    /// Poll all entities and log their states
    pub async fn poll(&self) {
        let updated = self.entries.async_update_entities().await;
        debug!("Polled {} entities", updated);

        let Some(climate) = self.entries.platform(Platform::Climate) else {
            return;
        };
        for state in climate.states() {
            info!(
                "{}: {} (current {}, target {})",
                state.entity_id,
                state.state,
                attribute(&state.attributes, "current_temperature"),
                attribute(&state.attributes, "temperature"),
            );
        }
    }

    /// Poll every `scan_interval` and retry failed setups until `shutdown`
    /// resolves, then unload every entry.
    ///
    /// Returns `None` when `scan_interval` cannot be scheduled.
    pub async fn run<F>(&mut self, scan_interval: Duration, shutdown: F) -> Option<()>
    where
        F: Future<Output = ()>,
    {
        // Entities were polled when added, so skip the immediate first tick
        let first_tick = Instant::now().checked_add(scan_interval)?;
        let mut ticker = tokio::time::interval_at(first_tick, scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Polled across iterations so a signal during a poll is not lost
        tokio::pin!(shutdown);

        loop {
            let next_retry = self.next_retry();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.poll().await,
                _ = sleep_until(next_retry) => self.retry_due().await,
            }
        }

        info!("Shutting down...");
        self.shutdown().await;
        Some(())
    }

    /// Unload every entry
    pub async fn shutdown(&mut self) {
        self.retry_at.clear();
        for entry_id in self.entries.entry_ids() {
            match self.entries.async_unload(&entry_id).await {
                Ok(true) => {}
                Ok(false) => warn!("Entry {} did not unload cleanly", entry_id),
                Err(e) => error!("Failed to unload entry {}: {}", entry_id, e),
            }
        }
    }

    async fn setup(&mut self, entry_id: &str) {
        match self.entries.async_setup(entry_id).await {
            Ok(true) => {}
            Ok(false) => {
                if let Some(delay) = self.entries.retry_delay(entry_id) {
                    self.schedule_retry(entry_id, delay);
                }
            }
            Err(e) => error!("Error setting up entry {}: {}", entry_id, e),
        }
    }

    fn schedule_retry(&mut self, entry_id: &str, delay: Duration) {
        self.retry_at
            .insert(entry_id.to_string(), Instant::now() + delay);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn attribute(attributes: &HashMap<String, Value>, key: &str) -> String {
    match attributes.get(key) {
        Some(Value::Null) | None => "-".to_string(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_entry_for_account() {
        let account = MasterthermAccount {
            username: "Heatpump@Example.com".to_string(),
            password: SecretString::from("hunter2".to_string()),
        };
        let entry = entry_for_account(&account);

        assert_eq!(entry.domain, "mastertherm");
        assert_eq!(entry.title, "Heatpump@Example.com");
        assert_eq!(entry.unique_id.as_deref(), Some("heatpump@example.com"));
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(
            entry.data_value(),
            json!({"username": "Heatpump@Example.com", "password": "hunter2"})
        );
    }

    #[test]
    fn test_attribute_formatting() {
        let mut attributes = HashMap::new();
        attributes.insert("current_temperature".to_string(), json!(20.5));
        attributes.insert("temperature".to_string(), Value::Null);

        assert_eq!(attribute(&attributes, "current_temperature"), "20.5");
        assert_eq!(attribute(&attributes, "temperature"), "-");
        assert_eq!(attribute(&attributes, "missing"), "-");
    }

    #[tokio::test]
    async fn test_next_retry_is_earliest() {
        let entries = Arc::new(ConfigEntries::new(Mastertherm::new()));
        let mut runner = Runner::new(entries);
        assert!(runner.next_retry().is_none());

        runner.schedule_retry("a", Duration::from_secs(80));
        runner.schedule_retry("b", Duration::from_secs(10));
        let next = runner.next_retry().unwrap();
        assert!(next <= Instant::now() + Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let entries = Arc::new(ConfigEntries::new(Mastertherm::new()));
        let mut runner = Runner::new(entries);
        runner.schedule_retry("a", Duration::from_secs(3600));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let _ = tx.send(());
        });

        // Several ticks elapse before the signal arrives
        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run(Duration::from_millis(20), async {
                let _ = rx.await;
            }),
        )
        .await
        .expect("runner did not stop");
        assert_eq!(stopped, Some(()));
        assert!(runner.next_retry().is_none());
    }

    #[tokio::test]
    async fn test_run_rejects_unschedulable_interval() {
        let entries = Arc::new(ConfigEntries::new(Mastertherm::new()));
        let mut runner = Runner::new(entries);
        assert!(runner
            .run(Duration::MAX, std::future::pending())
            .await
            .is_none());
    }
}
