//! Cached access to the settings document.

use crate::database::Database;
use crate::features::settings::document::{Settings, SETTINGS_DOCTYPE};
use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reads go through an in-process copy; saves write through and refresh it
#[derive(Clone)]
pub struct SettingsStore {
    database: Database,
    cached: Arc<RwLock<Option<Settings>>>,
}

impl SettingsStore {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Current settings. Falls back to defaults when no document has been saved.
    pub async fn get(&self) -> Result<Settings> {
        if let Some(settings) = self.cached.read().await.as_ref() {
            return Ok(settings.clone());
        }

        let settings = match self.database.get_settings_document(SETTINGS_DOCTYPE).await? {
            Some(json) => serde_json::from_str::<Settings>(&json).unwrap_or_else(|e| {
                warn!("Stored settings are unreadable ({e}), using defaults");
                Settings::default()
            }),
            None => Settings::default(),
        };

        *self.cached.write().await = Some(settings.clone());
        debug!("Settings loaded into cache");
        Ok(settings)
    }

    /// Validate and persist a new settings document
    pub async fn save(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let json = serde_json::to_string(&settings)?;
        self.database
            .save_settings_document(SETTINGS_DOCTYPE, &json)
            .await?;
        *self.cached.write().await = Some(settings);
        info!("⚙️ {SETTINGS_DOCTYPE} saved");
        Ok(())
    }

    /// Store `settings` only when no document exists yet. Returns whether it was written.
    pub async fn seed(&self, settings: Settings) -> Result<bool> {
        if self
            .database
            .get_settings_document(SETTINGS_DOCTYPE)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        self.save(settings).await?;
        Ok(true)
    }

    /// Drop the cached copy so the next read hits the database
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let store = SettingsStore::new(Database::in_memory().await.unwrap());
        assert_eq!(store.get().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_refreshes_cache() {
        let db = Database::in_memory().await.unwrap();
        let store = SettingsStore::new(db.clone());
        store.get().await.unwrap();

        let updated = Settings {
            send_daily_digest: true,
            digest_recipients: "buyer@example.com".to_string(),
            ..Settings::default()
        };
        store.save(updated.clone()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), updated);

        // A second store over the same database sees the persisted document
        let other = SettingsStore::new(db);
        assert_eq!(other.get().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid() {
        let store = SettingsStore::new(Database::in_memory().await.unwrap());
        let invalid = Settings {
            medium_priority_percentage: 60.0,
            ..Settings::default()
        };
        assert!(store.save(invalid).await.is_err());
        assert_eq!(store.get().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_seed_only_once() {
        let store = SettingsStore::new(Database::in_memory().await.unwrap());
        let seeded = Settings {
            cleanup_after_days: 30,
            ..Settings::default()
        };
        assert!(store.seed(seeded.clone()).await.unwrap());
        assert!(!store.seed(Settings::default()).await.unwrap());
        assert_eq!(store.get().await.unwrap().cleanup_after_days, 30);
    }

    #[tokio::test]
    async fn test_invalidate_rereads_database() {
        let db = Database::in_memory().await.unwrap();
        let store = SettingsStore::new(db.clone());
        store.get().await.unwrap();

        let changed = Settings {
            max_history_items: 9,
            ..Settings::default()
        };
        db.save_settings_document(SETTINGS_DOCTYPE, &serde_json::to_string(&changed).unwrap())
            .await
            .unwrap();
        assert_eq!(store.get().await.unwrap().max_history_items, 5);

        store.invalidate().await;
        assert_eq!(store.get().await.unwrap().max_history_items, 9);
    }
}
