//! Read-through cache for small per-ledger feature settings. The KV
//! entry is the boolean rendered as text; a miss loads the durable row
//! and an absent row means the feature is inactive.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use tally_common::ledger::Setting;

use crate::core::{error::LedgerError, keys, kv::KvStore, storage::LedgerStore};

pub struct SettingsCache {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn LedgerStore>,
}

impl SettingsCache {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn LedgerStore>) -> Self {
        Self { kv, store }
    }

    pub async fn get_or_load(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        setting_key: &str,
    ) -> Result<Setting, LedgerError> {
        let kv_key = keys::settings_key(organization_id, ledger_id, setting_key);
        if let Ok(cached) = self.kv.get(&kv_key).await {
            if cached == "true" || cached == "false" {
                return Ok(Setting {
                    organization_id,
                    ledger_id,
                    key: setting_key.to_string(),
                    active: cached == "true",
                    value: None,
                });
            }
        }

        let setting = self
            .store
            .find_setting_by_key(organization_id, ledger_id, setting_key)
            .await?
            .unwrap_or(Setting {
                organization_id,
                ledger_id,
                key: setting_key.to_string(),
                active: false,
                value: None,
            });

        // Write-back is best-effort; a lost entry only costs a reload
        let rendered = if setting.active { "true" } else { "false" };
        if let Err(err) = self.kv.set(&kv_key, rendered, Duration::ZERO).await {
            warn!("failed to cache setting {}: {}", setting_key, err);
        }
        Ok(setting)
    }
}
