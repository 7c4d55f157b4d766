use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::Setting;

use crate::core::{
    error::LedgerError,
    storage::{
        sled::{decode, scoped, SledStorage},
        SettingProvider,
    },
};

#[async_trait]
impl SettingProvider for SledStorage {
    async fn find_setting_by_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        key: &str,
    ) -> Result<Option<Setting>, LedgerError> {
        match self.settings.get(scoped(organization_id, ledger_id, key))? {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), LedgerError> {
        self.settings.insert(
            scoped(setting.organization_id, setting.ledger_id, &setting.key),
            serde_json::to_vec(setting)?,
        )?;
        Ok(())
    }
}
