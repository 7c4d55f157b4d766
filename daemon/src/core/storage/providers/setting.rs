use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::Setting;

use crate::core::error::LedgerError;

#[async_trait]
pub trait SettingProvider {
    async fn find_setting_by_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        key: &str,
    ) -> Result<Option<Setting>, LedgerError>;

    async fn upsert_setting(&self, setting: &Setting) -> Result<(), LedgerError>;
}
