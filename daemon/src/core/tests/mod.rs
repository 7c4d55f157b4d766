//! Pipeline tests wiring the command front door to the embedded
//! backends: sled durable store, in-memory KV, channel bus.

mod pipeline;

use std::sync::Arc;

use rust_decimal::Decimal;
use tempdir::TempDir;
use uuid::Uuid;

use tally_common::{
    config::{DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE},
    dsl::{self, Amount, Distribute, FromTo, Source},
    ledger::Balance,
    time,
};

use crate::{
    config::ServiceConfig,
    core::{
        bus::ChannelBus,
        command::Command,
        docstore::SledMetadataStore,
        kv::MemoryKvStore,
        storage::{BalanceProvider, SledStorage},
    },
};

pub(crate) struct Harness {
    pub command: Command,
    pub store: Arc<SledStorage>,
    pub kv: Arc<MemoryKvStore>,
    pub bus: Arc<ChannelBus>,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    _dir: TempDir,
}

pub(crate) fn harness() -> Harness {
    harness_with(ServiceConfig::default())
}

pub(crate) fn harness_with(config: ServiceConfig) -> Harness {
    let dir = TempDir::new("tally-core").unwrap();
    let store = Arc::new(SledStorage::open(dir.path().join("ledger")).unwrap());
    let metadata = Arc::new(SledMetadataStore::open(dir.path().join("metadata")).unwrap());
    let kv = Arc::new(MemoryKvStore::new());
    let bus = Arc::new(ChannelBus::new());
    let command = Command::new(
        store.clone(),
        metadata,
        kv.clone(),
        bus.clone(),
        config,
    );
    Harness {
        command,
        store,
        kv,
        bus,
        organization_id: Uuid::now_v7(),
        ledger_id: Uuid::now_v7(),
        _dir: dir,
    }
}

impl Harness {
    // Seed a funded balance row directly in the durable store
    pub async fn seed_balance(
        &self,
        alias: &str,
        key: &str,
        account_type: &str,
        available: Decimal,
    ) -> Balance {
        let now = time::now();
        let balance = Balance {
            id: Uuid::now_v7(),
            organization_id: self.organization_id,
            ledger_id: self.ledger_id,
            account_id: Uuid::now_v7(),
            alias: alias.to_string(),
            key: key.to_string(),
            asset_code: "USD".to_string(),
            account_type: account_type.to_string(),
            available,
            on_hold: Decimal::ZERO,
            version: 0,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
        };
        self.store.create_balance(&balance).await.unwrap();
        balance
    }

    pub async fn seed_default(&self, alias: &str, available: Decimal) -> Balance {
        self.seed_balance(alias, DEFAULT_BALANCE_KEY, "deposit", available).await
    }

    pub async fn seed_external(&self, alias: &str) -> Balance {
        self.seed_balance(alias, DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE, Decimal::ZERO).await
    }
}

pub(crate) fn transfer(from: &str, to: &str, value: Decimal) -> dsl::Send {
    dsl::Send {
        asset: "USD".to_string(),
        value,
        source: Source {
            from: vec![FromTo {
                account: from.to_string(),
                amount: Some(Amount { asset: "USD".to_string(), value }),
                share: None,
                description: None,
                chart_of_accounts: None,
                metadata: None,
                balance_key: None,
            }],
        },
        distribute: Distribute {
            to: vec![FromTo {
                account: to.to_string(),
                amount: Some(Amount { asset: "USD".to_string(), value }),
                share: None,
                description: None,
                chart_of_accounts: None,
                metadata: None,
                balance_key: None,
            }],
        },
        description: Some("transfer".to_string()),
        chart_of_accounts_group_name: None,
        metadata: None,
    }
}
