//! Front door of the write side. One instance owns the pipeline:
//! idempotency gate, per-alias locks, balance mutation, persistence,
//! audit, and the caches around them.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use tally_common::{
    config::IDEMPOTENCY_DEFAULT_TTL,
    dsl,
    ledger::{
        AccountRule, Balance, OperationRoute, OperationRouteType, RuleType, Setting, Status,
        Transaction, TransactionRoute, ValidIf,
    },
    queue::{QueueMessage, TransactionQueue},
    time,
};

use crate::{
    config::ServiceConfig,
    core::{
        balance::{AdditionalBalanceInput, BalanceEngine, CreateBalanceInput},
        bus::MessageBus,
        dispatch::{AsyncDispatcher, ExecutionMode},
        docstore::{ensure_deletable_index, MetadataStore},
        error::LedgerError,
        idempotency::IdempotencyStore,
        kv::KvStore,
        lock::{request_hash, LockManager},
        operations::OperationsBuilder,
        settings::SettingsCache,
        storage::LedgerStore,
        write_behind::WriteBehindCache,
        writer::TransactionWriter,
    },
};

#[derive(Clone, Debug)]
pub struct CreateTransactionInput {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub parent_transaction_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub idempotency_ttl: Option<Duration>,
    pub send: dsl::Send,
}

#[derive(Clone, Debug)]
pub struct CreateOperationRouteInput {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    pub description: String,
    pub operation_type: OperationRouteType,
    pub alias_rule: Option<ValidIf>,
    pub account_type_rule: Option<ValidIf>,
}

#[derive(Clone, Debug)]
pub struct CreateTransactionRouteInput {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    pub description: String,
    pub operation_routes: Vec<Uuid>,
}

pub struct Command {
    store: Arc<dyn LedgerStore>,
    metadata: Arc<dyn MetadataStore>,
    bus: Arc<dyn MessageBus>,
    config: Arc<ServiceConfig>,
    locks: LockManager,
    idempotency: IdempotencyStore,
    balances: BalanceEngine,
    dispatcher: AsyncDispatcher,
    settings: SettingsCache,
    write_behind: WriteBehindCache,
}

impl Command {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        metadata: Arc<dyn MetadataStore>,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        config: ServiceConfig,
    ) -> Self {
        let config = Arc::new(config);
        let writer = Arc::new(TransactionWriter::new(
            Arc::clone(&store),
            Arc::clone(&metadata),
            Arc::clone(&kv),
            Arc::clone(&bus),
            Arc::clone(&config),
        ));
        Self {
            locks: LockManager::new(Arc::clone(&kv), Arc::clone(&store)),
            idempotency: IdempotencyStore::new(Arc::clone(&kv)),
            balances: BalanceEngine::new(Arc::clone(&store), Arc::clone(&kv)),
            dispatcher: AsyncDispatcher::new(
                Arc::clone(&kv),
                Arc::clone(&bus),
                writer,
                Arc::clone(&config),
            ),
            settings: SettingsCache::new(Arc::clone(&kv), Arc::clone(&store)),
            write_behind: WriteBehindCache::new(Arc::clone(&kv)),
            store,
            metadata,
            bus,
            config,
        }
    }

    // ---- transactions ----

    pub async fn create_transaction(
        &self,
        input: CreateTransactionInput,
    ) -> Result<Transaction, LedgerError> {
        // Nil tenancy ids are a caller bug, not a runtime condition
        assert!(!input.organization_id.is_nil(), "organization id must not be nil");
        assert!(!input.ledger_id.is_nil(), "ledger id must not be nil");
        metrics::counter!("command.create_transaction").increment(1);

        let organization_id = input.organization_id;
        let ledger_id = input.ledger_id;
        let body = serde_json::to_vec(&input.send)?;
        let hash = request_hash(organization_id, ledger_id, &body);
        let user_key = input.idempotency_key.unwrap_or_default();
        let ttl = input.idempotency_ttl.unwrap_or(IDEMPOTENCY_DEFAULT_TTL);

        if let Some(memoized) = self
            .idempotency
            .reserve(organization_id, ledger_id, &user_key, &hash, ttl)
            .await?
        {
            metrics::counter!("command.idempotency_replay").increment(1);
            let replayed: Transaction = serde_json::from_str(&memoized)?;
            return Ok(replayed);
        }

        let validated = dsl::validate_send(&input.send)?;

        self.locks
            .acquire_all(organization_id, ledger_id, &validated.aliases, &hash)
            .await?;
        let result = self
            .create_locked(organization_id, ledger_id, &input.send, &validated, input.parent_transaction_id)
            .await;
        // Locks go back before anything else, success or not
        self.locks
            .release_all(organization_id, ledger_id, &validated.aliases, &hash)
            .await;

        let transaction = result?;
        self.idempotency
            .memoize(organization_id, ledger_id, &user_key, &hash, &transaction, ttl)
            .await;
        let reverse_key = if user_key.is_empty() { &hash } else { &user_key };
        self.idempotency
            .map_reverse(organization_id, ledger_id, transaction.id, reverse_key, ttl)
            .await;
        Ok(transaction)
    }

    async fn create_locked(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        send: &dsl::Send,
        validated: &dsl::Responses,
        parent_transaction_id: Option<Uuid>,
    ) -> Result<Transaction, LedgerError> {
        let balances = self
            .store
            .list_balances_by_targets(organization_id, ledger_id, &validated.aliases)
            .await?;

        let mut transaction = Transaction::approved(
            organization_id,
            ledger_id,
            parent_transaction_id,
            send,
            validated.total,
        );

        // Legs are built once, from the pre-mutation snapshots plus the
        // validated deltas; replays of the payload keep their ids
        let snapshots = balances.clone();
        transaction.operations =
            OperationsBuilder::build_all(&snapshots, &transaction, send, validated)?;

        if let Err(err) = self
            .balances
            .mutate(organization_id, ledger_id, balances, validated)
            .await
        {
            if err.is_retryable_conflict() {
                self.publish_balance_retry(validated, &snapshots, &transaction, send).await;
            }
            return Err(err);
        }

        // Readers can see the transaction immediately, even while the
        // async consumer still owns durability
        self.write_behind.store(&transaction, send).await;

        let mode = if self.config.async_transactions {
            ExecutionMode::Async
        } else {
            ExecutionMode::Sync
        };
        self.dispatcher
            .execute(
                mode,
                TransactionQueue {
                    validate: validated.clone(),
                    balances: snapshots,
                    transaction,
                    parse_dsl: send.clone(),
                },
            )
            .await
    }

    // A balance batch that exhausted its retries is parked on the retry
    // topic for the reconciliation consumer; this never masks the error
    async fn publish_balance_retry(
        &self,
        validated: &dsl::Responses,
        balances: &[Balance],
        transaction: &Transaction,
        send: &dsl::Send,
    ) {
        let queue = TransactionQueue {
            validate: validated.clone(),
            balances: balances.to_vec(),
            transaction: transaction.clone(),
            parse_dsl: send.clone(),
        };
        let payload = match rmp_serde::to_vec_named(&queue) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode balance retry payload for {}: {}", transaction.id, err);
                return;
            }
        };
        if let Err(err) = self
            .bus
            .publish(&self.config.balance_retry_exchange, &self.config.balance_retry_key, &payload)
            .await
        {
            warn!("failed to publish balance retry for {}: {}", transaction.id, err);
        }
    }

    // Queue-consumer entry: replays the async payload through the same
    // executor the inline path uses
    pub async fn consume_transaction_payload(
        &self,
        payload: &[u8],
    ) -> Result<Transaction, LedgerError> {
        self.dispatcher.consume(payload).await
    }

    pub async fn update_transaction_status(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        status: Status,
    ) -> Result<Transaction, LedgerError> {
        let updated = self
            .store
            .update_transaction_status(organization_id, ledger_id, transaction_id, status)
            .await?;

        // Refresh the snapshot readers see, preserving body and legs
        match self.write_behind.load(organization_id, ledger_id, transaction_id).await {
            Ok(Some(mut snapshot)) => {
                snapshot.status = updated.status.clone();
                snapshot.updated_at = updated.updated_at;
                self.write_behind.update(&snapshot).await;
            }
            Ok(None) => self.write_behind.update(&updated).await,
            Err(err) => warn!("failed to load snapshot of {}: {}", transaction_id, err),
        }
        Ok(updated)
    }

    // Drop the read-your-writes snapshot once the durable store has
    // confirmed the write
    pub async fn confirm_transaction_durable(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) {
        self.write_behind.delete(organization_id, ledger_id, transaction_id).await;
    }

    pub async fn load_transaction_snapshot(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        self.write_behind.load(organization_id, ledger_id, transaction_id).await
    }

    // ---- balances ----

    pub async fn create_balances_from_event(
        &self,
        message: &QueueMessage,
    ) -> Result<Vec<Balance>, LedgerError> {
        self.balances.create_from_account_event(message).await
    }

    pub async fn create_balance(&self, input: CreateBalanceInput) -> Result<Balance, LedgerError> {
        self.balances.create_sync(input).await
    }

    pub async fn create_additional_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        input: AdditionalBalanceInput,
    ) -> Result<Balance, LedgerError> {
        self.balances
            .create_additional(organization_id, ledger_id, account_id, input)
            .await
    }

    pub async fn sync_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        cached: &Balance,
    ) -> Result<bool, LedgerError> {
        self.balances.sync_cached(organization_id, ledger_id, cached).await
    }

    pub async fn delete_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<(), LedgerError> {
        self.balances.delete_one(organization_id, ledger_id, balance_id).await
    }

    pub async fn delete_account_balances(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), LedgerError> {
        self.balances
            .delete_all_for_account(&self.locks, organization_id, ledger_id, account_id)
            .await
    }

    // ---- routes ----

    pub async fn create_operation_route(
        &self,
        input: CreateOperationRouteInput,
    ) -> Result<OperationRoute, LedgerError> {
        let account = match (input.alias_rule, input.account_type_rule) {
            (Some(_), Some(_)) => return Err(LedgerError::MutuallyExclusiveFields),
            (Some(valid_if), None) => Some(AccountRule { rule_type: RuleType::Alias, valid_if }),
            (None, Some(valid_if)) => {
                Some(AccountRule { rule_type: RuleType::AccountType, valid_if })
            }
            (None, None) => None,
        };

        if self
            .store
            .operation_route_title_exists(input.organization_id, input.ledger_id, &input.title)
            .await?
        {
            return Err(LedgerError::OperationRouteTitleAlreadyExists);
        }

        let now = time::now();
        let route = OperationRoute {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            ledger_id: input.ledger_id,
            title: input.title,
            description: input.description,
            operation_type: input.operation_type,
            account,
            created_at: now,
            updated_at: now,
        };
        match self.store.create_operation_route(&route).await {
            Ok(()) => Ok(route),
            Err(err) if err.is_unique_violation() => {
                Err(LedgerError::OperationRouteTitleAlreadyExists)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn delete_operation_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError> {
        if let Err(err) = self.store.find_operation_route(organization_id, ledger_id, route_id).await
        {
            return Err(match err {
                LedgerError::EntityNotFound { .. } => LedgerError::OperationRouteNotFound,
                other => other,
            });
        }
        if self
            .store
            .has_transaction_route_links(organization_id, ledger_id, route_id)
            .await?
        {
            return Err(LedgerError::OperationRouteLinkedToTransactionRoutes);
        }
        self.store.delete_operation_route(organization_id, ledger_id, route_id).await
    }

    pub async fn create_transaction_route(
        &self,
        input: CreateTransactionRouteInput,
    ) -> Result<TransactionRoute, LedgerError> {
        for operation_route_id in &input.operation_routes {
            self.store
                .find_operation_route(input.organization_id, input.ledger_id, *operation_route_id)
                .await
                .map_err(|err| match err {
                    LedgerError::EntityNotFound { .. } => LedgerError::OperationRouteNotFound,
                    other => other,
                })?;
        }

        let now = time::now();
        let route = TransactionRoute {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            ledger_id: input.ledger_id,
            title: input.title,
            description: input.description,
            operation_routes: input.operation_routes,
            created_at: now,
            updated_at: now,
        };
        self.store.create_transaction_route(&route).await?;
        Ok(route)
    }

    pub async fn delete_transaction_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError> {
        self.store.delete_transaction_route(organization_id, ledger_id, route_id).await
    }

    // ---- metadata and settings ----

    pub async fn delete_metadata_index(
        &self,
        entity_name: &str,
        index_name: &str,
    ) -> Result<(), LedgerError> {
        // Refused here, before the document store is ever reached
        ensure_deletable_index(index_name)?;
        self.metadata.delete_index(entity_name, index_name).await
    }

    pub async fn get_settings(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        setting_key: &str,
    ) -> Result<Setting, LedgerError> {
        self.settings.get_or_load(organization_id, ledger_id, setting_key).await
    }
}
