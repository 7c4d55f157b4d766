use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tally_common::{
    ledger::{Metadata, OperationKind, Status, StatusCode},
    queue::QueueMessage,
};

use crate::{
    config::ServiceConfig,
    core::{
        command::CreateTransactionInput,
        error::LedgerError,
        storage::{BalanceProvider, OperationProvider, TransactionProvider},
        tests::{harness, harness_with, transfer},
    },
};

fn input(harness: &super::Harness, send: tally_common::dsl::Send) -> CreateTransactionInput {
    CreateTransactionInput {
        organization_id: harness.organization_id,
        ledger_id: harness.ledger_id,
        parent_transaction_id: None,
        idempotency_key: None,
        idempotency_ttl: None,
        send,
    }
}

#[tokio::test]
async fn inline_write_path_moves_funds_and_persists_everything() {
    let harness = harness();
    let mut audit = harness.bus.bind("transaction.audit.exchange", "transaction.audit.key");
    let world = harness.seed_external("@world").await;
    let merchant = harness.seed_default("@merchant", Decimal::ZERO).await;

    let transaction = harness
        .command
        .create_transaction(input(&harness, transfer("@world", "@merchant", dec!(100))))
        .await
        .unwrap();

    assert_eq!(transaction.status.code, StatusCode::Approved);
    assert_eq!(transaction.amount, dec!(100));
    assert_eq!(transaction.operations.len(), 2);

    // double-entry identity per asset
    let debits: Decimal = transaction
        .operations
        .iter()
        .filter(|op| op.kind == OperationKind::Debit)
        .map(|op| op.amount.value)
        .sum();
    let credits: Decimal = transaction
        .operations
        .iter()
        .filter(|op| op.kind == OperationKind::Credit)
        .map(|op| op.amount.value)
        .sum();
    assert_eq!(debits, credits);

    // balances moved under version guard
    let world_after = harness
        .store
        .find_balance(harness.organization_id, harness.ledger_id, world.id)
        .await
        .unwrap();
    let merchant_after = harness
        .store
        .find_balance(harness.organization_id, harness.ledger_id, merchant.id)
        .await
        .unwrap();
    assert_eq!(world_after.available, dec!(-100));
    assert_eq!(merchant_after.available, dec!(100));
    assert_eq!(world_after.version, world.version + 1);

    // header and legs are durable
    let stored = harness
        .store
        .find_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(stored.id, transaction.id);
    let legs = harness
        .store
        .list_operations_by_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(legs.len(), 2);

    // the read-your-writes snapshot carries the parsed body
    let snapshot = harness
        .command
        .load_transaction_snapshot(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.body.is_some());
    assert_eq!(snapshot.operations.len(), 2);

    // one audit entry per operation reached the bus
    let audit_payload = audit.recv().await.unwrap();
    let envelope: QueueMessage = serde_json::from_slice(&audit_payload).unwrap();
    assert_eq!(envelope.audit_id, Some(transaction.id));
    assert_eq!(envelope.queue_data.len(), 2);
}

#[tokio::test]
async fn transaction_metadata_is_written_and_returned() {
    let harness = harness();
    harness.seed_external("@world").await;
    harness.seed_default("@merchant", Decimal::ZERO).await;

    let mut send = transfer("@world", "@merchant", dec!(10));
    let mut metadata = Metadata::new();
    metadata.insert("invoice".to_string(), serde_json::json!("INV-42"));
    send.metadata = Some(metadata.clone());
    // leg metadata rides along on the credit operation
    send.distribute.to[0].metadata = Some(metadata.clone());

    let transaction = harness.command.create_transaction(input(&harness, send)).await.unwrap();
    assert_eq!(transaction.metadata, Some(metadata.clone()));
    let credit = transaction
        .operations
        .iter()
        .find(|op| op.kind == OperationKind::Credit)
        .unwrap();
    assert_eq!(credit.metadata, Some(metadata));
}

#[tokio::test]
async fn oversized_transaction_metadata_fails_the_write() {
    let harness = harness();
    harness.seed_external("@world").await;
    harness.seed_default("@merchant", Decimal::ZERO).await;

    let mut send = transfer("@world", "@merchant", dec!(10));
    let mut metadata = Metadata::new();
    metadata.insert("note".to_string(), serde_json::json!("x".repeat(200)));
    send.metadata = Some(metadata);

    let err = harness.command.create_transaction(input(&harness, send)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Metadata(_)));
}

#[tokio::test]
async fn insufficient_funds_abort_before_anything_persists() {
    let harness = harness();
    harness.seed_default("@cash", dec!(5)).await;
    harness.seed_default("@merchant", Decimal::ZERO).await;

    let err = harness
        .command
        .create_transaction(input(&harness, transfer("@cash", "@merchant", dec!(100))))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let cash = harness
        .store
        .list_balances_by_targets(harness.organization_id, harness.ledger_id, &["@cash".to_string()])
        .await
        .unwrap();
    assert_eq!(cash[0].available, dec!(5));
}

#[tokio::test]
async fn async_mode_parks_the_payload_for_the_consumer() {
    let config = ServiceConfig { async_transactions: true, ..Default::default() };
    let harness = harness_with(config);
    let mut consumer = harness.bus.bind(
        "transaction.balance_operation.exchange",
        "transaction.balance_operation.key",
    );
    harness.seed_external("@world").await;
    let merchant = harness.seed_default("@merchant", Decimal::ZERO).await;

    let transaction = harness
        .command
        .create_transaction(input(&harness, transfer("@world", "@merchant", dec!(100))))
        .await
        .unwrap();

    // balances are already mutated in the request path
    let merchant_now = harness
        .store
        .find_balance(harness.organization_id, harness.ledger_id, merchant.id)
        .await
        .unwrap();
    assert_eq!(merchant_now.available, dec!(100));

    // the header is not durable until the consumer runs, but readers
    // already see the snapshot
    assert!(harness
        .store
        .find_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .is_err());
    assert!(harness
        .command
        .load_transaction_snapshot(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap()
        .is_some());

    let payload = consumer.recv().await.unwrap();
    let consumed = harness.command.consume_transaction_payload(&payload).await.unwrap();
    assert_eq!(consumed.id, transaction.id);

    let legs = harness
        .store
        .list_operations_by_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(legs.len(), 2);
}

#[tokio::test]
async fn failed_async_publish_falls_back_inline_exactly_once() {
    let config = ServiceConfig { async_transactions: true, ..Default::default() };
    // no consumer bound: every publish to the execution topic fails
    let harness = harness_with(config);
    harness.seed_external("@world").await;
    harness.seed_default("@merchant", Decimal::ZERO).await;

    let transaction = harness
        .command
        .create_transaction(input(&harness, transfer("@world", "@merchant", dec!(100))))
        .await
        .unwrap();

    // the inline fallback persisted header and legs
    let stored = harness
        .store
        .find_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(stored.id, transaction.id);
    let legs = harness
        .store
        .list_operations_by_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(legs.len(), 2);

    // a replay of the parked payload is absorbed by the duplicate
    // tolerance: same header, same legs, nothing doubled
    use crate::core::{keys, kv::KvStore};
    let parked = harness
        .kv
        .drain(&keys::backup_queue_key(harness.organization_id, harness.ledger_id))
        .await
        .unwrap();
    assert_eq!(parked.len(), 1);
    let replayed = harness.command.consume_transaction_payload(&parked[0]).await.unwrap();
    assert_eq!(replayed.id, transaction.id);
    let legs = harness
        .store
        .list_operations_by_transaction(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap();
    assert_eq!(legs.len(), 2);
}

#[tokio::test]
async fn legs_can_route_to_non_default_balances() {
    let harness = harness();
    harness.seed_external("@world").await;
    let default = harness.seed_default("@merchant", Decimal::ZERO).await;
    harness
        .command
        .create_additional_balance(
            harness.organization_id,
            harness.ledger_id,
            default.account_id,
            crate::core::balance::AdditionalBalanceInput {
                key: "escrow".to_string(),
                allow_sending: None,
                allow_receiving: None,
            },
        )
        .await
        .unwrap();

    let mut send = transfer("@world", "@merchant", dec!(25));
    send.distribute.to[0].balance_key = Some("escrow".to_string());

    let transaction = harness.command.create_transaction(input(&harness, send)).await.unwrap();
    let credit = transaction
        .operations
        .iter()
        .find(|op| op.kind == OperationKind::Credit)
        .unwrap();
    assert_eq!(credit.balance_key, "escrow");

    // the default balance is untouched, the escrow one received
    let balances = harness
        .store
        .list_balances_by_targets(
            harness.organization_id,
            harness.ledger_id,
            &["@merchant".to_string(), "@merchant#escrow".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(balances[0].available, Decimal::ZERO);
    assert_eq!(balances[1].available, dec!(25));
}

#[tokio::test]
async fn status_change_refreshes_the_snapshot() {
    let harness = harness();
    harness.seed_external("@world").await;
    harness.seed_default("@merchant", Decimal::ZERO).await;

    let transaction = harness
        .command
        .create_transaction(input(&harness, transfer("@world", "@merchant", dec!(30))))
        .await
        .unwrap();

    let updated = harness
        .command
        .update_transaction_status(
            harness.organization_id,
            harness.ledger_id,
            transaction.id,
            Status::canceled(None),
        )
        .await
        .unwrap();

    let snapshot = harness
        .command
        .load_transaction_snapshot(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.status.code, updated.status.code);
    // body and legs survive the refresh
    assert!(snapshot.body.is_some());
    assert_eq!(snapshot.operations.len(), 2);

    // once the durable store is confirmed the snapshot goes away
    harness
        .command
        .confirm_transaction_durable(harness.organization_id, harness.ledger_id, transaction.id)
        .await;
    assert!(harness
        .command
        .load_transaction_snapshot(harness.organization_id, harness.ledger_id, transaction.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[should_panic(expected = "organization id must not be nil")]
async fn nil_tenancy_ids_are_a_caller_bug() {
    let harness = harness();
    let mut bad = input(&harness, transfer("@a", "@b", dec!(1)));
    bad.organization_id = uuid::Uuid::nil();
    let _ = harness.command.create_transaction(bad).await;
}
