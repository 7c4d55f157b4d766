use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::{OperationRoute, TransactionRoute};

use crate::core::error::LedgerError;

#[async_trait]
pub trait RouteProvider {
    // Titles are unique per ledger; a duplicate surfaces as a
    // unique-constraint conflict
    async fn create_operation_route(&self, route: &OperationRoute) -> Result<(), LedgerError>;

    async fn find_operation_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<OperationRoute, LedgerError>;

    async fn delete_operation_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError>;

    async fn operation_route_title_exists(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        title: &str,
    ) -> Result<bool, LedgerError>;

    // True while any transaction route references the operation route
    async fn has_transaction_route_links(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        operation_route_id: Uuid,
    ) -> Result<bool, LedgerError>;

    async fn create_transaction_route(&self, route: &TransactionRoute) -> Result<(), LedgerError>;

    async fn find_transaction_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<TransactionRoute, LedgerError>;

    async fn delete_transaction_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError>;
}
