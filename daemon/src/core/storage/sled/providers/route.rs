use async_trait::async_trait;
use uuid::Uuid;

use tally_common::{
    config::{ENTITY_OPERATION_ROUTE, ENTITY_TRANSACTION_ROUTE},
    ledger::{OperationRoute, TransactionRoute},
};

use crate::core::{
    error::LedgerError,
    storage::{
        sled::{decode, scoped, SledStorage},
        RouteProvider,
    },
};

#[async_trait]
impl RouteProvider for SledStorage {
    async fn create_operation_route(&self, route: &OperationRoute) -> Result<(), LedgerError> {
        let title_key = scoped(route.organization_id, route.ledger_id, &route.title);
        let claimed = self.operation_route_titles.compare_and_swap(
            title_key,
            None as Option<&[u8]>,
            Some(route.id.to_string().into_bytes()),
        )?;
        if claimed.is_err() {
            return Err(LedgerError::EntityConflict { entity: ENTITY_OPERATION_ROUTE });
        }
        self.operation_routes.insert(
            scoped(route.organization_id, route.ledger_id, route.id.to_string()),
            serde_json::to_vec(route)?,
        )?;
        Ok(())
    }

    async fn find_operation_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<OperationRoute, LedgerError> {
        let row = self
            .operation_routes
            .get(scoped(organization_id, ledger_id, route_id.to_string()))?
            .ok_or(LedgerError::EntityNotFound { entity: ENTITY_OPERATION_ROUTE })?;
        decode(&row)
    }

    async fn delete_operation_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError> {
        let route = self.find_operation_route(organization_id, ledger_id, route_id).await?;
        self.operation_routes
            .remove(scoped(organization_id, ledger_id, route_id.to_string()))?;
        self.operation_route_titles
            .remove(scoped(organization_id, ledger_id, &route.title))?;
        Ok(())
    }

    async fn operation_route_title_exists(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        title: &str,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .operation_route_titles
            .contains_key(scoped(organization_id, ledger_id, title))?)
    }

    async fn has_transaction_route_links(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        operation_route_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let prefix = scoped(organization_id, ledger_id, format!("{}:", operation_route_id));
        Ok(self.transaction_route_links.scan_prefix(prefix).next().transpose()?.is_some())
    }

    async fn create_transaction_route(&self, route: &TransactionRoute) -> Result<(), LedgerError> {
        let key = scoped(route.organization_id, route.ledger_id, route.id.to_string());
        let row = serde_json::to_vec(route)?;
        let claimed = self
            .transaction_routes
            .compare_and_swap(key, None as Option<&[u8]>, Some(row))?;
        if claimed.is_err() {
            return Err(LedgerError::EntityConflict { entity: ENTITY_TRANSACTION_ROUTE });
        }
        for operation_route_id in &route.operation_routes {
            self.transaction_route_links.insert(
                scoped(
                    route.organization_id,
                    route.ledger_id,
                    format!("{}:{}", operation_route_id, route.id),
                ),
                Vec::<u8>::new(),
            )?;
        }
        Ok(())
    }

    async fn find_transaction_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<TransactionRoute, LedgerError> {
        let row = self
            .transaction_routes
            .get(scoped(organization_id, ledger_id, route_id.to_string()))?
            .ok_or(LedgerError::EntityNotFound { entity: ENTITY_TRANSACTION_ROUTE })?;
        decode(&row)
    }

    async fn delete_transaction_route(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        route_id: Uuid,
    ) -> Result<(), LedgerError> {
        let route = self.find_transaction_route(organization_id, ledger_id, route_id).await?;
        self.transaction_routes
            .remove(scoped(organization_id, ledger_id, route_id.to_string()))?;
        for operation_route_id in &route.operation_routes {
            self.transaction_route_links.remove(scoped(
                organization_id,
                ledger_id,
                format!("{}:{}", operation_route_id, route_id),
            ))?;
        }
        Ok(())
    }
}
