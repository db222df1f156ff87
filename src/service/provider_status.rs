// service/provider_status.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{db::MarketStore, marketdb::MarketTx},
    models::requestmodel::{ProviderRequestStatus, ProviderStatus},
    service::error::ServiceError,
};

/// Moves a provider's row towards `next` if negotiation allows it, creating the row on first
/// contact. Returns the row as stored afterwards.
pub async fn record(
    tx: &mut dyn MarketTx,
    request_id: Uuid,
    provider_id: Uuid,
    next: ProviderStatus,
    quote_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<ProviderRequestStatus, sqlx::Error> {
    let Some(mut row) = tx.get_provider_status(request_id, provider_id).await? else {
        let row = ProviderRequestStatus::new(request_id, provider_id, next, quote_id, now);
        tx.upsert_provider_status(&row).await?;
        return Ok(row);
    };

    let relink = row.status == next && quote_id.is_some() && quote_id != row.quote_id;
    if !row.status.can_advance_to(next) && !relink {
        return Ok(row);
    }

    row.status = next;
    if quote_id.is_some() {
        row.quote_id = quote_id;
    }
    row.last_updated = now;
    tx.upsert_provider_status(&row).await?;
    Ok(row)
}

/// Fan-out on assignment: every other provider still negotiating is rejected and the winner
/// becomes the single Assigned row for the request.
pub async fn retire_losers(
    tx: &mut dyn MarketTx,
    request_id: Uuid,
    winner_id: Uuid,
    winner_quote_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let rejected = tx
        .reject_provider_statuses(request_id, Some(winner_id), false, now)
        .await?;

    let winner = match tx.get_provider_status(request_id, winner_id).await? {
        Some(mut row) => {
            row.status = ProviderStatus::Assigned;
            row.quote_id = Some(winner_quote_id);
            row.last_updated = now;
            row
        }
        None => ProviderRequestStatus::new(
            request_id,
            winner_id,
            ProviderStatus::Assigned,
            Some(winner_quote_id),
            now,
        ),
    };
    tx.upsert_provider_status(&winner).await?;

    Ok(rejected)
}

pub async fn mark_completed(
    tx: &mut dyn MarketTx,
    request_id: Uuid,
    provider_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let row = match tx.get_provider_status(request_id, provider_id).await? {
        Some(mut row) => {
            row.status = ProviderStatus::Completed;
            row.last_updated = now;
            row
        }
        None => ProviderRequestStatus::new(
            request_id,
            provider_id,
            ProviderStatus::Completed,
            None,
            now,
        ),
    };
    tx.upsert_provider_status(&row).await
}

#[derive(Debug, Clone)]
pub struct ProviderStatusService {
    store: Arc<dyn MarketStore>,
}

impl ProviderStatusService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Every provider's view of a request. Only the requester may look across providers.
    pub async fn for_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let request = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.requester_id != actor_id {
            return Err(ServiceError::Forbidden(
                "only the requester can list provider statuses".to_string(),
            ));
        }

        Ok(tx.get_request_provider_statuses(request_id).await?)
    }

    pub async fn for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.get_provider_statuses(provider_id).await?)
    }

    pub async fn get(
        &self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<ProviderRequestStatus>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.get_provider_status(request_id, provider_id).await?)
    }
}
