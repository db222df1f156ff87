// service/quote_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_traits::Zero;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        quotemodel::{ActorRole, Quote, QuoteStatus},
        requestmodel::ProviderStatus,
    },
    service::{
        error::ServiceError,
        events::{EventPublisher, MarketEvent},
        provider_status,
    },
};

/// Exclusive upper bound of the `NUMERIC(14, 2)` price column.
const PRICE_LIMIT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone)]
pub struct QuoteService {
    store: Arc<dyn MarketStore>,
    events: Arc<dyn EventPublisher>,
}

impl QuoteService {
    pub fn new(store: Arc<dyn MarketStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    pub async fn submit(
        &self,
        request_id: Uuid,
        provider_id: Uuid,
        price: BigDecimal,
        message: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Quote, ServiceError> {
        let now = Utc::now();

        if price <= BigDecimal::zero() {
            return Err(ServiceError::InvalidArgument("price must be greater than zero".to_string()));
        }
        let price = price.round(2);
        if price >= BigDecimal::from(PRICE_LIMIT) {
            return Err(ServiceError::InvalidArgument(format!(
                "price must be below {}",
                PRICE_LIMIT
            )));
        }
        if matches!(expires_at, Some(at) if at <= now) {
            return Err(ServiceError::InvalidArgument("expires_at must be in the future".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.requester_id == provider_id {
            return Err(ServiceError::Forbidden("a requester cannot quote on their own request".to_string()));
        }
        if !request.is_open() {
            return Err(ServiceError::InvalidArgument(format!(
                "service request {} is not open for quotes ({:?})",
                request_id, request.status
            )));
        }

        if let Some(mut existing) = tx.get_live_quote(request_id, provider_id).await? {
            if !existing.is_due(now) {
                return Err(ServiceError::Conflict(format!(
                    "provider {} already has live quote {} on request {}",
                    provider_id, existing.id, request_id
                )));
            }
            // overdue but not yet swept
            existing.set_status(QuoteStatus::Expired, now);
            tx.update_quote(&existing).await?;
        }

        let quote = Quote {
            id: Uuid::new_v4(),
            request_id,
            provider_id,
            price,
            message: message.filter(|m| !m.trim().is_empty()),
            expires_at,
            status: QuoteStatus::Pending,
            accepted_by_requester: false,
            requester_accepted_at: None,
            accepted_by_provider: false,
            provider_accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_quote(&quote).await?;
        provider_status::record(
            tx.as_mut(),
            request_id,
            provider_id,
            ProviderStatus::Quoted,
            Some(quote.id),
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Quote {} of {} submitted by provider {} on request {}",
            quote.id,
            quote.price,
            provider_id,
            request_id
        );
        self.events
            .publish(MarketEvent::QuoteReceived { request_id, provider_id })
            .await;

        Ok(quote)
    }

    /// A quote is visible to the request's requester and to the provider who made it.
    pub async fn get(&self, quote_id: Uuid, actor_id: Uuid) -> Result<Quote, ServiceError> {
        let mut tx = self.store.begin().await?;
        let quote = tx
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(quote_id))?;

        if quote.provider_id != actor_id {
            let request = tx
                .get_request(quote.request_id)
                .await?
                .ok_or_else(|| ServiceError::request_not_found(quote.request_id))?;
            if request.requester_id != actor_id {
                return Err(ServiceError::Forbidden(format!("quote {} is not visible to {}", quote_id, actor_id)));
            }
        }

        Ok(quote)
    }

    /// The requester sees every quote; a provider only sees its own.
    pub async fn list_for_request(&self, request_id: Uuid, actor_id: Uuid) -> Result<Vec<Quote>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let request = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        let quotes = tx.get_request_quotes(request_id).await?;
        if request.requester_id == actor_id {
            return Ok(quotes);
        }
        Ok(quotes.into_iter().filter(|q| q.provider_id == actor_id).collect())
    }

    pub async fn accept_by_requester(&self, quote_id: Uuid, actor_id: Uuid) -> Result<Quote, ServiceError> {
        self.accept(quote_id, actor_id, ActorRole::Requester).await
    }

    pub async fn accept_by_provider(&self, quote_id: Uuid, actor_id: Uuid) -> Result<Quote, ServiceError> {
        self.accept(quote_id, actor_id, ActorRole::Provider).await
    }

    /// Records one side's interest in a quote. The quote's status is left alone: binding
    /// acceptance goes through an agreement.
    async fn accept(&self, quote_id: Uuid, actor_id: Uuid, role: ActorRole) -> Result<Quote, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let request_id = tx
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(quote_id))?
            .request_id;

        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;
        let mut quote = tx
            .lock_quote(quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(quote_id))?;

        let allowed = match role {
            ActorRole::Requester => request.requester_id == actor_id,
            ActorRole::Provider => quote.provider_id == actor_id,
        };
        if !allowed {
            return Err(ServiceError::Forbidden(format!(
                "user {} cannot accept quote {} as {:?}",
                actor_id, quote_id, role
            )));
        }

        if quote.is_due(now) {
            quote.set_status(QuoteStatus::Expired, now);
            tx.update_quote(&quote).await?;
            tx.commit().await?;
            self.publish_expired(&quote).await;
            return Err(ServiceError::InvalidTransition(format!("quote {} has expired", quote_id)));
        }
        if quote.status != QuoteStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "quote {} is {:?} and can no longer be accepted",
                quote_id, quote.status
            )));
        }
        if !request.is_open() {
            return Err(ServiceError::InvalidTransition(format!(
                "service request {} is no longer open",
                request_id
            )));
        }

        quote.mark_accepted_by(role, now);
        tx.update_quote(&quote).await?;
        tx.commit().await?;

        tracing::info!("Quote {} accepted by {:?} {}", quote_id, role, actor_id);
        Ok(quote)
    }

    /// Expires one quote whose expiry has passed. Repeating it on an expired quote is a no-op.
    pub async fn expire(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut quote = tx
            .lock_quote(quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(quote_id))?;

        if quote.status == QuoteStatus::Expired {
            return Ok(quote);
        }
        if !quote.is_due(now) {
            return Err(ServiceError::InvalidTransition(format!(
                "quote {} is {:?} and not past its expiry",
                quote_id, quote.status
            )));
        }

        quote.set_status(QuoteStatus::Expired, now);
        tx.update_quote(&quote).await?;
        tx.commit().await?;

        self.publish_expired(&quote).await;
        Ok(quote)
    }

    /// Expires every pending quote that is past due at `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Quote>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let expired = tx.expire_due_quotes(now).await?;
        tx.commit().await?;

        if !expired.is_empty() {
            tracing::info!("Quote sweep expired {} quotes", expired.len());
        }
        for quote in &expired {
            self.publish_expired(quote).await;
        }
        Ok(expired)
    }

    async fn publish_expired(&self, quote: &Quote) {
        self.events
            .publish(MarketEvent::QuoteExpired {
                request_id: quote.request_id,
                provider_id: quote.provider_id,
                quote_id: quote.id,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::Harness;
    use chrono::Duration;

    #[tokio::test]
    async fn second_live_quote_conflicts() {
        let h = Harness::new();
        let request = h.open_request(Uuid::new_v4()).await;
        let provider = Uuid::new_v4();

        h.quote(request.id, provider, 100).await;
        let err = h
            .quotes
            .submit(request.id, provider, BigDecimal::from(80), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn non_positive_price_is_invalid() {
        let h = Harness::new();
        let request = h.open_request(Uuid::new_v4()).await;

        for price in [0, -5] {
            let err = h
                .quotes
                .submit(request.id, Uuid::new_v4(), BigDecimal::from(price), None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn price_must_fit_the_money_column() {
        let h = Harness::new();
        let request = h.open_request(Uuid::new_v4()).await;

        let err = h
            .quotes
            .submit(request.id, Uuid::new_v4(), BigDecimal::from(PRICE_LIMIT), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));

        let quote = h
            .quotes
            .submit(request.id, Uuid::new_v4(), BigDecimal::from(PRICE_LIMIT - 1), None, None)
            .await
            .unwrap();
        assert_eq!(quote.price, BigDecimal::from(PRICE_LIMIT - 1));
    }

    #[tokio::test]
    async fn submitting_marks_provider_quoted_and_emits_event() {
        let h = Harness::new();
        let mut events = h.events.subscribe();
        let request = h.open_request(Uuid::new_v4()).await;
        let provider = Uuid::new_v4();

        let quote = h.quote(request.id, provider, 120).await;

        let status = h.statuses.get(request.id, provider).await.unwrap().unwrap();
        assert_eq!(status.status, ProviderStatus::Quoted);
        assert_eq!(status.quote_id, Some(quote.id));
        assert_eq!(
            events.recv().await.unwrap(),
            MarketEvent::QuoteReceived { request_id: request.id, provider_id: provider }
        );
    }

    #[tokio::test]
    async fn quoting_a_cancelled_request_is_invalid() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        h.requests.cancel(request.id, owner).await.unwrap();

        let err = h
            .quotes
            .submit(request.id, Uuid::new_v4(), BigDecimal::from(50), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn expired_quote_cannot_be_accepted() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(5);

        let quote = h
            .quotes
            .submit(request.id, provider, BigDecimal::from(75), None, Some(expires_at))
            .await
            .unwrap();

        let swept = h.quotes.sweep_expired(expires_at + Duration::seconds(1)).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, QuoteStatus::Expired);

        // sweeping again finds nothing and expiring again is a no-op
        assert!(h.quotes.sweep_expired(expires_at + Duration::seconds(2)).await.unwrap().is_empty());
        assert_eq!(h.quotes.expire(quote.id).await.unwrap().status, QuoteStatus::Expired);

        let err = h.quotes.accept_by_requester(quote.id, owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn expire_before_due_is_invalid() {
        let h = Harness::new();
        let request = h.open_request(Uuid::new_v4()).await;
        let quote = h.quote(request.id, Uuid::new_v4(), 40).await;

        let err = h.quotes.expire(quote.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn provider_may_requote_after_expiry() {
        let h = Harness::new();
        let request = h.open_request(Uuid::new_v4()).await;
        let provider = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(5);

        let first = h
            .quotes
            .submit(request.id, provider, BigDecimal::from(75), None, Some(expires_at))
            .await
            .unwrap();
        h.quotes.sweep_expired(expires_at + Duration::seconds(1)).await.unwrap();

        let second = h.quote(request.id, provider, 70).await;
        assert_ne!(first.id, second.id);

        let status = h.statuses.get(request.id, provider).await.unwrap().unwrap();
        assert_eq!(status.quote_id, Some(second.id));
    }

    #[tokio::test]
    async fn acceptance_flags_are_independent_and_checked() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 90).await;

        let err = h.quotes.accept_by_requester(quote.id, provider).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let accepted = h.quotes.accept_by_requester(quote.id, owner).await.unwrap();
        assert!(accepted.accepted_by_requester);
        assert!(!accepted.accepted_by_provider);
        assert_eq!(accepted.status, QuoteStatus::Pending);

        let both = h.quotes.accept_by_provider(quote.id, provider).await.unwrap();
        assert!(both.accepted_by_requester && both.accepted_by_provider);
        assert_eq!(both.status, QuoteStatus::Pending);
    }

    #[tokio::test]
    async fn providers_only_see_their_own_quotes() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        h.quote(request.id, a, 100).await;
        let b_quote = h.quote(request.id, b, 90).await;

        assert_eq!(h.quotes.list_for_request(request.id, owner).await.unwrap().len(), 2);
        let visible = h.quotes.list_for_request(request.id, b).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, b_quote.id);

        let err = h.quotes.get(b_quote.id, a).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
