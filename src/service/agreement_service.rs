// service/agreement_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        quotemodel::{Agreement, AgreementStatus, QuoteStatus},
        requestmodel::ServiceRequest,
        workflowmodel::WorkflowStatus,
    },
    service::{
        error::ServiceError,
        events::{EventPublisher, MarketEvent},
        provider_status, request_service,
    },
};

fn lost_to_other(request: &ServiceRequest, provider_id: Uuid) -> bool {
    request
        .assigned_provider_id
        .map_or(false, |assigned| assigned != provider_id)
}

#[derive(Debug, Clone)]
pub struct AgreementService {
    store: Arc<dyn MarketStore>,
    events: Arc<dyn EventPublisher>,
}

impl AgreementService {
    pub fn new(store: Arc<dyn MarketStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    /// The requester proposes to settle on `quote_id` with its provider.
    pub async fn open(
        &self,
        quote_id: Uuid,
        provider_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Agreement, ServiceError> {
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
        let quote = tx
            .lock_quote(quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(quote_id))?;

        if request.requester_id != requester_id {
            return Err(ServiceError::Forbidden(format!(
                "user {} does not own service request {}",
                requester_id, request_id
            )));
        }
        if quote.provider_id != provider_id {
            return Err(ServiceError::InvalidArgument(format!(
                "quote {} was not made by provider {}",
                quote_id, provider_id
            )));
        }
        if !request.is_open() {
            return Err(ServiceError::InvalidTransition(format!(
                "service request {} is {:?}",
                request_id, request.status
            )));
        }
        if quote.status != QuoteStatus::Pending || quote.is_due(now) {
            return Err(ServiceError::InvalidTransition(format!(
                "quote {} can no longer be agreed on",
                quote_id
            )));
        }
        if let Some(existing) = tx.get_agreement_for_quote(quote_id, provider_id).await? {
            return Err(ServiceError::Conflict(format!(
                "agreement {} already exists for quote {}",
                existing.id, quote_id
            )));
        }

        let agreement = Agreement::new(&quote, requester_id, now);
        tx.insert_agreement(&agreement).await?;
        tx.commit().await?;

        tracing::info!(
            "Agreement {} opened on quote {} between {} and {}",
            agreement.id,
            quote_id,
            requester_id,
            provider_id
        );
        Ok(agreement)
    }

    /// Visible to its two parties only.
    pub async fn get(&self, agreement_id: Uuid, actor_id: Uuid) -> Result<Agreement, ServiceError> {
        let mut tx = self.store.begin().await?;
        let agreement = tx
            .get_agreement(agreement_id)
            .await?
            .ok_or_else(|| ServiceError::agreement_not_found(agreement_id))?;

        if agreement.party(actor_id).is_none() {
            return Err(ServiceError::Forbidden(format!(
                "user {} is not a party to agreement {}",
                actor_id, agreement_id
            )));
        }
        Ok(agreement)
    }

    pub async fn list_for_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<Agreement>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let request = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        let agreements = tx.get_request_agreements(request_id).await?;
        if request.requester_id == actor_id {
            return Ok(agreements);
        }
        Ok(agreements
            .into_iter()
            .filter(|a| a.provider_id == actor_id)
            .collect())
    }

    /// Records the caller's acceptance. When both sides have accepted, the agreement is
    /// finalized in the same transaction: the request is claimed for the provider, the
    /// winning quote accepted, competing quotes and agreements closed, other providers
    /// rejected and the workflow tracker created.
    pub async fn accept(&self, agreement_id: Uuid, actor_id: Uuid) -> Result<Agreement, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let snapshot = tx
            .get_agreement(agreement_id)
            .await?
            .ok_or_else(|| ServiceError::agreement_not_found(agreement_id))?;
        let role = snapshot.party(actor_id).ok_or_else(|| {
            ServiceError::Forbidden(format!(
                "user {} is not a party to agreement {}",
                actor_id, agreement_id
            ))
        })?;

        let request = tx
            .lock_request(snapshot.request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(snapshot.request_id))?;
        let mut agreement = tx
            .lock_agreement(agreement_id)
            .await?
            .ok_or_else(|| ServiceError::agreement_not_found(agreement_id))?;

        if agreement.status.is_terminal() {
            if agreement.status == AgreementStatus::Cancelled
                && lost_to_other(&request, agreement.provider_id)
            {
                return Err(ServiceError::Conflict(format!(
                    "service request {} was assigned to another provider",
                    request.id
                )));
            }
            if agreement.status == AgreementStatus::Accepted {
                return Ok(agreement);
            }
            return Err(ServiceError::InvalidTransition(format!(
                "agreement {} is {:?}",
                agreement_id, agreement.status
            )));
        }
        if agreement.has_accepted(role) {
            return Ok(agreement);
        }

        let mut quote = tx
            .lock_quote(agreement.quote_id)
            .await?
            .ok_or_else(|| ServiceError::quote_not_found(agreement.quote_id))?;

        if quote.is_due(now) {
            quote.set_status(QuoteStatus::Expired, now);
            tx.update_quote(&quote).await?;
            tx.commit().await?;
            self.events
                .publish(MarketEvent::QuoteExpired {
                    request_id: quote.request_id,
                    provider_id: quote.provider_id,
                    quote_id: quote.id,
                })
                .await;
            return Err(ServiceError::InvalidTransition(format!(
                "quote {} expired before the agreement was accepted",
                quote.id
            )));
        }
        if quote.status != QuoteStatus::Pending {
            if lost_to_other(&request, agreement.provider_id) {
                return Err(ServiceError::Conflict(format!(
                    "service request {} was assigned to another provider",
                    request.id
                )));
            }
            return Err(ServiceError::InvalidTransition(format!(
                "quote {} is {:?}",
                quote.id, quote.status
            )));
        }

        if !request.is_open() {
            if lost_to_other(&request, agreement.provider_id) {
                agreement.close(AgreementStatus::Cancelled, now);
                tx.update_agreement(&agreement).await?;
                tx.commit().await?;
                return Err(ServiceError::Conflict(format!(
                    "service request {} was assigned to another provider",
                    request.id
                )));
            }
            return Err(ServiceError::InvalidTransition(format!(
                "service request {} is {:?}",
                request.id, request.status
            )));
        }

        agreement.record_acceptance(role, now);
        quote.mark_accepted_by(role, now);

        if !agreement.is_fully_accepted() {
            tx.update_agreement(&agreement).await?;
            tx.update_quote(&quote).await?;
            tx.commit().await?;
            tracing::info!("Agreement {} accepted by {:?} {}", agreement_id, role, actor_id);
            return Ok(agreement);
        }

        match request_service::assign(tx.as_mut(), request.id, agreement.provider_id, now).await {
            Ok(_) => {}
            Err(err @ ServiceError::Conflict(_)) => {
                agreement.close(AgreementStatus::Cancelled, now);
                tx.update_agreement(&agreement).await?;
                tx.commit().await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        }

        agreement.finalize(now);
        tx.update_agreement(&agreement).await?;

        quote.set_status(QuoteStatus::Accepted, now);
        tx.update_quote(&quote).await?;

        let quotes = tx.reject_pending_quotes(request.id, Some(quote.id), now).await?;
        let agreements = tx
            .cancel_pending_agreements(request.id, Some(agreement.id), now)
            .await?;
        let providers =
            provider_status::retire_losers(tx.as_mut(), request.id, agreement.provider_id, quote.id, now)
                .await?;

        if tx.get_workflow(request.id, agreement.provider_id).await?.is_none() {
            tx.insert_workflow(&WorkflowStatus::assigned(request.id, agreement.provider_id, now))
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Agreement {} finalized: request {} assigned to {} ({} quotes rejected, {} agreements cancelled, {} providers rejected)",
            agreement.id,
            request.id,
            agreement.provider_id,
            quotes,
            agreements,
            providers
        );
        self.events
            .publish(MarketEvent::AgreementFinalized {
                request_id: request.id,
                provider_id: agreement.provider_id,
                quote_id: quote.id,
            })
            .await;
        self.events
            .publish(MarketEvent::RequestAssigned {
                request_id: request.id,
                provider_id: agreement.provider_id,
            })
            .await;

        Ok(agreement)
    }

    /// Either party can walk away from a pending agreement.
    pub async fn reject(&self, agreement_id: Uuid, actor_id: Uuid) -> Result<Agreement, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let request_id = tx
            .get_agreement(agreement_id)
            .await?
            .ok_or_else(|| ServiceError::agreement_not_found(agreement_id))?
            .request_id;

        tx.lock_request(request_id).await?;
        let mut agreement = tx
            .lock_agreement(agreement_id)
            .await?
            .ok_or_else(|| ServiceError::agreement_not_found(agreement_id))?;

        if agreement.party(actor_id).is_none() {
            return Err(ServiceError::Forbidden(format!(
                "user {} is not a party to agreement {}",
                actor_id, agreement_id
            )));
        }
        if agreement.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "agreement {} is {:?}",
                agreement_id, agreement.status
            )));
        }

        agreement.close(AgreementStatus::Rejected, now);
        tx.update_agreement(&agreement).await?;
        tx.commit().await?;

        tracing::info!("Agreement {} rejected by {}", agreement_id, actor_id);
        Ok(agreement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::requestmodel::{BookingMode, ProviderStatus, RequestStatus},
        models::workflowmodel::Milestone,
        db::db::DBClient,
        service::test_support::{quote_only_body, Harness},
    };
    use chrono::Duration;
    use sqlx::{postgres::PgPoolOptions, types::BigDecimal};

    #[tokio::test]
    async fn one_sided_acceptance_changes_nothing_else() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;

        let agreement = h.agreements.open(quote.id, provider, owner).await.unwrap();
        let after = h.agreements.accept(agreement.id, owner).await.unwrap();
        assert!(after.requester_accepted && !after.provider_accepted);
        assert_eq!(after.status, AgreementStatus::Pending);

        // repeated acceptance is a no-op
        let again = h.agreements.accept(agreement.id, owner).await.unwrap();
        assert_eq!(again.requester_accepted_at, after.requester_accepted_at);

        assert_eq!(h.requests.get(request.id).await.unwrap().status, RequestStatus::Open);
        assert_eq!(h.quotes.get(quote.id, owner).await.unwrap().status, QuoteStatus::Pending);
    }

    #[tokio::test]
    async fn finalization_assigns_and_retires_competitors() {
        let h = Harness::new();
        let mut events = h.events.subscribe();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let (winner, loser) = (Uuid::new_v4(), Uuid::new_v4());
        let winning = h.quote(request.id, winner, 120).await;
        let losing = h.quote(request.id, loser, 110).await;
        let losing_agreement = h.agreements.open(losing.id, loser, owner).await.unwrap();

        let agreement = h.finalize(owner, &winning).await;
        assert_eq!(agreement.status, AgreementStatus::Accepted);
        assert!(agreement.finalized_at.is_some());

        let request = h.requests.get(request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Assigned);
        assert_eq!(request.assigned_provider_id, Some(winner));

        assert_eq!(h.quotes.get(winning.id, owner).await.unwrap().status, QuoteStatus::Accepted);
        assert_eq!(h.quotes.get(losing.id, owner).await.unwrap().status, QuoteStatus::Rejected);
        assert_eq!(
            h.agreements.get(losing_agreement.id, owner).await.unwrap().status,
            AgreementStatus::Cancelled
        );

        let winner_status = h.statuses.get(request.id, winner).await.unwrap().unwrap();
        assert_eq!(winner_status.status, ProviderStatus::Assigned);
        assert_eq!(winner_status.quote_id, Some(winning.id));
        let loser_status = h.statuses.get(request.id, loser).await.unwrap().unwrap();
        assert_eq!(loser_status.status, ProviderStatus::Rejected);

        let workflow = h.workflows.get(request.id, winner, owner).await.unwrap();
        assert_eq!(workflow.current_milestone(), Some(Milestone::Assigned));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&MarketEvent::AgreementFinalized {
            request_id: request.id,
            provider_id: winner,
            quote_id: winning.id,
        }));
        assert!(seen.contains(&MarketEvent::RequestAssigned { request_id: request.id, provider_id: winner }));
    }

    #[tokio::test]
    async fn immediate_booking_is_won_by_the_chosen_quote() {
        let h = Harness::new();
        let requester = Uuid::new_v4();
        let mut body = quote_only_body();
        body.booking_mode = BookingMode::Immediate;
        body.date = Some(Utc::now().date_naive());
        let x = h.requests.create(requester, body).await.unwrap();

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let quote_a = h.quote(x.id, a, 100).await;
        let quote_b = h.quote(x.id, b, 90).await;

        h.finalize(requester, &quote_b).await;

        let x = h.requests.get(x.id).await.unwrap();
        assert_eq!(x.status, RequestStatus::Assigned);
        assert_eq!(x.assigned_provider_id, Some(b));
        assert!(x.is_consistent());

        assert_eq!(h.quotes.get(quote_a.id, requester).await.unwrap().status, QuoteStatus::Rejected);
        assert_eq!(
            h.statuses.get(x.id, a).await.unwrap().unwrap().status,
            ProviderStatus::Rejected
        );
        assert_eq!(
            h.statuses.get(x.id, b).await.unwrap().unwrap().status,
            ProviderStatus::Assigned
        );

        let workflow = h.workflows.get(x.id, b, requester).await.unwrap();
        assert!(workflow.is_assigned);
        assert!(!workflow.is_in_progress && !workflow.is_checked_in && !workflow.is_completed);
    }

    /// Two providers' agreements, both accepted by the requester, finalized at the same time
    /// alongside an expiry sweep. Exactly one finalization may win.
    async fn race_two_finalizations(h: &Harness) {
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let qa = h.quote(request.id, a, 100).await;
        let qb = h.quote(request.id, b, 95).await;

        let ag_a = h.agreements.open(qa.id, a, owner).await.unwrap();
        let ag_b = h.agreements.open(qb.id, b, owner).await.unwrap();
        h.agreements.accept(ag_a.id, owner).await.unwrap();
        h.agreements.accept(ag_b.id, owner).await.unwrap();

        let (ra, rb, swept) = futures::join!(
            h.agreements.accept(ag_a.id, a),
            h.agreements.accept(ag_b.id, b),
            h.quotes.sweep_expired(Utc::now())
        );
        assert!(swept.is_ok());

        let outcomes = [ra, rb];
        let winners: Vec<&Agreement> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].status, AgreementStatus::Accepted);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ServiceError::Conflict(_)))));

        let request = h.requests.get(request.id).await.unwrap();
        assert_eq!(request.assigned_provider_id, Some(winners[0].provider_id));
        assert!(request.is_consistent());

        let accepted_quotes = h
            .quotes
            .list_for_request(request.id, owner)
            .await
            .unwrap()
            .into_iter()
            .filter(|q| q.status == QuoteStatus::Accepted)
            .count();
        assert_eq!(accepted_quotes, 1);

        let statuses = h.statuses.for_request(request.id, owner).await.unwrap();
        let assigned = statuses.iter().filter(|s| s.status == ProviderStatus::Assigned).count();
        assert_eq!(assigned, 1);
    }

    #[tokio::test]
    async fn concurrent_finalizations_have_one_winner() {
        race_two_finalizations(&Harness::new()).await;
    }

    /// Runs the same race through row locks and the conditional update on a real database.
    /// Skipped unless `TEST_DATABASE_URL` points at a disposable Postgres.
    #[tokio::test]
    async fn postgres_finalizations_have_one_winner() {
        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("connect to TEST_DATABASE_URL");
        sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");

        race_two_finalizations(&Harness::with_store(Arc::new(DBClient::new(pool)))).await;
    }

    #[tokio::test]
    async fn agreement_on_expired_quote_fails() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::milliseconds(150);
        let quote = h
            .quotes
            .submit(request.id, provider, BigDecimal::from(60), None, Some(expires_at))
            .await
            .unwrap();
        let agreement = h.agreements.open(quote.id, provider, owner).await.unwrap();
        h.agreements.accept(agreement.id, owner).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let err = h.agreements.accept(agreement.id, provider).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        assert_eq!(h.quotes.get(quote.id, owner).await.unwrap().status, QuoteStatus::Expired);
        assert_eq!(h.requests.get(request.id).await.unwrap().status, RequestStatus::Open);
    }

    #[tokio::test]
    async fn only_parties_may_act() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;

        let err = h.agreements.open(quote.id, provider, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = h.agreements.open(quote.id, Uuid::new_v4(), owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));

        let agreement = h.agreements.open(quote.id, provider, owner).await.unwrap();
        let err = h.agreements.open(quote.id, provider, owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = h.agreements.accept(agreement.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejected_agreement_cannot_be_accepted() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;
        let agreement = h.agreements.open(quote.id, provider, owner).await.unwrap();

        let rejected = h.agreements.reject(agreement.id, provider).await.unwrap();
        assert_eq!(rejected.status, AgreementStatus::Rejected);

        let err = h.agreements.accept(agreement.id, owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        let err = h.agreements.reject(agreement.id, owner).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn late_acceptance_after_assignment_conflicts() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let qa = h.quote(request.id, a, 100).await;
        let qb = h.quote(request.id, b, 90).await;
        let ag_b = h.agreements.open(qb.id, b, owner).await.unwrap();

        h.finalize(owner, &qa).await;

        let err = h.agreements.accept(ag_b.id, b).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
