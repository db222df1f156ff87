// service/workflow_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        requestmodel::RequestStatus,
        workflowmodel::{Milestone, WorkflowStatus},
    },
    service::{
        error::ServiceError,
        events::{EventPublisher, MarketEvent},
        provider_status, request_service,
    },
};

#[derive(Debug, Clone)]
pub struct WorkflowService {
    store: Arc<dyn MarketStore>,
    events: Arc<dyn EventPublisher>,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn MarketStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    pub async fn get(
        &self,
        request_id: Uuid,
        provider_id: Uuid,
        actor_id: Uuid,
    ) -> Result<WorkflowStatus, ServiceError> {
        let mut tx = self.store.begin().await?;
        let request = tx
            .get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if actor_id != provider_id && actor_id != request.requester_id {
            return Err(ServiceError::Forbidden(format!(
                "user {} cannot view this workflow",
                actor_id
            )));
        }

        tx.get_workflow(request_id, provider_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Workflow for request {} and provider {}",
                    request_id, provider_id
                ))
            })
    }

    /// Moves the provider's workflow to `target`, which must be the next milestone.
    /// Starting work moves the request to InProgress; completing it completes the request.
    pub async fn advance(
        &self,
        request_id: Uuid,
        provider_id: Uuid,
        actor_id: Uuid,
        target: Milestone,
    ) -> Result<WorkflowStatus, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if actor_id != provider_id && actor_id != request.requester_id {
            return Err(ServiceError::Forbidden(format!(
                "user {} cannot advance this workflow",
                actor_id
            )));
        }

        let mut workflow = tx.get_workflow(request_id, provider_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Workflow for request {} and provider {}",
                request_id, provider_id
            ))
        })?;

        let active = matches!(request.status, RequestStatus::Assigned | RequestStatus::InProgress);
        if !request.is_assigned_to(provider_id) || !active {
            return Err(ServiceError::InvalidTransition(format!(
                "request {} is {:?} and not in progress with provider {}",
                request_id, request.status, provider_id
            )));
        }

        workflow
            .advance(target, now)
            .map_err(ServiceError::InvalidTransition)?;
        tx.update_workflow(&workflow).await?;

        match target {
            Milestone::InProgress => request_service::start(tx.as_mut(), &mut request, now).await?,
            Milestone::Completed => {
                request_service::complete(tx.as_mut(), &mut request, &workflow, now).await?;
                provider_status::mark_completed(tx.as_mut(), request_id, provider_id, now).await?;
            }
            _ => {}
        }

        tx.commit().await?;

        tracing::info!(
            "Workflow for request {} / provider {} reached {}",
            request_id,
            provider_id,
            target.to_str()
        );
        self.events
            .publish(MarketEvent::WorkflowMilestoneReached {
                request_id,
                provider_id,
                milestone: target,
            })
            .await;
        if target == Milestone::Completed {
            self.events
                .publish(MarketEvent::RequestCompleted { request_id })
                .await;
        }

        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::requestmodel::ProviderStatus, service::test_support::Harness};

    #[tokio::test]
    async fn milestones_must_follow_order() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;
        h.finalize(owner, &quote).await;

        let err = h
            .workflows
            .advance(request.id, provider, provider, Milestone::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        let unchanged = h.workflows.get(request.id, provider, owner).await.unwrap();
        assert_eq!(unchanged.current_milestone(), Some(Milestone::Assigned));
        assert!(!unchanged.is_completed);
    }

    #[tokio::test]
    async fn full_run_completes_the_request() {
        let h = Harness::new();
        let mut events = h.events.subscribe();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;
        h.finalize(owner, &quote).await;

        h.workflows
            .advance(request.id, provider, provider, Milestone::InProgress)
            .await
            .unwrap();
        assert_eq!(h.requests.get(request.id).await.unwrap().status, RequestStatus::InProgress);

        h.workflows
            .advance(request.id, provider, provider, Milestone::CheckedIn)
            .await
            .unwrap();
        let done = h
            .workflows
            .advance(request.id, provider, owner, Milestone::Completed)
            .await
            .unwrap();
        assert!(done.is_monotonic());
        assert!(done.completed_at.is_some());

        let request = h.requests.get(request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Completed);
        assert!(request.is_consistent());
        let status = h.statuses.get(request.id, provider).await.unwrap().unwrap();
        assert_eq!(status.status, ProviderStatus::Completed);

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            completed |= event == MarketEvent::RequestCompleted { request_id: request.id };
        }
        assert!(completed);

        let err = h
            .workflows
            .advance(request.id, provider, provider, Milestone::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn strangers_cannot_advance() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;
        h.finalize(owner, &quote).await;

        let err = h
            .workflows
            .advance(request.id, provider, Uuid::new_v4(), Milestone::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn cancelled_request_freezes_workflow() {
        let h = Harness::new();
        let owner = Uuid::new_v4();
        let request = h.open_request(owner).await;
        let provider = Uuid::new_v4();
        let quote = h.quote(request.id, provider, 100).await;
        h.finalize(owner, &quote).await;
        h.requests.cancel(request.id, owner).await.unwrap();

        let err = h
            .workflows
            .advance(request.id, provider, provider, Milestone::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }
}
