// service/request_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{db::MarketStore, marketdb::MarketTx},
    dtos::marketdtos::CreateServiceRequestDto,
    models::{
        requestmodel::{HiddenRequest, ProviderStatus, RequestStatus, ServiceRequest},
        workflowmodel::WorkflowStatus,
    },
    service::{
        error::ServiceError,
        events::{EventPublisher, MarketEvent},
        provider_status,
    },
};

fn required(field: &str, value: String) -> Result<String, ServiceError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ServiceError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(value)
}

/// Exclusive assignment. The compare-and-swap on `assigned_provider_id` is what decides a
/// race between two finalizations; the loser gets `Conflict`. A request that left `Open`
/// without an assignee (cancelled) gives `InvalidTransition`.
pub async fn assign(
    tx: &mut dyn MarketTx,
    request_id: Uuid,
    provider_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, ServiceError> {
    if let Some(request) = tx.claim_request(request_id, provider_id, now).await? {
        tracing::info!("Request {} assigned to provider {}", request_id, provider_id);
        return Ok(request);
    }

    let current = tx
        .get_request(request_id)
        .await?
        .ok_or_else(|| ServiceError::request_not_found(request_id))?;

    match current.assigned_provider_id {
        Some(other) => {
            tracing::warn!(
                "Assignment of request {} to provider {} lost to provider {}",
                request_id,
                provider_id,
                other
            );
            Err(ServiceError::Conflict(format!(
                "service request {} has already been assigned",
                request_id
            )))
        }
        None => Err(ServiceError::InvalidTransition(format!(
            "service request {} cannot be assigned from {:?}",
            request_id, current.status
        ))),
    }
}

/// Assigned -> InProgress, driven by the workflow's InProgress milestone.
pub async fn start(
    tx: &mut dyn MarketTx,
    request: &mut ServiceRequest,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if request.status != RequestStatus::Assigned {
        return Err(ServiceError::InvalidTransition(format!(
            "request {} cannot start from {:?}",
            request.id, request.status
        )));
    }
    request.status = RequestStatus::InProgress;
    request.updated_at = now;
    tx.update_request(request).await?;
    Ok(())
}

/// InProgress -> Completed. Only legal once the provider's workflow has completed.
pub async fn complete(
    tx: &mut dyn MarketTx,
    request: &mut ServiceRequest,
    workflow: &WorkflowStatus,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !workflow.is_completed || !request.is_assigned_to(workflow.provider_id) {
        return Err(ServiceError::InvalidTransition(format!(
            "request {} has no completed workflow for its assigned provider",
            request.id
        )));
    }
    if request.status != RequestStatus::InProgress {
        return Err(ServiceError::InvalidTransition(format!(
            "request {} cannot complete from {:?}",
            request.id, request.status
        )));
    }
    request.status = RequestStatus::Completed;
    request.updated_at = now;
    tx.update_request(request).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RequestService {
    store: Arc<dyn MarketStore>,
    events: Arc<dyn EventPublisher>,
}

impl RequestService {
    pub fn new(store: Arc<dyn MarketStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    pub async fn create(
        &self,
        requester_id: Uuid,
        body: CreateServiceRequestDto,
    ) -> Result<ServiceRequest, ServiceError> {
        let now = Utc::now();

        body.booking_mode
            .validate_schedule(body.date, body.time.as_deref(), now.date_naive())
            .map_err(ServiceError::InvalidArgument)?;

        if body.latitude.map_or(false, |lat| !(-90.0..=90.0).contains(&lat)) {
            return Err(ServiceError::InvalidArgument("latitude must be between -90 and 90".to_string()));
        }
        if body.longitude.map_or(false, |lng| !(-180.0..=180.0).contains(&lng)) {
            return Err(ServiceError::InvalidArgument("longitude must be between -180 and 180".to_string()));
        }

        let request = ServiceRequest {
            id: Uuid::new_v4(),
            requester_id,
            booking_mode: body.booking_mode,
            category: required("category", body.category)?,
            subcategory: required("subcategory", body.subcategory)?,
            location: required("location", body.location)?,
            latitude: body.latitude,
            longitude: body.longitude,
            scheduled_date: body.date,
            scheduled_time: body.time.filter(|t| !t.trim().is_empty()),
            title: body.title,
            description: body.description,
            notes: body.notes,
            assigned_provider_id: None,
            status: RequestStatus::Open,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_request(&request).await?;
        tx.commit().await?;

        tracing::info!(
            "Service request {} created by {} ({} / {}, {})",
            request.id,
            requester_id,
            request.category,
            request.subcategory,
            request.booking_mode.to_str()
        );

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<ServiceRequest, ServiceError> {
        let mut tx = self.store.begin().await?;
        tx.get_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))
    }

    /// Opens a request. A provider opening an open request is recorded as having viewed it.
    pub async fn view(&self, request_id: Uuid, viewer_id: Uuid) -> Result<ServiceRequest, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.requester_id != viewer_id && request.is_open() {
            provider_status::record(
                tx.as_mut(),
                request_id,
                viewer_id,
                ProviderStatus::Viewed,
                None,
                now,
            )
            .await?;
            tx.commit().await?;
        }

        Ok(request)
    }

    pub async fn feed(
        &self,
        provider_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<ServiceRequest>, ServiceError> {
        let limit = limit.clamp(1, 100) as i64;
        let offset = (page.max(1) as i64 - 1) * limit;

        let mut tx = self.store.begin().await?;
        Ok(tx.get_open_requests_for_provider(provider_id, limit, offset).await?)
    }

    pub async fn list_mine(&self, requester_id: Uuid) -> Result<Vec<ServiceRequest>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.get_requester_requests(requester_id).await?)
    }

    /// Cancels an open or assigned request and retires everything still negotiating on it.
    pub async fn cancel(&self, request_id: Uuid, actor_id: Uuid) -> Result<ServiceRequest, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.requester_id != actor_id {
            return Err(ServiceError::Forbidden(format!(
                "user {} does not own service request {}",
                actor_id, request_id
            )));
        }

        if !request.status.is_cancellable() {
            return Err(ServiceError::InvalidTransition(format!(
                "request {} cannot be cancelled from {:?}",
                request_id, request.status
            )));
        }

        request.status = RequestStatus::Cancelled;
        request.assigned_provider_id = None;
        request.updated_at = now;
        tx.update_request(&request).await?;

        let quotes = tx.reject_pending_quotes(request_id, None, now).await?;
        let agreements = tx.cancel_pending_agreements(request_id, None, now).await?;
        let statuses = tx.reject_provider_statuses(request_id, None, true, now).await?;

        tx.commit().await?;

        tracing::info!(
            "Request {} cancelled: {} quotes rejected, {} agreements cancelled, {} provider statuses rejected",
            request_id,
            quotes,
            agreements,
            statuses
        );
        self.events.publish(MarketEvent::RequestCancelled { request_id }).await;

        Ok(request)
    }

    pub async fn hide(&self, request_id: Uuid, provider_id: Uuid) -> Result<HiddenRequest, ServiceError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.requester_id == provider_id {
            return Err(ServiceError::InvalidArgument(
                "a requester cannot hide their own request".to_string(),
            ));
        }

        if let Some(existing) = tx.get_hidden(provider_id, request_id).await? {
            return Ok(existing);
        }

        let hidden = HiddenRequest {
            id: Uuid::new_v4(),
            provider_id,
            service_request_id: request_id,
            hidden_at: now,
        };
        tx.insert_hidden(&hidden).await?;
        provider_status::record(
            tx.as_mut(),
            request_id,
            provider_id,
            ProviderStatus::Hidden,
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Provider {} hid request {}", provider_id, request_id);
        Ok(hidden)
    }

    pub async fn unhide(&self, request_id: Uuid, provider_id: Uuid) -> Result<bool, ServiceError> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_hidden(provider_id, request_id).await?;
        tx.commit().await?;

        if removed {
            tracing::info!("Provider {} unhid request {}", provider_id, request_id);
        }
        Ok(removed)
    }

    pub async fn is_hidden(&self, request_id: Uuid, provider_id: Uuid) -> Result<bool, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.get_hidden(provider_id, request_id).await?.is_some())
    }
}
