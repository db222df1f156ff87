// service/test_support.rs
use std::sync::Arc;

use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::{
    db::{db::MarketStore, memorydb::MemoryStore},
    dtos::marketdtos::CreateServiceRequestDto,
    models::{
        quotemodel::{Agreement, Quote},
        requestmodel::{BookingMode, ServiceRequest},
    },
    service::{
        agreement_service::AgreementService, chat_service::ChatService,
        events::BroadcastPublisher, provider_status::ProviderStatusService,
        quote_service::QuoteService, request_service::RequestService,
        workflow_service::WorkflowService,
    },
};

pub fn quote_only_body() -> CreateServiceRequestDto {
    CreateServiceRequestDto {
        booking_mode: BookingMode::QuoteOnly,
        category: "cleaning".to_string(),
        subcategory: "deep-clean".to_string(),
        location: "12 Marina Road".to_string(),
        latitude: None,
        longitude: None,
        date: None,
        time: None,
        title: Some("Post-renovation clean".to_string()),
        description: None,
        notes: None,
    }
}

/// Every service wired to one in-memory store.
pub struct Harness {
    pub events: Arc<BroadcastPublisher>,
    pub requests: RequestService,
    pub statuses: ProviderStatusService,
    pub quotes: QuoteService,
    pub agreements: AgreementService,
    pub workflows: WorkflowService,
    pub chat: ChatService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn MarketStore>) -> Self {
        let events = Arc::new(BroadcastPublisher::new(64));

        Self {
            requests: RequestService::new(store.clone(), events.clone()),
            statuses: ProviderStatusService::new(store.clone()),
            quotes: QuoteService::new(store.clone(), events.clone()),
            agreements: AgreementService::new(store.clone(), events.clone()),
            workflows: WorkflowService::new(store.clone(), events.clone()),
            chat: ChatService::new(store),
            events,
        }
    }

    pub async fn open_request(&self, requester_id: Uuid) -> ServiceRequest {
        self.requests
            .create(requester_id, quote_only_body())
            .await
            .expect("create request")
    }

    pub async fn quote(&self, request_id: Uuid, provider_id: Uuid, price: i64) -> Quote {
        self.quotes
            .submit(request_id, provider_id, BigDecimal::from(price), None, None)
            .await
            .expect("submit quote")
    }

    /// Opens an agreement on `quote` and has both sides accept it.
    pub async fn finalize(&self, requester_id: Uuid, quote: &Quote) -> Agreement {
        let agreement = self
            .agreements
            .open(quote.id, quote.provider_id, requester_id)
            .await
            .expect("open agreement");
        self.agreements
            .accept(agreement.id, requester_id)
            .await
            .expect("requester accepts");
        self.agreements
            .accept(agreement.id, quote.provider_id)
            .await
            .expect("provider accepts")
    }
}
