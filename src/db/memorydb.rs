// db/memorydb.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{db::MarketStore, marketdb::MarketTx};
use crate::models::{
    chatmodel::Message,
    quotemodel::{Agreement, AgreementStatus, Quote, QuoteStatus},
    requestmodel::{HiddenRequest, ProviderRequestStatus, ProviderStatus, RequestStatus, ServiceRequest},
    workflowmodel::WorkflowStatus,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    requests: HashMap<Uuid, ServiceRequest>,
    // keyed by (provider_id, request_id)
    hidden: HashMap<(Uuid, Uuid), HiddenRequest>,
    // keyed by (request_id, provider_id)
    provider_statuses: HashMap<(Uuid, Uuid), ProviderRequestStatus>,
    quotes: HashMap<Uuid, Quote>,
    agreements: HashMap<Uuid, Agreement>,
    // keyed by (request_id, provider_id)
    workflows: HashMap<(Uuid, Uuid), WorkflowStatus>,
    messages: Vec<Message>,
}

/// In-process store. A transaction holds the single state lock for its whole lifetime,
/// so transactions are fully serialized; writes go to a copy that `commit` swaps in.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn MarketTx>, Error> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    fn backend(&self) -> &str {
        "memory"
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

fn unique_violation(what: &str) -> Error {
    Error::Protocol(format!("unique constraint violated: {}", what))
}

fn newest_first(requests: &mut [ServiceRequest]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl MarketTx for MemoryTx {
    async fn insert_request(&mut self, request: &ServiceRequest) -> Result<(), Error> {
        if self.work.requests.contains_key(&request.id) {
            return Err(unique_violation("service_requests.id"));
        }
        self.work.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        Ok(self.work.requests.get(&request_id).cloned())
    }

    async fn lock_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        self.get_request(request_id).await
    }

    async fn update_request(&mut self, request: &ServiceRequest) -> Result<(), Error> {
        match self.work.requests.get_mut(&request.id) {
            Some(existing) => {
                existing.status = request.status;
                existing.assigned_provider_id = request.assigned_provider_id;
                existing.updated_at = request.updated_at;
                Ok(())
            }
            None => Err(Error::RowNotFound),
        }
    }

    async fn claim_request(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceRequest>, Error> {
        let Some(request) = self.work.requests.get_mut(&request_id) else {
            return Ok(None);
        };
        if request.status != RequestStatus::Open || request.assigned_provider_id.is_some() {
            return Ok(None);
        }
        request.assigned_provider_id = Some(provider_id);
        request.status = RequestStatus::Assigned;
        request.updated_at = now;
        Ok(Some(request.clone()))
    }

    async fn get_open_requests_for_provider(
        &mut self,
        provider_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ServiceRequest>, Error> {
        let mut open: Vec<ServiceRequest> = self
            .work
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Open && r.requester_id != provider_id)
            .filter(|r| !self.work.hidden.contains_key(&(provider_id, r.id)))
            .cloned()
            .collect();
        newest_first(&mut open);

        Ok(open
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_requester_requests(
        &mut self,
        requester_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error> {
        let mut mine: Vec<ServiceRequest> = self
            .work
            .requests
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        newest_first(&mut mine);
        Ok(mine)
    }

    async fn insert_hidden(&mut self, hidden: &HiddenRequest) -> Result<bool, Error> {
        let key = (hidden.provider_id, hidden.service_request_id);
        if self.work.hidden.contains_key(&key) {
            return Ok(false);
        }
        self.work.hidden.insert(key, hidden.clone());
        Ok(true)
    }

    async fn delete_hidden(&mut self, provider_id: Uuid, request_id: Uuid) -> Result<bool, Error> {
        Ok(self.work.hidden.remove(&(provider_id, request_id)).is_some())
    }

    async fn get_hidden(
        &mut self,
        provider_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<HiddenRequest>, Error> {
        Ok(self.work.hidden.get(&(provider_id, request_id)).cloned())
    }

    async fn get_provider_status(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<ProviderRequestStatus>, Error> {
        Ok(self.work.provider_statuses.get(&(request_id, provider_id)).cloned())
    }

    async fn upsert_provider_status(&mut self, status: &ProviderRequestStatus) -> Result<(), Error> {
        let key = (status.request_id, status.provider_id);
        match self.work.provider_statuses.get_mut(&key) {
            Some(existing) => {
                existing.status = status.status;
                existing.quote_id = status.quote_id;
                existing.last_updated = status.last_updated;
            }
            None => {
                self.work.provider_statuses.insert(key, status.clone());
            }
        }

        let assigned = self
            .work
            .provider_statuses
            .values()
            .filter(|s| s.request_id == status.request_id && s.status == ProviderStatus::Assigned)
            .count();
        if assigned > 1 {
            return Err(unique_violation("provider_request_statuses assigned per request"));
        }
        Ok(())
    }

    async fn get_request_provider_statuses(
        &mut self,
        request_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error> {
        let mut rows: Vec<ProviderRequestStatus> = self
            .work
            .provider_statuses
            .values()
            .filter(|s| s.request_id == request_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(rows)
    }

    async fn get_provider_statuses(
        &mut self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error> {
        let mut rows: Vec<ProviderRequestStatus> = self
            .work
            .provider_statuses
            .values()
            .filter(|s| s.provider_id == provider_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(rows)
    }

    async fn reject_provider_statuses(
        &mut self,
        request_id: Uuid,
        except_provider: Option<Uuid>,
        include_assigned: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut count = 0;
        for row in self.work.provider_statuses.values_mut() {
            if row.request_id != request_id || Some(row.provider_id) == except_provider {
                continue;
            }
            let retire = row.status.is_live_negotiation()
                || (include_assigned && row.status == ProviderStatus::Assigned);
            if retire {
                row.status = ProviderStatus::Rejected;
                row.last_updated = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), Error> {
        let duplicate = quote.is_live()
            && self.work.quotes.values().any(|q| {
                q.request_id == quote.request_id && q.provider_id == quote.provider_id && q.is_live()
            });
        if duplicate || self.work.quotes.contains_key(&quote.id) {
            return Err(unique_violation("quotes live per (request_id, provider_id)"));
        }
        self.work.quotes.insert(quote.id, quote.clone());
        Ok(())
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), Error> {
        match self.work.quotes.get_mut(&quote.id) {
            Some(existing) => {
                *existing = quote.clone();
                Ok(())
            }
            None => Err(Error::RowNotFound),
        }
    }

    async fn get_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error> {
        Ok(self.work.quotes.get(&quote_id).cloned())
    }

    async fn lock_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error> {
        self.get_quote(quote_id).await
    }

    async fn get_live_quote(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Quote>, Error> {
        Ok(self
            .work
            .quotes
            .values()
            .find(|q| q.request_id == request_id && q.provider_id == provider_id && q.is_live())
            .cloned())
    }

    async fn get_request_quotes(&mut self, request_id: Uuid) -> Result<Vec<Quote>, Error> {
        let mut quotes: Vec<Quote> = self
            .work
            .quotes
            .values()
            .filter(|q| q.request_id == request_id)
            .cloned()
            .collect();
        quotes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(quotes)
    }

    async fn reject_pending_quotes(
        &mut self,
        request_id: Uuid,
        except_quote: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut count = 0;
        for quote in self.work.quotes.values_mut() {
            if quote.request_id == request_id
                && Some(quote.id) != except_quote
                && quote.status == QuoteStatus::Pending
            {
                quote.set_status(QuoteStatus::Rejected, now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn expire_due_quotes(&mut self, now: DateTime<Utc>) -> Result<Vec<Quote>, Error> {
        let mut expired = Vec::new();
        for quote in self.work.quotes.values_mut() {
            if quote.is_due(now) {
                quote.set_status(QuoteStatus::Expired, now);
                expired.push(quote.clone());
            }
        }
        Ok(expired)
    }

    async fn insert_agreement(&mut self, agreement: &Agreement) -> Result<(), Error> {
        let duplicate = self
            .work
            .agreements
            .values()
            .any(|a| a.quote_id == agreement.quote_id && a.provider_id == agreement.provider_id);
        if duplicate {
            return Err(unique_violation("agreements (quote_id, provider_id)"));
        }
        self.work.agreements.insert(agreement.id, agreement.clone());
        Ok(())
    }

    async fn update_agreement(&mut self, agreement: &Agreement) -> Result<(), Error> {
        match self.work.agreements.get_mut(&agreement.id) {
            Some(existing) => {
                *existing = agreement.clone();
                Ok(())
            }
            None => Err(Error::RowNotFound),
        }
    }

    async fn get_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error> {
        Ok(self.work.agreements.get(&agreement_id).cloned())
    }

    async fn lock_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error> {
        self.get_agreement(agreement_id).await
    }

    async fn get_agreement_for_quote(
        &mut self,
        quote_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Agreement>, Error> {
        Ok(self
            .work
            .agreements
            .values()
            .find(|a| a.quote_id == quote_id && a.provider_id == provider_id)
            .cloned())
    }

    async fn get_request_agreements(&mut self, request_id: Uuid) -> Result<Vec<Agreement>, Error> {
        let mut agreements: Vec<Agreement> = self
            .work
            .agreements
            .values()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect();
        agreements.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agreements)
    }

    async fn cancel_pending_agreements(
        &mut self,
        request_id: Uuid,
        except_agreement: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut count = 0;
        for agreement in self.work.agreements.values_mut() {
            if agreement.request_id == request_id
                && Some(agreement.id) != except_agreement
                && agreement.status == AgreementStatus::Pending
            {
                agreement.close(AgreementStatus::Cancelled, now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error> {
        let key = (workflow.request_id, workflow.provider_id);
        if self.work.workflows.contains_key(&key) {
            return Err(unique_violation("workflow_statuses (request_id, provider_id)"));
        }
        self.work.workflows.insert(key, workflow.clone());
        Ok(())
    }

    async fn update_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error> {
        let key = (workflow.request_id, workflow.provider_id);
        match self.work.workflows.get_mut(&key) {
            Some(existing) => {
                *existing = workflow.clone();
                Ok(())
            }
            None => Err(Error::RowNotFound),
        }
    }

    async fn get_workflow(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<WorkflowStatus>, Error> {
        Ok(self.work.workflows.get(&(request_id, provider_id)).cloned())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<(), Error> {
        self.work.messages.push(message.clone());
        Ok(())
    }

    async fn get_thread(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        participant_id: Uuid,
    ) -> Result<Vec<Message>, Error> {
        Ok(self
            .work
            .messages
            .iter()
            .filter(|m| m.in_thread(request_id, quote_id) && m.involves(participant_id))
            .cloned()
            .collect())
    }

    async fn mark_thread_read(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        reader_id: Uuid,
    ) -> Result<u64, Error> {
        let mut count = 0;
        for message in self.work.messages.iter_mut() {
            if message.in_thread(request_id, quote_id)
                && message.receiver_id == reader_id
                && !message.is_read
            {
                message.is_read = true;
                message.is_delivered = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
