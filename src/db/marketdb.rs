// db/marketdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Error, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    chatmodel::Message,
    quotemodel::{Agreement, Quote},
    requestmodel::{HiddenRequest, ProviderRequestStatus, ServiceRequest},
    workflowmodel::WorkflowStatus,
};

/// One unit of work over the six marketplace tables.
#[async_trait]
pub trait MarketTx: Send {
    // Service requests
    async fn insert_request(&mut self, request: &ServiceRequest) -> Result<(), Error>;

    async fn get_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error>;

    /// Reads the request and holds its row lock until the transaction ends.
    async fn lock_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error>;

    async fn update_request(&mut self, request: &ServiceRequest) -> Result<(), Error>;

    /// Compare-and-swap of `assigned_provider_id` from NULL to `provider_id`, only while the
    /// request is open. `None` means another assignment got there first.
    async fn claim_request(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceRequest>, Error>;

    async fn get_open_requests_for_provider(
        &mut self,
        provider_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ServiceRequest>, Error>;

    async fn get_requester_requests(
        &mut self,
        requester_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error>;

    // Visibility
    async fn insert_hidden(&mut self, hidden: &HiddenRequest) -> Result<bool, Error>;

    async fn delete_hidden(&mut self, provider_id: Uuid, request_id: Uuid) -> Result<bool, Error>;

    async fn get_hidden(
        &mut self,
        provider_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<HiddenRequest>, Error>;

    // Provider statuses
    async fn get_provider_status(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<ProviderRequestStatus>, Error>;

    async fn upsert_provider_status(&mut self, status: &ProviderRequestStatus) -> Result<(), Error>;

    async fn get_request_provider_statuses(
        &mut self,
        request_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error>;

    async fn get_provider_statuses(
        &mut self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error>;

    /// Sets every Viewed/Negotiating/Quoted row of the request (and Assigned ones when
    /// `include_assigned`) to Rejected, skipping `except_provider`.
    async fn reject_provider_statuses(
        &mut self,
        request_id: Uuid,
        except_provider: Option<Uuid>,
        include_assigned: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    // Quotes
    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), Error>;

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), Error>;

    async fn get_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error>;

    async fn lock_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error>;

    async fn get_live_quote(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Quote>, Error>;

    async fn get_request_quotes(&mut self, request_id: Uuid) -> Result<Vec<Quote>, Error>;

    async fn reject_pending_quotes(
        &mut self,
        request_id: Uuid,
        except_quote: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Moves every Pending quote whose expiry is before `now` to Expired and returns them.
    /// Rows locked by another transaction are skipped and left for the next sweep.
    async fn expire_due_quotes(&mut self, now: DateTime<Utc>) -> Result<Vec<Quote>, Error>;

    // Agreements
    async fn insert_agreement(&mut self, agreement: &Agreement) -> Result<(), Error>;

    async fn update_agreement(&mut self, agreement: &Agreement) -> Result<(), Error>;

    async fn get_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error>;

    async fn lock_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error>;

    async fn get_agreement_for_quote(
        &mut self,
        quote_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Agreement>, Error>;

    async fn get_request_agreements(&mut self, request_id: Uuid) -> Result<Vec<Agreement>, Error>;

    async fn cancel_pending_agreements(
        &mut self,
        request_id: Uuid,
        except_agreement: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    // Workflow
    async fn insert_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error>;

    async fn update_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error>;

    async fn get_workflow(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<WorkflowStatus>, Error>;

    // Messages
    async fn insert_message(&mut self, message: &Message) -> Result<(), Error>;

    async fn get_thread(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        participant_id: Uuid,
    ) -> Result<Vec<Message>, Error>;

    async fn mark_thread_read(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        reader_id: Uuid,
    ) -> Result<u64, Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;
}

pub struct PgMarketTx {
    tx: Transaction<'static, Postgres>,
}

impl PgMarketTx {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MarketTx for PgMarketTx {
    async fn insert_request(&mut self, request: &ServiceRequest) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO service_requests
            (id, requester_id, booking_mode, category, subcategory, location, latitude, longitude,
            scheduled_date, scheduled_time, title, description, notes, assigned_provider_id,
            status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#
        )
        .bind(request.id)
        .bind(request.requester_id)
        .bind(request.booking_mode)
        .bind(&request.category)
        .bind(&request.subcategory)
        .bind(&request.location)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(request.scheduled_date)
        .bind(&request.scheduled_time)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.notes)
        .bind(request.assigned_provider_id)
        .bind(request.status)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        sqlx::query_as::<_, ServiceRequest>("SELECT * FROM service_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn lock_request(&mut self, request_id: Uuid) -> Result<Option<ServiceRequest>, Error> {
        sqlx::query_as::<_, ServiceRequest>(
            "SELECT * FROM service_requests WHERE id = $1 FOR UPDATE"
        )
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn update_request(&mut self, request: &ServiceRequest) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE service_requests
            SET status = $2, assigned_provider_id = $3, updated_at = $4
            WHERE id = $1
            "#
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.assigned_provider_id)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn claim_request(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceRequest>, Error> {
        sqlx::query_as::<_, ServiceRequest>(
            r#"
            UPDATE service_requests
            SET assigned_provider_id = $2, status = 'assigned'::request_status, updated_at = $3
            WHERE id = $1
              AND status = 'open'::request_status
              AND assigned_provider_id IS NULL
            RETURNING *
            "#
        )
        .bind(request_id)
        .bind(provider_id)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn get_open_requests_for_provider(
        &mut self,
        provider_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ServiceRequest>, Error> {
        sqlx::query_as::<_, ServiceRequest>(
            r#"
            SELECT sr.* FROM service_requests sr
            WHERE sr.status = 'open'::request_status
              AND sr.requester_id <> $1
              AND NOT EXISTS (
                  SELECT 1 FROM hidden_requests h
                  WHERE h.service_request_id = sr.id AND h.provider_id = $1
              )
            ORDER BY sr.created_at DESC
            LIMIT $2 OFFSET $3
            "#
        )
        .bind(provider_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn get_requester_requests(
        &mut self,
        requester_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, Error> {
        sqlx::query_as::<_, ServiceRequest>(
            "SELECT * FROM service_requests WHERE requester_id = $1 ORDER BY created_at DESC"
        )
        .bind(requester_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn insert_hidden(&mut self, hidden: &HiddenRequest) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO hidden_requests (id, provider_id, service_request_id, hidden_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider_id, service_request_id) DO NOTHING
            "#
        )
        .bind(hidden.id)
        .bind(hidden.provider_id)
        .bind(hidden.service_request_id)
        .bind(hidden.hidden_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_hidden(&mut self, provider_id: Uuid, request_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM hidden_requests WHERE provider_id = $1 AND service_request_id = $2"
        )
        .bind(provider_id)
        .bind(request_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_hidden(
        &mut self,
        provider_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<HiddenRequest>, Error> {
        sqlx::query_as::<_, HiddenRequest>(
            "SELECT * FROM hidden_requests WHERE provider_id = $1 AND service_request_id = $2"
        )
        .bind(provider_id)
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn get_provider_status(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<ProviderRequestStatus>, Error> {
        sqlx::query_as::<_, ProviderRequestStatus>(
            "SELECT * FROM provider_request_statuses WHERE request_id = $1 AND provider_id = $2"
        )
        .bind(request_id)
        .bind(provider_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn upsert_provider_status(&mut self, status: &ProviderRequestStatus) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO provider_request_statuses
            (id, request_id, provider_id, status, quote_id, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_id, request_id) DO UPDATE
            SET status = EXCLUDED.status,
                quote_id = EXCLUDED.quote_id,
                last_updated = EXCLUDED.last_updated
            "#
        )
        .bind(status.id)
        .bind(status.request_id)
        .bind(status.provider_id)
        .bind(status.status)
        .bind(status.quote_id)
        .bind(status.last_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_request_provider_statuses(
        &mut self,
        request_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error> {
        sqlx::query_as::<_, ProviderRequestStatus>(
            r#"
            SELECT * FROM provider_request_statuses
            WHERE request_id = $1
            ORDER BY last_updated DESC
            "#
        )
        .bind(request_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn get_provider_statuses(
        &mut self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderRequestStatus>, Error> {
        sqlx::query_as::<_, ProviderRequestStatus>(
            r#"
            SELECT * FROM provider_request_statuses
            WHERE provider_id = $1
            ORDER BY last_updated DESC
            "#
        )
        .bind(provider_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn reject_provider_statuses(
        &mut self,
        request_id: Uuid,
        except_provider: Option<Uuid>,
        include_assigned: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE provider_request_statuses
            SET status = 'rejected'::provider_status, last_updated = $4
            WHERE request_id = $1
              AND ($2::uuid IS NULL OR provider_id <> $2)
              AND (
                  status IN ('viewed'::provider_status, 'negotiating'::provider_status, 'quoted'::provider_status)
                  OR ($3 AND status = 'assigned'::provider_status)
              )
            "#
        )
        .bind(request_id)
        .bind(except_provider)
        .bind(include_assigned)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO quotes
            (id, request_id, provider_id, price, message, expires_at, status,
            accepted_by_requester, requester_accepted_at, accepted_by_provider, provider_accepted_at,
            created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        )
        .bind(quote.id)
        .bind(quote.request_id)
        .bind(quote.provider_id)
        .bind(&quote.price)
        .bind(&quote.message)
        .bind(quote.expires_at)
        .bind(quote.status)
        .bind(quote.accepted_by_requester)
        .bind(quote.requester_accepted_at)
        .bind(quote.accepted_by_provider)
        .bind(quote.provider_accepted_at)
        .bind(quote.created_at)
        .bind(quote.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE quotes
            SET status = $2,
                accepted_by_requester = $3, requester_accepted_at = $4,
                accepted_by_provider = $5, provider_accepted_at = $6,
                updated_at = $7
            WHERE id = $1
            "#
        )
        .bind(quote.id)
        .bind(quote.status)
        .bind(quote.accepted_by_requester)
        .bind(quote.requester_accepted_at)
        .bind(quote.accepted_by_provider)
        .bind(quote.provider_accepted_at)
        .bind(quote.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error> {
        sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1")
            .bind(quote_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn lock_quote(&mut self, quote_id: Uuid) -> Result<Option<Quote>, Error> {
        sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1 FOR UPDATE")
            .bind(quote_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn get_live_quote(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Quote>, Error> {
        sqlx::query_as::<_, Quote>(
            r#"
            SELECT * FROM quotes
            WHERE request_id = $1 AND provider_id = $2
              AND status IN ('pending'::quote_status, 'accepted'::quote_status)
            "#
        )
        .bind(request_id)
        .bind(provider_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn get_request_quotes(&mut self, request_id: Uuid) -> Result<Vec<Quote>, Error> {
        sqlx::query_as::<_, Quote>(
            "SELECT * FROM quotes WHERE request_id = $1 ORDER BY created_at ASC"
        )
        .bind(request_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn reject_pending_quotes(
        &mut self,
        request_id: Uuid,
        except_quote: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE quotes
            SET status = 'rejected'::quote_status, updated_at = $3
            WHERE request_id = $1
              AND ($2::uuid IS NULL OR id <> $2)
              AND status = 'pending'::quote_status
            "#
        )
        .bind(request_id)
        .bind(except_quote)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_due_quotes(&mut self, now: DateTime<Utc>) -> Result<Vec<Quote>, Error> {
        sqlx::query_as::<_, Quote>(
            r#"
            WITH due AS (
                SELECT id FROM quotes
                WHERE status = 'pending'::quote_status
                  AND expires_at IS NOT NULL
                  AND expires_at < $1
                ORDER BY id
                FOR UPDATE SKIP LOCKED
            )
            UPDATE quotes q
            SET status = 'expired'::quote_status, updated_at = $1
            FROM due
            WHERE q.id = due.id
            RETURNING q.*
            "#
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn insert_agreement(&mut self, agreement: &Agreement) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO agreements
            (id, quote_id, request_id, requester_id, provider_id,
            requester_accepted, requester_accepted_at, provider_accepted, provider_accepted_at,
            finalized_at, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        )
        .bind(agreement.id)
        .bind(agreement.quote_id)
        .bind(agreement.request_id)
        .bind(agreement.requester_id)
        .bind(agreement.provider_id)
        .bind(agreement.requester_accepted)
        .bind(agreement.requester_accepted_at)
        .bind(agreement.provider_accepted)
        .bind(agreement.provider_accepted_at)
        .bind(agreement.finalized_at)
        .bind(agreement.status)
        .bind(agreement.created_at)
        .bind(agreement.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_agreement(&mut self, agreement: &Agreement) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE agreements
            SET requester_accepted = $2, requester_accepted_at = $3,
                provider_accepted = $4, provider_accepted_at = $5,
                finalized_at = $6, status = $7, updated_at = $8
            WHERE id = $1
            "#
        )
        .bind(agreement.id)
        .bind(agreement.requester_accepted)
        .bind(agreement.requester_accepted_at)
        .bind(agreement.provider_accepted)
        .bind(agreement.provider_accepted_at)
        .bind(agreement.finalized_at)
        .bind(agreement.status)
        .bind(agreement.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error> {
        sqlx::query_as::<_, Agreement>("SELECT * FROM agreements WHERE id = $1")
            .bind(agreement_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn lock_agreement(&mut self, agreement_id: Uuid) -> Result<Option<Agreement>, Error> {
        sqlx::query_as::<_, Agreement>("SELECT * FROM agreements WHERE id = $1 FOR UPDATE")
            .bind(agreement_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn get_agreement_for_quote(
        &mut self,
        quote_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<Agreement>, Error> {
        sqlx::query_as::<_, Agreement>(
            "SELECT * FROM agreements WHERE quote_id = $1 AND provider_id = $2"
        )
        .bind(quote_id)
        .bind(provider_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn get_request_agreements(&mut self, request_id: Uuid) -> Result<Vec<Agreement>, Error> {
        sqlx::query_as::<_, Agreement>(
            "SELECT * FROM agreements WHERE request_id = $1 ORDER BY created_at ASC"
        )
        .bind(request_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn cancel_pending_agreements(
        &mut self,
        request_id: Uuid,
        except_agreement: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE agreements
            SET status = 'cancelled'::agreement_status, updated_at = $3
            WHERE request_id = $1
              AND ($2::uuid IS NULL OR id <> $2)
              AND status = 'pending'::agreement_status
            "#
        )
        .bind(request_id)
        .bind(except_agreement)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO workflow_statuses
            (id, request_id, provider_id, is_assigned, assigned_at, is_in_progress, in_progress_at,
            is_checked_in, checked_in_at, is_completed, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        )
        .bind(workflow.id)
        .bind(workflow.request_id)
        .bind(workflow.provider_id)
        .bind(workflow.is_assigned)
        .bind(workflow.assigned_at)
        .bind(workflow.is_in_progress)
        .bind(workflow.in_progress_at)
        .bind(workflow.is_checked_in)
        .bind(workflow.checked_in_at)
        .bind(workflow.is_completed)
        .bind(workflow.completed_at)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_workflow(&mut self, workflow: &WorkflowStatus) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE workflow_statuses
            SET is_assigned = $2, assigned_at = $3,
                is_in_progress = $4, in_progress_at = $5,
                is_checked_in = $6, checked_in_at = $7,
                is_completed = $8, completed_at = $9,
                updated_at = $10
            WHERE id = $1
            "#
        )
        .bind(workflow.id)
        .bind(workflow.is_assigned)
        .bind(workflow.assigned_at)
        .bind(workflow.is_in_progress)
        .bind(workflow.in_progress_at)
        .bind(workflow.is_checked_in)
        .bind(workflow.checked_in_at)
        .bind(workflow.is_completed)
        .bind(workflow.completed_at)
        .bind(workflow.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_workflow(
        &mut self,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<WorkflowStatus>, Error> {
        sqlx::query_as::<_, WorkflowStatus>(
            "SELECT * FROM workflow_statuses WHERE request_id = $1 AND provider_id = $2"
        )
        .bind(request_id)
        .bind(provider_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn insert_message(&mut self, message: &Message) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO messages
            (id, sender_id, receiver_id, request_id, quote_id, content, is_delivered, is_read, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.request_id)
        .bind(message.quote_id)
        .bind(&message.content)
        .bind(message.is_delivered)
        .bind(message.is_read)
        .bind(message.sent_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_thread(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        participant_id: Uuid,
    ) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE request_id = $1
              AND quote_id IS NOT DISTINCT FROM $2
              AND (sender_id = $3 OR receiver_id = $3)
            ORDER BY sent_at ASC
            "#
        )
        .bind(request_id)
        .bind(quote_id)
        .bind(participant_id)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn mark_thread_read(
        &mut self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        reader_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, is_delivered = TRUE
            WHERE request_id = $1
              AND quote_id IS NOT DISTINCT FROM $2
              AND receiver_id = $3
              AND is_read = FALSE
            "#
        )
        .bind(request_id)
        .bind(quote_id)
        .bind(reader_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await
    }
}
