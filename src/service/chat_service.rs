// service/chat_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::db::MarketStore,
    models::{
        chatmodel::Message,
        requestmodel::{ProviderStatus, RequestStatus},
    },
    service::{error::ServiceError, provider_status},
};

#[derive(Debug, Clone)]
pub struct ChatService {
    store: Arc<dyn MarketStore>,
}

impl ChatService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Posts into the request's general thread, or into one negotiation's thread when
    /// `quote_id` is set. One side must be the requester and the other a provider (the
    /// quote's provider for a negotiation thread).
    pub async fn post(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        content: String,
    ) -> Result<Message, ServiceError> {
        let now = Utc::now();
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::InvalidArgument("message content is required".to_string()));
        }
        if sender_id == receiver_id {
            return Err(ServiceError::InvalidArgument("cannot message yourself".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::request_not_found(request_id))?;

        if request.status == RequestStatus::Cancelled {
            return Err(ServiceError::InvalidTransition(format!(
                "service request {} is cancelled",
                request_id
            )));
        }

        let provider_id = if sender_id == request.requester_id {
            receiver_id
        } else if receiver_id == request.requester_id {
            sender_id
        } else {
            return Err(ServiceError::Forbidden(
                "messages must be exchanged with the requester".to_string(),
            ));
        };

        if let Some(quote_id) = quote_id {
            let quote = tx
                .get_quote(quote_id)
                .await?
                .ok_or_else(|| ServiceError::quote_not_found(quote_id))?;
            if quote.request_id != request_id {
                return Err(ServiceError::InvalidArgument(format!(
                    "quote {} does not belong to request {}",
                    quote_id, request_id
                )));
            }
            if quote.provider_id != provider_id {
                return Err(ServiceError::Forbidden(format!(
                    "thread for quote {} is between the requester and its provider",
                    quote_id
                )));
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            request_id,
            quote_id,
            content,
            is_delivered: false,
            is_read: false,
            sent_at: now,
        };
        tx.insert_message(&message).await?;

        if request.is_open() {
            provider_status::record(
                tx.as_mut(),
                request_id,
                provider_id,
                ProviderStatus::Negotiating,
                None,
                now,
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Message {} on request {} ({:?}) from {} to {}",
            message.id,
            request_id,
            quote_id,
            sender_id,
            receiver_id
        );
        Ok(message)
    }

    pub async fn thread(
        &self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        reader_id: Uuid,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut tx = self.store.begin().await?;
        if tx.get_request(request_id).await?.is_none() {
            return Err(ServiceError::request_not_found(request_id));
        }
        Ok(tx.get_thread(request_id, quote_id, reader_id).await?)
    }

    pub async fn mark_read(
        &self,
        request_id: Uuid,
        quote_id: Option<Uuid>,
        reader_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let count = tx.mark_thread_read(request_id, quote_id, reader_id).await?;
        tx.commit().await?;
        Ok(count)
    }
}
