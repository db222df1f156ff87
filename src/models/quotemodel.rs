// models/quotemodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Requester,
    Provider,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "quote_status", rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Quote {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub price: BigDecimal,
    pub message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: QuoteStatus,
    pub accepted_by_requester: bool,
    pub requester_accepted_at: Option<DateTime<Utc>>,
    pub accepted_by_provider: bool,
    pub provider_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// A live quote blocks the provider from submitting another one on the same request.
    pub fn is_live(&self) -> bool {
        matches!(self.status, QuoteStatus::Pending | QuoteStatus::Accepted)
    }

    /// Pending with an expiry strictly before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QuoteStatus::Pending && self.expires_at.map_or(false, |at| now > at)
    }

    pub fn mark_accepted_by(&mut self, role: ActorRole, now: DateTime<Utc>) {
        match role {
            ActorRole::Requester if !self.accepted_by_requester => {
                self.accepted_by_requester = true;
                self.requester_accepted_at = Some(now);
                self.updated_at = now;
            }
            ActorRole::Provider if !self.accepted_by_provider => {
                self.accepted_by_provider = true;
                self.provider_accepted_at = Some(now);
                self.updated_at = now;
            }
            _ => {}
        }
    }

    pub fn set_status(&mut self, status: QuoteStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "agreement_status", rename_all = "snake_case")]
pub enum AgreementStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl AgreementStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgreementStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Agreement {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub request_id: Uuid,
    pub requester_id: Uuid,
    pub provider_id: Uuid,
    pub requester_accepted: bool,
    pub requester_accepted_at: Option<DateTime<Utc>>,
    pub provider_accepted: bool,
    pub provider_accepted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub status: AgreementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    pub fn new(quote: &Quote, requester_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            quote_id: quote.id,
            request_id: quote.request_id,
            requester_id,
            provider_id: quote.provider_id,
            requester_accepted: false,
            requester_accepted_at: None,
            provider_accepted: false,
            provider_accepted_at: None,
            finalized_at: None,
            status: AgreementStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The party `user_id` acts as on this agreement, if any.
    pub fn party(&self, user_id: Uuid) -> Option<ActorRole> {
        if user_id == self.requester_id {
            Some(ActorRole::Requester)
        } else if user_id == self.provider_id {
            Some(ActorRole::Provider)
        } else {
            None
        }
    }

    pub fn has_accepted(&self, role: ActorRole) -> bool {
        match role {
            ActorRole::Requester => self.requester_accepted,
            ActorRole::Provider => self.provider_accepted,
        }
    }

    /// Sets the acting side's flag. Repeating an acceptance keeps the original timestamp.
    pub fn record_acceptance(&mut self, role: ActorRole, now: DateTime<Utc>) {
        if self.has_accepted(role) {
            return;
        }
        match role {
            ActorRole::Requester => {
                self.requester_accepted = true;
                self.requester_accepted_at = Some(now);
            }
            ActorRole::Provider => {
                self.provider_accepted = true;
                self.provider_accepted_at = Some(now);
            }
        }
        self.updated_at = now;
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.requester_accepted && self.provider_accepted
    }

    pub fn finalize(&mut self, now: DateTime<Utc>) {
        self.status = AgreementStatus::Accepted;
        self.finalized_at = Some(now);
        self.updated_at = now;
    }

    pub fn close(&mut self, status: AgreementStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quote(expires_at: Option<DateTime<Utc>>) -> Quote {
        let now = Utc::now();
        Quote {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            price: BigDecimal::from(100),
            message: None,
            expires_at,
            status: QuoteStatus::Pending,
            accepted_by_requester: false,
            requester_accepted_at: None,
            accepted_by_provider: false,
            provider_accepted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn quote_is_due_only_after_expiry() {
        let now = Utc::now();
        let q = quote(Some(now + Duration::minutes(5)));
        assert!(!q.is_due(now));
        assert!(q.is_due(now + Duration::minutes(6)));
        assert!(!quote(None).is_due(now + Duration::days(365)));
    }

    #[test]
    fn agreement_needs_both_sides() {
        let now = Utc::now();
        let requester = Uuid::new_v4();
        let q = quote(None);
        let mut agreement = Agreement::new(&q, requester, now);

        assert_eq!(agreement.party(requester), Some(ActorRole::Requester));
        assert_eq!(agreement.party(q.provider_id), Some(ActorRole::Provider));
        assert_eq!(agreement.party(Uuid::new_v4()), None);

        agreement.record_acceptance(ActorRole::Requester, now);
        assert!(!agreement.is_fully_accepted());

        let later = now + Duration::seconds(30);
        agreement.record_acceptance(ActorRole::Requester, later);
        assert_eq!(agreement.requester_accepted_at, Some(now));

        agreement.record_acceptance(ActorRole::Provider, later);
        assert!(agreement.is_fully_accepted());
    }
}
