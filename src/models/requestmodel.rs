// models/requestmodel.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "booking_mode", rename_all = "snake_case")]
#[serde(rename_all = "kebab-case")]
pub enum BookingMode {
    Immediate,
    Scheduled,
    QuoteOnly,
}

impl BookingMode {
    pub fn to_str(&self) -> &str {
        match self {
            BookingMode::Immediate => "immediate",
            BookingMode::Scheduled => "scheduled",
            BookingMode::QuoteOnly => "quote-only",
        }
    }

    /// Checks the schedule fields a request carries against what this mode allows.
    /// `today` is the caller's current UTC date.
    pub fn validate_schedule(
        &self,
        date: Option<NaiveDate>,
        time: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), String> {
        let time = time.map(str::trim).filter(|t| !t.is_empty());

        match self {
            BookingMode::Immediate => {
                let date = date.ok_or("date is required for immediate bookings")?;
                if date < today {
                    return Err("date cannot be in the past for immediate bookings".to_string());
                }
                Ok(())
            }
            BookingMode::Scheduled => {
                let date = date.ok_or("date is required for scheduled bookings")?;
                if date < today + Duration::days(1) {
                    return Err("date must be tomorrow or later for scheduled bookings".to_string());
                }
                if time.is_none() {
                    return Err("time is required for scheduled bookings".to_string());
                }
                Ok(())
            }
            BookingMode::QuoteOnly => {
                if date.is_some() {
                    return Err("date must be omitted for quote-only bookings".to_string());
                }
                if time.is_some() {
                    return Err("time must be omitted for quote-only bookings".to_string());
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    /// Statuses in which a request must carry an assigned provider.
    pub fn has_provider(&self) -> bool {
        matches!(
            self,
            RequestStatus::Assigned | RequestStatus::InProgress | RequestStatus::Completed
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, RequestStatus::Open | RequestStatus::Assigned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub booking_mode: BookingMode,
    pub category: String,
    pub subcategory: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub assigned_provider_id: Option<Uuid>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn is_open(&self) -> bool {
        self.status == RequestStatus::Open && self.assigned_provider_id.is_none()
    }

    pub fn is_assigned_to(&self, provider_id: Uuid) -> bool {
        self.assigned_provider_id == Some(provider_id)
    }

    /// `assigned_provider_id` is set exactly when the status says a provider holds the job.
    pub fn is_consistent(&self) -> bool {
        self.assigned_provider_id.is_some() == self.status.has_provider()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "provider_status", rename_all = "snake_case")]
pub enum ProviderStatus {
    Hidden,
    Viewed,
    Negotiating,
    Quoted,
    Assigned,
    Rejected,
    Completed,
}

impl ProviderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderStatus::Assigned | ProviderStatus::Rejected | ProviderStatus::Completed
        )
    }

    /// Statuses retired when another provider wins the request.
    pub fn is_live_negotiation(&self) -> bool {
        matches!(
            self,
            ProviderStatus::Viewed | ProviderStatus::Negotiating | ProviderStatus::Quoted
        )
    }

    fn rank(&self) -> u8 {
        match self {
            ProviderStatus::Hidden => 0,
            ProviderStatus::Viewed => 1,
            ProviderStatus::Negotiating => 2,
            ProviderStatus::Quoted => 3,
            ProviderStatus::Assigned | ProviderStatus::Rejected | ProviderStatus::Completed => 4,
        }
    }

    /// Whether a provider-driven event may move a row from `self` to `next`.
    /// Negotiation only moves forward and never leaves a terminal status.
    pub fn can_advance_to(&self, next: ProviderStatus) -> bool {
        !self.is_terminal() && !next.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ProviderRequestStatus {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub status: ProviderStatus,
    pub quote_id: Option<Uuid>,
    pub last_updated: DateTime<Utc>,
}

impl ProviderRequestStatus {
    pub fn new(
        request_id: Uuid,
        provider_id: Uuid,
        status: ProviderStatus,
        quote_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            provider_id,
            status,
            quote_id,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct HiddenRequest {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_request_id: Uuid,
    pub hidden_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn immediate_requires_date_not_in_past() {
        let mode = BookingMode::Immediate;
        assert!(mode.validate_schedule(Some(today()), None, today()).is_ok());
        assert!(mode.validate_schedule(None, None, today()).is_err());

        let yesterday = today() - Duration::days(1);
        let err = mode.validate_schedule(Some(yesterday), None, today()).unwrap_err();
        assert!(err.contains("date"));
    }

    #[test]
    fn scheduled_requires_tomorrow_and_time() {
        let mode = BookingMode::Scheduled;
        let tomorrow = today() + Duration::days(1);

        assert!(mode.validate_schedule(Some(tomorrow), Some("10:30"), today()).is_ok());
        assert!(mode.validate_schedule(Some(today()), Some("10:30"), today()).is_err());

        let err = mode.validate_schedule(Some(tomorrow), Some("  "), today()).unwrap_err();
        assert!(err.contains("time"));
    }

    #[test]
    fn quote_only_rejects_any_schedule_field() {
        let mode = BookingMode::QuoteOnly;
        assert!(mode.validate_schedule(None, None, today()).is_ok());
        assert!(mode.validate_schedule(Some(today()), None, today()).is_err());
        assert!(mode.validate_schedule(None, Some("morning"), today()).is_err());
    }

    #[test]
    fn provider_status_only_moves_forward() {
        assert!(ProviderStatus::Hidden.can_advance_to(ProviderStatus::Viewed));
        assert!(ProviderStatus::Viewed.can_advance_to(ProviderStatus::Quoted));
        assert!(!ProviderStatus::Quoted.can_advance_to(ProviderStatus::Viewed));
        assert!(!ProviderStatus::Rejected.can_advance_to(ProviderStatus::Quoted));
        assert!(!ProviderStatus::Quoted.can_advance_to(ProviderStatus::Assigned));
    }

    #[test]
    fn booking_mode_serializes_kebab_case() {
        let json = serde_json::to_string(&BookingMode::QuoteOnly).unwrap();
        assert_eq!(json, "\"quote-only\"");
    }
}
